//! End-to-end pipeline tests against the in-memory store and mock embedders.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{
    DIM, MockEmbeddingProvider, SlowFirstBatchProvider, ThrottledProvider, mock_embedding,
    mock_pipeline, pipeline_with,
};
use pgrag::{
    Document, DocumentLoader, FixedSizeChunker, InMemoryVectorStore, LoadPolicy, RagConfig,
    RagError, RagPipeline, SearchType, TextLoader,
};
use pgrag::vectorstore::cosine_similarity;

const NEWS: &str = "Markets rallied after the central bank held rates steady.\n\
Tech earnings beat expectations across the sector.\n\
Oil prices slipped on weaker demand forecasts.\n";

fn news_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(NEWS.as_bytes()).unwrap();
    file
}

#[test]
fn mock_embeddings_separate_distinct_texts() {
    let rates = mock_embedding("Markets rallied after the central bank held rates steady.", DIM);
    let earnings = mock_embedding("Tech earnings beat expectations across the sector.", DIM);
    assert_eq!(rates, mock_embedding("Markets rallied after the central bank held rates steady.", DIM));
    assert!(cosine_similarity(&rates, &earnings).abs() < 0.9);
}

#[tokio::test]
async fn load_upsert_and_search() {
    let file = news_file();
    let documents = TextLoader::new(file.path()).load().await.unwrap();
    assert_eq!(documents.len(), 1);

    let pipeline = mock_pipeline(60, 10);
    let chunks = pipeline.upsert_collection("NQNews", &documents, false).await.unwrap();
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.embedding.len() == DIM));

    let results = pipeline.similarity_search("NQNews", &chunks[1].text, 4).await.unwrap();
    assert_eq!(results.len(), 4.min(chunks.len()));
    assert_eq!(results[0].chunk.id, chunks[1].id);
    assert!(results.windows(2).all(|w| w[0].score <= w[1].score));
}

#[tokio::test]
async fn added_document_is_its_own_nearest_neighbour() {
    let file = news_file();
    let documents =
        TextLoader::new(file.path()).with_policy(LoadPolicy::Lines).load().await.unwrap();
    assert_eq!(documents.len(), 3);

    let pipeline = mock_pipeline(1000, 0);
    pipeline.upsert_collection("NQNews", &documents, false).await.unwrap();
    pipeline.add_documents("NQNews", &[Document::new("foo")]).await.unwrap();

    let results = pipeline.similarity_search("NQNews", "foo", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.text, "foo");

    let all = pipeline.similarity_search("NQNews", "foo", 10).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all[1..].iter().all(|r| r.score >= results[0].score));
}

#[tokio::test]
async fn add_documents_creates_missing_collection() {
    let pipeline = mock_pipeline(1000, 0);
    pipeline.add_documents("fresh", &[Document::new("foo")]).await.unwrap();
    let store = pipeline.vector_store();
    assert_eq!(store.collection_dimensions("fresh").await.unwrap(), Some(DIM));
}

#[tokio::test]
async fn pre_delete_rebuild_leaves_no_stale_records() {
    let pipeline = mock_pipeline(1000, 0);
    let old = [Document::new("stale headline").with_id("old")];
    let new = [Document::new("fresh headline").with_id("new")];

    pipeline.upsert_collection("NQNews", &old, false).await.unwrap();
    pipeline.upsert_collection("NQNews", &new, true).await.unwrap();

    let results = pipeline.similarity_search("NQNews", "stale headline", 10).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, ["new_0"]);
}

#[tokio::test]
async fn upsert_without_pre_delete_accumulates() {
    let pipeline = mock_pipeline(1000, 0);
    let first = [Document::new("first").with_id("a")];
    let second = [Document::new("second").with_id("b")];

    pipeline.upsert_collection("NQNews", &first, false).await.unwrap();
    pipeline.upsert_collection("NQNews", &second, false).await.unwrap();
    // Same ids replace rather than duplicate.
    pipeline.upsert_collection("NQNews", &first, false).await.unwrap();

    let results = pipeline.similarity_search("NQNews", "first", 10).await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn embedding_errors_propagate_unchanged() {
    let config = RagConfig::default();
    let pipeline = pipeline_with(config, Arc::new(ThrottledProvider));

    let err = pipeline
        .upsert_collection("NQNews", &[Document::new("anything")], false)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::RateLimitError { .. }));
    assert!(err.is_retryable());

    let err = pipeline.similarity_search("NQNews", "anything", 1).await.unwrap_err();
    assert!(matches!(err, RagError::RateLimitError { .. }));
}

#[tokio::test]
async fn searching_an_absent_collection_fails() {
    let pipeline = mock_pipeline(1000, 0);
    let err = pipeline.similarity_search("missing", "foo", 4).await.unwrap_err();
    assert!(matches!(err, RagError::CollectionNotFound(name) if name == "missing"));

    let err = pipeline.max_marginal_relevance_search("missing", "foo", 4, 20, 0.5).await.unwrap_err();
    assert!(matches!(err, RagError::CollectionNotFound(_)));
}

#[tokio::test]
async fn dimension_mismatch_is_a_schema_error() {
    let store = Arc::new(InMemoryVectorStore::new());
    let build = |dims: usize| {
        RagPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(MockEmbeddingProvider::new(dims)))
            .vector_store(store.clone())
            .chunker(Arc::new(FixedSizeChunker::new(1000, 0).unwrap()))
            .build()
            .unwrap()
    };

    build(DIM).upsert_collection("NQNews", &[Document::new("a")], false).await.unwrap();
    let err = build(16).add_documents("NQNews", &[Document::new("b")]).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::SchemaError { expected, actual, .. } if expected == DIM && actual == 16
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_batches_keep_chunk_order() {
    let config = RagConfig::builder()
        .embedding_batch_size(2)
        .embedding_concurrency(4)
        .build()
        .unwrap();
    let provider = Arc::new(SlowFirstBatchProvider::new(DIM));
    let pipeline = pipeline_with(config, provider.clone());

    let documents: Vec<Document> =
        (0..9).map(|i| Document::new(format!("headline {i}")).with_id(format!("d{i}"))).collect();
    let chunks = pipeline.upsert_collection("NQNews", &documents, false).await.unwrap();

    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 5);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.text, format!("headline {i}"));
        assert_eq!(chunk.embedding, mock_embedding(&chunk.text, DIM));
    }
}

#[tokio::test]
async fn query_applies_distance_threshold() {
    let config = RagConfig::builder().top_k(10).score_threshold(1e-3).build().unwrap();
    let pipeline = pipeline_with(config, Arc::new(MockEmbeddingProvider::new(DIM)));
    let documents = [
        Document::new("rates held").with_id("a"),
        Document::new("earnings beat").with_id("b"),
        Document::new("oil slipped").with_id("c"),
    ];
    pipeline.upsert_collection("NQNews", &documents, false).await.unwrap();

    let results = pipeline.query("NQNews", "earnings beat").await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, ["b_0"]);
}

#[tokio::test]
async fn retriever_returns_documents() {
    let pipeline = mock_pipeline(1000, 0);
    let documents = [
        Document::new("rates held").with_id("a").with_metadata("source", "news.csv"),
        Document::new("earnings beat").with_id("b").with_metadata("source", "news.csv"),
    ];
    pipeline.upsert_collection("NQNews", &documents, false).await.unwrap();

    let retriever = pipeline.as_retriever("NQNews").with_k(1);
    assert_eq!(retriever.to_string(), "Retriever(collection=NQNews, search=similarity, k=1)");

    let docs = retriever.retrieve("rates held").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text, "rates held");
    assert_eq!(docs[0].source_uri.as_deref(), Some("news.csv"));

    let mmr = pipeline.as_retriever("NQNews").with_mmr();
    assert_eq!(mmr.search_type(), SearchType::Mmr { fetch_k: 20, lambda_mult: 0.5 });
    assert_eq!(mmr.retrieve("rates held").await.unwrap().len(), 2);
}

#[test]
fn builder_reports_missing_parts() {
    let err = RagPipeline::builder().build().unwrap_err();
    assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("config")));

    let err = RagPipeline::builder()
        .config(RagConfig::default())
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .chunker(Arc::new(FixedSizeChunker::new(100, 0).unwrap()))
        .build()
        .unwrap_err();
    assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("embedding_provider")));
}

#[test]
fn pipeline_debug_omits_trait_objects() {
    let pipeline = mock_pipeline(1000, 0);
    let rendered = format!("{pipeline:?}");
    assert!(rendered.starts_with("RagPipeline"));
    assert!(rendered.contains(&format!("dimensions: {DIM}")));
}
