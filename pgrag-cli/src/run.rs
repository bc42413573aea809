//! The fixed ingest-and-query sequence driven by the command line.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use pgrag::{
    Document, DocumentLoader, EmbeddingProvider, FixedSizeChunker, InMemoryVectorStore,
    LoadPolicy, OpenAIEmbeddingProvider, PgConnectionConfig, PgVectorStore, RagConfig,
    RagError, RagPipeline, RetryPolicy, SearchResult, TextLoader, VectorStore,
};
use tracing::info;

use crate::cli::{Cli, StoreKind};

const RULE_WIDTH: usize = 80;

/// Everything resolved from the command line and environment before any
/// pipeline step runs.
struct Settings {
    config: RagConfig,
    chunker: FixedSizeChunker,
    loader: TextLoader,
    embedder: OpenAIEmbeddingProvider,
    store: Option<PgConnectionConfig>,
}

fn resolve(cli: &Cli) -> Result<Settings> {
    let config = RagConfig::builder()
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.chunk_overlap)
        .top_k(cli.top_k)
        .fetch_k(cli.fetch_k)
        .lambda_mult(cli.lambda_mult)
        .embedding_batch_size(cli.batch_size)
        .embedding_concurrency(cli.concurrency)
        .build()
        .context("invalid pipeline settings")?;
    let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;

    if !cli.file.is_file() {
        return Err(RagError::NotFound { path: cli.file.clone() }.into());
    }
    let policy = match &cli.delimiter {
        Some(separator) => LoadPolicy::Delimited(separator.clone()),
        None => LoadPolicy::WholeFile,
    };
    let loader = TextLoader::new(&cli.file).with_policy(policy);

    let mut embedder = OpenAIEmbeddingProvider::from_env()
        .context("OPENAI_API_KEY must be set to embed documents")?
        .with_retry(RetryPolicy::with_max_retries(cli.max_retries));
    if let Some(model) = &cli.model {
        embedder = embedder.with_model(model);
    }

    let store = match cli.store {
        StoreKind::Memory => None,
        StoreKind::Pgvector => {
            let connection = match &cli.database_url {
                Some(url) => PgConnectionConfig::from_connection_string(url),
                None => PgConnectionConfig::from_env()?,
            };
            connection.validate().context("invalid database connection")?;
            Some(connection)
        }
    };

    Ok(Settings { config, chunker, loader, embedder, store })
}

async fn open_store(connection: Option<&PgConnectionConfig>) -> Result<Arc<dyn VectorStore>> {
    Ok(match connection {
        Some(connection) => {
            info!(database = %connection.redacted(), "connecting to pgvector");
            Arc::new(PgVectorStore::connect(connection).await?)
        }
        None => {
            info!("using in-memory vector store");
            Arc::new(InMemoryVectorStore::new())
        }
    })
}

fn print_results(heading: &str, results: &[SearchResult]) {
    println!("{heading}");
    let rule = "-".repeat(RULE_WIDTH);
    for result in results {
        println!("{rule}");
        println!("Score:  {}", result.score);
        println!("{}", result.chunk.text);
        println!("{rule}");
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = resolve(&cli)?;
    info!(
        file = %cli.file.display(),
        collection = %cli.collection,
        model = settings.embedder.model(),
        "configuration resolved"
    );

    let vector_store = open_store(settings.store.as_ref()).await?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(settings.embedder);
    let pipeline = Arc::new(
        RagPipeline::builder()
            .config(settings.config)
            .embedding_provider(embedder)
            .vector_store(vector_store)
            .chunker(Arc::new(settings.chunker))
            .build()?,
    );
    let config = pipeline.config();
    let collection = cli.collection.as_str();

    let documents = settings.loader.load().await?;
    let chunks = pipeline.upsert_collection(collection, &documents, false).await?;
    info!(document_count = documents.len(), chunk_count = chunks.len(), "collection indexed");

    let results = pipeline.similarity_search(collection, &cli.query, config.top_k).await?;
    print_results("Similarity search results:", &results);

    let results = pipeline
        .max_marginal_relevance_search(
            collection,
            &cli.query,
            config.top_k,
            config.fetch_k,
            config.lambda_mult,
        )
        .await?;
    print_results("Maximal marginal relevance results:", &results);

    pipeline.add_documents(collection, &[Document::new("foo")]).await?;
    let results = pipeline.similarity_search(collection, "foo", 1).await?;
    print_results("After adding \"foo\":", &results);

    if cli.rebuild {
        pipeline.upsert_collection(collection, &documents, true).await?;
        let results = pipeline.similarity_search(collection, "foo", 1).await?;
        print_results("After rebuilding the collection:", &results);
    }

    let retriever = pipeline.as_retriever(collection);
    println!("{retriever}");
    let results = retriever.retrieve_with_scores(&cli.query).await?;
    print_results("Retriever results:", &results);

    Ok(())
}
