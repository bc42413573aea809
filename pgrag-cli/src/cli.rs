use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use pgrag::DEFAULT_COLLECTION_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// PostgreSQL with the pgvector extension.
    Pgvector,
    /// Process-local store, lost on exit.
    Memory,
}

#[derive(Debug, Parser)]
#[command(name = "pgrag")]
#[command(about = "Load a text file, index it in a vector store and run sample queries", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Text or CSV file to index")]
    pub file: PathBuf,

    #[arg(short, long, default_value = DEFAULT_COLLECTION_NAME, help = "Collection name")]
    pub collection: String,

    #[arg(
        short,
        long,
        default_value = "What are the latest financial news?",
        help = "Query to run against the collection"
    )]
    pub query: String,

    #[arg(long, default_value_t = 1000, help = "Maximum characters per chunk")]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 0, help = "Characters shared by consecutive chunks")]
    pub chunk_overlap: usize,

    #[arg(short = 'k', long, default_value_t = 4, help = "Number of results per search")]
    pub top_k: usize,

    #[arg(long, default_value_t = 20, help = "Candidates fetched before MMR re-ranking")]
    pub fetch_k: usize,

    #[arg(long = "lambda", default_value_t = 0.5, help = "MMR relevance/diversity balance in [0, 1]")]
    pub lambda_mult: f32,

    #[arg(long, help = "Split the file into one document per record on this separator")]
    pub delimiter: Option<String>,

    #[arg(long, value_enum, default_value_t = StoreKind::Pgvector, help = "Vector store backend")]
    pub store: StoreKind,

    #[arg(
        long,
        env = "PGVECTOR_CONNECTION_STRING",
        hide_env_values = true,
        help = "PostgreSQL connection string (defaults to the PGVECTOR_* variables)"
    )]
    pub database_url: Option<String>,

    #[arg(long, help = "Rebuild the collection from the file, deleting what was stored")]
    pub rebuild: bool,

    #[arg(long, default_value_t = 0, help = "Retries for throttled or failed embedding calls")]
    pub max_retries: u32,

    #[arg(long, default_value_t = 64, help = "Texts per embedding request")]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1, help = "Embedding requests in flight")]
    pub concurrency: usize,

    #[arg(long, env = "OPENAI_EMBEDDING_MODEL", help = "Embedding model (overrides the default)")]
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_library() {
        let cli = Cli::try_parse_from(["pgrag", "--file", "news.csv", "--store", "memory"]).unwrap();
        assert_eq!(cli.collection, "NQNews");
        assert_eq!(cli.query, "What are the latest financial news?");
        assert_eq!((cli.chunk_size, cli.chunk_overlap, cli.top_k), (1000, 0, 4));
        assert_eq!(cli.fetch_k, 20);
        assert_eq!(cli.store, StoreKind::Memory);
        assert!(!cli.rebuild);
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["pgrag"]).is_err());
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "pgrag",
            "-f",
            "news.csv",
            "--chunk-size",
            "200",
            "--chunk-overlap",
            "20",
            "--lambda",
            "0.25",
            "--delimiter",
            "\n",
            "--rebuild",
        ])
        .unwrap();
        assert_eq!(cli.chunk_size, 200);
        assert_eq!(cli.chunk_overlap, 20);
        assert_eq!(cli.lambda_mult, 0.25);
        assert_eq!(cli.delimiter.as_deref(), Some("\n"));
        assert!(cli.rebuild);
    }
}
