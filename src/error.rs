use thiserror::Error;

use crate::models::PostId;

pub type Result<T> = std::result::Result<T, NarrativeError>;

#[derive(Debug, Error)]
pub enum NarrativeError {
    /// Caller-side misconfiguration: wrong platform count, missing analyzer, zero batch size.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input records that cannot be turned into posts.
    #[error("invalid post data: {0}")]
    Data(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("analyzer failed on batch {batch} (posts {start}..{end}): {message}")]
    Analyzer {
        batch: usize,
        start: usize,
        end: usize,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("reply tree rooted at {root} contains a cycle")]
    Cycle { root: PostId },

    #[error("reply tree root {root} is not in the graph")]
    MissingRoot { root: PostId },
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding model returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed after {attempts} attempt(s): {message}")]
    Request { attempts: u32, message: String },

    #[error("oracle timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("oracle returned no message content")]
    EmptyResponse,
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        EmbedError::Request(e.to_string())
    }
}
