use thiserror::Error;

/// Error taxonomy of the retrieval engine.
///
/// `BackendUnavailable` and `CorpusUnavailable` are recoverable: the engine
/// falls back to lexical-only results or to the built-in corpus. Only
/// `RetrievalFailure` reaches callers of a search as a failed request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailure(String),
}

impl Error {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable(err.to_string())
    }

    pub fn corpus(err: impl std::fmt::Display) -> Self {
        Error::CorpusUnavailable(err.to_string())
    }

    pub fn retrieval(err: impl std::fmt::Display) -> Self {
        Error::RetrievalFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
