use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("malformed corpus {}: {reason}", path.display())]
    CorpusFormat { path: PathBuf, reason: String },

    #[error("input too long ({reference}): {chars} chars, limit is {limit}")]
    InputTooLong {
        reference: String,
        chars: usize,
        limit: usize,
    },

    #[error("embedding provider failed ({context}): {reason}")]
    EmbeddingProvider { context: String, reason: String },

    #[error("could not persist index to {}: {reason}", path.display())]
    IndexPersistence { path: PathBuf, reason: String },

    #[error("index not found at {}; run `versebert index` first", .0.display())]
    IndexNotFound(PathBuf),

    #[error("unusable index {}: {reason}", path.display())]
    IndexFormat { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn provider(
        context: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::EmbeddingProvider {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}
