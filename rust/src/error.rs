#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum ChatError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("position {position} out of range (len {len})")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("chat is closed")]
    Closed,
}

pub type ChatResult<T> = Result<T, ChatError>;
