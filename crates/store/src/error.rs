use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("key '{0}' holds the wrong kind of value")]
    WrongType(String),

    #[error("value at '{0}' is not an integer")]
    NotInteger(String),

    #[error("timed out after {0}ms connecting to the store")]
    ConnectTimeout(u64),
}
