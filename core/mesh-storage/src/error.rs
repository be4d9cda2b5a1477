use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage client is closed")]
    Closed,
}
