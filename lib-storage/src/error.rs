use lib_types::BlockId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no block stored at height {0}")]
    UnknownHeight(u32),
    #[error("block {id} already stored with different contents")]
    Conflict { id: BlockId },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
