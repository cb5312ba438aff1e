use crate::cancel::Interrupted;
use crate::cipher::CipherError;
use crate::client::Role;
use crate::index::IndexError;
use crate::ore::OreError;
use crate::store::{BulkWriteError, DocId, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown attribute role: {0}")]
    UnknownRole(String),
    #[error("no key material for the {0} role")]
    MissingKey(Role),
    #[error("field {0} has no role assigned")]
    UnclassifiedField(String),
    #[error("field {field} cannot be encrypted: {reason}")]
    UnsupportedValue { field: String, reason: String },
    #[error("unsupported update operator: {0}")]
    UnsupportedOperator(String),
    #[error("field {0} is indexed and cannot be replaced")]
    IndexedFieldUpdate(String),
    #[error("ORE error: {0}")]
    Ore(#[from] OreError),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("bulk write error: {0}")]
    BulkWrite(#[from] BulkWriteError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    /// The document body is stored under `id` but is missing from the
    /// attribute's index.
    #[error("document {id} was stored but not indexed under {attribute}: {source}")]
    NotIndexed {
        id: DocId,
        attribute: String,
        #[source]
        source: IndexError,
    },
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
