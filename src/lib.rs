//! Encrypted document store.
//!
//! A [`Client`] holds the keys and encrypts each document field under the
//! roles assigned to it: randomized symmetric encryption for storage,
//! order-revealing encryption for the index, and additively or
//! multiplicatively homomorphic encryption for fields that are updated in
//! place. An [`EncryptedCollection`] stores the result in any
//! [`DocumentStore`] and answers equality, inequality and range queries
//! through an AVL tree of ORE ciphertexts, without ever seeing a plaintext.
//!
//! ```no_run
//! use ore_store::{CancelToken, Client, Config, EncryptedCollection, KeySet, MemoryStore, Role};
//! use serde_json::json;
//!
//! let config = Config::default()
//!     .field("name", Role::Static)
//!     .field("age", Role::Index)
//!     .field("age", Role::Static);
//! let keys = KeySet::generate(&config, &mut rand::thread_rng())?;
//! let client = Client::new(&config, &keys)?;
//! let people = EncryptedCollection::new(MemoryStore::new(), "people");
//!
//! let doc = json!({"name": "Arya", "age": 18});
//! let encrypted = client.encrypt(doc.as_object().unwrap())?;
//! people.insert(encrypted, &CancelToken::new())?;
//! # Ok::<(), ore_store::Error>(())
//! ```
pub mod cancel;
pub mod cipher;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod index;
pub mod keys;
pub mod load;
pub mod ore;
pub mod primitives;
pub mod query;
pub mod store;

pub use crate::cancel::{CancelToken, Interrupted};
pub use crate::client::{Client, EncryptKind, EncryptedDocument, Role};
pub use crate::config::{Config, IndexEncoding};
pub use crate::error::{Error, Result};
pub use crate::index::{EncryptedIndex, Relation};
pub use crate::keys::KeySet;
pub use crate::load::Loader;
pub use crate::ore::{OreCipher, OreParams};
pub use crate::query::{Condition, EncryptedCollection, Predicate, Selection};
pub use crate::store::{DocId, Document, DocumentStore, MemoryStore};
