//! Persistence of acquired tokens.
//!
//! The login flow hands its token to a [`Storage`] implementation keyed by the
//! service host it logged in to.

mod file;
mod storage;

pub use file::FileStorage;
pub use storage::{credential_key, Storage, StoredCredential};
