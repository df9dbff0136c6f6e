//! Credential provisioning implementations.

mod fs_store;
mod inline;
mod remote;

pub use fs_store::{CREDS_FILE, FsCredentialStore};
pub use inline::InlineCredentialFetcher;
pub use remote::HttpCredentialFetcher;
