pub mod credentials;
pub(crate) mod refresh;

pub use credentials::{
    CredentialStore, CredentialStoreError, FileCredentialStore, MemoryCredentialStore, TokenPair,
};
