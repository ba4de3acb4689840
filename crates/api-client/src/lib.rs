//! # clinic-api-client
//!
//! Async client core for the clinic patient-management REST backend: the
//! single egress point for all API traffic. It owns the concerns every call
//! shares:
//!
//! - bearer-token authentication backed by a durable credential store
//! - transparent, single-flight recovery from access-token expiry
//! - short-TTL memoization of GET responses
//! - normalization of heterogeneous backend error shapes into one
//!   user-presentable message per failure
//!
//! Entity-level wrappers (patients, surgeries, districts, ...) are thin
//! collaborators that hold an [`ApiClient`] clone and call the operations it
//! exposes; they live with the UI, not here.
//!
//! ```rust,no_run
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! use clinic_api_client::{ApiClient, ClientConfig};
//! use serde_json::json;
//!
//! let config = ClientConfig::builder("https://api.example.com/api/v1")
//!     .credentials_path("session/credentials.json")
//!     .build()?;
//! let client = ApiClient::new(config)?;
//!
//! client
//!     .login("/auth/login", &json!({ "phone": "+7000000000", "password": "secret" }))
//!     .await?;
//! let patients = client.get("/patients", &[("page", "1")]).await?;
//! # let _ = patients;
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod time;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use auth::{
    CredentialStore, CredentialStoreError, FileCredentialStore, MemoryCredentialStore, TokenPair,
};
pub use client::ApiClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, DEFAULT_USER_AGENT};
pub use error::{ApiError, ApiResult};
pub use normalize::extract_error_message;
pub use time::{Clock, SystemClock};
pub use transport::{
    HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};
