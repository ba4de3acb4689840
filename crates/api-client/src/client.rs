//! Request dispatcher: the single egress point for backend traffic.
//!
//! Composes the credential store, response cache and refresh coordinator.
//! Reads are memoized for a short window; writes invalidate the whole cache;
//! a 401 triggers one coordinated token refresh and exactly one retry.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenPair,
};
use crate::auth::refresh::{REFRESH_ENDPOINT, RefreshCoordinator, RefreshOutcome};
use crate::cache::{ResponseCache, cache_key};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::normalize::extract_error_message;
use crate::time::{Clock, SystemClock};
use crate::transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};

const FALLBACK_MESSAGE: &str = "request failed";

/// Strip the `{ success, data, meta? }` envelope some endpoints wrap their
/// payload in. Both marker keys are required, so a domain object that merely
/// contains a `data` field passes through untouched.
pub(crate) fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Cheaply cloneable handle shared by all collaborators.
///
/// Constructed explicitly with its configuration; there is no global
/// instance. Entity-level wrappers hold a clone and call the operations
/// below.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    cache: ResponseCache,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    /// Production wiring: `reqwest` transport, file-backed credentials when a
    /// path is configured (in-memory otherwise), system clock.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.timeout, &config.user_agent)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let credentials: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => Arc::new(FileCredentialStore::new(path.clone(), Arc::clone(&clock))),
            None => Arc::new(MemoryCredentialStore::new(Arc::clone(&clock))),
        };

        Ok(Self::with_components(
            config,
            Arc::new(transport),
            credentials,
            clock,
        ))
    }

    /// Assemble a client from explicit parts. This is the seam for swapping
    /// the storage mechanism, the transport or the clock.
    pub fn with_components(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResponseCache::new(config.cache_ttl, Arc::clone(&clock));
        let refresher = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&credentials),
            config.endpoint_url(REFRESH_ENDPOINT),
            config.access_token_ttl,
            config.refresh_token_ttl,
        );

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                credentials,
                cache,
                refresher,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Whether a usable refresh token is currently stored.
    pub fn has_session(&self) -> bool {
        self.inner.credentials.refresh_token().is_some()
    }

    /// GET with short-window memoization. A cache hit returns immediately,
    /// with no transport call and no token check.
    pub async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> ApiResult<Value> {
        let key = cache_key(endpoint, params);
        if let Some(hit) = self.inner.cache.lookup(&key) {
            debug!(endpoint, "serving response from cache");
            return Ok(hit);
        }

        let body = self.dispatch(Method::GET, endpoint, params, None).await?;
        self.inner.cache.store(key, body.clone());
        Ok(body)
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> ApiResult<Value> {
        self.mutate(Method::POST, endpoint, &[], Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: &Value) -> ApiResult<Value> {
        self.mutate(Method::PUT, endpoint, &[], Some(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: &Value) -> ApiResult<Value> {
        self.mutate(Method::PATCH, endpoint, &[], Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str, params: &[(&str, &str)]) -> ApiResult<Value> {
        self.mutate(Method::DELETE, endpoint, params, None).await
    }

    /// POST a login or registration payload and persist the returned token
    /// pair. The (unwrapped) response body is passed back to the caller.
    pub async fn login(&self, endpoint: &str, body: &Value) -> ApiResult<Value> {
        let response = self.mutate(Method::POST, endpoint, &[], Some(body)).await?;

        match TokenPair::from_body(&response) {
            Some(pair) => {
                if let Err(err) = self.inner.credentials.set(
                    &pair,
                    self.inner.config.access_token_ttl,
                    self.inner.config.refresh_token_ttl,
                ) {
                    warn!(error = %err, "failed to persist credentials after login");
                }
            }
            None => warn!(endpoint, "login response carried no token pair"),
        }

        Ok(response)
    }

    /// Best-effort sign-out: local session state is dropped whether or not
    /// the backend call succeeds.
    pub async fn logout(&self, endpoint: &str) -> ApiResult<Value> {
        let empty = Value::Object(serde_json::Map::new());
        let result = self.mutate(Method::POST, endpoint, &[], Some(&empty)).await;

        self.clear_credentials();
        self.inner.cache.invalidate_all();

        result
    }

    /// Writes always hit the backend; a successful one drops the whole read
    /// cache. Cross-entity side effects are common in this domain, so coarse
    /// invalidation is the safe default.
    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let result = self.dispatch(method, endpoint, params, body).await?;
        self.inner.cache.invalidate_all();
        Ok(result)
    }

    /// Authorized send with the 401 recovery protocol. The attempt counter is
    /// explicit per call: after one refresh-and-retry, a second 401 is
    /// terminal.
    async fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let url = self.inner.config.endpoint_url(endpoint);
        let query: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();

        let mut attempt: u8 = 0;
        loop {
            let mut request = TransportRequest::new(method.clone(), url.clone())
                .with_query(query.clone())
                .with_bearer(self.inner.credentials.access_token());
            if let Some(body) = body {
                request = request.with_body(body.clone());
            }

            let response = match self.inner.transport.execute(request).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(endpoint, error = %err, "transport failure");
                    return Err(ApiError::Network {
                        message: extract_error_message(None, Some(&err.message), FALLBACK_MESSAGE),
                    });
                }
            };

            if response.status == StatusCode::UNAUTHORIZED {
                if attempt > 0 {
                    debug!(endpoint, "401 with a freshly refreshed token; session expired");
                    self.clear_credentials();
                    return Err(ApiError::AuthenticationExpired);
                }
                attempt += 1;

                match self.inner.refresher.ensure_fresh().await {
                    RefreshOutcome::Refreshed => continue,
                    // The coordinator already cleared the store.
                    RefreshOutcome::Failed => return Err(ApiError::AuthenticationExpired),
                }
            }

            return into_result(response);
        }
    }

    fn clear_credentials(&self) {
        if let Err(err) = self.inner.credentials.clear() {
            warn!(error = %err, "failed to clear credentials");
        }
    }
}

fn into_result(response: TransportResponse) -> ApiResult<Value> {
    let status = response.status;

    if status.is_success() {
        let body = response.body.map(unwrap_envelope).unwrap_or(Value::Null);
        return Ok(body);
    }

    let fallback = format!("request failed with HTTP {status}");
    let message = extract_error_message(response.body.as_ref(), None, &fallback);

    if status.is_client_error() {
        Err(ApiError::Validation { status, message })
    } else {
        Err(ApiError::Server { status, message })
    }
}
