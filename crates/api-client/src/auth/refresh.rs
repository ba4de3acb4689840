//! Single-flight coordination for token refresh.
//!
//! N requests hitting 401 at the same moment must produce exactly one call to
//! the refresh endpoint, and every waiter resolves with that attempt's
//! outcome. The pending attempt lives in a mutex-guarded slot; the
//! check-and-set holds a synchronous lock with no suspension point, so the
//! idle-to-in-flight transition is atomic with respect to concurrent 401
//! handlers. Waiters subscribe to a `watch` broadcast instead of polling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::credentials::{CredentialStore, TokenPair};
use crate::client::unwrap_envelope;
use crate::transport::{Transport, TransportRequest};

pub(crate) const REFRESH_ENDPOINT: &str = "/auth/refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// A new pair is in the store; the caller should retry with it.
    Refreshed,
    /// The session cannot be recovered; the store has been cleared.
    Failed,
}

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

#[derive(Debug)]
pub(crate) struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    refresh_url: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// `Some` while an attempt is in flight; reset to `None` on settlement
    /// regardless of outcome. Shared with the detached attempt task.
    inflight: Arc<Mutex<Option<OutcomeReceiver>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        refresh_url: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresh_url,
            access_ttl,
            refresh_ttl,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve once the current (or a newly started) refresh attempt settles.
    ///
    /// The attempt itself runs as a detached task, so a caller that abandons
    /// its request cannot strand the remaining waiters.
    pub(crate) async fn ensure_fresh(&self) -> RefreshOutcome {
        let mut rx = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(rx) => {
                    debug!("joining in-flight token refresh");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());

                    let inflight = Arc::clone(&self.inflight);
                    let transport = Arc::clone(&self.transport);
                    let credentials = Arc::clone(&self.credentials);
                    let refresh_url = self.refresh_url.clone();
                    let (access_ttl, refresh_ttl) = (self.access_ttl, self.refresh_ttl);
                    tokio::spawn(async move {
                        let outcome = run_refresh(
                            transport,
                            credentials,
                            refresh_url,
                            access_ttl,
                            refresh_ttl,
                        )
                        .await;
                        // Back to idle before broadcasting: a 401 arriving
                        // after settlement starts a fresh attempt instead of
                        // consuming this one's outcome.
                        *inflight.lock() = None;
                        let _ = tx.send(Some(outcome));
                    });

                    rx
                }
            }
        };

        match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).unwrap_or(RefreshOutcome::Failed),
            // Sender dropped without settling; treat as a failed attempt.
            Err(_) => RefreshOutcome::Failed,
        }
    }
}

/// One refresh attempt: POST the stored refresh token, rotate the pair on
/// success, clear the store on any failure.
async fn run_refresh(
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    refresh_url: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
) -> RefreshOutcome {
    let Some(refresh_token) = credentials.refresh_token() else {
        debug!("no usable refresh token; session cannot be recovered");
        return fail(&credentials);
    };

    let request = TransportRequest::new(Method::POST, refresh_url)
        .with_body(json!({ "refresh_token": refresh_token }));

    let response = match transport.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "token refresh transport failure");
            return fail(&credentials);
        }
    };

    if !response.status.is_success() {
        warn!(status = %response.status, "token refresh rejected");
        return fail(&credentials);
    }

    let body = response.body.map(unwrap_envelope).unwrap_or(Value::Null);
    let Some(pair) = TokenPair::from_body(&body) else {
        warn!("token refresh response carried no token pair");
        return fail(&credentials);
    };

    if let Err(err) = credentials.set(&pair, access_ttl, refresh_ttl) {
        warn!(error = %err, "failed to persist refreshed credentials");
    }
    debug!("access token refreshed");
    RefreshOutcome::Refreshed
}

fn fail(credentials: &Arc<dyn CredentialStore>) -> RefreshOutcome {
    if let Err(err) = credentials.clear() {
        warn!(error = %err, "failed to clear credentials after refresh failure");
    }
    RefreshOutcome::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::MemoryCredentialStore;
    use crate::test_utils::{FakeTransport, ManualClock, json_response};
    use reqwest::StatusCode;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn seeded_store(clock: Arc<ManualClock>) -> Arc<MemoryCredentialStore> {
        let store = Arc::new(MemoryCredentialStore::new(clock));
        store
            .set(
                &TokenPair {
                    access_token: "stale-access".to_owned(),
                    refresh_token: "refresh-1".to_owned(),
                },
                7 * DAY,
                30 * DAY,
            )
            .unwrap();
        store
    }

    fn coordinator(
        transport: Arc<FakeTransport>,
        store: Arc<MemoryCredentialStore>,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(
            transport,
            store,
            "https://api.test/auth/refresh".to_owned(),
            7 * DAY,
            30 * DAY,
        )
    }

    #[tokio::test]
    async fn successful_refresh_rotates_the_stored_pair() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded_store(clock);
        let transport = Arc::new(FakeTransport::new(|request| {
            assert!(request.url.ends_with("/auth/refresh"));
            assert_eq!(request.bearer, None);
            assert_eq!(
                request.body.as_ref().and_then(|body| body.get("refresh_token")),
                Some(&json!("refresh-1"))
            );
            Ok(json_response(
                StatusCode::OK,
                json!({ "access_token": "access-2", "refresh_token": "refresh-2" }),
            ))
        }));

        let coordinator = coordinator(transport.clone(), store.clone());
        assert_eq!(coordinator.ensure_fresh().await, RefreshOutcome::Refreshed);

        assert_eq!(store.access_token().as_deref(), Some("access-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh_call() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded_store(clock);
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::OK,
                json!({ "access_token": "access-2", "refresh_token": "refresh-2" }),
            ))
        }));

        let coordinator = coordinator(transport.clone(), store);
        let outcomes = tokio::join!(
            coordinator.ensure_fresh(),
            coordinator.ensure_fresh(),
            coordinator.ensure_fresh(),
            coordinator.ensure_fresh(),
            coordinator.ensure_fresh(),
        );

        assert_eq!(
            outcomes,
            (
                RefreshOutcome::Refreshed,
                RefreshOutcome::Refreshed,
                RefreshOutcome::Refreshed,
                RefreshOutcome::Refreshed,
                RefreshOutcome::Refreshed,
            )
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_clears_credentials_for_all_waiters() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded_store(clock);
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::UNAUTHORIZED,
                json!({ "detail": "refresh token revoked" }),
            ))
        }));

        let coordinator = coordinator(transport.clone(), store.clone());
        let outcomes = tokio::join!(coordinator.ensure_fresh(), coordinator.ensure_fresh());

        assert_eq!(outcomes, (RefreshOutcome::Failed, RefreshOutcome::Failed));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_a_network_call() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCredentialStore::new(clock));
        let transport = Arc::new(FakeTransport::new(|_| {
            panic!("no transport call expected")
        }));

        let coordinator = coordinator(transport.clone(), store);
        assert_eq!(coordinator.ensure_fresh().await, RefreshOutcome::Failed);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn settled_attempt_resets_to_idle() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded_store(clock);
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::OK,
                json!({ "access_token": "access-2", "refresh_token": "refresh-2" }),
            ))
        }));

        let coordinator = coordinator(transport.clone(), store);
        coordinator.ensure_fresh().await;
        coordinator.ensure_fresh().await;

        // two sequential attempts, two calls: the slot did not stay occupied
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn malformed_refresh_body_is_a_failure() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded_store(clock);
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(StatusCode::OK, json!({ "ok": true })))
        }));

        let coordinator = coordinator(transport, store.clone());
        assert_eq!(coordinator.ensure_fresh().await, RefreshOutcome::Failed);
        assert_eq!(store.refresh_token(), None);
    }
}
