//! Shared fakes for unit tests: a manually advanced clock and an in-memory
//! transport.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;

use crate::time::Clock;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Initialize tracing for tests with output captured per test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Clock that only moves when a test says so.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        Self {
            now: Mutex::new(start),
        }
    }
}

impl ManualClock {
    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::TimeDelta::from_std(by).expect("advance out of range");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

type Handler =
    dyn Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Transport fake driven by a closure; every request is recorded for
/// call-count assertions.
pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTransport")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&TransportRequest) -> Result<TransportResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of recorded requests whose URL ends with `path`.
    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url.ends_with(path))
            .count()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}

pub(crate) fn json_response(status: StatusCode, body: Value) -> TransportResponse {
    TransportResponse {
        status,
        body: Some(body),
    }
}

pub(crate) fn network_error(message: &str) -> TransportError {
    TransportError {
        message: message.to_owned(),
    }
}
