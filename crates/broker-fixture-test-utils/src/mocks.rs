//! Mock runner, instance and connector.
//!
//! Mocks share their state through an `Arc`, so a test can keep a clone,
//! hand the other clone to the fixture config, and inspect call counts
//! afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! let instance = MockInstance::unreachable(unexpected_error());
//! let runner = MockRunner::succeeding(instance.clone());
//!
//! // ... bootstrap and cancel ...
//!
//! assert_eq!(instance.terminate_calls(), 1);
//! ```

use crate::deps::{FakeClient, TestClient, TEST_CLIENT_LABEL, TEST_DSN_LABEL, TEST_PREFIX_LABEL};
use crate::UnexpectedError;
use async_trait::async_trait;
use broker_fixture::{
    ClientConnector, ConnectorError, FixtureConfig, InstanceError, InstanceRunner, RunRequest,
    RunningInstance,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Config wired to the given mocks and to the `TestDeps` labels.
pub fn mock_config(runner: MockRunner, connector: MockConnector) -> FixtureConfig<TestClient> {
    FixtureConfig::new(Arc::new(runner), Arc::new(connector))
        .with_inject_label(TEST_CLIENT_LABEL)
        .with_inject_label_dsn(TEST_DSN_LABEL)
        .with_inject_label_prefix(TEST_PREFIX_LABEL)
}

// =============================================================================
// MockInstance
// =============================================================================

#[derive(Debug)]
struct InstanceState {
    endpoint: Result<String, UnexpectedError>,
    terminate_error: Mutex<Option<UnexpectedError>>,
    endpoint_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
}

/// Mock running instance.
#[derive(Debug, Clone)]
pub struct MockInstance {
    state: Arc<InstanceState>,
}

impl MockInstance {
    /// An instance whose endpoint query succeeds.
    pub fn reachable(endpoint: impl Into<String>) -> Self {
        Self::with_endpoint(Ok(endpoint.into()))
    }

    /// An instance whose endpoint query fails with `error`.
    pub fn unreachable(error: UnexpectedError) -> Self {
        Self::with_endpoint(Err(error))
    }

    fn with_endpoint(endpoint: Result<String, UnexpectedError>) -> Self {
        Self {
            state: Arc::new(InstanceState {
                endpoint,
                terminate_error: Mutex::new(None),
                endpoint_calls: AtomicUsize::new(0),
                terminate_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Make `terminate` fail with `error`. Applies to every clone.
    pub fn failing_terminate(self, error: UnexpectedError) -> Self {
        *self.state.terminate_error.lock().unwrap() = Some(error);
        self
    }

    /// Number of endpoint queries.
    pub fn endpoint_calls(&self) -> usize {
        self.state.endpoint_calls.load(Ordering::SeqCst)
    }

    /// Number of terminate calls.
    pub fn terminate_calls(&self) -> usize {
        self.state.terminate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunningInstance for MockInstance {
    async fn connection_endpoint(&self) -> Result<String, InstanceError> {
        self.state.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .endpoint
            .clone()
            .map_err(|e| InstanceError::Endpoint(Box::new(e)))
    }

    async fn terminate(&self) -> Result<(), InstanceError> {
        self.state.terminate_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.terminate_error.lock().unwrap().clone() {
            Some(error) => Err(InstanceError::Terminate(Box::new(error))),
            None => Ok(()),
        }
    }
}

// =============================================================================
// MockRunner
// =============================================================================

#[derive(Debug)]
struct RunnerState {
    outcome: Result<MockInstance, UnexpectedError>,
    cancel_on_run: AtomicBool,
    call_count: AtomicUsize,
    requests: Mutex<Vec<RunRequest>>,
}

/// Mock environment runner.
#[derive(Debug, Clone)]
pub struct MockRunner {
    state: Arc<RunnerState>,
}

impl MockRunner {
    /// A runner that hands out `instance` on every call.
    pub fn succeeding(instance: MockInstance) -> Self {
        Self::with_outcome(Ok(instance))
    }

    /// A runner that fails with `error` on every call.
    pub fn failing(error: UnexpectedError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<MockInstance, UnexpectedError>) -> Self {
        Self {
            state: Arc::new(RunnerState {
                outcome,
                cancel_on_run: AtomicBool::new(false),
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel the caller's token while running, then return the outcome
    /// anyway, as a runner that finished just as teardown began would.
    pub fn cancelling_on_run(self) -> Self {
        self.state.cancel_on_run.store(true, Ordering::SeqCst);
        self
    }

    /// Number of run calls.
    pub fn call_count(&self) -> usize {
        self.state.call_count.load(Ordering::SeqCst)
    }

    /// Requests received, in call order.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceRunner for MockRunner {
    async fn run(
        &self,
        request: &RunRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Arc<dyn RunningInstance>, InstanceError> {
        self.state.call_count.fetch_add(1, Ordering::SeqCst);
        self.state.requests.lock().unwrap().push(request.clone());

        if cancel_token.is_cancelled() {
            return Err(InstanceError::Cancelled);
        }
        if self.state.cancel_on_run.load(Ordering::SeqCst) {
            cancel_token.cancel();
        }

        match &self.state.outcome {
            Ok(instance) => Ok(Arc::new(instance.clone())),
            Err(error) => Err(InstanceError::Start(Box::new(error.clone()))),
        }
    }
}

// =============================================================================
// MockConnector
// =============================================================================

#[derive(Debug)]
struct ConnectorState {
    error: Option<UnexpectedError>,
    cancel_on_connect: Mutex<Option<CancellationToken>>,
    endpoints: Mutex<Vec<String>>,
    clients: Mutex<Vec<TestClient>>,
}

/// Mock client connector producing `TestClient` handles.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

impl MockConnector {
    /// A connector that returns a fresh client for every call.
    pub fn accepting() -> Self {
        Self::with_error(None)
    }

    /// A connector that fails with `error` on every call.
    pub fn failing(error: UnexpectedError) -> Self {
        Self::with_error(Some(error))
    }

    fn with_error(error: Option<UnexpectedError>) -> Self {
        Self {
            state: Arc::new(ConnectorState {
                error,
                cancel_on_connect: Mutex::new(None),
                endpoints: Mutex::new(Vec::new()),
                clients: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel `token` during each connect, before the outcome is returned.
    pub fn cancelling_on_connect(self, token: CancellationToken) -> Self {
        *self.state.cancel_on_connect.lock().unwrap() = Some(token);
        self
    }

    /// Number of connect calls.
    pub fn call_count(&self) -> usize {
        self.state.endpoints.lock().unwrap().len()
    }

    /// Endpoints received, in call order.
    pub fn endpoints(&self) -> Vec<String> {
        self.state.endpoints.lock().unwrap().clone()
    }

    /// Most recent client handed out.
    pub fn last_client(&self) -> Option<TestClient> {
        self.state.clients.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ClientConnector<TestClient> for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<TestClient, ConnectorError> {
        self.state
            .endpoints
            .lock()
            .unwrap()
            .push(endpoint.to_string());

        if let Some(token) = self.state.cancel_on_connect.lock().unwrap().as_ref() {
            token.cancel();
        }

        if let Some(error) = &self.state.error {
            return Err(ConnectorError::Connect(Box::new(error.clone())));
        }

        let client = Arc::new(FakeClient {
            endpoint: endpoint.to_string(),
        });
        self.state.clients.lock().unwrap().push(Arc::clone(&client));
        Ok(client)
    }
}
