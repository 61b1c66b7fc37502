//! NATS backend: a `testcontainers` runner and an `async-nats` connector.
//!
//! The runner starts the image as a `GenericImage` and waits for the
//! server's ready line on stderr. The connector opens an `async_nats::Client`
//! that test cases share.

use crate::config::FixtureConfig;
use crate::connector::ClientConnector;
use crate::errors::{ConnectorError, InstanceError};
use crate::runner::{InstanceRunner, RunRequest, RunningInstance};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Client port exposed by the NATS server.
pub const NATS_CLIENT_PORT: u16 = 4222;

/// Line the NATS server logs once it accepts client connections.
const READY_MESSAGE: &str = "Server is ready";

/// Default timeout for establishing the client connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default client name reported to the server.
pub const DEFAULT_CLIENT_NAME: &str = "broker-fixture";

impl FixtureConfig<async_nats::Client> {
    /// Default configuration backed by a NATS container and `async-nats`.
    #[must_use]
    pub fn nats() -> Self {
        Self::new(
            Arc::new(NatsContainerRunner),
            Arc::new(NatsConnector::default()),
        )
    }
}

/// Runs NATS servers in containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NatsContainerRunner;

#[async_trait]
impl InstanceRunner for NatsContainerRunner {
    #[instrument(skip_all, name = "broker_fixture.nats.run", fields(image = %request.image))]
    async fn run(
        &self,
        request: &RunRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Arc<dyn RunningInstance>, InstanceError> {
        let image = GenericImage::new(request.image.name(), request.image.tag())
            .with_exposed_port(NATS_CLIENT_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_MESSAGE));

        let mut container_request = image.with_startup_timeout(request.startup_timeout);
        if !request.args.is_empty() {
            container_request = container_request.with_cmd(request.args.clone());
        }

        let container = tokio::select! {
            biased;
            () = cancel_token.cancelled() => return Err(InstanceError::Cancelled),
            result = container_request.start() => result.map_err(|e| InstanceError::Start(e.into()))?,
        };

        debug!(
            target: "broker_fixture.nats",
            container_id = %container.id(),
            "NATS container started"
        );

        Ok(Arc::new(NatsInstance::new(container)))
    }
}

/// A running NATS container.
///
/// `terminate` removes the container; later calls are no-ops.
pub struct NatsInstance {
    container_id: String,
    container: Mutex<Option<ContainerAsync<GenericImage>>>,
}

impl NatsInstance {
    fn new(container: ContainerAsync<GenericImage>) -> Self {
        Self {
            container_id: container.id().to_string(),
            container: Mutex::new(Some(container)),
        }
    }

    /// Docker id of the container.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

#[async_trait]
impl RunningInstance for NatsInstance {
    async fn connection_endpoint(&self) -> Result<String, InstanceError> {
        let guard = self.container.lock().await;
        let container = guard
            .as_ref()
            .ok_or_else(|| InstanceError::Endpoint("container already terminated".into()))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| InstanceError::Endpoint(e.into()))?;
        let port = container
            .get_host_port_ipv4(NATS_CLIENT_PORT.tcp())
            .await
            .map_err(|e| InstanceError::Endpoint(e.into()))?;

        Ok(format!("nats://{host}:{port}"))
    }

    async fn terminate(&self) -> Result<(), InstanceError> {
        let container = self.container.lock().await.take();
        match container {
            Some(container) => {
                debug!(
                    target: "broker_fixture.nats",
                    container_id = %self.container_id,
                    "Removing NATS container"
                );
                container
                    .rm()
                    .await
                    .map_err(|e| InstanceError::Terminate(e.into()))
            }
            None => Ok(()),
        }
    }
}

/// Connects `async-nats` clients.
#[derive(Debug, Clone)]
pub struct NatsConnector {
    connect_timeout: Duration,
    client_name: String,
}

impl Default for NatsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }
}

impl NatsConnector {
    /// Set the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the client name reported to the server.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

#[async_trait]
impl ClientConnector<async_nats::Client> for NatsConnector {
    async fn connect(&self, endpoint: &str) -> Result<async_nats::Client, ConnectorError> {
        if endpoint.trim().is_empty() {
            return Err(ConnectorError::InvalidEndpoint(
                "endpoint is empty".to_string(),
            ));
        }

        async_nats::ConnectOptions::new()
            .name(&self.client_name)
            .connection_timeout(self.connect_timeout)
            .connect(endpoint)
            .await
            .map_err(|e| ConnectorError::Connect(e.into()))
    }
}
