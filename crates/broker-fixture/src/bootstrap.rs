//! Bootstrapper: runner -> termination guard -> endpoint -> connector -> fixture.
//!
//! The ordering matters. The termination guard is registered as soon as the
//! runner hands back an instance, before anything else can fail. Once the
//! scope is cancelled, every started instance is terminated, whether or not
//! the bootstrap succeeded. Failures after the runner step never clean up
//! synchronously; teardown belongs to the guard.

use crate::connector::ClientConnector;
use crate::errors::{BootstrapError, InstanceError};
use crate::fixture::{Fixture, InjectLabels};
use crate::runner::{ImageRef, InstanceRunner, RunRequest};
use crate::teardown::{spawn_termination_guard, TeardownScope};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Resolved, immutable fixture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSettings {
    /// Image to run, after any environment override.
    pub image: ImageRef,
    /// Labels the injected values are written under.
    pub labels: InjectLabels,
    /// Static namespace prepended to per-case prefixes.
    pub case_prefix: Option<String>,
    /// Container command arguments.
    pub container_args: Vec<String>,
    /// Upper bound on waiting for the broker to report ready.
    pub startup_timeout: Duration,
}

/// Provisions a broker and produces a `Fixture` for it.
///
/// Built with [`crate::config::FixtureConfig::finalize`].
pub struct Bootstrapper<C> {
    settings: FixtureSettings,
    runner: Arc<dyn InstanceRunner>,
    connector: Arc<dyn ClientConnector<C>>,
}

impl<C> fmt::Debug for Bootstrapper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("settings", &self.settings)
            .field("runner", &"<runner>")
            .field("connector", &"<connector>")
            .finish()
    }
}

impl<C> Bootstrapper<C> {
    pub(crate) fn from_parts(
        settings: FixtureSettings,
        runner: Arc<dyn InstanceRunner>,
        connector: Arc<dyn ClientConnector<C>>,
    ) -> Self {
        Self {
            settings,
            runner,
            connector,
        }
    }

    /// Settings this bootstrapper was finalized with.
    #[must_use]
    pub fn settings(&self) -> &FixtureSettings {
        &self.settings
    }
}

impl<C: Clone + Send + Sync + 'static> Bootstrapper<C> {
    /// Start a broker, connect to it and return the fixture.
    ///
    /// Steps, each short-circuiting on failure:
    /// 1. Run the instance (`BootstrapError::Runner`; nothing to tear down)
    /// 2. Register its termination guard on `scope`
    /// 3. Query the endpoint (`BootstrapError::Endpoint`)
    /// 4. Connect the client (`BootstrapError::Connector`)
    /// 5. Build the fixture
    ///
    /// After step 2 the instance is terminated when `scope` is cancelled,
    /// whatever the outcome of the later steps. Callers must eventually
    /// cancel `scope` (see `TeardownScope::shutdown`).
    ///
    /// A fixture is only returned if `scope` is still live once the client
    /// is connected.
    ///
    /// # Errors
    ///
    /// Returns the `BootstrapError` for the first step that failed, or
    /// `BootstrapError::Cancelled` if `scope` was cancelled first. A
    /// runner that reports `InstanceError::Cancelled` also maps to
    /// `BootstrapError::Cancelled`.
    #[instrument(skip_all, name = "broker_fixture.bootstrap", fields(image = %self.settings.image))]
    pub async fn bootstrap(&self, scope: &TeardownScope) -> Result<Fixture<C>, BootstrapError> {
        if scope.is_cancelled() {
            warn!(target: "broker_fixture.bootstrap", "Scope already cancelled, not starting broker");
            return Err(BootstrapError::Cancelled);
        }

        let request = RunRequest {
            image: self.settings.image.clone(),
            args: self.settings.container_args.clone(),
            startup_timeout: self.settings.startup_timeout,
        };

        debug!(
            target: "broker_fixture.bootstrap",
            args = ?request.args,
            "Starting broker instance"
        );

        let cancel_token = scope.token();
        let instance = match self.runner.run(&request, &cancel_token).await {
            Ok(instance) => instance,
            Err(InstanceError::Cancelled) => {
                warn!(target: "broker_fixture.bootstrap", "Broker start cancelled");
                return Err(BootstrapError::Cancelled);
            }
            Err(e) => {
                warn!(target: "broker_fixture.bootstrap", error = %e, "Broker instance failed to start");
                return Err(BootstrapError::Runner(e));
            }
        };

        spawn_termination_guard(scope, self.settings.image.to_string(), Arc::clone(&instance));

        let endpoint = tokio::select! {
            biased;
            () = scope.cancelled() => return Err(cancelled("endpoint query")),
            result = instance.connection_endpoint() => result.map_err(|e| {
                warn!(target: "broker_fixture.bootstrap", error = %e, "Broker endpoint query failed");
                BootstrapError::Endpoint(e)
            })?,
        };

        let client = tokio::select! {
            biased;
            () = scope.cancelled() => return Err(cancelled("connect")),
            result = self.connector.connect(&endpoint) => result.map_err(|e| {
                warn!(
                    target: "broker_fixture.bootstrap",
                    endpoint = %endpoint,
                    error = %e,
                    "Broker client failed to connect"
                );
                BootstrapError::Connector(e)
            })?,
        };

        // The guard may already be terminating the broker.
        if scope.is_cancelled() {
            return Err(cancelled("fixture build"));
        }

        info!(
            target: "broker_fixture.bootstrap",
            endpoint = %endpoint,
            "Broker fixture ready"
        );

        Ok(Fixture::new(
            client,
            endpoint,
            self.settings.labels.clone(),
            self.settings.case_prefix.clone(),
        ))
    }
}

fn cancelled(stage: &str) -> BootstrapError {
    warn!(
        target: "broker_fixture.bootstrap",
        stage = %stage,
        "Scope cancelled during bootstrap, broker left to its termination guard"
    );
    BootstrapError::Cancelled
}
