//! Suite supervisor.
//!
//! A `Suite` is the explicit, per-test-process object that owns one fixture
//! and the teardown scope behind it. Create it once (typically from a
//! `tokio::sync::OnceCell` or at the top of a test), pass it by reference to
//! each test case, and call `shutdown` before the process exits.
//!
//! # Example
//!
//! ```rust,ignore
//! let bootstrapper = FixtureConfig::nats().with_case_prefix("orders").finalize()?;
//! let suite = Suite::start(&bootstrapper).await?;
//!
//! let deps = suite.case(Deps::default())?;
//! deps.client.unwrap().publish(format!("{}events", deps.prefix), "hi".into()).await?;
//!
//! let report = suite.shutdown().await;
//! assert!(report.is_clean());
//! ```

use crate::bootstrap::Bootstrapper;
use crate::errors::BootstrapError;
use crate::fixture::Fixture;
use crate::inject::{InjectError, Injectable};
use crate::teardown::{TeardownReport, TeardownScope};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One fixture plus the scope that tears it down.
///
/// Dropping a suite without calling `shutdown` still cancels its scope, so
/// the broker is terminated as long as the runtime keeps running.
#[derive(Debug)]
pub struct Suite<C> {
    fixture: Fixture<C>,
    scope: TeardownScope,
}

impl<C: Clone + Send + Sync + 'static> Suite<C> {
    /// Bootstrap a suite on a fresh teardown scope.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap error after the scope has been shut down, so no
    /// instance or background task outlives a failed start.
    pub async fn start(bootstrapper: &Bootstrapper<C>) -> Result<Self, BootstrapError> {
        Self::start_in(bootstrapper, TeardownScope::new()).await
    }

    /// Bootstrap a suite whose teardown also fires when `parent` is cancelled.
    ///
    /// # Errors
    ///
    /// Same as [`Suite::start`].
    pub async fn start_with_parent(
        bootstrapper: &Bootstrapper<C>,
        parent: &CancellationToken,
    ) -> Result<Self, BootstrapError> {
        Self::start_in(bootstrapper, TeardownScope::with_token(parent.child_token())).await
    }

    async fn start_in(
        bootstrapper: &Bootstrapper<C>,
        scope: TeardownScope,
    ) -> Result<Self, BootstrapError> {
        match bootstrapper.bootstrap(&scope).await {
            Ok(fixture) => Ok(Self { fixture, scope }),
            Err(e) => {
                let report = scope.shutdown().await;
                if !report.is_clean() {
                    warn!(
                        target: "broker_fixture.suite",
                        failures = report.failures.len(),
                        "Teardown after failed bootstrap was not clean"
                    );
                }
                Err(e)
            }
        }
    }

    /// Inject this suite's dependencies into a test case's container.
    ///
    /// # Errors
    ///
    /// See [`Fixture::inject`].
    pub fn case<T: Injectable<C>>(&self, target: T) -> Result<T, InjectError> {
        self.fixture.inject(target)
    }
}

impl<C> Suite<C> {
    /// The shared fixture.
    #[must_use]
    pub fn fixture(&self) -> &Fixture<C> {
        &self.fixture
    }

    /// The teardown scope.
    #[must_use]
    pub fn scope(&self) -> &TeardownScope {
        &self.scope
    }

    /// Terminate the broker and wait until teardown has drained.
    pub async fn shutdown(self) -> TeardownReport {
        let report = self.scope.shutdown().await;
        info!(
            target: "broker_fixture.suite",
            cases = self.fixture.injections(),
            terminated = report.terminated,
            failures = report.failures.len(),
            "Suite shut down"
        );
        report
    }
}

impl<C> Drop for Suite<C> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
