//! Termination guards and the scope that supervises them.
//!
//! A `TeardownScope` pairs a `CancellationToken` with a `TaskTracker`:
//!
//! - `spawn_termination_guard` registers one tracked task per running
//!   instance. Registering is what marks "one more cleanup owed".
//! - The task sleeps until the token is cancelled, calls `terminate` exactly
//!   once, and records the outcome.
//! - `TeardownScope::wait` blocks until every registered guard has finished.
//!
//! Cancelling the token more than once is harmless. Each guard observes the
//! cancellation once and then exits.
//!
//! # Example
//!
//! ```rust,ignore
//! let scope = TeardownScope::new();
//! let fixture = bootstrapper.bootstrap(&scope).await?;
//!
//! // ... run test cases ...
//!
//! let report = scope.shutdown().await;
//! assert!(report.is_clean());
//! ```

use crate::runner::RunningInstance;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// A terminate call that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Name the instance was registered under.
    pub instance: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome of every termination guard in a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Number of instances terminated successfully.
    pub terminated: usize,
    /// Terminate calls that failed. These are not retried.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// True when no terminate call failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Cancellation token plus tracker for the termination guards tied to it.
///
/// Clones share the same token, tracker and report.
#[derive(Debug, Clone, Default)]
pub struct TeardownScope {
    cancel_token: CancellationToken,
    tracker: TaskTracker,
    report: Arc<Mutex<TeardownReport>>,
}

impl TeardownScope {
    /// Create a scope with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope driven by an existing token.
    ///
    /// Pass `parent.child_token()` to tear down when either the parent or
    /// this scope is cancelled.
    #[must_use]
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            tracker: TaskTracker::new(),
            report: Arc::new(Mutex::new(TeardownReport::default())),
        }
    }

    /// Token whose cancellation triggers teardown.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Signal teardown. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether teardown has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once teardown has been signalled.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await;
    }

    /// Number of termination guards that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every registered guard has finished and return the report.
    ///
    /// This does not cancel the scope. If guards are registered and nobody
    /// cancels, this waits forever; use `shutdown` to do both.
    pub async fn wait(&self) -> TeardownReport {
        self.tracker.close();
        self.tracker.wait().await;
        self.report.lock().await.clone()
    }

    /// Cancel the scope and wait for every guard to finish.
    pub async fn shutdown(&self) -> TeardownReport {
        self.cancel();
        self.wait().await
    }
}

/// Register a termination guard for `instance` on `scope`.
///
/// The guard is tracked before this function returns. It calls
/// `terminate` exactly once, after the scope is cancelled. If the scope is
/// already cancelled, terminate runs right away.
///
/// # Arguments
///
/// * `scope` - Scope whose cancellation triggers teardown
/// * `name` - Name used in logs and in the `TeardownReport`
/// * `instance` - Instance to terminate; the guard keeps it alive until then
pub fn spawn_termination_guard(
    scope: &TeardownScope,
    name: impl Into<String>,
    instance: Arc<dyn RunningInstance>,
) {
    let name = name.into();
    let cancel_token = scope.cancel_token.clone();
    let report = Arc::clone(&scope.report);

    debug!(
        target: "broker_fixture.teardown",
        instance = %name,
        "Registering termination guard"
    );

    scope.tracker.spawn(async move {
        cancel_token.cancelled().await;

        info!(
            target: "broker_fixture.teardown",
            instance = %name,
            "Teardown signalled, terminating instance"
        );

        let result = instance.terminate().await;
        let mut report = report.lock().await;
        match result {
            Ok(()) => {
                report.terminated += 1;
                info!(
                    target: "broker_fixture.teardown",
                    instance = %name,
                    "Instance terminated"
                );
            }
            Err(e) => {
                error!(
                    target: "broker_fixture.teardown",
                    instance = %name,
                    error = %e,
                    "Failed to terminate instance"
                );
                report.failures.push(TeardownFailure {
                    instance: name,
                    error: e.to_string(),
                });
            }
        }
    });
}
