//! Error types for broker fixtures.
//!
//! Each concern gets its own enum so callers can match on the stage that
//! failed. `BootstrapError` wraps the runner, endpoint and connector errors
//! as `#[source]`, so the original cause is still reachable by matching on
//! the variant or walking `Error::source`.

use std::fmt;
use thiserror::Error;

/// Boxed cause carried by runner, instance and connector errors.
///
/// Backends put their own error value here, so callers can find it again
/// with `downcast_ref` while walking `Error::source`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by an environment runner or a running instance.
#[derive(Error, Debug)]
pub enum InstanceError {
    /// The instance could not be started.
    #[error("Instance start failed: {0}")]
    Start(#[source] BoxError),

    /// The teardown scope was cancelled before the instance was ready.
    #[error("Instance start cancelled")]
    Cancelled,

    /// The instance is running but its endpoint could not be resolved.
    #[error("Endpoint query failed: {0}")]
    Endpoint(#[source] BoxError),

    /// The instance could not be terminated.
    #[error("Terminate failed: {0}")]
    Terminate(#[source] BoxError),
}

/// Errors raised while connecting a client to a running instance.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The endpoint string is not usable.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The connection attempt failed.
    #[error("Connection failed: {0}")]
    Connect(#[source] BoxError),
}

/// Errors surfaced by `Bootstrapper::bootstrap`.
///
/// All variants are terminal for the current attempt; nothing is retried.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The runner could not start an instance. No teardown was scheduled.
    #[error("broker container failed to run: {0}")]
    Runner(#[source] InstanceError),

    /// The instance started but its endpoint could not be queried.
    /// Teardown is still owned by the scope's termination guard.
    #[error("can't get broker connection endpoint: {0}")]
    Endpoint(#[source] InstanceError),

    /// The connector failed. Teardown is still owned by the scope's
    /// termination guard.
    #[error("can't connect to broker: {0}")]
    Connector(#[source] ConnectorError),

    /// The scope was cancelled before the fixture was ready. Any instance
    /// that was started is terminated by its guard.
    #[error("broker bootstrap cancelled")]
    Cancelled,
}

/// Kind of value written into an injection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedKind {
    /// Live client handle.
    Client,
    /// Connection string of the running instance.
    ConnectionString,
    /// Per-case unique prefix.
    Prefix,
}

impl fmt::Display for InjectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectedKind::Client => write!(f, "client"),
            InjectedKind::ConnectionString => write!(f, "connection string"),
            InjectedKind::Prefix => write!(f, "prefix"),
        }
    }
}

/// Errors raised while writing values into an injection target.
///
/// Both variants mean the target and the configured labels disagree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectError {
    /// The target has no field mapped to the label.
    #[error("No field labelled '{0}' in injection target")]
    UnknownLabel(String),

    /// The field mapped to the label cannot hold this kind of value.
    #[error("Field labelled '{label}' cannot hold a {kind} value")]
    KindMismatch {
        /// Label that was addressed.
        label: String,
        /// Kind of the value that was offered.
        kind: InjectedKind,
    },
}

/// Errors raised while finalizing a `FixtureConfig`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The image reference cannot be parsed.
    #[error("Invalid image reference: {0}")]
    InvalidImage(String),

    /// An injection label is empty.
    #[error("Injection label for {0} must not be empty")]
    EmptyLabel(InjectedKind),

    /// Two values would be written under the same label.
    #[error("Injection label '{0}' is used for more than one value")]
    DuplicateLabel(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, PartialEq, Eq)]
    struct DockerDown;

    impl fmt::Display for DockerDown {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "no docker")
        }
    }

    impl std::error::Error for DockerDown {}

    #[test]
    fn test_bootstrap_error_keeps_runner_cause() {
        let err = BootstrapError::Runner(InstanceError::Start(Box::new(DockerDown)));

        assert_eq!(
            err.to_string(),
            "broker container failed to run: Instance start failed: no docker"
        );
        let source = err.source().expect("runner error should have a source");
        assert_eq!(source.to_string(), "Instance start failed: no docker");

        let cause = source.source().expect("start error should have a source");
        assert_eq!(cause.downcast_ref::<DockerDown>(), Some(&DockerDown));
    }

    #[test]
    fn test_bootstrap_error_keeps_connector_cause() {
        let err = BootstrapError::Connector(ConnectorError::Connect("refused".into()));

        let source = err.source().expect("connector error should have a source");
        assert!(matches!(
            source.downcast_ref::<ConnectorError>(),
            Some(ConnectorError::Connect(_))
        ));
        assert_eq!(source.source().unwrap().to_string(), "refused");
    }

    #[test]
    fn test_cancelled_has_no_cause() {
        assert!(BootstrapError::Cancelled.source().is_none());
        assert_eq!(
            BootstrapError::Cancelled.to_string(),
            "broker bootstrap cancelled"
        );
    }

    #[test]
    fn test_inject_error_messages() {
        let err = InjectError::KindMismatch {
            label: "nats.prefix".to_string(),
            kind: InjectedKind::Client,
        };
        assert_eq!(
            err.to_string(),
            "Field labelled 'nats.prefix' cannot hold a client value"
        );

        let err = InjectError::UnknownLabel("nats".to_string());
        assert!(err.to_string().contains("'nats'"));
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::EmptyLabel(InjectedKind::ConnectionString).to_string(),
            "Injection label for connection string must not be empty"
        );
    }
}
