//! # Broker Fixture Test Utilities
//!
//! Shared test utilities for `broker-fixture`.
//!
//! This crate provides:
//! - Mock runner, instance and connector (`mocks`)
//! - A test dependency container wired with `injectable!` (`deps`)
//! - Logging setup for test binaries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use broker_fixture_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let instance = MockInstance::reachable("nats://127.0.0.1:4222");
//!     let runner = MockRunner::succeeding(instance.clone());
//!     let connector = MockConnector::accepting();
//!
//!     let bootstrapper = mock_config(runner, connector.clone())
//!         .finalize_with_vars(&Default::default())
//!         .unwrap();
//!
//!     // Run your test...
//! }
//! ```

pub mod deps;
pub mod mocks;

// Re-export commonly used items
pub use deps::*;
pub use mocks::*;

/// A uniquely identifiable error value.
///
/// Mocks return it as the cause of their failures. Two values are equal
/// only if they came from the same `unexpected_error()` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected error {0}")]
pub struct UnexpectedError(uuid::Uuid);

/// A fresh `UnexpectedError`.
pub fn unexpected_error() -> UnexpectedError {
    UnexpectedError(uuid::Uuid::new_v4())
}

/// Find the first error of type `E` in `err`'s source chain, `err` included.
pub fn find_cause<'a, E>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a E>
where
    E: std::error::Error + 'static,
{
    let mut cause = Some(err);
    while let Some(e) = cause {
        if let Some(found) = e.downcast_ref::<E>() {
            return Some(found);
        }
        cause = e.source();
    }
    None
}

/// Initialize test logging (safe to call from every test).
///
/// Honors `RUST_LOG`; defaults to debug output for `broker_fixture`.
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,broker_fixture=debug")),
        )
        .with_test_writer()
        .try_init();
}
