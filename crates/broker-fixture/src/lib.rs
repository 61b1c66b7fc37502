//! Broker fixture: per-test-process message broker bootstrap and teardown.
//!
//! This library provisions an isolated NATS broker for a test run, connects
//! a client to it, and injects the client, connection string and a unique
//! per-case prefix into each test case's dependency container. Teardown is
//! scheduled before any step that can fail, so a broker is never orphaned
//! once its scope is cancelled.
//!
//! # Architecture
//!
//! ```text
//! FixtureConfig --finalize--> Bootstrapper --bootstrap(scope)--> Fixture --inject--> Deps
//!                                  |                                  ^
//!                     InstanceRunner / ClientConnector        TeardownScope (guards)
//! ```
//!
//! # Modules
//!
//! - `config` - Builder options and environment override
//! - `bootstrap` - Runner -> guard -> endpoint -> connector -> fixture
//! - `fixture` - Shared client handle and per-case prefixes
//! - `inject` - Label-addressed injection (`Injectable`, `injectable!`)
//! - `teardown` - Termination guards and their supervising scope
//! - `suite` - Explicit per-process suite object
//! - `runner` / `connector` - Backend seams (enable mocking)
//! - `nats` - `testcontainers` + `async-nats` backend

pub mod bootstrap;
pub mod config;
pub mod connector;
pub mod errors;
pub mod fixture;
pub mod inject;
pub mod nats;
pub mod runner;
pub mod suite;
pub mod teardown;

pub use bootstrap::{Bootstrapper, FixtureSettings};
pub use config::FixtureConfig;
pub use connector::ClientConnector;
pub use errors::{
    BootstrapError, BoxError, ConfigError, ConnectorError, InjectError, InstanceError,
};
pub use fixture::{Fixture, InjectLabels};
pub use inject::{Injectable, Injected};
pub use nats::{NatsConnector, NatsContainerRunner};
pub use runner::{ImageRef, InstanceRunner, RunRequest, RunningInstance};
pub use suite::Suite;
pub use teardown::{spawn_termination_guard, TeardownReport, TeardownScope};
