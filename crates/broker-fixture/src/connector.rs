//! Client connector abstraction.

use crate::errors::ConnectorError;
use async_trait::async_trait;

/// Establishes a client connection to an endpoint (enables mocking).
///
/// `C` is the client handle handed to test cases. It is cloned once per
/// injection, so it should be a cheap shared handle.
#[async_trait]
pub trait ClientConnector<C>: Send + Sync {
    /// Connect to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<C, ConnectorError>;
}
