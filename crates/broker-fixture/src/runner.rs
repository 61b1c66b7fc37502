//! Environment runner abstraction.
//!
//! An `InstanceRunner` starts an external service from an image reference and
//! hands back a `RunningInstance`. The bootstrapper only talks to these traits,
//! so tests can substitute mocks and other backends can be plugged in without
//! touching the lifecycle code.

use crate::errors::{ConfigError, InstanceError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tag used when an image reference does not name one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Parsed container image reference (`name[:tag]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    name: String,
    tag: String,
}

impl ImageRef {
    /// Parse an image reference.
    ///
    /// A colon only separates the tag when it appears after the last `/`, so
    /// `localhost:5000/nats` is an untagged image on a registry with a port.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidImage` if the reference, its name or its
    /// tag is empty.
    pub fn parse(image: &str) -> Result<Self, ConfigError> {
        let image = image.trim();
        if image.is_empty() {
            return Err(ConfigError::InvalidImage(
                "image reference is empty".to_string(),
            ));
        }

        let (name, tag) = match image.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (image, DEFAULT_IMAGE_TAG),
        };

        if name.is_empty() || tag.is_empty() {
            return Err(ConfigError::InvalidImage(format!(
                "expected name[:tag], got '{image}'"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Image name, including any registry and repository path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Everything a runner needs to start one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Image to run.
    pub image: ImageRef,
    /// Command arguments passed to the container. Empty keeps the image default.
    pub args: Vec<String>,
    /// Upper bound on waiting for the instance to report ready.
    pub startup_timeout: Duration,
}

/// Handle to a started instance.
///
/// Once the bootstrapper registers the instance with a termination guard,
/// the guard is the only caller of `terminate`.
#[async_trait]
pub trait RunningInstance: Send + Sync {
    /// Endpoint clients should connect to (e.g. `nats://127.0.0.1:49153`).
    async fn connection_endpoint(&self) -> Result<String, InstanceError>;

    /// Stop and remove the instance.
    async fn terminate(&self) -> Result<(), InstanceError>;
}

/// Starts instances of an external service (enables mocking).
#[async_trait]
pub trait InstanceRunner: Send + Sync {
    /// Start one instance and wait until it reports ready.
    ///
    /// Implementations should give up with `InstanceError::Cancelled` once
    /// `cancel_token` fires.
    async fn run(
        &self,
        request: &RunRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Arc<dyn RunningInstance>, InstanceError>;
}
