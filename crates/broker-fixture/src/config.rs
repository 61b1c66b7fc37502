//! Fixture configuration.
//!
//! A `FixtureConfig` starts from defaults and is adjusted with `with_*`
//! builder methods. `finalize` then applies the image override from the
//! environment, validates everything, and returns an immutable
//! `Bootstrapper`. Nothing can change after that point.
//!
//! # Example
//!
//! ```rust,ignore
//! let bootstrapper = FixtureConfig::nats()
//!     .with_inject_label("gronats")
//!     .with_inject_label_dsn("gronats.config")
//!     .with_inject_label_prefix("gronats.prefix")
//!     .with_case_prefix("gronats")
//!     .with_container_image("nats:2.6")
//!     .finalize()?;
//! ```

use crate::bootstrap::{Bootstrapper, FixtureSettings};
use crate::connector::ClientConnector;
use crate::errors::{ConfigError, InjectedKind};
use crate::fixture::InjectLabels;
use crate::runner::{ImageRef, InstanceRunner};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default broker image.
pub const DEFAULT_IMAGE: &str = "nats:2.9";

/// Default environment variable that overrides the image.
pub const DEFAULT_IMAGE_ENV_VAR: &str = "BROKER_FIXTURE_NATS_IMAGE";

/// Default upper bound on waiting for the broker to report ready.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for a `Bootstrapper`.
pub struct FixtureConfig<C> {
    image: String,
    image_env_var: String,
    labels: InjectLabels,
    case_prefix: Option<String>,
    container_args: Vec<String>,
    startup_timeout: Duration,
    runner: Arc<dyn InstanceRunner>,
    connector: Arc<dyn ClientConnector<C>>,
}

impl<C> fmt::Debug for FixtureConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureConfig")
            .field("image", &self.image)
            .field("image_env_var", &self.image_env_var)
            .field("labels", &self.labels)
            .field("case_prefix", &self.case_prefix)
            .field("container_args", &self.container_args)
            .field("startup_timeout", &self.startup_timeout)
            .field("runner", &"<runner>")
            .field("connector", &"<connector>")
            .finish()
    }
}

impl<C> FixtureConfig<C> {
    /// Create a configuration with default settings around a runner and a
    /// connector.
    #[must_use]
    pub fn new(runner: Arc<dyn InstanceRunner>, connector: Arc<dyn ClientConnector<C>>) -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            image_env_var: DEFAULT_IMAGE_ENV_VAR.to_string(),
            labels: InjectLabels::default(),
            case_prefix: None,
            container_args: Vec::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            runner,
            connector,
        }
    }

    /// Set the container image (e.g. `nats:2.6`).
    #[must_use]
    pub fn with_container_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set the environment variable whose non-empty value overrides the image.
    #[must_use]
    pub fn with_image_env_var(mut self, name: impl Into<String>) -> Self {
        self.image_env_var = name.into();
        self
    }

    /// Set the label the client handle is injected under.
    #[must_use]
    pub fn with_inject_label(mut self, label: impl Into<String>) -> Self {
        self.labels.client = label.into();
        self
    }

    /// Set the label the connection string is injected under.
    #[must_use]
    pub fn with_inject_label_dsn(mut self, label: impl Into<String>) -> Self {
        self.labels.connection_string = label.into();
        self
    }

    /// Set the label the per-case prefix is injected under.
    #[must_use]
    pub fn with_inject_label_prefix(mut self, label: impl Into<String>) -> Self {
        self.labels.prefix = label.into();
        self
    }

    /// Prepend a static namespace to every per-case prefix (`case` gives
    /// `case_1_`, `case_2_`, ...).
    #[must_use]
    pub fn with_case_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.case_prefix = Some(prefix.into());
        self
    }

    /// Set the container command arguments (e.g. `["-js"]` for JetStream).
    #[must_use]
    pub fn with_container_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set how long to wait for the broker to report ready.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Replace the runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn InstanceRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the connector.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ClientConnector<C>>) -> Self {
        self.connector = connector;
        self
    }

    /// Finalize using the process environment for the image override.
    ///
    /// Only the override variable is read. A value that is not valid UTF-8
    /// is ignored.
    ///
    /// # Errors
    ///
    /// See [`FixtureConfig::finalize_with_vars`].
    pub fn finalize(self) -> Result<Bootstrapper<C>, ConfigError> {
        let mut vars = HashMap::new();
        if !self.image_env_var.is_empty() {
            match env::var_os(&self.image_env_var).map(|v| v.into_string()) {
                Some(Ok(value)) => {
                    vars.insert(self.image_env_var.clone(), value);
                }
                Some(Err(_)) => {
                    warn!(
                        target: "broker_fixture.config",
                        env_var = %self.image_env_var,
                        "Image override is not valid UTF-8, ignoring it"
                    );
                }
                None => {}
            }
        }
        self.finalize_with_vars(&vars)
    }

    /// Finalize using `vars` for the image override (for testing).
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidImage` - the resolved image cannot be parsed
    /// - `ConfigError::EmptyLabel` - an injection label is empty
    /// - `ConfigError::DuplicateLabel` - two values share a label
    pub fn finalize_with_vars(
        self,
        vars: &HashMap<String, String>,
    ) -> Result<Bootstrapper<C>, ConfigError> {
        let image = resolve_image(&self.image, &self.image_env_var, vars);
        let image = ImageRef::parse(&image)?;
        validate_labels(&self.labels)?;

        let settings = FixtureSettings {
            image,
            labels: self.labels,
            case_prefix: self.case_prefix.filter(|p| !p.is_empty()),
            container_args: self.container_args,
            startup_timeout: self.startup_timeout,
        };

        Ok(Bootstrapper::from_parts(
            settings,
            self.runner,
            self.connector,
        ))
    }
}

/// Pick the configured image unless `env_var` holds a non-empty override.
fn resolve_image(configured: &str, env_var: &str, vars: &HashMap<String, String>) -> String {
    if env_var.is_empty() {
        return configured.to_string();
    }

    match vars.get(env_var).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(image) => {
            info!(
                target: "broker_fixture.config",
                env_var = %env_var,
                image = %image,
                "Container image overridden from environment"
            );
            image.to_string()
        }
        None => configured.to_string(),
    }
}

fn validate_labels(labels: &InjectLabels) -> Result<(), ConfigError> {
    let entries = [
        (InjectedKind::Client, &labels.client),
        (InjectedKind::ConnectionString, &labels.connection_string),
        (InjectedKind::Prefix, &labels.prefix),
    ];

    for (kind, label) in entries {
        if label.is_empty() {
            return Err(ConfigError::EmptyLabel(kind));
        }
    }

    if labels.client == labels.connection_string || labels.client == labels.prefix {
        return Err(ConfigError::DuplicateLabel(labels.client.clone()));
    }
    if labels.connection_string == labels.prefix {
        return Err(ConfigError::DuplicateLabel(labels.prefix.clone()));
    }

    Ok(())
}
