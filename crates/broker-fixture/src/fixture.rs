//! Per-suite fixture handle.
//!
//! A `Fixture` owns the live client and connection string for one running
//! broker, plus a counter that gives every injected test case its own
//! prefix. Clones share all of it, so one fixture can serve test cases
//! running in parallel.

use crate::inject::{InjectError, Injectable, Injected};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Separator between the case prefix, the case number and the caller's names.
pub const PREFIX_SEPARATOR: &str = "_";

/// Default label for the client handle.
pub const DEFAULT_CLIENT_LABEL: &str = "nats";

/// Default label for the connection string.
pub const DEFAULT_CONNECTION_STRING_LABEL: &str = "nats.config";

/// Default label for the per-case prefix.
pub const DEFAULT_PREFIX_LABEL: &str = "nats.prefix";

/// Labels under which the three injected values are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectLabels {
    /// Label for the client handle.
    pub client: String,
    /// Label for the connection string.
    pub connection_string: String,
    /// Label for the per-case prefix.
    pub prefix: String,
}

impl Default for InjectLabels {
    fn default() -> Self {
        Self {
            client: DEFAULT_CLIENT_LABEL.to_string(),
            connection_string: DEFAULT_CONNECTION_STRING_LABEL.to_string(),
            prefix: DEFAULT_PREFIX_LABEL.to_string(),
        }
    }
}

/// Shared handle to one running broker and its client.
pub struct Fixture<C> {
    inner: Arc<FixtureInner<C>>,
}

struct FixtureInner<C> {
    client: C,
    connection_string: String,
    labels: InjectLabels,
    case_prefix: Option<String>,
    forks: AtomicU64,
}

impl<C> Clone for Fixture<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for Fixture<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("client", &"<client>")
            .field("connection_string", &self.inner.connection_string)
            .field("labels", &self.inner.labels)
            .field("case_prefix", &self.inner.case_prefix)
            .field("injections", &self.injections())
            .finish()
    }
}

impl<C> Fixture<C> {
    /// Create a fixture around a connected client.
    ///
    /// An empty `case_prefix` is treated as none.
    #[must_use]
    pub fn new(
        client: C,
        connection_string: String,
        labels: InjectLabels,
        case_prefix: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(FixtureInner {
                client,
                connection_string,
                labels,
                case_prefix: case_prefix.filter(|p| !p.is_empty()),
                forks: AtomicU64::new(0),
            }),
        }
    }

    /// The shared client handle.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.inner.client
    }

    /// Connection string of the running broker.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.inner.connection_string
    }

    /// Labels the values are written under.
    #[must_use]
    pub fn labels(&self) -> &InjectLabels {
        &self.inner.labels
    }

    /// Number of prefixes handed out so far.
    #[must_use]
    pub fn injections(&self) -> u64 {
        self.inner.forks.load(Ordering::Relaxed)
    }

    /// Reserve the next unique prefix.
    ///
    /// The first call returns `"1_"` (or `"<case_prefix>_1_"`). The counter
    /// is only ever advanced by an atomic add, so concurrent callers never
    /// see the same value.
    #[must_use]
    pub fn next_prefix(&self) -> String {
        let fork = self.inner.forks.fetch_add(1, Ordering::Relaxed) + 1;
        format_prefix(self.inner.case_prefix.as_deref(), fork)
    }
}

impl<C: Clone> Fixture<C> {
    /// Write the client, connection string and a fresh prefix into `target`.
    ///
    /// # Errors
    ///
    /// Returns an `InjectError` when `target` has no field for one of the
    /// configured labels, or maps it to a field of the wrong kind. The
    /// prefix counter has already advanced at that point.
    pub fn inject<T: Injectable<C>>(&self, target: T) -> Result<T, InjectError> {
        let prefix = self.next_prefix();
        let labels = &self.inner.labels;

        trace!(
            target: "broker_fixture.fixture",
            prefix = %prefix,
            "Injecting broker dependencies"
        );

        target
            .set_by_label(&labels.client, Injected::Client(self.inner.client.clone()))?
            .set_by_label(
                &labels.connection_string,
                Injected::ConnectionString(self.inner.connection_string.clone()),
            )?
            .set_by_label(&labels.prefix, Injected::Prefix(prefix))
    }

    /// The injection operation as a standalone closure.
    ///
    /// Each call behaves like `inject` on a clone of this fixture.
    pub fn injector<T>(&self) -> impl Fn(T) -> Result<T, InjectError> + Clone + Send + Sync
    where
        T: Injectable<C>,
        C: Send + Sync,
    {
        let fixture = self.clone();
        move |target| fixture.inject(target)
    }
}

fn format_prefix(case_prefix: Option<&str>, fork: u64) -> String {
    match case_prefix {
        Some(case_prefix) => {
            format!("{case_prefix}{PREFIX_SEPARATOR}{fork}{PREFIX_SEPARATOR}")
        }
        None => format!("{fork}{PREFIX_SEPARATOR}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Deps {
        client: Option<Arc<String>>,
        dsn: String,
        prefix: String,
    }

    crate::injectable! {
        Deps => Arc<String> {
            "nats" => client: client,
            "nats.config" => dsn: text,
            "nats.prefix" => prefix: text,
        }
    }

    fn fixture(case_prefix: Option<&str>) -> Fixture<Arc<String>> {
        Fixture::new(
            Arc::new("client".to_string()),
            "nats://127.0.0.1:4222".to_string(),
            InjectLabels::default(),
            case_prefix.map(str::to_string),
        )
    }

    #[test]
    fn test_default_labels() {
        let labels = InjectLabels::default();
        assert_eq!(labels.client, "nats");
        assert_eq!(labels.connection_string, "nats.config");
        assert_eq!(labels.prefix, "nats.prefix");
    }

    #[test]
    fn test_format_prefix() {
        assert_eq!(format_prefix(None, 1), "1_");
        assert_eq!(format_prefix(Some("case"), 12), "case_12_");
    }

    #[test]
    fn test_prefixes_without_case_prefix() {
        let fixture = fixture(None);
        assert_eq!(fixture.next_prefix(), "1_");
        assert_eq!(fixture.next_prefix(), "2_");
        assert_eq!(fixture.injections(), 2);
    }

    #[test]
    fn test_empty_case_prefix_is_ignored() {
        let fixture = fixture(Some(""));
        assert_eq!(fixture.next_prefix(), "1_");
    }

    #[test]
    fn test_inject_fills_all_fields() {
        let fixture = fixture(Some("case"));
        let deps = fixture.inject(Deps::default()).unwrap();

        let client = deps.client.expect("client should be injected");
        assert!(Arc::ptr_eq(&client, fixture.client()));
        assert_eq!(deps.dsn, "nats://127.0.0.1:4222");
        assert_eq!(deps.prefix, "case_1_");
    }

    #[test]
    fn test_injector_shares_counter_with_fixture() {
        let fixture = fixture(None);
        let inject = fixture.injector::<Deps>();

        assert_eq!(inject(Deps::default()).unwrap().prefix, "1_");
        assert_eq!(fixture.inject(Deps::default()).unwrap().prefix, "2_");
        assert_eq!(inject(Deps::default()).unwrap().prefix, "3_");
    }

    #[test]
    fn test_inject_reports_missing_label() {
        let fixture = Fixture::new(
            Arc::new("client".to_string()),
            "nats://127.0.0.1:4222".to_string(),
            InjectLabels {
                client: "gronats".to_string(),
                ..InjectLabels::default()
            },
            None,
        );

        let err = fixture.inject(Deps::default()).unwrap_err();
        assert_eq!(err, InjectError::UnknownLabel("gronats".to_string()));
    }

    #[test]
    fn test_debug_hides_client() {
        let debug_str = format!("{:?}", fixture(None));
        assert!(debug_str.contains("<client>"));
        assert!(debug_str.contains("nats://127.0.0.1:4222"));
    }
}
