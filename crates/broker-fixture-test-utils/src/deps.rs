//! Dependency container used by broker-fixture tests.

use std::sync::Arc;

/// Label for the client handle in `TestDeps`.
pub const TEST_CLIENT_LABEL: &str = "gronats";

/// Label for the connection string in `TestDeps`.
pub const TEST_DSN_LABEL: &str = "gronats.config";

/// Label for the per-case prefix in `TestDeps`.
pub const TEST_PREFIX_LABEL: &str = "gronats.prefix";

/// Stand-in for a broker client.
///
/// Tests compare handles with `Arc::ptr_eq`, so identity is what matters.
#[derive(Debug, PartialEq, Eq)]
pub struct FakeClient {
    /// Endpoint the client was "connected" to.
    pub endpoint: String,
}

/// Client handle type produced by `MockConnector`.
pub type TestClient = Arc<FakeClient>;

/// Dependency container for one test case.
#[derive(Debug, Clone, Default)]
pub struct TestDeps {
    pub client: Option<TestClient>,
    pub conn_string: String,
    pub prefix: String,
}

broker_fixture::injectable! {
    TestDeps => TestClient {
        "gronats" => client: client,
        "gronats.config" => conn_string: text,
        "gronats.prefix" => prefix: text,
    }
}
