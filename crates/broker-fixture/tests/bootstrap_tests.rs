//! Bootstrap integration tests.
//!
//! Drives `Bootstrapper::bootstrap` against mock runners and connectors and
//! checks that every failure after the runner leaves exactly one termination
//! guard behind, which fires once the scope is cancelled.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use broker_fixture::{
    BootstrapError, ConnectorError, InstanceError, TeardownReport, TeardownScope,
};
use broker_fixture_test_utils::*;
use std::collections::HashMap;
use std::sync::Arc;

const ENDPOINT: &str = "nats://127.0.0.1:4222";

/// Successful bootstrap injects the client, the endpoint and a first prefix.
#[tokio::test]
async fn test_bootstrap_success_injects_dependencies() -> Result<(), anyhow::Error> {
    init_test_logging();

    let instance = MockInstance::reachable(ENDPOINT);
    let connector = MockConnector::accepting();
    let bootstrapper = mock_config(MockRunner::succeeding(instance.clone()), connector.clone())
        .finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    let fixture = bootstrapper.bootstrap(&scope).await?;

    let deps = fixture.inject(TestDeps::default())?;
    let client = deps.client.expect("client should be injected");

    assert!(Arc::ptr_eq(&client, &connector.last_client().unwrap()));
    assert_eq!(client.endpoint, ENDPOINT);
    assert_eq!(deps.conn_string, ENDPOINT);
    assert_eq!(deps.prefix, "1_");
    assert_eq!(connector.endpoints(), vec![ENDPOINT.to_string()]);

    // Broker stays up until the scope is cancelled.
    assert_eq!(instance.terminate_calls(), 0);
    assert_eq!(scope.in_flight(), 1);

    let report = scope.shutdown().await;
    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 1);
    assert!(report.is_clean());

    Ok(())
}

/// Runner failure: no guard is registered and nothing else is called.
#[tokio::test]
async fn test_bootstrap_runner_error() -> Result<(), anyhow::Error> {
    init_test_logging();

    let error = unexpected_error();
    let runner = MockRunner::failing(error.clone());
    let connector = MockConnector::accepting();
    let bootstrapper =
        mock_config(runner.clone(), connector.clone()).finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    match &err {
        BootstrapError::Runner(InstanceError::Start(_)) => {}
        other => panic!("expected runner error, got {other:?}"),
    }
    assert_eq!(find_cause::<UnexpectedError>(&err), Some(&error));
    assert!(err.to_string().contains(&error.to_string()));
    assert_eq!(runner.call_count(), 1);
    assert_eq!(connector.call_count(), 0);
    assert_eq!(scope.in_flight(), 0);

    let report = scope.shutdown().await;
    assert_eq!(report.terminated, 0);
    assert!(report.is_clean());

    Ok(())
}

/// Endpoint failure: the instance is still terminated once on cancel.
#[tokio::test]
async fn test_bootstrap_endpoint_error_terminates_instance() -> Result<(), anyhow::Error> {
    init_test_logging();

    let error = unexpected_error();
    let instance = MockInstance::unreachable(error.clone());
    let connector = MockConnector::accepting();
    let bootstrapper = mock_config(MockRunner::succeeding(instance.clone()), connector.clone())
        .finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Endpoint(InstanceError::Endpoint(_))
    ));
    assert_eq!(find_cause::<UnexpectedError>(&err), Some(&error));
    assert!(find_cause::<InstanceError>(&err).is_some());
    assert_eq!(connector.call_count(), 0);
    assert_eq!(instance.terminate_calls(), 0);

    scope.cancel();
    let report = scope.wait().await;

    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 1);

    Ok(())
}

/// Connector failure: the instance is still terminated once on cancel.
#[tokio::test]
async fn test_bootstrap_connector_error_terminates_instance() -> Result<(), anyhow::Error> {
    init_test_logging();

    let error = unexpected_error();
    let instance = MockInstance::reachable(ENDPOINT);
    let connector = MockConnector::failing(error.clone());
    let bootstrapper = mock_config(MockRunner::succeeding(instance.clone()), connector.clone())
        .finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Connector(ConnectorError::Connect(_))));
    assert_eq!(find_cause::<UnexpectedError>(&err), Some(&error));
    assert_ne!(find_cause::<UnexpectedError>(&err), Some(&unexpected_error()));
    assert_eq!(connector.endpoints(), vec![ENDPOINT.to_string()]);

    scope.cancel();
    let report = scope.wait().await;

    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 1);

    Ok(())
}

/// The runner receives the resolved image, args and timeout.
#[tokio::test]
async fn test_bootstrap_passes_run_request() -> Result<(), anyhow::Error> {
    let runner = MockRunner::succeeding(MockInstance::reachable(ENDPOINT));
    let vars = HashMap::from([(
        "BROKER_FIXTURE_NATS_IMAGE".to_string(),
        "nats:2.10-alpine".to_string(),
    )]);

    let bootstrapper = mock_config(runner.clone(), MockConnector::accepting())
        .with_container_args(["-js"])
        .with_startup_timeout(std::time::Duration::from_secs(5))
        .finalize_with_vars(&vars)?;

    let scope = TeardownScope::new();
    bootstrapper.bootstrap(&scope).await?;

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    let request = requests.first().unwrap();
    assert_eq!(request.image.to_string(), "nats:2.10-alpine");
    assert_eq!(request.args, vec!["-js".to_string()]);
    assert_eq!(request.startup_timeout, std::time::Duration::from_secs(5));

    scope.shutdown().await;
    Ok(())
}

/// A failing terminate is reported, logged and not retried.
#[tokio::test]
async fn test_bootstrap_terminate_failure_is_reported() -> Result<(), anyhow::Error> {
    init_test_logging();

    let error = unexpected_error();
    let instance = MockInstance::reachable(ENDPOINT).failing_terminate(error.clone());
    let bootstrapper = mock_config(
        MockRunner::succeeding(instance.clone()),
        MockConnector::accepting(),
    )
    .finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    bootstrapper.bootstrap(&scope).await?;

    scope.cancel();
    scope.cancel();
    let report = scope.wait().await;

    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report
        .failures
        .first()
        .unwrap()
        .error
        .contains(&error.to_string()));
    assert_eq!(report.failures.first().unwrap().instance, "nats:2.9");

    Ok(())
}

/// Bootstrapping on a cancelled scope starts nothing.
#[tokio::test]
async fn test_bootstrap_on_cancelled_scope_starts_nothing() -> Result<(), anyhow::Error> {
    let instance = MockInstance::reachable(ENDPOINT);
    let runner = MockRunner::succeeding(instance.clone());
    let connector = MockConnector::accepting();
    let bootstrapper =
        mock_config(runner.clone(), connector.clone()).finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    scope.cancel();

    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Cancelled));
    assert_eq!(runner.call_count(), 0);
    assert_eq!(connector.call_count(), 0);
    assert_eq!(scope.in_flight(), 0);

    let report = scope.wait().await;
    assert_eq!(instance.terminate_calls(), 0);
    assert_eq!(report, TeardownReport::default());

    Ok(())
}

/// Cancellation while the runner is starting: no fixture, instance terminated.
#[tokio::test]
async fn test_bootstrap_cancelled_during_run() -> Result<(), anyhow::Error> {
    let instance = MockInstance::reachable(ENDPOINT);
    let runner = MockRunner::succeeding(instance.clone()).cancelling_on_run();
    let connector = MockConnector::accepting();
    let bootstrapper =
        mock_config(runner.clone(), connector.clone()).finalize_with_vars(&HashMap::new())?;

    let scope = TeardownScope::new();
    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Cancelled));
    assert_eq!(runner.call_count(), 1);
    assert_eq!(instance.endpoint_calls(), 0);
    assert_eq!(connector.call_count(), 0);

    let report = scope.wait().await;
    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 1);

    Ok(())
}

/// Cancellation while connecting: the connected client is discarded.
#[tokio::test]
async fn test_bootstrap_cancelled_during_connect() -> Result<(), anyhow::Error> {
    let scope = TeardownScope::new();
    let instance = MockInstance::reachable(ENDPOINT);
    let connector = MockConnector::accepting().cancelling_on_connect(scope.token());
    let bootstrapper = mock_config(MockRunner::succeeding(instance.clone()), connector.clone())
        .finalize_with_vars(&HashMap::new())?;

    let err = bootstrapper.bootstrap(&scope).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Cancelled));
    assert_eq!(connector.call_count(), 1);

    let report = scope.wait().await;
    assert_eq!(instance.terminate_calls(), 1);
    assert_eq!(report.terminated, 1);

    Ok(())
}
