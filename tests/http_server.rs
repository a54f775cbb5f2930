//! Graceful shutdown behaviour of the HTTP server.

use std::time::Duration;

use axum::{routing::get, Router};
use service_runtime::http::{load_into_system, HttpServer, ServerConfig, ServerError};
use service_runtime::lifecycle::{ManualSignal, RunError, Signal, System};
use tokio_util::sync::CancellationToken;

mod common;

fn slow_router(delay: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
}

async fn start(config: ServerConfig) -> (String, CancellationToken, tokio::task::JoinHandle<Result<(), ServerError>>) {
    let server = HttpServer::bind(config).await.expect("bind");
    let addr = server.addr().to_string();
    let token = CancellationToken::new();
    let handle = tokio::spawn(server.serve(token.clone()));
    (addr, token, handle)
}

#[tokio::test]
async fn test_serves_requests() {
    let config = ServerConfig::new("test", "127.0.0.1:0", slow_router(Duration::ZERO));
    let (addr, token, handle) = start(config).await;

    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");

    token.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_in_flight_request_completes_within_grace_period() {
    let config = ServerConfig::new("test", "127.0.0.1:0", slow_router(Duration::from_millis(300)))
        .shutdown_grace_period(Duration::from_secs(5));
    let (addr, token, handle) = start(config).await;

    let request = tokio::spawn(async move { common::client().get(format!("http://{addr}/slow")).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let res = request.await.unwrap().expect("in-flight request should complete");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_request_outliving_grace_period_is_cut_off() {
    let config = ServerConfig::new("test", "127.0.0.1:0", slow_router(Duration::from_secs(10)))
        .shutdown_grace_period(Duration::from_millis(200));
    let (addr, token, handle) = start(config).await;

    let request = tokio::spawn(async move { common::client().get(format!("http://{addr}/slow")).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let res = tokio::time::timeout(Duration::from_secs(5), request).await.unwrap().unwrap();
    assert!(res.is_err(), "request should fail once the grace period elapses");

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, ServerError::ShutdownTimeout { open: 1, .. }));
}

#[tokio::test]
async fn test_no_new_connections_after_shutdown() {
    let config = ServerConfig::new("test", "127.0.0.1:0", slow_router(Duration::ZERO));
    let (addr, token, handle) = start(config).await;

    token.cancel();
    handle.await.unwrap().unwrap();

    let res = common::client()
        .get(format!("http://{addr}/"))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(res.is_err());
}

#[tokio::test]
async fn test_write_timeout_returns_408() {
    let config = ServerConfig::new("test", "127.0.0.1:0", slow_router(Duration::from_secs(5)))
        .timeouts(Duration::from_secs(5), Duration::from_millis(100));
    let (addr, token, handle) = start(config).await;

    let res = common::client().get(format!("http://{addr}/slow")).send().await.unwrap();
    assert_eq!(res.status(), 408);

    token.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_server_stops_with_system() {
    let (signals, trigger) = ManualSignal::new();
    let mut system = System::with_signals(signals);
    let addr = load_into_system(
        ServerConfig::new("api", "127.0.0.1:0", slow_router(Duration::ZERO)),
        &mut system,
    )
    .await
    .unwrap();

    let run = tokio::spawn(async move { system.run(&CancellationToken::new(), Duration::ZERO).await });

    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    trigger.send(Signal::Interrupt);
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(matches!(result, Err(RunError::Terminated)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_binds() {
    use service_runtime::net::Network;

    let path = std::env::temp_dir().join(format!("service-runtime-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let config = ServerConfig::new("unix", path.display().to_string(), slow_router(Duration::ZERO))
        .network(Network::Unix);
    let (addr, token, handle) = start(config).await;
    assert_eq!(addr, path.display().to_string());

    token.cancel();
    assert!(handle.await.unwrap().is_ok());
    let _ = std::fs::remove_file(&path);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_rebinds_after_shutdown() {
    use service_runtime::net::Network;

    let path = std::env::temp_dir().join(format!("service-runtime-rebind-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let config = || {
        ServerConfig::new("unix", path.display().to_string(), slow_router(Duration::ZERO)).network(Network::Unix)
    };

    let (_, token, handle) = start(config()).await;
    token.cancel();
    assert!(handle.await.unwrap().is_ok());
    assert!(!path.exists(), "socket file left behind after shutdown");

    let (_, token, handle) = start(config()).await;
    token.cancel();
    assert!(handle.await.unwrap().is_ok());
    assert!(!path.exists());
}
