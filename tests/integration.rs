use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, oneshot};
use tower::ServiceExt;

use marquee_api::Server;
use marquee_api::config::{AppConfig, LimiterConfig, ServerSettings};
use marquee_api::error::{ErrorReporter, JsonErrorReporter};
use marquee_api::limiter::RateLimiter;
use marquee_api::middleware::Pipeline;
use marquee_api::server::{AppState, pipeline};
use marquee_api::utils::network::TrustedProxies;

fn limiter_config(enabled: bool, burst: u32) -> LimiterConfig {
    LimiterConfig {
        enabled,
        requests_per_second: 2.0,
        burst,
        ..LimiterConfig::default()
    }
}

fn test_pipeline(limiter: &RateLimiter, trusted: TrustedProxies) -> Pipeline {
    let reporter: Arc<dyn ErrorReporter> = Arc::new(JsonErrorReporter);
    let state = AppState {
        env: "development".to_string(),
        version: "test",
        reporter,
    };
    pipeline(state, Arc::new(limiter.clone()), trusted)
}

fn request(method: Method, path: &str, peer: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

// Helper to send a request through the pipeline and decode the JSON body
async fn send(pipeline: &Pipeline, req: Request<Body>) -> (StatusCode, Value) {
    let response = pipeline.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn test_healthcheck() {
    let limiter = RateLimiter::new(&limiter_config(true, 4));
    let pipeline = test_pipeline(&limiter, TrustedProxies::None);

    let (status, body) = send(
        &pipeline,
        request(Method::GET, "/v1/healthcheck", "127.0.0.1:5000"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "available",
            "system_info": { "environment": "development", "version": "test" }
        })
    );
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let limiter = RateLimiter::new(&limiter_config(false, 4));
    let pipeline = test_pipeline(&limiter, TrustedProxies::None);

    let (status, body) = send(&pipeline, request(Method::GET, "/v1/nope", "127.0.0.1:1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "error": "the requested resource could not be found" })
    );

    let (status, body) = send(
        &pipeline,
        request(Method::POST, "/v1/healthcheck", "127.0.0.1:1"),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body,
        json!({ "error": "the POST method is not supported for this resource" })
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_sequence() {
    let limiter = RateLimiter::new(&limiter_config(true, 4));
    let pipeline = test_pipeline(&limiter, TrustedProxies::None);

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let (status, _) = send(
            &pipeline,
            request(Method::GET, "/v1/healthcheck", "10.0.0.1:40000"),
        )
        .await;
        statuses.push(status.as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 200, 200, 429]);

    let (_, body) = send(
        &pipeline,
        request(Method::GET, "/v1/healthcheck", "10.0.0.1:40001"),
    )
    .await;
    assert_eq!(body, json!({ "error": "rate limit exceeded" }));

    // Another client is unaffected
    let (status, _) = send(
        &pipeline,
        request(Method::GET, "/v1/healthcheck", "10.0.0.2:40000"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::advance(Duration::from_millis(500)).await;
    let (status, _) = send(
        &pipeline,
        request(Method::GET, "/v1/healthcheck", "10.0.0.1:40000"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_routes_still_count_against_the_limit() {
    let limiter = RateLimiter::new(&limiter_config(true, 2));
    let pipeline = test_pipeline(&limiter, TrustedProxies::None);

    send(&pipeline, request(Method::GET, "/a", "10.0.0.9:1")).await;
    send(&pipeline, request(Method::GET, "/b", "10.0.0.9:1")).await;
    let (status, _) = send(&pipeline, request(Method::GET, "/v1/healthcheck", "10.0.0.9:1")).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(start_paused = true)]
async fn test_forwarded_clients_behind_trusted_proxy() {
    let limiter = RateLimiter::new(&limiter_config(true, 1));
    let trusted = TrustedProxies::from_config(&["127.0.0.1".to_string()]).unwrap();
    let pipeline = test_pipeline(&limiter, trusted);

    let forwarded = |client: &str| {
        let mut req = request(Method::GET, "/v1/healthcheck", "127.0.0.1:8080");
        req.headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        req
    };

    let (first, _) = send(&pipeline, forwarded("198.51.100.1")).await;
    let (second, _) = send(&pipeline, forwarded("198.51.100.2")).await;
    let (repeat, _) = send(&pipeline, forwarded("198.51.100.1")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(repeat, StatusCode::TOO_MANY_REQUESTS);

    let registry = limiter.registry().unwrap();
    assert!(registry.contains("198.51.100.1"));
    assert!(registry.contains("198.51.100.2"));
    assert!(!registry.contains("127.0.0.1"));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_limiter_never_rejects() {
    let limiter = RateLimiter::new(&limiter_config(false, 1));
    let pipeline = test_pipeline(&limiter, TrustedProxies::None);

    for _ in 0..100 {
        let (status, _) = send(
            &pipeline,
            request(Method::GET, "/v1/healthcheck", "10.0.0.1:1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(limiter.tracked_clients(), 0);
}

// Helper to send a raw HTTP/1.1 request and read the whole response
async fn raw_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await.unwrap();
    String::from_utf8_lossy(&buffer).to_string()
}

#[tokio::test]
async fn test_server_end_to_end() {
    let config = AppConfig {
        server: ServerSettings {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..ServerSettings::default()
        },
        limiter: LimiterConfig {
            enabled: true,
            requests_per_second: 0.001,
            burst: 2,
            ..LimiterConfig::default()
        },
    };

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let response = raw_get(addr, "/v1/healthcheck").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"status\":\"available\""));

    let response = raw_get(addr, "/v1/missing").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    let response = raw_get(addr, "/v1/healthcheck").await;
    assert!(response.starts_with("HTTP/1.1 429"), "{response}");
    assert!(response.contains("rate limit exceeded"));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("server did not shut down")
        .unwrap();
    assert!(result.is_ok());
}

fn local_config(shutdown_timeout_secs: u64) -> AppConfig {
    AppConfig {
        server: ServerSettings {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            shutdown_timeout_secs,
            ..ServerSettings::default()
        },
        limiter: LimiterConfig::default(),
    }
}

// Router whose only route signals `started` and then waits `delay` (or
// forever when `None`) before answering.
fn slow_routes(started: Arc<Notify>, delay: Option<Duration>) -> Router {
    Router::new().route(
        "/slow",
        get(move || {
            let started = Arc::clone(&started);
            async move {
                started.notify_one();
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
                "done"
            }
        }),
    )
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_request() {
    let started = Arc::new(Notify::new());
    let endpoint = slow_routes(Arc::clone(&started), Some(Duration::from_millis(300)));
    let server = Server::bind_with_routes(local_config(5), move |_| endpoint)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let in_flight = tokio::spawn(raw_get(addr, "/slow"));
    started.notified().await;
    stop_tx.send(()).unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("in-flight request was not answered")
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("done"));

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server did not shut down")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_gives_up_after_timeout() {
    let started = Arc::new(Notify::new());
    let endpoint = slow_routes(Arc::clone(&started), None);
    let server = Server::bind_with_routes(local_config(1), move |_| endpoint)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let stuck = tokio::spawn(raw_get(addr, "/slow"));
    started.notified().await;

    let stopping = Instant::now();
    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("server did not give up on the stuck request")
        .unwrap();
    let waited = stopping.elapsed();

    assert!(result.is_ok());
    assert!(waited >= Duration::from_secs(1), "returned after {waited:?}");
    assert!(waited < Duration::from_secs(5), "returned after {waited:?}");

    stuck.abort();
}
