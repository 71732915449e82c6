mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{Request, StatusCode, Uri},
    routing::get,
};
use gateway::{
    AppState,
    config::{Config, parse_routes},
    router::create_router,
};
use serde_json::json;
use tower::ServiceExt;

use common::{RecordingStore, body_json, get as get_req, get_as, wait_for_sets};

async fn echo(State(calls): State<Arc<AtomicUsize>>, uri: Uri) -> Json<serde_json::Value> {
    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "path": uri.path(), "query": uri.query(), "call": n }))
}

async fn echo_body(State(calls): State<Arc<AtomicUsize>>, body: Bytes) -> Json<serde_json::Value> {
    calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "body": String::from_utf8_lossy(&body) }))
}

/// 在随机端口上启动服务，返回地址
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{}", addr)
}

/// 启动一个本地上游服务，返回地址和调用计数
async fn spawn_upstream() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/{*path}", get(echo).post(echo_body))
        .with_state(calls.clone());
    (serve(app).await, calls)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn gateway(upstream: &str, store: &RecordingStore) -> Router {
    let routes = parse_routes(
        &json!([
            {
                "id": "items",
                "path": "/api/items",
                "uri": format!("{}/v1", upstream),
                "stripPrefix": true,
                "rateLimit": { "limit": 3, "windowSeconds": 60 },
                "cache": { "ttlSeconds": 60, "maxBytes": 4096 }
            },
            {
                "id": "open",
                "path": "/open",
                "uri": upstream
            }
        ])
        .to_string(),
    )
    .unwrap();

    let state = AppState {
        config: Config {
            redis_url: "redis://unused".into(),
            server_host: "127.0.0.1".into(),
            server_port: 0,
            routes_file: "inline".into(),
            identity_header: "X-Real-IP".into(),
            rate_limit_namespace: "rl".into(),
            cache_namespace: "cache".into(),
            routes,
        },
        counters: Arc::new(store.clone()),
        cache: Arc::new(store.clone()),
        http: client(),
    };
    create_router(&state).unwrap()
}

#[tokio::test]
async fn forwards_caches_and_limits() {
    let (upstream, calls) = spawn_upstream().await;
    let store = RecordingStore::default();
    let app = gateway(&upstream, &store);

    let resp = app
        .clone()
        .oneshot(get_as("/api/items/42?b=2&a=1", "abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-cache"], "MISS");
    let first = body_json(resp).await;
    assert_eq!(first["path"], "/v1/42");
    assert_eq!(first["query"], "b=2&a=1");
    wait_for_sets(&store, 1).await;

    let resp = app
        .clone()
        .oneshot(get_as("/api/items/42?a=1&b=2", "abc"))
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-cache"], "HIT");
    assert_eq!(body_json(resp).await, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 缓存命中也计入限流
    let resp = app
        .clone()
        .oneshot(get_as("/api/items/42", "abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get_as("/api/items/42", "abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(resp).await;
    assert_eq!(body["key"], "abc");
    assert!(body["retryAfterSeconds"].as_u64().unwrap() <= 60);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn routes_without_filters_pass_through() {
    let (upstream, calls) = spawn_upstream().await;
    let store = RecordingStore::default();
    let app = gateway(&upstream, &store);

    for n in 1..=5 {
        let resp = app.clone().oneshot(get_req("/open/things")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("x-cache").is_none());
        let body = body_json(resp).await;
        assert_eq!(body["path"], "/open/things");
        assert_eq!(body["call"], n);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(store.increments(), 0);
    assert_eq!(store.gets(), 0);
}

#[tokio::test]
async fn unreachable_upstream_is_reported_as_bad_gateway() {
    let store = RecordingStore::default();
    // 绑定后立即释放，端口上没有服务
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let app = gateway(&format!("http://{}", addr), &store);
    let resp = app.oneshot(get_req("/open/x")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "BAD_GATEWAY");
    assert_eq!(body["status"], 502);
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let (upstream, _) = spawn_upstream().await;
    let app = gateway(&upstream, &RecordingStore::default());
    let resp = app.oneshot(get_req("/elsewhere")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_length_responses_are_cached_over_a_real_connection() {
    let (upstream, calls) = spawn_upstream().await;
    let store = RecordingStore::default();
    let gateway_url = serve(gateway(&upstream, &store)).await;
    let url = format!("{}/api/items/7?x=1", gateway_url);

    let first = client()
        .get(&url)
        .header("x-real-ip", "abc")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert!(first.headers().contains_key("content-length"));
    let first_body: serde_json::Value = first.json().await.unwrap();
    wait_for_sets(&store, 1).await;

    let second = client()
        .get(&url)
        .header("x-real-ip", "abc")
        .send()
        .await
        .unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.json::<serde_json::Value>().await.unwrap(), first_body);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_body_is_forwarded() {
    let (upstream, calls) = spawn_upstream().await;
    let app = gateway(&upstream, &RecordingStore::default());

    let req = Request::builder()
        .method("POST")
        .uri("/open/submit")
        .header("content-type", "text/plain")
        .body(Body::from("hello upstream"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["body"], "hello upstream");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_request_body_is_rejected() {
    let (upstream, calls) = spawn_upstream().await;
    let app = gateway(&upstream, &RecordingStore::default());

    let req = Request::builder()
        .method("POST")
        .uri("/open/submit")
        .body(Body::from(vec![b'a'; 10 * 1024 * 1024 + 1]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["code"], "BAD_REQUEST");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
