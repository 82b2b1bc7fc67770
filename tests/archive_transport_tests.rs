//! HTTP archive transport against a local server

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use stack_controller::config::ControllerConfig;
use stack_controller::controller::pipeline::{ArchiveCache, ArchiveTransport, HttpArchiveTransport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ETAG: &str = "\"v1\"";
const BODY: &[u8] = b"archive-bytes";

#[derive(Default)]
struct Hits {
    full: AtomicUsize,
    not_modified: AtomicUsize,
}

async fn archive(State(hits): State<Arc<Hits>>, headers: HeaderMap) -> impl IntoResponse {
    if headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) == Some(ETAG) {
        hits.not_modified.fetch_add(1, Ordering::SeqCst);
        return StatusCode::NOT_MODIFIED.into_response();
    }
    hits.full.fetch_add(1, Ordering::SeqCst);
    (
        [
            (header::ETAG, ETAG),
            (header::DATE, "Wed, 14 Oct 2026 10:00:00 GMT"),
        ],
        BODY,
    )
        .into_response()
}

async fn no_validators() -> &'static [u8] {
    BODY
}

async fn serve() -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/default.tar.gz", get(archive))
        .route("/plain.tar.gz", get(no_validators))
        .route("/missing.tar.gz", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn transport() -> (HttpArchiveTransport, ArchiveCache) {
    let cache = ArchiveCache::new();
    let transport = HttpArchiveTransport::new(&ControllerConfig::default(), cache.clone()).unwrap();
    (transport, cache)
}

#[tokio::test]
async fn test_revalidates_with_etag() {
    let (base, hits) = serve().await;
    let (transport, cache) = transport();
    let url = format!("{base}/default.tar.gz");

    assert_eq!(transport.fetch(&url, false).await.unwrap(), BODY);
    assert_eq!(cache.len(), 1);
    assert_eq!(transport.fetch(&url, false).await.unwrap(), BODY);

    assert_eq!(hits.full.load(Ordering::SeqCst), 1);
    assert_eq!(hits.not_modified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_responses_without_validators_are_not_cached() {
    let (base, _) = serve().await;
    let (transport, cache) = transport();
    let url = format!("{base}/plain.tar.gz");

    assert_eq!(transport.fetch(&url, false).await.unwrap(), BODY);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (base, _) = serve().await;
    let (transport, _) = transport();
    let url = format!("{base}/missing.tar.gz");

    let err = transport.fetch(&url, false).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Could not retrieve the pipeline archive from {url}. Http status code: 404")
    );
}

#[tokio::test]
async fn test_connection_failure_names_tls_configuration() {
    let (transport, _) = transport();
    // Nothing listens on port 9 locally
    let err = transport
        .fetch("http://127.0.0.1:9/default.tar.gz", false)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").starts_with("HTTP request error while using the default TLS configuration"));
}
