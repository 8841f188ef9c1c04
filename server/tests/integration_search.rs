use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use spimi_core::builder::build_partial_indices;
use spimi_core::merge::merge_partial_indices;
use spimi_core::persist::IndexPaths;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(src: &Path, index: &Path) {
    let docs = [
        ("0.json", "https://docs/rust-book", "<title>Rust</title><p>rust systems programming</p>"),
        ("1.json", "https://docs/learning", "<p>Learning rust programming.</p>"),
        ("2.json", "https://docs/python", "<p>python scripting</p>"),
    ];
    for (name, url, html) in docs {
        let record = serde_json::json!({ "url": url, "content": html });
        fs::write(src.join(name), record.to_string()).unwrap();
    }
    let paths = IndexPaths::new(index);
    build_partial_indices(src, &paths, 2).unwrap();
    merge_partial_indices(&paths).unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn app_for(index: &Path) -> Router {
    server::build_app(index.to_string_lossy().to_string()).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let src = tempdir().unwrap();
    let idx = tempdir().unwrap();
    build_tiny_index(src.path(), idx.path());

    let (status, json) = call(app_for(idx.path()), "/search?q=rust&size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"].as_u64(), Some(2));
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64(), Some(0));
    assert_eq!(arr[0]["url"].as_str(), Some("https://docs/rust-book"));
    assert_eq!(arr[1]["doc_id"].as_u64(), Some(1));
    assert!(arr[0]["score"].as_f64().unwrap() > arr[1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn search_pages_and_reports_missing_terms() {
    let src = tempdir().unwrap();
    let idx = tempdir().unwrap();
    build_tiny_index(src.path(), idx.path());

    let (status, json) = call(app_for(idx.path()), "/search?q=rust&size=1&page=2").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["rank"].as_u64(), Some(2));

    let (_, json) = call(app_for(idx.path()), "/search?q=rust+haskell").await;
    assert_eq!(json["missing_terms"].as_array().unwrap().len(), 1);
    assert_eq!(json["total_hits"].as_u64(), Some(2));

    let (status, _) = call(app_for(idx.path()), "/search?q=rust&page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn doc_lookup_uses_registry() {
    let src = tempdir().unwrap();
    let idx = tempdir().unwrap();
    build_tiny_index(src.path(), idx.path());

    let (status, json) = call(app_for(idx.path()), "/doc/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"].as_str(), Some("https://docs/python"));

    let (status, _) = call(app_for(idx.path()), "/doc/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn doc_lookup_follows_a_republished_registry() {
    let src = tempdir().unwrap();
    let idx = tempdir().unwrap();
    build_tiny_index(src.path(), idx.path());
    let app = app_for(idx.path());

    let record = serde_json::json!({ "url": "https://docs/haskell", "content": "<p>haskell</p>" });
    fs::write(src.path().join("3.json"), record.to_string()).unwrap();
    let paths = IndexPaths::new(idx.path());
    build_partial_indices(src.path(), &paths, 2).unwrap();
    merge_partial_indices(&paths).unwrap();

    let (status, json) = call(app, "/doc/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"].as_str(), Some("https://docs/haskell"));
}

#[test]
fn refuses_unmerged_index() {
    let idx = tempdir().unwrap();
    assert!(server::build_app(idx.path().to_string_lossy().to_string()).is_err());
}
