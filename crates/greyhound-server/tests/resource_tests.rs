//! Endpoint tests for `/info` and `/files`, plus routing and error
//! behavior.

mod common;

use common::{TestServer, ELLIPSOID_POINTS};
use reqwest::StatusCode;

#[tokio::test]
async fn test_info_shape() {
    let server = TestServer::start().await;

    let info = server.get_json("/resource/ellipsoid/info").await;
    assert_eq!(info["type"], "octree");
    assert_eq!(info["numPoints"], ELLIPSOID_POINTS as u64);
    assert!(info["schema"].is_array());
    assert_eq!(
        info["bounds"],
        serde_json::json!([0.0, 0.0, 0.0, 100.0, 100.0, 100.0])
    );
    assert_eq!(
        info["boundsConforming"],
        serde_json::json!([10.0, 20.0, 30.0, 90.0, 80.0, 70.0])
    );
    assert_eq!(info["srs"], "EPSG:26915");
    assert_eq!(info["baseDepth"], 0);

    server.stop().await;
}

#[tokio::test]
async fn test_info_headers() {
    let server = TestServer::start().await;

    let response = server.get("/resource/ellipsoid/info").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(response.headers().get("x-powered-by").unwrap(), "Hobu, Inc.");
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "Content-Type"
    );
    // Configured default headers ride along on every response.
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_resource_is_404() {
    let server = TestServer::start().await;

    let response = server.get("/resource/ghost/info").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.text().await.unwrap(),
        "ghost could not be created"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_routes_are_404() {
    let server = TestServer::start().await;

    for path in ["/", "/resource", "/resource/ellipsoid", "/resource/ellipsoid/write"] {
        let response = server.get(path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {path}");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_files_all_paths() {
    let server = TestServer::start().await;

    let files = server.get_json("/resource/ellipsoid/files").await;
    assert_eq!(
        files,
        serde_json::json!(["s3://ellipsoid/half-0.laz", "s3://ellipsoid/half-1.laz"])
    );

    server.stop().await;
}

#[tokio::test]
async fn test_files_by_origin_segment() {
    let server = TestServer::start().await;

    let file = server.get_json("/resource/ellipsoid/files/0").await;
    assert_eq!(file["path"], "s3://ellipsoid/half-0.laz");
    assert_eq!(file["origin"], 0);
    assert!(file["bounds"].is_array());

    // A non-numeric segment searches by path.
    let file = server.get_json("/resource/ellipsoid/files/half-1").await;
    assert_eq!(file["origin"], 1);

    // A miss is a JSON null, not an error.
    let missing = server.get_json("/resource/ellipsoid/files/99").await;
    assert!(missing.is_null());

    server.stop().await;
}

#[tokio::test]
async fn test_files_search_array() {
    let server = TestServer::start().await;

    let found = server
        .get_json("/resource/ellipsoid/files?search=%5B1,0,%22nope%22%5D")
        .await;
    let entries = found.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["origin"], 1);
    assert_eq!(entries[1]["origin"], 0);
    assert!(entries[2].is_null());

    server.stop().await;
}

#[tokio::test]
async fn test_files_bounds_query() {
    let server = TestServer::start().await;

    // Only the lower-z source file overlaps this box.
    let found = server
        .get_json("/resource/ellipsoid/files?bounds=%5B0,0,0,100,100,40%5D")
        .await;
    let entries = found.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["origin"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_files_bounds_and_search_is_400() {
    let server = TestServer::start().await;

    let response = server
        .get("/resource/ellipsoid/files?bounds=%5B0,0,0,1,1,1%5D&search=foo")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "Invalid query - cannot specify bounds and search"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_files_segment_with_query_is_400() {
    let server = TestServer::start().await;

    let response = server.get("/resource/ellipsoid/files/0?search=1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_hierarchy_requires_its_fields() {
    let server = TestServer::start().await;

    let response = server.get("/resource/ellipsoid/hierarchy").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .get("/resource/ellipsoid/hierarchy?bounds=%5B0,0,0,100,100,100%5D&depthBegin=0")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}
