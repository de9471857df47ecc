mod common;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use common::{config, serve, store};
use robostore::{ClientError, ErrorCategory, config::API_KEY_HEADER};
use serde_json::{Value, json};
use std::collections::HashMap;
use tempfile::TempDir;

async fn whoami(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    match (key, bearer) {
        (Some("k-123"), None) => (
            StatusCode::OK,
            Json(json!({
                "email": "ada@example.com",
                "email_verified": true,
                "user": { "id": "u-1", "email": "ada@example.com", "username": "ada" },
            })),
        ),
        (None, Some("Bearer test-token")) => (
            StatusCode::OK,
            Json(json!({
                "email": "bob@example.com",
                "email_verified": false,
                "user": { "id": "u-2", "email": "bob@example.com" },
            })),
        ),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "not authenticated" }))),
    }
}

#[tokio::test]
async fn api_key_replaces_bearer_token() {
    let tmp = TempDir::new().unwrap();
    let base = serve(Router::new().route("/auth/profile", get(whoami))).await;

    let keyed = store(config(&base, tmp.path()).with_api_key("k-123"));
    let profile = keyed.users().profile().await.unwrap();
    assert_eq!(profile.user.id, "u-1");
    // No login was needed.
    assert!(!tmp.path().join("auth/bearer_token.txt").exists());

    let bearer = store(config(&base, tmp.path()));
    let profile = bearer.users().profile().await.unwrap();
    assert_eq!(profile.user.id, "u-2");
}

#[tokio::test]
async fn rejected_credentials_surface_as_http_error() {
    let tmp = TempDir::new().unwrap();
    let base = serve(Router::new().route("/auth/profile", get(whoami))).await;

    let wrong = store(config(&base, tmp.path()).with_api_key("wrong"));
    let err = wrong.users().profile().await.unwrap_err();
    match &err {
        ClientError::Http { method, status, body, .. } => {
            assert_eq!(method, "GET");
            assert_eq!(*status, 401);
            assert!(body.contains("not authenticated"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Transport);
}

async fn class_update(
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    Json(json!({
        "id": "rc-1",
        "class_name": params.get("new_class_name").cloned().unwrap_or(name),
        "description": params.get("new_description"),
    }))
}

#[tokio::test]
async fn robot_class_update_sends_only_given_fields() {
    let tmp = TempDir::new().unwrap();
    let base = serve(Router::new().route("/robots/{name}", post(class_update))).await;
    let store = store(config(&base, tmp.path()));
    let classes = store.robot_classes();

    let renamed = classes.api().update("arm", Some("arm-v2"), None).await.unwrap();
    assert_eq!(renamed.class_name, "arm-v2");
    assert_eq!(renamed.description, None);

    let described = classes.api().update("arm", None, Some("six axis")).await.unwrap();
    assert_eq!(described.class_name, "arm");
    assert_eq!(described.description.as_deref(), Some("six axis"));

    let err = classes.api().update("arm", None, None).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));
}

async fn add_robot(Path(name): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "id": "r-1",
        "robot_name": name,
        "class_name": body["class_name"],
        "description": body.get("description"),
    }))
}

#[tokio::test]
async fn robots_can_be_added_and_listed() {
    let tmp = TempDir::new().unwrap();
    let app = Router::new()
        .route("/robot/{name}", put(add_robot))
        .route(
            "/robot/user/{user}",
            get(|Path(user): Path<String>| async move {
                Json(json!([{ "id": "r-1", "robot_name": "rover", "username": user }]))
            }),
        )
        .route("/robot/", get(|| async { Json(json!([])) }));
    let base = serve(app).await;
    let robots = store(config(&base, tmp.path())).robots();

    let added = robots.add("rover", "arm", None).await.unwrap();
    assert_eq!(added.robot_name.as_deref(), Some("rover"));
    assert_eq!(added.class_name.as_deref(), Some("arm"));
    assert_eq!(added.description, None);

    let mine = robots.list_for_user("me").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].username.as_deref(), Some("me"));
    assert!(robots.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn names_with_reserved_characters_stay_in_one_segment() {
    let tmp = TempDir::new().unwrap();
    let app = Router::new()
        .route(
            "/robot/name/{name}",
            get(|Path(name): Path<String>| async move {
                Json(json!({ "id": "r-9", "robot_name": name }))
            }),
        )
        .route(
            "/robot/name/{first}/{rest}",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "detail": "split name" }))) }),
        );
    let base = serve(app).await;
    let robots = store(config(&base, tmp.path())).robots();

    let robot = robots.by_name("arm/v2#1?x").await.unwrap();
    assert_eq!(robot.robot_name.as_deref(), Some("arm/v2#1?x"));
}

#[tokio::test]
async fn class_urdf_upload_accepts_only_tgz() {
    let tmp = TempDir::new().unwrap();
    let store = store(config("http://127.0.0.1:9", tmp.path()));
    let classes = store.robot_classes();

    let zip = tmp.path().join("robot.zip");
    std::fs::write(&zip, b"PK").unwrap();
    let err = classes.upload_urdf("arm", &zip).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let missing = tmp.path().join("robot.tgz");
    let err = classes.upload_urdf("arm", &missing).await.unwrap_err();
    assert!(matches!(err, ClientError::FileNotFound(_)));
}

async fn form_upload(Path(listing): Path<String>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains(r#"name="files"; filename="robot.tgz""#));
    assert!(body.contains("application/gzip"));
    Json(json!({
        "artifacts": [{
            "artifact_id": "art-3",
            "listing_id": listing,
            "urls": { "large": "http://blob.example/art-3/robot.tgz" },
        }]
    }))
}

#[tokio::test]
async fn artifact_form_upload_sends_files_field() {
    let tmp = TempDir::new().unwrap();
    let base = serve(Router::new().route("/artifacts/upload/{listing}", post(form_upload))).await;
    let store = store(config(&base, tmp.path()));

    let archive = tmp.path().join("robot.tgz");
    std::fs::write(&archive, common::tarball(&[("robot.urdf", b"<robot/>")])).unwrap();

    let uploaded = store.artifacts().upload_form("listing-1", &archive).await.unwrap();
    assert_eq!(uploaded.artifacts.len(), 1);
    assert_eq!(uploaded.artifacts[0].artifact_id, "art-3");
    assert_eq!(uploaded.artifacts[0].listing_id.as_deref(), Some("listing-1"));

    let missing = tmp.path().join("gone.tgz");
    let err = store.artifacts().upload_form("listing-1", &missing).await.unwrap_err();
    assert!(matches!(err, ClientError::FileNotFound(_)));
}
