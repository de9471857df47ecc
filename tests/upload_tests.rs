mod common;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header::ETAG},
    response::IntoResponse,
    routing::{post, put},
};
use common::{config, serve_with, sha256_hex, store};
use robostore::{ClientError, models::multipart::UploadSession};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone)]
struct ReceivedPart {
    number: u32,
    len: usize,
    content_md5: Option<String>,
}

#[derive(Clone, Default)]
struct BlobStore {
    base: String,
    parts: Arc<Mutex<Vec<ReceivedPart>>>,
    created: Arc<Mutex<Option<Value>>>,
    completed: Arc<Mutex<Option<Value>>>,
    fail_part: Option<u32>,
}

async fn create_upload(State(blob): State<BlobStore>, Json(req): Json<Value>) -> Json<Value> {
    let file_size = req["file_size"].as_u64().unwrap();
    let part_size = req["part_size"].as_u64().unwrap();
    *blob.created.lock().unwrap() = Some(req);

    let count = UploadSession::expected_parts(file_size, part_size) as u32;
    // Handed out newest first; the client must put them back in order.
    let urls: Vec<Value> = (1..=count)
        .rev()
        .map(|n| {
            json!({
                "part_number": n,
                "url": format!("{}/blob/{n}?X-Amz-Signature=secret", blob.base),
            })
        })
        .collect();
    Json(json!({
        "krec_id": "krec-1",
        "upload_details": {
            "upload_id": "up-1",
            "file_size": file_size,
            "part_size": part_size,
            "presigned_urls": urls,
        }
    }))
}

async fn put_part(
    State(blob): State<BlobStore>,
    Path(number): Path<u32>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if blob.fail_part == Some(number) {
        return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new());
    }
    blob.parts.lock().unwrap().push(ReceivedPart {
        number,
        len: body.len(),
        content_md5: headers
            .get("content-md5")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
    let mut response = HeaderMap::new();
    response.insert(ETAG, format!("\"etag-{number}\"").parse().unwrap());
    (StatusCode::OK, response)
}

async fn complete_upload(
    State(blob): State<BlobStore>,
    Path(krec_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(krec_id, "krec-1");
    *blob.completed.lock().unwrap() = Some(body);
    Json(json!({ "krec_id": krec_id, "status": "complete" }))
}

async fn blob_store(fail_part: Option<u32>) -> (String, BlobStore) {
    let mut recorder = BlobStore {
        fail_part,
        ..BlobStore::default()
    };
    let shared = recorder.clone();
    let base = serve_with(move |base| {
        let state = BlobStore { base, ..shared };
        Router::new()
            .route("/krecs/upload", post(create_upload))
            .route("/krecs/{id}/complete", post(complete_upload))
            .route("/blob/{n}", put(put_part))
            .layer(DefaultBodyLimit::disable())
            .with_state(state)
    })
    .await;
    recorder.base = base.clone();
    (base, recorder)
}

fn write_file(dir: &TempDir, name: &str, len: usize) -> (std::path::PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

#[tokio::test]
async fn large_file_is_sent_in_ordered_parts() {
    let tmp = TempDir::new().unwrap();
    let (base, blob) = blob_store(None).await;
    let store = store(config(&base, tmp.path()));
    let (path, data) = write_file(&tmp, "walk.krec", 12 * MIB);

    let receipt = store
        .krecs()
        .upload("robot-7", &path, Some("walking test"))
        .await
        .unwrap();

    let parts = blob.parts.lock().unwrap().clone();
    let numbers: Vec<u32> = parts.iter().map(|p| p.number).collect();
    let sizes: Vec<usize> = parts.iter().map(|p| p.len).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(sizes, vec![5 * MIB, 5 * MIB, 2 * MIB]);
    assert!(parts.iter().all(|p| p.content_md5.is_some()));

    let created = blob.created.lock().unwrap().clone().unwrap();
    assert_eq!(created["robot_id"], "robot-7");
    assert_eq!(created["name"], "walk.krec");
    assert_eq!(created["description"], "walking test");
    assert_eq!(created["file_size"], 12 * MIB);

    let completed = blob.completed.lock().unwrap().clone().unwrap();
    assert_eq!(completed["upload_id"], "up-1");
    let listed: Vec<(u64, String)> = completed["parts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["part_number"].as_u64().unwrap(), p["etag"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        listed,
        vec![
            (1, "etag-1".to_string()),
            (2, "etag-2".to_string()),
            (3, "etag-3".to_string())
        ]
    );

    assert_eq!(receipt.resource_id, "krec-1");
    assert_eq!(receipt.file_size, data.len() as u64);
    assert_eq!(receipt.checksum, sha256_hex(&data));
}

#[tokio::test]
async fn failed_part_aborts_before_completion() {
    let tmp = TempDir::new().unwrap();
    let (base, blob) = blob_store(Some(2)).await;
    let store = store(config(&base, tmp.path()));
    let (path, _) = write_file(&tmp, "walk.krec", 12 * MIB);

    let err = store.krecs().upload("robot-7", &path, None).await.unwrap_err();

    match &err {
        ClientError::UploadPart {
            upload_id,
            part_number,
            offset,
            source,
        } => {
            assert_eq!(upload_id, "up-1");
            assert_eq!(*part_number, 2);
            assert_eq!(*offset, 5 * MIB as u64);
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(blob.parts.lock().unwrap().len(), 1);
    assert!(blob.completed.lock().unwrap().is_none());
}

#[tokio::test]
async fn empty_and_missing_files_are_rejected_locally() {
    let tmp = TempDir::new().unwrap();
    let (base, blob) = blob_store(None).await;
    let store = store(config(&base, tmp.path()));

    let (empty, _) = write_file(&tmp, "empty.krec", 0);
    let err = store.krecs().upload("robot-7", &empty, None).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let missing = tmp.path().join("nope.krec");
    let err = store.krecs().upload("robot-7", &missing, None).await.unwrap_err();
    assert!(matches!(err, ClientError::FileNotFound(_)));

    assert!(blob.created.lock().unwrap().is_none());
}

#[tokio::test]
async fn kernel_upload_requires_img_extension() {
    let tmp = TempDir::new().unwrap();
    let store = store(config("http://127.0.0.1:9", tmp.path()));
    let (path, _) = write_file(&tmp, "kernel.bin", 16);

    let err = store.kernels().upload("listing-1", &path).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));
}

#[derive(Clone, Default)]
struct PresignedStore {
    base: String,
    query: Arc<Mutex<Option<std::collections::HashMap<String, String>>>>,
    uploaded: Arc<Mutex<Option<(String, Vec<u8>)>>>,
}

#[tokio::test]
async fn urdf_directory_is_packed_and_uploaded_in_one_put() {
    use axum::{extract::Query, routing::get};
    use std::collections::HashMap;

    let tmp = TempDir::new().unwrap();
    let robot_dir = tmp.path().join("arm");
    std::fs::create_dir_all(robot_dir.join("meshes")).unwrap();
    std::fs::write(robot_dir.join("robot.urdf"), b"<robot name=\"arm\"/>").unwrap();
    std::fs::write(robot_dir.join("meshes/link.STL"), b"solid link").unwrap();
    std::fs::write(robot_dir.join("notes.txt"), b"skip me").unwrap();

    let recorder = PresignedStore::default();
    let shared = recorder.clone();
    let base = serve_with(move |base| {
        let state = PresignedStore { base, ..shared };
        Router::new()
            .route(
                "/artifacts/presigned/{listing}",
                post(
                    |State(s): State<PresignedStore>,
                     Path(listing): Path<String>,
                     Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(listing, "listing-1");
                        *s.query.lock().unwrap() = Some(q);
                        Json(json!({
                            "artifact_id": "art-9",
                            "upload_url": format!("{}/put/robot.tgz?sig=abc", s.base),
                        }))
                    },
                ),
            )
            .route(
                "/put/robot.tgz",
                put(|State(s): State<PresignedStore>, headers: HeaderMap, body: Bytes| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *s.uploaded.lock().unwrap() = Some((content_type, body.to_vec()));
                    StatusCode::OK
                }),
            )
            .route(
                "/artifacts/info/{id}",
                get(|State(s): State<PresignedStore>, Path(id): Path<String>| async move {
                    Json(json!({
                        "artifact_id": id,
                        "listing_id": "listing-1",
                        "urls": { "large": format!("{}/files/{id}/robot.tgz", s.base) },
                    }))
                }),
            )
            .layer(DefaultBodyLimit::disable())
            .with_state(state)
    })
    .await;
    let store = store(config(&base, tmp.path()));

    let info = store.urdfs().upload("listing-1", &robot_dir).await.unwrap();
    assert_eq!(info.artifact_id, "art-9");

    let (content_type, body) = recorder.uploaded.lock().unwrap().clone().unwrap();
    assert_eq!(content_type, "application/gzip");
    let query = recorder.query.lock().unwrap().clone().unwrap();
    assert_eq!(query["filename"], "robot.tgz");
    assert_eq!(query["checksum"], sha256_hex(&body));

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(body.as_slice()));
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["meshes/link.STL".to_string(), "robot.urdf".to_string()]);
}
