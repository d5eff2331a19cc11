//! End-to-end tests against a local mock of the avatar service
//!
//! The mock runs on 127.0.0.1:0 and is driven through the real reqwest
//! transport, the polling machine and the retrieval pipeline.

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asdk_client::jobs::PollOptions;
use asdk_client::params::Inheritable;
use asdk_client::retrieval::download_with_progress;
use asdk_client::{AsdkError, AvatarSdkClient, Photo, PipelineSelection, Session};
use asdk_common::events::{AsdkEvent, EventBus, Stage};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const TOKEN: &str = "test-token";
const ENCODED_LEN: usize = 64 * 1024;

struct MockState {
    base: String,
    avatar_polls: AtomicUsize,
    export_polls: AtomicUsize,
    creates: AtomicUsize,
    submitted: Mutex<Option<String>>,
    preview_zip: Bytes,
    /// While set, the avatar stays `Computing` without advancing
    hold_avatar: AtomicBool,
    held_polls: AtomicUsize,
    /// Full export ends in `Failed` instead of `Completed`
    fail_full_export: AtomicBool,
    gzip_requested: AtomicBool,
}

type Shared = Arc<MockState>;

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(&format!("Bearer {}", TOKEN)[..]);
    bearer && headers.contains_key("x-user-agent")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Invalid token."})),
    )
        .into_response()
}

fn preview_zip() -> Bytes {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.add_directory("avatar/", options).unwrap();
    zip.start_file("avatar/model.glb", options).unwrap();
    zip.write_all(b"glTF-binary").unwrap();
    zip.start_file("texture.png", options).unwrap();
    zip.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
    Bytes::from(zip.finish().unwrap().into_inner())
}

async fn parameters(State(_): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "bust/mobile": {
            "haircuts": ["bob", "long"],
            "plus": ["remove_smile", "caricature_amount"],
            "avatar_modifications": ["hair_color"]
        }
    }))
    .into_response()
}

async fn export_parameters(State(_): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "haircuts": ["bob", "long", "short", "balding"],
        "blendshapes": ["basic"]
    }))
    .into_response()
}

async fn create_avatar(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state.creates.fetch_add(1, Ordering::SeqCst);
    *state.submitted.lock().unwrap() = Some(String::from_utf8_lossy(&body).to_string());

    (
        StatusCode::CREATED,
        Json(json!({
            "url": format!("{}/avatars/abc/", state.base),
            "code": "abc",
            "status": "Uploading",
            "progress": 0,
            "exports": format!("{}/avatars/abc/exports/", state.base)
        })),
    )
        .into_response()
}

async fn get_avatar(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let tick = if state.hold_avatar.load(Ordering::SeqCst) {
        state.held_polls.fetch_add(1, Ordering::SeqCst);
        1
    } else {
        state.avatar_polls.fetch_add(1, Ordering::SeqCst)
    };
    let (status, progress) = match tick {
        0 => ("Queued", 0),
        1 => ("Computing", 50),
        _ => ("Completed", 100),
    };
    Json(json!({
        "url": format!("{}/avatars/abc/", state.base),
        "code": "abc",
        "status": status,
        "progress": progress,
        "exports": format!("{}/avatars/abc/exports/", state.base)
    }))
    .into_response()
}

fn full_export(base: &str, status: &str) -> Value {
    json!({
        "url": format!("{}/exports/full/", base),
        "status": status,
        "progress": if status == "Completed" { 100 } else { 10 },
        "created_on": "2024-05-01T10:00:02Z",
        "files": if status == "Completed" {
            json!([
                {"identity": "avatar", "file": format!("{}/files/full.zip", base), "static_files": []},
                {"identity": "bob", "category": "haircuts", "file": format!("{}/files/bob.zip", base),
                 "static_files": [format!("{}/files/bob.png", base)]}
            ])
        } else {
            json!([])
        }
    })
}

async fn list_exports(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let base = &state.base;
    // full export listed first; selection must reorder by created_on
    Json(json!([
        full_export(base, "Computing"),
        {
            "url": format!("{}/exports/visual/", base),
            "status": "Completed",
            "progress": 100,
            "created_on": "2024-05-01T10:00:01Z",
            "files": [
                {"identity": "avatar", "file": format!("{}/files/preview.zip", base), "static_files": []}
            ]
        }
    ]))
    .into_response()
}

async fn get_full_export(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let tick = state.export_polls.fetch_add(1, Ordering::SeqCst);
    let status = match tick {
        0 => "Computing",
        _ if state.fail_full_export.load(Ordering::SeqCst) => "Failed",
        _ => "Completed",
    };
    Json(full_export(&state.base, status)).into_response()
}

async fn preview_file(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        [(header::CONTENT_TYPE, "application/zip")],
        state.preview_zip.clone(),
    )
        .into_response()
}

fn encoded_payload() -> Vec<u8> {
    (0..ENCODED_LEN).map(|i| (i % 251) as u8).collect()
}

/// Served gzip-compressed by the route layer; `x-file-size` is the decoded size
async fn encoded_file(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    state.gzip_requested.store(gzip, Ordering::SeqCst);

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::HeaderName::from_static("x-file-size"), ENCODED_LEN.to_string()),
        ],
        encoded_payload(),
    )
        .into_response()
}

async fn encoded_file_unsized(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        encoded_payload(),
    )
        .into_response()
}

async fn start_mock() -> Shared {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = Arc::new(MockState {
        base: format!("http://{}", addr),
        avatar_polls: AtomicUsize::new(0),
        export_polls: AtomicUsize::new(0),
        creates: AtomicUsize::new(0),
        submitted: Mutex::new(None),
        preview_zip: preview_zip(),
        hold_avatar: AtomicBool::new(false),
        held_polls: AtomicUsize::new(0),
        fail_full_export: AtomicBool::new(false),
        gzip_requested: AtomicBool::new(false),
    });

    let app = Router::new()
        .route("/parameters/available/:pipeline/", get(parameters))
        .route("/export_parameters/available/:pipeline/", get(export_parameters))
        .route("/avatars/", post(create_avatar))
        .route("/avatars/abc/", get(get_avatar))
        .route("/avatars/abc/exports/", get(list_exports))
        .route("/exports/full/", get(get_full_export))
        .route("/files/preview.zip", get(preview_file))
        .route(
            "/files/encoded.bin",
            get(encoded_file).layer(CompressionLayer::new()),
        )
        .route(
            "/files/encoded-unsized.bin",
            get(encoded_file_unsized).layer(CompressionLayer::new()),
        )
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    state
}

fn session(state: &MockState, token: &str) -> Session {
    let client = AvatarSdkClient::new(&format!("{}/", state.base), token).unwrap();
    Session::new(client, EventBus::new(256)).with_poll_options(PollOptions {
        interval: Duration::from_millis(5),
    })
}

fn selection() -> PipelineSelection {
    PipelineSelection::new("head_2.0", "bust/mobile")
}

fn photo() -> Photo {
    Photo {
        name: "face.jpg".to_string(),
        data: Bytes::from_static(b"\xff\xd8\xff\xe0 fake jpeg"),
    }
}

#[tokio::test]
async fn test_load_settings_builds_defaults() {
    let mock = start_mock().await;
    let session = session(&mock, TOKEN);

    let settings = session.load_settings(&selection()).await.unwrap();

    // haircuts is configured through the export settings only
    assert!(!settings.parameter_spec["bust/mobile"].contains_key("haircuts"));
    assert!(settings.parameters.get("plus..remove_smile").is_some());
    assert!(settings.parameters.get("haircuts..bob").is_none());

    let haircuts = settings.export.haircuts.as_ref().unwrap();
    assert_eq!(haircuts.format, Some(Inheritable::Inherit));
    assert_eq!(haircuts.list.as_ref().unwrap().len(), 4);
    assert!(settings.export.blendshapes.is_some());
}

#[tokio::test]
async fn test_bad_token_surfaces_detail_message() {
    let mock = start_mock().await;
    let session = session(&mock, "wrong");

    let err = session.load_settings(&selection()).await.unwrap_err();

    match &err {
        AsdkError::Api { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Invalid token.");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.user_message(), "Invalid token.");
}

#[tokio::test]
async fn test_missing_photo_fails_without_request() {
    let mock = start_mock().await;
    let session = session(&mock, TOKEN);
    let settings = session.load_settings(&selection()).await.unwrap();

    let err = session.compute_avatar(None, &settings).await.unwrap_err();
    assert_eq!(err.user_message(), "Please select a photo");

    let empty = Photo {
        name: "empty.jpg".to_string(),
        data: Bytes::new(),
    };
    assert!(session.compute_avatar(Some(empty), &settings).await.is_err());
    assert_eq!(mock.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_compute_avatar_end_to_end() {
    let mock = start_mock().await;
    let session = session(&mock, TOKEN);
    let mut events = session.events().subscribe();

    let mut settings = session.load_settings(&selection()).await.unwrap();
    settings.parameters.set_enabled("plus..remove_smile", true);
    settings
        .export
        .category_mut("haircuts")
        .unwrap()
        .list
        .as_mut()
        .unwrap()
        .set("bob", true);

    let outcome = session.compute_avatar(Some(photo()), &settings).await.unwrap();

    // avatar polled Queued, Computing, Completed
    assert_eq!(mock.avatar_polls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.avatar.code.as_deref(), Some("abc"));

    assert!(outcome.preview_export.url.ends_with("/exports/visual/"));
    let mut names: Vec<_> = outcome.preview_files.keys().cloned().collect();
    names.sort();
    assert_eq!(names, vec!["model.glb", "texture.png"]);
    assert_eq!(&outcome.preview_files["model.glb"][..], b"glTF-binary");

    let full = outcome.full_export.unwrap().expect("full export");
    assert_eq!(full.files.len(), 2);
    assert_eq!(mock.export_polls.load(Ordering::SeqCst), 2);

    let submitted = mock.submitted.lock().unwrap().clone().unwrap();
    assert!(submitted.contains("name=\"photo\"; filename=\"face.jpg\""));
    assert!(submitted.contains("bust/mobile"));
    assert!(submitted.contains(r#"{"plus":["remove_smile"]}"#));
    assert!(submitted.contains(r#""haircuts":{"list":["bob"]}"#));

    let mut stages = Vec::new();
    let mut download = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            AsdkEvent::StageChanged { stage, .. } => stages.push(stage),
            AsdkEvent::DownloadProgress { percent, .. } => download.push(percent),
            _ => {}
        }
    }
    assert_eq!(stages.first(), Some(&Stage::Uploading));
    assert_eq!(stages.last(), Some(&Stage::Done));
    assert!(download.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(download.last(), Some(&100));
}

#[tokio::test]
async fn test_fetch_and_link_export_file() {
    let mock = start_mock().await;
    let session = session(&mock, TOKEN);
    let url = format!("{}/files/preview.zip", mock.base);

    let data = session.client().fetch_export_file(&url).await.unwrap();
    assert_eq!(data, mock.preview_zip);

    let missing = format!("{}/files/none.zip", mock.base);
    let err = session.client().fetch_export_file(&missing).await.unwrap_err();
    assert!(matches!(err, AsdkError::Api { status: 404, .. }));
}

#[tokio::test]
async fn test_failed_full_export_keeps_preview() {
    let mock = start_mock().await;
    mock.fail_full_export.store(true, Ordering::SeqCst);
    let session = session(&mock, TOKEN);
    let mut events = session.events().subscribe();
    let settings = session.load_settings(&selection()).await.unwrap();

    let outcome = session.compute_avatar(Some(photo()), &settings).await.unwrap();

    assert_eq!(outcome.preview_files.len(), 2);
    assert_eq!(&outcome.preview_files["model.glb"][..], b"glTF-binary");

    let err = outcome.full_export.unwrap_err();
    assert!(err.is_job_failure());
    assert_eq!(mock.export_polls.load(Ordering::SeqCst), 2);

    let mut ready = 0;
    let mut last_stage = None;
    while let Ok(event) = events.try_recv() {
        match event {
            AsdkEvent::ExportReady { .. } => ready += 1,
            AsdkEvent::StageChanged { stage, .. } => last_stage = Some(stage),
            _ => {}
        }
    }
    assert_eq!(ready, 0);
    assert_eq!(last_stage, Some(Stage::Done));
}

#[tokio::test]
async fn test_new_computation_supersedes_running_one() {
    let mock = start_mock().await;
    mock.hold_avatar.store(true, Ordering::SeqCst);
    let session = session(&mock, TOKEN);
    let settings = session.load_settings(&selection()).await.unwrap();

    let (first, second) = tokio::join!(session.compute_avatar(Some(photo()), &settings), async {
        while mock.held_polls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        mock.hold_avatar.store(false, Ordering::SeqCst);
        session.compute_avatar(Some(photo()), &settings).await
    });

    assert!(matches!(first, Err(AsdkError::Cancelled)));
    let outcome = second.unwrap();
    assert_eq!(outcome.preview_files.len(), 2);
    assert_eq!(mock.creates.load(Ordering::SeqCst), 2);
    assert_eq!(mock.avatar_polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gzip_download_sized_by_file_size_header() {
    let mock = start_mock().await;
    let session = session(&mock, TOKEN);
    let url = format!("{}/files/encoded.bin", mock.base);

    let mut seen = Vec::new();
    let data = download_with_progress(session.client(), &url, |p| seen.push(p))
        .await
        .unwrap();

    assert!(mock.gzip_requested.load(Ordering::SeqCst));
    assert_eq!(data.len(), ENCODED_LEN);
    assert_eq!(&data[..], &encoded_payload()[..]);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&100));

    let unsized_url = format!("{}/files/encoded-unsized.bin", mock.base);
    let err = download_with_progress(session.client(), &unsized_url, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, AsdkError::MissingHeader(_)));
}
