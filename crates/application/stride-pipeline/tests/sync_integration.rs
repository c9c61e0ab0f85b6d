use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::Router;
use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use stride_infra::net::ApiClient;
use stride_persistence::{ActivityStore, RedbActivityStore};
use stride_pipeline::sync::{HttpActivityProvider, PassOptions, SyncEngine, SyncError};

#[derive(Clone)]
struct ServerState {
    activities: Arc<Vec<serde_json::Value>>,
    export_hits: Arc<AtomicUsize>,
    reject_auth: Arc<AtomicBool>,
    always_500: Arc<AtomicBool>,
}

fn listing_entry(id: u64, type_key: &str, start: &str, updated: &str) -> serde_json::Value {
    serde_json::json!({
        "activityId": id,
        "activityName": format!("Workout {id}"),
        "activityType": {"typeKey": type_key},
        "startTimeGMT": start,
        "lastUpdateTimeGMT": updated,
    })
}

fn query_param(uri: &Uri, name: &str) -> Option<usize> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .and_then(|(_, v)| v.parse().ok())
}

async fn list_handler(State(state): State<ServerState>, uri: Uri) -> (StatusCode, String) {
    if state.reject_auth.load(Ordering::Relaxed) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    if state.always_500.load(Ordering::Relaxed) {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    let start = query_param(&uri, "start").unwrap_or(0);
    let limit = query_param(&uri, "limit").unwrap_or(30);
    let page: Vec<_> = state
        .activities
        .iter()
        .skip(start)
        .take(limit)
        .cloned()
        .collect();
    (StatusCode::OK, serde_json::to_string(&page).unwrap())
}

async fn export_handler(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    uri: Uri,
) -> (StatusCode, Vec<u8>) {
    state.export_hits.fetch_add(1, Ordering::Relaxed);
    let format = uri
        .query()
        .and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == "format")
                .map(|(_, v)| v.to_string())
        })
        .unwrap_or_default();
    (StatusCode::OK, format!("{format} payload for {id}").into_bytes())
}

async fn start_server(state: ServerState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/activities", get(list_handler))
        .route("/activities/:id/export", get(export_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn engine_for(addr: SocketAddr, root: &Utf8PathBuf) -> SyncEngine {
    let api = ApiClient::new(
        reqwest::Client::new(),
        &format!("http://{addr}"),
        Some("test-token".into()),
        Duration::ZERO,
        2,
    )
    .unwrap();
    SyncEngine::with_components(
        Box::new(HttpActivityProvider::new(api)),
        Arc::new(RedbActivityStore::new()),
        root.clone(),
        root.join(".stride"),
        PassOptions::default(),
    )
}

#[tokio::test]
async fn full_sync_then_second_pass_is_noop() {
    let export_hits = Arc::new(AtomicUsize::new(0));
    let state = ServerState {
        activities: Arc::new(vec![
            listing_entry(2, "running", "2024-06-02 08:00:00", "2024-06-02 09:00:00"),
            listing_entry(1, "indoor_cycling", "2024-06-01 18:00:00", "2024-06-01 19:00:00"),
        ]),
        export_hits: export_hits.clone(),
        reject_auth: Arc::new(AtomicBool::new(false)),
        always_500: Arc::new(AtomicBool::new(false)),
    };
    let (addr, handle) = start_server(state).await;

    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    let engine = engine_for(addr, &root);
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let report = engine.run_pass(now, None).await.unwrap();

    // outdoor: 5 outputs, indoor: 3; exports exclude json
    assert_eq!(report.stats.new, 2);
    assert_eq!(report.stats.outputs_written, 8);
    assert_eq!(export_hits.load(Ordering::Relaxed), 6);

    let gpx = root
        .join("gpx")
        .join("2024-06-02-08-00-00_activity_2_running_Workout_2.gpx");
    assert_eq!(std::fs::read(&gpx).unwrap(), b"gpx payload for 2");
    let json = root
        .join("activity_json")
        .join("2024-06-01-18-00-00_activity_1_indoor_cycling_Workout_1.json");
    assert!(json.exists());
    assert!(!root.join("gpx").join(
        "2024-06-01-18-00-00_activity_1_indoor_cycling_Workout_1.gpx"
    ).exists());

    // A fresh engine (fresh process, same state dir) does nothing.
    let engine = engine_for(addr, &root);
    let report = engine.run_pass(now, None).await.unwrap();
    assert_eq!(report.stats.outputs_written, 0);
    assert_eq!(export_hits.load(Ordering::Relaxed), 6, "no re-fetch on second pass");

    handle.abort();
}

#[tokio::test]
async fn pacing_lower_bound_holds_end_to_end() {
    let state = ServerState {
        activities: Arc::new(vec![listing_entry(
            9,
            "running",
            "2024-06-02 08:00:00",
            "2024-06-02 09:00:00",
        )]),
        export_hits: Arc::new(AtomicUsize::new(0)),
        reject_auth: Arc::new(AtomicBool::new(false)),
        always_500: Arc::new(AtomicBool::new(false)),
    };
    let (addr, handle) = start_server(state).await;

    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    let delay = Duration::from_millis(40);
    let api = ApiClient::new(
        reqwest::Client::new(),
        &format!("http://{addr}"),
        None,
        delay,
        2,
    )
    .unwrap();
    let engine = SyncEngine::with_components(
        Box::new(HttpActivityProvider::new(api)),
        Arc::new(RedbActivityStore::new()),
        root.clone(),
        root.join(".stride"),
        PassOptions::default(),
    );

    let started = std::time::Instant::now();
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let report = engine.run_pass(now, None).await.unwrap();
    let elapsed = started.elapsed();

    // 1 listing call + 4 export calls = 4 inter-call gaps minimum
    assert_eq!(report.stats.outputs_written, 5);
    assert!(
        elapsed >= delay * 4,
        "5 paced calls finished in {elapsed:?}, expected at least {:?}",
        delay * 4
    );

    handle.abort();
}

#[tokio::test]
async fn auth_rejection_aborts_the_pass() {
    let state = ServerState {
        activities: Arc::new(vec![]),
        export_hits: Arc::new(AtomicUsize::new(0)),
        reject_auth: Arc::new(AtomicBool::new(true)),
        always_500: Arc::new(AtomicBool::new(false)),
    };
    let (addr, handle) = start_server(state).await;

    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let engine = engine_for(addr, &root);

    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let err = engine.run_pass(now, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)), "got {err:?}");

    let store = RedbActivityStore::new();
    let checkpoint = store.load_checkpoint(&root.join(".stride")).unwrap();
    assert_eq!(checkpoint.last_full_scan_time, None);

    handle.abort();
}

#[tokio::test]
async fn persistent_server_errors_abort_after_bounded_retries() {
    let state = ServerState {
        activities: Arc::new(vec![]),
        export_hits: Arc::new(AtomicUsize::new(0)),
        reject_auth: Arc::new(AtomicBool::new(false)),
        always_500: Arc::new(AtomicBool::new(true)),
    };
    let (addr, handle) = start_server(state).await;

    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let engine = engine_for(addr, &root);

    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let err = engine.run_pass(now, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Listing(_)), "got {err:?}");

    let store = RedbActivityStore::new();
    let checkpoint = store.load_checkpoint(&root.join(".stride")).unwrap();
    assert_eq!(checkpoint.last_incremental_cursor, None, "checkpoint untouched");

    handle.abort();
}
