use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tilefetch::batch::{BatchError, BatchOptions, BatchRunner, TileOutcome};
use tilefetch::observability::Metrics;
use tilefetch::pipeline::{ErrorKind, PipelineSettings, TilePipeline};
use tilefetch::portal::{HttpPortal, HttpPortalConfig, TileId};
use tilefetch::products::Elevation;
use tilefetch::report::BatchReport;
use tilefetch::useragent::RandomUserAgent;

/// In-process stand-in for the portal's detail/job/download endpoints
#[derive(Default)]
struct StubPortal {
    /// Status requests per job answered with `pending` before `done`
    pending_polls: usize,
    /// Status request (1-based, per job) answered with `success: false`
    fail_at: Option<usize>,
    /// Downloads that stall longer than the client timeout
    slow_downloads: usize,
    /// Status requests get a 200 with no body
    empty_status: bool,
    /// Download links answer 404
    missing_downloads: bool,
    rejected: Mutex<HashSet<String>>,
    /// Tile ids whose detail lookup answers 500
    broken_details: Mutex<HashSet<String>>,
    polls_per_job: Mutex<HashMap<String, usize>>,
    detail_requests: AtomicUsize,
    start_requests: AtomicUsize,
    status_requests: AtomicUsize,
    download_requests: AtomicUsize,
    cache_busted: AtomicUsize,
    json_requests_without_agent: AtomicUsize,
}

impl StubPortal {
    fn total_requests(&self) -> usize {
        self.detail_requests.load(Ordering::SeqCst)
            + self.start_requests.load(Ordering::SeqCst)
            + self.status_requests.load(Ordering::SeqCst)
            + self.download_requests.load(Ordering::SeqCst)
    }

    fn check_headers(&self, headers: &HeaderMap) {
        let agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !agent.starts_with("Mozilla/5.0") || content_type != "application/json" {
            self.json_requests_without_agent.fetch_add(1, Ordering::SeqCst);
        }
    }
}

type Shared = Arc<StubPortal>;

fn zip_archive(tile: &str) -> Bytes {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file(
                format!("tile_{}.xyz", tile),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer
            .write_all(format!("571000.0 6036000.0 {}.25\n", tile).as_bytes())
            .unwrap();
        writer.finish().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

async fn details(
    State(stub): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    stub.detail_requests.fetch_add(1, Ordering::SeqCst);
    stub.check_headers(&headers);

    let id = query.get("id").cloned().unwrap_or_default();
    if stub.broken_details.lock().unwrap().contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if stub.rejected.lock().unwrap().contains(&id) {
        return Json(json!({ "success": false, "message": "Kachel nicht gefunden" })).into_response();
    }

    Json(json!({
        "success": true,
        "object": { "kachelname": format!("tile_{}", id) }
    }))
    .into_response()
}

async fn multi(
    State(stub): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    stub.check_headers(&headers);
    if query.contains_key("_") {
        stub.cache_busted.fetch_add(1, Ordering::SeqCst);
    }

    match query.get("action").map(String::as_str) {
        Some("start") => {
            stub.start_requests.fetch_add(1, Ordering::SeqCst);
            let id = query.get("id").cloned().unwrap_or_default();
            Json(json!({ "success": true, "id": format!("job-{}", id) })).into_response()
        }
        Some("status") => {
            stub.status_requests.fetch_add(1, Ordering::SeqCst);
            let job = query.get("job").cloned().unwrap_or_default();
            let poll = {
                let mut polls = stub.polls_per_job.lock().unwrap();
                let count = polls.entry(job.clone()).or_insert(0);
                *count += 1;
                *count
            };

            if stub.empty_status {
                return (StatusCode::OK, "").into_response();
            }

            let reply = if stub.fail_at == Some(poll) {
                json!({ "status": "running", "success": false, "message": "Export abgebrochen" })
            } else if poll > stub.pending_polls {
                json!({ "status": "done", "success": true, "downloadUrl": format!("files/{}", job) })
            } else {
                json!({ "status": "pending" })
            };
            Json(reply).into_response()
        }
        _ => Json(json!({ "success": false, "message": "unknown action" })).into_response(),
    }
}

async fn file(State(stub): State<Shared>, Path(job): Path<String>) -> Response {
    let n = stub.download_requests.fetch_add(1, Ordering::SeqCst);
    if stub.missing_downloads {
        return StatusCode::NOT_FOUND.into_response();
    }
    if n < stub.slow_downloads {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    zip_archive(job.trim_start_matches("job-")).into_response()
}

/// Start the stub on an ephemeral port and return the portal base URL
async fn start_stub(stub: Shared) -> String {
    let app = Router::new()
        .route("/dla/_ajax/details.php", get(details))
        .route("/dla/multi.php", get(multi))
        .route("/dla/files/{job}", get(file))
        .with_state(stub);

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/dla/", bound_addr)
}

struct Harness {
    stub: Shared,
    runner: BatchRunner,
    metrics: Arc<Metrics>,
    root: TempDir,
}

async fn harness(stub: StubPortal) -> Harness {
    let stub = Arc::new(stub);
    let base_url = start_stub(stub.clone()).await;
    let root = TempDir::new().unwrap();

    let portal = HttpPortal::new(HttpPortalConfig {
        base_url,
        request_timeout: Duration::from_secs(5),
        download_timeout: Duration::from_millis(300),
        ..Default::default()
    })
    .unwrap();

    let metrics = Arc::new(Metrics::new());
    let pipeline = TilePipeline::new(
        Arc::new(portal),
        Arc::new(Elevation),
        Arc::new(RandomUserAgent),
        PipelineSettings::immediate(root.path()),
        metrics.clone(),
    );

    Harness {
        stub,
        runner: BatchRunner::new(Arc::new(pipeline)),
        metrics,
        root,
    }
}

fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<TileId> {
    range.map(TileId::from).collect()
}

#[tokio::test]
async fn test_polls_until_done_over_http() {
    let h = harness(StubPortal {
        pending_polls: 3,
        ..Default::default()
    })
    .await;

    let options = BatchOptions::builder().extract(true).inspect(true).build();
    let results = h.runner.run(vec![TileId::from(7)], &options).await.unwrap();

    match &results[0].outcome {
        TileOutcome::Success {
            job_id,
            archive,
            extracted,
            payload,
        } => {
            assert_eq!(job_id, "job-7");
            assert_eq!(archive, &h.root.path().join("job-7.zip"));
            assert_eq!(extracted.as_deref(), Some(h.root.path().join("job-7").as_path()));
            assert_eq!(payload.as_deref(), Some("571000.0 6036000.0 7.25\n"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    // k pending replies, then done: k + 1 status requests
    assert_eq!(h.stub.status_requests.load(Ordering::SeqCst), 4);
    assert_eq!(h.metrics.snapshot().status_requests, 4);
    // every start and status request carries the cache-busting timestamp
    assert_eq!(h.stub.cache_busted.load(Ordering::SeqCst), 5);
    assert_eq!(h.stub.json_requests_without_agent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_success_false_ends_tile() {
    let h = harness(StubPortal {
        pending_polls: 10,
        fail_at: Some(2),
        ..Default::default()
    })
    .await;

    let results = h
        .runner
        .run(vec![TileId::from(1)], &BatchOptions::default())
        .await
        .unwrap();

    match &results[0].outcome {
        TileOutcome::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::JobFailed);
            assert!(message.contains("Export abgebrochen"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.stub.status_requests.load(Ordering::SeqCst), 2);
    assert_eq!(h.stub.download_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_isolates_failed_tile() {
    let stub = StubPortal::default();
    stub.rejected.lock().unwrap().insert("3".to_string());
    let h = harness(stub).await;

    let options = BatchOptions::builder().concurrency(2).build();
    let results = h.runner.run(ids(1..=5), &options).await.unwrap();

    assert_eq!(results.len(), 5);
    let order: Vec<_> = results.iter().map(|r| r.tile_id.clone()).collect();
    assert_eq!(order, ids(1..=5));

    for result in &results {
        if result.tile_id == TileId::from(3) {
            assert!(matches!(
                result.outcome,
                TileOutcome::Failed {
                    kind: ErrorKind::Resolution,
                    ..
                }
            ));
        } else {
            assert!(result.outcome.is_success(), "tile {} failed", result.tile_id);
        }
    }

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.tiles_succeeded, 4);
    assert_eq!(snapshot.tiles_failed, 1);
}

#[tokio::test]
async fn test_download_timeout_is_retried() {
    let h = harness(StubPortal {
        slow_downloads: 1,
        ..Default::default()
    })
    .await;

    let results = h
        .runner
        .run(vec![TileId::from(9)], &BatchOptions::default())
        .await
        .unwrap();

    assert!(results[0].outcome.is_success());
    assert_eq!(h.stub.download_requests.load(Ordering::SeqCst), 2);
    assert_eq!(h.metrics.snapshot().fetch_retries, 1);

    let archive = std::fs::read(h.root.path().join("job-9.zip")).unwrap();
    assert_eq!(archive, zip_archive("9").to_vec());
}

#[tokio::test]
async fn test_start_after_end_sends_nothing() {
    let h = harness(StubPortal::default()).await;

    let err = h
        .runner
        .run_range(12, 3, true, &BatchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, BatchError::InvalidRange { start: 12, end: 3 });
    assert_eq!(h.stub.total_requests(), 0);
}

#[tokio::test]
async fn test_report_retry_runs_failed_subset() {
    let stub = StubPortal::default();
    stub.rejected.lock().unwrap().insert("2".to_string());
    let h = harness(stub).await;

    let started_at = chrono::Utc::now();
    let results = h
        .runner
        .run_range(1, 4, false, &BatchOptions::default())
        .await
        .unwrap();
    let report = BatchReport::new("dgm1", started_at, results);
    let path = report.save(h.root.path()).await.unwrap();

    let loaded = BatchReport::load(&path).await.unwrap();
    assert_eq!(loaded.failed_tile_ids(), vec![TileId::from(2)]);

    h.stub.rejected.lock().unwrap().clear();
    let before = h.stub.detail_requests.load(Ordering::SeqCst);
    let retried = h
        .runner
        .run(loaded.failed_tile_ids(), &BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(retried.len(), 1);
    assert!(retried[0].outcome.is_success());
    assert_eq!(h.stub.detail_requests.load(Ordering::SeqCst), before + 1);
}

fn failure(results: &[tilefetch::batch::BatchResult]) -> (ErrorKind, String) {
    match &results[0].outcome {
        TileOutcome::Failed { kind, message } => (*kind, message.clone()),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_detail_server_error_fails_resolution() {
    let stub = StubPortal::default();
    stub.broken_details.lock().unwrap().insert("4".to_string());
    let h = harness(stub).await;

    let results = h
        .runner
        .run(vec![TileId::from(4)], &BatchOptions::default())
        .await
        .unwrap();

    let (kind, message) = failure(&results);
    assert_eq!(kind, ErrorKind::Resolution);
    assert!(message.contains("HTTP 500"), "{}", message);
    assert_eq!(h.stub.start_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_status_body_fails_poll() {
    let h = harness(StubPortal {
        empty_status: true,
        ..Default::default()
    })
    .await;

    let results = h
        .runner
        .run(vec![TileId::from(5)], &BatchOptions::default())
        .await
        .unwrap();

    let (kind, message) = failure(&results);
    assert_eq!(kind, ErrorKind::Poll);
    assert!(message.contains("empty body"), "{}", message);
    assert_eq!(h.stub.status_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.stub.download_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_download_fails_fetch_without_retry() {
    let h = harness(StubPortal {
        missing_downloads: true,
        ..Default::default()
    })
    .await;

    let results = h
        .runner
        .run(vec![TileId::from(6)], &BatchOptions::default())
        .await
        .unwrap();

    let (kind, message) = failure(&results);
    assert_eq!(kind, ErrorKind::Fetch);
    assert!(message.contains("HTTP 404"), "{}", message);
    assert_eq!(h.stub.download_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.snapshot().fetch_retries, 0);
    assert!(!h.root.path().join("job-6.zip").exists());
}
