//! Scripted in-memory portal for stage and batch tests.
//!
//! Replies are consumed from per-endpoint queues. Once a queue is empty the portal
//! behaves like a healthy one: every tile resolves to `tile_{id}`, jobs are named
//! `job-{id}`, report `done` with `https://portal.test/files/job-{id}` and the
//! download is a zip holding `tile_{id}.xyz`.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::portal::{
    JobStartResponse, JobState, JobStatusResponse, PortalApi, PortalError, Query,
    TileDetailResponse, TileId,
};

const FILES_URL: &str = "https://portal.test/files/";

#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Reply(T),
    Timeout,
    Http(u16),
}

impl<T> Scripted<T> {
    fn into_result(self) -> Result<T, PortalError> {
        match self {
            Scripted::Reply(value) => Ok(value),
            Scripted::Timeout => Err(PortalError::Timeout),
            Scripted::Http(status) => Err(PortalError::Status {
                status,
                reason: "scripted".to_string(),
            }),
        }
    }
}

pub fn pending() -> Scripted<JobStatusResponse> {
    Scripted::Reply(JobStatusResponse {
        status: JobState::Pending,
        success: None,
        download_url: None,
        message: None,
    })
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Bytes {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

pub fn tile_archive(tile: &str) -> Bytes {
    let name = format!("tile_{}.xyz", tile);
    let body = format!("571000.0 6036000.0 {}.5\n", tile);
    zip_bytes(&[(name.as_str(), body.as_bytes())])
}

#[derive(Default)]
pub struct ScriptedPortal {
    rejected_tiles: HashSet<String>,
    detail_delays: HashMap<String, Duration>,
    starts: Mutex<VecDeque<Scripted<JobStartResponse>>>,
    statuses: Mutex<VecDeque<Scripted<JobStatusResponse>>>,
    downloads: Mutex<VecDeque<Scripted<Bytes>>>,
    detail_calls: AtomicUsize,
    start_calls: AtomicUsize,
    status_calls: AtomicUsize,
    download_calls: AtomicUsize,
    user_agents: Mutex<Vec<String>>,
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_detail(mut self, tile_id: TileId) -> Self {
        self.rejected_tiles.insert(tile_id.to_string());
        self
    }

    pub fn delay_detail(mut self, tile_id: TileId, delay: Duration) -> Self {
        self.detail_delays.insert(tile_id.to_string(), delay);
        self
    }

    pub fn with_starts(self, replies: Vec<Scripted<JobStartResponse>>) -> Self {
        *self.starts.lock().unwrap() = replies.into();
        self
    }

    pub fn with_statuses(self, replies: Vec<Scripted<JobStatusResponse>>) -> Self {
        *self.statuses.lock().unwrap() = replies.into();
        self
    }

    pub fn with_downloads(self, replies: Vec<Scripted<Bytes>>) -> Self {
        *self.downloads.lock().unwrap() = replies.into();
        self
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.detail_calls() + self.start_calls() + self.status_calls() + self.download_calls()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }

    fn record_agent(&self, user_agent: &str) {
        self.user_agents.lock().unwrap().push(user_agent.to_string());
    }
}

fn query_value<'a>(query: &'a Query, key: &str) -> &'a str {
    query
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

#[async_trait]
impl PortalApi for ScriptedPortal {
    async fn tile_detail(
        &self,
        query: &Query,
        user_agent: &str,
    ) -> Result<TileDetailResponse, PortalError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.record_agent(user_agent);

        let id = query_value(query, "id").to_string();
        if let Some(delay) = self.detail_delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }

        if self.rejected_tiles.contains(&id) {
            return Ok(TileDetailResponse {
                success: Some(false),
                message: Some("Kachel nicht gefunden".to_string()),
                object: None,
            });
        }

        let object: Map<String, Value> = json!({
            "kachelname": format!("tile_{}", id),
            "flur": format!("tile_{}", id),
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        Ok(TileDetailResponse {
            success: Some(true),
            message: None,
            object: Some(object),
        })
    }

    async fn start_job(
        &self,
        query: &Query,
        user_agent: &str,
    ) -> Result<JobStartResponse, PortalError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.record_agent(user_agent);

        if let Some(scripted) = self.starts.lock().unwrap().pop_front() {
            return scripted.into_result();
        }

        Ok(JobStartResponse {
            success: Some(true),
            message: None,
            id: Some(Value::String(format!("job-{}", query_value(query, "id")))),
        })
    }

    async fn job_status(
        &self,
        job_id: &str,
        user_agent: &str,
    ) -> Result<JobStatusResponse, PortalError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.record_agent(user_agent);

        if let Some(scripted) = self.statuses.lock().unwrap().pop_front() {
            return scripted.into_result();
        }

        Ok(JobStatusResponse {
            status: JobState::Done,
            success: Some(true),
            download_url: Some(format!("{}{}", FILES_URL, job_id)),
            message: None,
        })
    }

    async fn download(&self, url: &str) -> Result<Bytes, PortalError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(scripted) = self.downloads.lock().unwrap().pop_front() {
            return scripted.into_result();
        }

        let tile = url
            .strip_prefix(FILES_URL)
            .and_then(|job| job.strip_prefix("job-"))
            .unwrap_or_default();
        Ok(tile_archive(tile))
    }
}
