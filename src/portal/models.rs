//! Typed request/response shapes of the download portal.
//!
//! The portal answers every JSON request with a loose envelope: a `success` flag,
//! an optional human-readable `message` and a request-specific payload. Instead of
//! probing keys, each shape is deserialized into its own struct and then collapsed
//! into a [`PortalReply`] so callers match on an explicit variant.
//!
//! ```json
//! { "success": true, "object": { "kachelname": "dgm1_32_571_6036_1_sh" } }
//! { "success": true, "id": "a81f0c" }
//! { "status": "done", "success": true, "downloadUrl": "https://.../a81f0c" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Query parameters of a portal request, in the order they are sent.
pub type Query = Vec<(&'static str, String)>;

/// Identifier of a tile within a product (numeric ids are kept as their decimal form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for TileId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a portal request whose HTTP exchange itself succeeded
#[derive(Debug, Clone, PartialEq)]
pub enum PortalReply<T> {
    Accepted(T),
    Rejected { message: String },
}

fn into_reply<T>(
    success: Option<bool>,
    message: Option<String>,
    payload: Option<T>,
    missing: &str,
) -> PortalReply<T> {
    if success == Some(false) {
        return PortalReply::Rejected {
            message: message.unwrap_or_else(|| "portal reported failure".to_string()),
        };
    }

    match payload {
        Some(payload) => PortalReply::Accepted(payload),
        None => PortalReply::Rejected {
            message: message.unwrap_or_else(|| missing.to_string()),
        },
    }
}

/// Reply of the tile-detail lookup (`_ajax/details.php`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TileDetailResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub object: Option<Map<String, Value>>,
}

impl TileDetailResponse {
    pub fn into_reply(self) -> PortalReply<Map<String, Value>> {
        into_reply(self.success, self.message, self.object, "response carries no tile object")
    }
}

/// Reply of the job-start request (`multi.php?action=start`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobStartResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    /// Job identifier; the portal has been seen sending both strings and numbers
    #[serde(default)]
    pub id: Option<Value>,
}

impl JobStartResponse {
    pub fn into_reply(self) -> PortalReply<String> {
        let id = self.id.and_then(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        into_reply(self.success, self.message, id, "response carries no job id")
    }
}

/// Server-side state of a packaging job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    /// Any state string this client does not know; treated as "not done yet"
    #[default]
    #[serde(other)]
    Unknown,
}

/// Reply of the job-status request (`multi.php?action=status`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(default)]
    pub status: JobState,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Latest known snapshot of a portal job.
///
/// The client never changes a job on its own; [`Job::apply`] only stores what the
/// portal reported last.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub tile_id: TileId,
    pub state: JobState,
    pub success: Option<bool>,
    pub download_url: Option<String>,
    pub message: Option<String>,
}

impl Job {
    pub fn submitted(job_id: impl Into<String>, tile_id: TileId) -> Self {
        Self {
            job_id: job_id.into(),
            tile_id,
            state: JobState::Pending,
            success: None,
            download_url: None,
            message: None,
        }
    }

    pub fn apply(&mut self, status: JobStatusResponse) {
        self.state = status.status;
        self.success = status.success;
        self.download_url = status.download_url;
        self.message = status.message;
    }

    /// The portal explicitly gave up on this job
    pub fn is_failed(&self) -> bool {
        self.success == Some(false) || self.state == JobState::Failed
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done && !self.is_failed()
    }

    /// Download URL, only when the job is done and not flagged as failed
    pub fn ready_url(&self) -> Option<&str> {
        if self.is_done() {
            self.download_url.as_deref().filter(|url| !url.is_empty())
        } else {
            None
        }
    }
}

/// Product-specific attributes of a tile, fetched fresh for every run
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetadata {
    pub tile_id: TileId,
    /// Portal-internal tile name (`kachelname`, `kachel_n`, or the parcel `flur`)
    pub tile_name: String,
    pub grid_cell: Option<String>,
    pub file_path: Option<String>,
    pub year: Option<String>,
    /// The full detail object as returned by the portal
    pub attributes: Map<String, Value>,
}

impl TileMetadata {
    pub fn new(tile_id: TileId, tile_name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            tile_id,
            tile_name: tile_name.into(),
            grid_cell: None,
            file_path: None,
            year: None,
            attributes,
        }
    }
}

/// Read a detail field as text; numbers are rendered in their JSON form
pub fn field_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_reply_accepted() {
        let response: TileDetailResponse = serde_json::from_value(json!({
            "success": true,
            "object": { "kachelname": "dgm1_32_571_6036_1_sh" }
        }))
        .unwrap();

        match response.into_reply() {
            PortalReply::Accepted(object) => {
                assert_eq!(field_string(&object, "kachelname").unwrap(), "dgm1_32_571_6036_1_sh");
            }
            other => panic!("expected accepted reply, got {:?}", other),
        }
    }

    #[test]
    fn test_detail_reply_rejected_carries_message() {
        let response: TileDetailResponse = serde_json::from_value(json!({
            "success": false,
            "message": "Kachel nicht gefunden"
        }))
        .unwrap();

        assert_eq!(
            response.into_reply(),
            PortalReply::Rejected { message: "Kachel nicht gefunden".to_string() }
        );
    }

    #[test]
    fn test_detail_reply_without_object_is_rejected() {
        let response: TileDetailResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(response.into_reply(), PortalReply::Rejected { .. }));
    }

    #[test]
    fn test_start_reply_numeric_id() {
        let response: JobStartResponse =
            serde_json::from_value(json!({ "success": true, "id": 4711 })).unwrap();
        assert_eq!(response.into_reply(), PortalReply::Accepted("4711".to_string()));
    }

    #[test]
    fn test_start_reply_provisioning() {
        let response: JobStartResponse =
            serde_json::from_value(json!({ "success": false, "id": "abc" })).unwrap();
        assert!(matches!(response.into_reply(), PortalReply::Rejected { .. }));
    }

    #[test]
    fn test_status_unknown_state() {
        let response: JobStatusResponse =
            serde_json::from_value(json!({ "status": "queued" })).unwrap();
        assert_eq!(response.status, JobState::Unknown);
    }

    #[test]
    fn test_job_ready_url_requires_done_and_success() {
        let mut job = Job::submitted("j1", TileId::from(7));
        assert!(job.ready_url().is_none());

        job.apply(JobStatusResponse {
            status: JobState::Done,
            success: Some(false),
            download_url: Some("https://example.com/j1".to_string()),
            message: None,
        });
        assert!(job.is_failed());
        assert!(job.ready_url().is_none());

        job.apply(JobStatusResponse {
            status: JobState::Done,
            success: None,
            download_url: Some("https://example.com/j1".to_string()),
            message: None,
        });
        assert_eq!(job.ready_url(), Some("https://example.com/j1"));
    }
}
