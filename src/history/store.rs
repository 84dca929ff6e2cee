//! Append-only log of "send" events in a flat JSON file, newest first.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::observability::metrics::get_metrics;

pub const DEFAULT_APP_ID: &str = "app1";
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub app_id: String,
    pub user_id: Option<String>,
    pub template_id: String,
    pub template_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub upstream_request_id: Option<String>,
    pub upstream_status: String,
    pub request_payload: Option<Value>,
    pub upstream_response: Option<Value>,
}

/// Input of [`HistoryStore::append`]; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHistoryEntry {
    pub app_id: Option<String>,
    pub user_id: Option<String>,
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    #[serde(alias = "zoho_request_id")]
    pub upstream_request_id: Option<String>,
    #[serde(alias = "zoho_status")]
    pub upstream_status: Option<String>,
    pub request_payload: Option<Value>,
    #[serde(alias = "zoho_response")]
    pub upstream_response: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub template_id: Option<String>,
    pub app_id: Option<String>,
    pub limit: Option<usize>,
}

impl NewHistoryEntry {
    /// Derive request id and status from an upstream create-document reply.
    pub fn from_reply(
        template_id: &str,
        template_name: Option<String>,
        http_status: u16,
        request_payload: Value,
        reply_json: Option<&Value>,
        reply_text: &str,
    ) -> Self {
        let mut entry = Self {
            app_id: None,
            user_id: None,
            template_id: Some(template_id.to_owned()),
            template_name,
            upstream_request_id: None,
            upstream_status: None,
            request_payload: Some(request_payload),
            upstream_response: Some(
                reply_json
                    .cloned()
                    .unwrap_or_else(|| Value::String(reply_text.to_owned())),
            ),
        };
        entry.fill_from_response();
        entry.upstream_status.get_or_insert_with(|| http_status.to_string());
        entry
    }

    /// Fill a missing request id or status from the recorded upstream response.
    pub fn fill_from_response(&mut self) {
        let Some(response) = self.upstream_response.as_ref() else {
            return;
        };
        if self.upstream_request_id.is_none() {
            self.upstream_request_id =
                scalar_at(response, "/request_id").or_else(|| scalar_at(response, "/requests/request_id"));
        }
        if self.upstream_status.is_none() {
            self.upstream_status = scalar_at(response, "/status")
                .or_else(|| scalar_at(response, "/requests/request_status"))
                .or_else(|| scalar_at(response, "/requests/status"));
        }
    }
}

fn scalar_at(json: &Value, pointer: &str) -> Option<String> {
    match json.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Empty text is no history. Anything but a JSON array is an error.
fn parse_entries(raw: &str) -> Result<Vec<Value>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(_) => Err(anyhow!("is not a JSON array")),
        Err(err) => Err(anyhow!("is not valid JSON: {}", err)),
    }
}

fn field_is(entry: &Value, field: &str, expected: Option<&String>) -> bool {
    expected.map_or(true, |e| entry.get(field).and_then(Value::as_str) == Some(e.as_str()))
}

pub struct HistoryStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, mut new_entry: NewHistoryEntry) -> Result<HistoryEntry> {
        new_entry.fill_from_response();
        let template_id = new_entry
            .template_id
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("template_id required"))?;

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            app_id: new_entry.app_id.unwrap_or_else(|| DEFAULT_APP_ID.to_owned()),
            user_id: new_entry.user_id,
            template_id,
            template_name: new_entry.template_name,
            timestamp: Utc::now(),
            upstream_request_id: new_entry.upstream_request_id,
            upstream_status: new_entry.upstream_status.unwrap_or_else(|| "unknown".to_owned()),
            request_payload: new_entry.request_payload,
            upstream_response: new_entry.upstream_response,
        };

        let record = serde_json::to_value(&entry)?;
        let metrics = get_metrics().await;
        let _guard = self.lock.lock().await;
        let raw = self
            .read_text()
            .await
            .inspect_err(|_| metrics.history_failures.inc())?;
        let mut entries = match parse_entries(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                metrics.history_failures.inc();
                let backup = self.set_aside().await?;
                warn!(
                    "history file {} {}, moved it to {} and starting a new history",
                    self.path.display(),
                    err,
                    backup.display()
                );
                Vec::new()
            }
        };
        entries.insert(0, record);
        self.write_all(&entries)
            .await
            .inspect_err(|_| metrics.history_failures.inc())?;
        metrics.history_writes.inc();
        info!("history entry {} stored for template {}", entry.id, entry.template_id);
        Ok(entry)
    }

    /// Entries are returned as stored, so records written by older versions keep
    /// every field they carry.
    pub async fn list(&self, query: &HistoryQuery) -> Vec<Value> {
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        let _guard = self.lock.lock().await;
        let entries = match self.read_text().await.and_then(|raw| parse_entries(&raw)) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("history file {} unusable ({:#}), listing no history", self.path.display(), err);
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter(|e| field_is(e, "app_id", query.app_id.as_ref()))
            .filter(|e| field_is(e, "template_id", query.template_id.as_ref()))
            .take(limit)
            .collect()
    }

    /// A missing file reads as empty text.
    async fn read_text(&self) -> Result<String> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err).with_context(|| format!("reading history file {}", self.path.display())),
        }
    }

    /// Renames an unreadable history file out of the way instead of overwriting it.
    async fn set_aside(&self) -> Result<PathBuf> {
        let mut backup = self.path.clone().into_os_string();
        backup.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let backup = PathBuf::from(backup);
        fs::rename(&self.path, &backup)
            .await
            .with_context(|| format!("moving unreadable history file to {}", backup.display()))?;
        debug!("history file {} moved to {}", self.path.display(), backup.display());
        Ok(backup)
    }

    /// temp file + rename, so readers never see a partial array
    async fn write_all(&self, entries: &[Value]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating history dir {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(entries)?;
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
