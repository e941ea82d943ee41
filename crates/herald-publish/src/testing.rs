//! Recording in-memory [`GraphTransport`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{PublishError, Result};
use crate::transport::GraphTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Post { path: String, params: Value },
    Get { path: String, status: String },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_id: u64,
    /// container id -> media url it was created from
    sources: HashMap<String, String>,
    /// media url -> queued status codes, last one repeats
    scripts: HashMap<String, VecDeque<String>>,
    /// path substrings whose POSTs are rejected
    rejected: Vec<String>,
}

/// Hands out sequential ids, records every call, and answers readiness
/// checks from per-media-url scripts (default `FINISHED`).
#[derive(Default)]
pub struct FakeGraph {
    state: Mutex<State>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers created from `url` (or the container whose id is `url`, for
    /// containers without media) report `statuses` in order; the last repeats.
    pub fn script(&self, url: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.scripts.insert(
            url.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Reject POSTs whose path or `url` param contains `needle`.
    pub fn reject(&self, needle: &str) {
        self.state.lock().unwrap().rejected.push(needle.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post { path, params } => Some((path, params)),
                Call::Get { .. } => None,
            })
            .collect()
    }

    pub fn gets(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Get { .. }))
            .count()
    }
}

fn source_url(params: &Value) -> Option<String> {
    ["url", "file_url", "image_url", "video_url"]
        .iter()
        .find_map(|k| params.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl GraphTransport for FakeGraph {
    async fn post(&self, path: &str, _token: &str, params: &Value) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Post {
            path: path.to_string(),
            params: params.clone(),
        });
        let url = source_url(params);
        let rejected = state.rejected.iter().any(|needle| {
            path.contains(needle.as_str())
                || url.as_deref().is_some_and(|u| u.contains(needle.as_str()))
        });
        if rejected {
            return Err(PublishError::Platform {
                status: 400,
                message: format!("rejected {path}"),
            });
        }
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        if let Some(url) = url {
            state.sources.insert(id.clone(), url);
        }
        Ok(json!({ "id": id }))
    }

    async fn get(&self, path: &str, _token: &str, _fields: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        let url = state
            .sources
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string());
        let status = match state.scripts.get_mut(&url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => "FINISHED".to_string(),
        };
        state.calls.push(Call::Get {
            path: path.to_string(),
            status: status.clone(),
        });
        Ok(json!({ "id": path, "status_code": status }))
    }
}
