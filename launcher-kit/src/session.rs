//! Per-app run history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::run_state::SessionRecord;

/// Receives one record per completed run. Never called for launch failures.
pub trait SessionRecorder: Send + Sync {
    fn record_session(&self, app_id: &str, record: &SessionRecord);
}

/// Aggregated run statistics of one app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppMeta {
    pub run_count: u64,
    pub total_run_time: Duration,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_stop_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<Duration>,
    pub last_exit_code: Option<i32>,
}

impl AppMeta {
    pub fn add_session(&mut self, record: &SessionRecord) {
        let run_time = record.run_time();
        self.run_count += 1;
        self.total_run_time += run_time;
        self.last_start_time = Some(record.start_time);
        self.last_stop_time = Some(record.stop_time);
        self.last_run_time = Some(run_time);
        self.last_exit_code = record.exit_code;
    }
}

/// In-memory [`SessionRecorder`].
#[derive(Debug, Default)]
pub struct MetaStore {
    apps: Mutex<HashMap<String, AppMeta>>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_id: &str) -> Option<AppMeta> {
        self.apps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(app_id)
            .cloned()
    }
}

impl SessionRecorder for MetaStore {
    fn record_session(&self, app_id: &str, record: &SessionRecord) {
        self.apps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(app_id.to_string())
            .or_default()
            .add_session(record);
    }
}
