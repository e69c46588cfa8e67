mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

pub use sqlite::SqliteProcessStore;
#[cfg(test)]
pub(crate) use sqlite::{create_test_schema, insert_test_process};

/// The one status value that marks a process as still in flight.
pub const STATUS_EXECUTING: &str = "executing";

/// A snapshot of one row of the `process` table.
///
/// Nullable columns are read as their zero value. Serialization produces the
/// placeholder namespace used by request body templates, so columns that may
/// leak secrets or mean nothing for a settled process are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessRecord {
    pub id: i64,
    pub sub_type: String,
    pub updated_by_id: i64,
    pub output_format: String,
    pub date_created: String,
    pub server_name: String,
    pub created_by_id: i64,
    pub process_type_id: i64,
    pub updated_by: String,
    pub updated_by_display_name: String,
    pub error: String,
    pub app_name: String,
    pub success: bool,
    pub created_by_display_name: String,
    pub display_name: String,
    pub input: String,
    pub app_id: i64,
    pub message: String,
    pub ref_type: String,
    pub job_template_id: i64,
    pub container_name: String,
    pub output: String,
    #[serde(skip)]
    pub api_key: String,
    pub account_id: i64,
    #[serde(skip)]
    pub status_eta: i64,
    #[serde(skip)]
    pub timer_sub_category: String,
    pub process_type_name: String,
    pub task_set_name: String,
    pub container_id: i64,
    pub job_template_name: String,
    pub task_set_id: i64,
    pub last_updated: String,
    pub server_group_name: String,
    pub sub_id: i64,
    #[serde(skip)]
    pub deleted: bool,
    pub task_id: i64,
    pub unique_id: String,
    #[serde(skip)]
    pub percent: f64,
    #[serde(skip)]
    pub timer_category: String,
    pub reason: String,
    pub end_date: String,
    pub duration: i64,
    pub instance_name: String,
    pub start_date: String,
    pub zone_id: i64,
    pub input_format: String,
    pub server_id: i64,
    pub exit_code: String,
    pub integration_id: i64,
    pub ref_id: i64,
    pub instance_id: i64,
    #[serde(rename = "ServergroupId")]
    pub server_group_id: i64,
    pub task_name: String,
    pub created_by: String,
    pub status: String,
    pub process_result: String,
    pub description: String,
    pub event_title: String,
}

impl ProcessRecord {
    pub fn is_executing(&self) -> bool {
        self.status == STATUS_EXECUTING
    }
}

/// Process type code to display name, loaded once from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTypeLookup {
    names: HashMap<String, String>,
}

impl ProcessTypeLookup {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            names: pairs.into_iter().collect(),
        }
    }

    pub fn name_for(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Read access to the process store. Rows come back in ascending id order.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn processes_above(&self, id: i64) -> Result<Vec<ProcessRecord>>;

    async fn processes_by_ids(&self, ids: &[i64]) -> Result<Vec<ProcessRecord>>;

    /// Highest id in the table, or 0 when it is empty.
    async fn max_process_id(&self) -> Result<i64>;

    async fn process_types(&self) -> Result<ProcessTypeLookup>;
}
