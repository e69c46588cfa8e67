use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ProcessRecord, ProcessStore, ProcessTypeLookup};

const PROCESS_COLUMNS: &str = "id, sub_type, updated_by_id, output_format, date_created, server_name, \
    created_by_id, process_type_id, updated_by, updated_by_display_name, error, app_name, success, \
    created_by_display_name, display_name, input, app_id, message, ref_type, job_template_id, \
    container_name, output, api_key, account_id, status_eta, timer_sub_category, process_type_name, \
    task_set_name, container_id, job_template_name, task_set_id, last_updated, server_group_name, \
    sub_id, deleted, task_id, unique_id, percent, timer_category, reason, end_date, duration, \
    instance_name, start_date, zone_id, input_format, server_id, exit_code, integration_id, ref_id, \
    instance_id, server_group_id, task_name, created_by, status, process_result, description, \
    event_title";

// Stays well under SQLite's bound-parameter limit.
const IDS_PER_QUERY: usize = 500;

pub struct SqliteProcessStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteProcessStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open process database {}", path.display()))?;
        Ok(Self::from_connection(db))
    }

    pub fn from_connection(db: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Cheap round trip used at startup to fail fast on an unusable store.
    pub async fn ping(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.query_row("SELECT COUNT(*) FROM process", [], |row| row.get::<_, i64>(0))
            .context("process table is not readable")?;
        Ok(())
    }
}

fn text(row: &Row<'_>, column: &str) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(column)?.unwrap_or_default())
}

fn int(row: &Row<'_>, column: &str) -> rusqlite::Result<i64> {
    Ok(row.get::<_, Option<i64>>(column)?.unwrap_or_default())
}

fn flag(row: &Row<'_>, column: &str) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<bool>>(column)?.unwrap_or_default())
}

fn read_process(row: &Row<'_>) -> rusqlite::Result<ProcessRecord> {
    Ok(ProcessRecord {
        id: row.get("id")?,
        sub_type: text(row, "sub_type")?,
        updated_by_id: int(row, "updated_by_id")?,
        output_format: text(row, "output_format")?,
        date_created: text(row, "date_created")?,
        server_name: text(row, "server_name")?,
        created_by_id: int(row, "created_by_id")?,
        process_type_id: int(row, "process_type_id")?,
        updated_by: text(row, "updated_by")?,
        updated_by_display_name: text(row, "updated_by_display_name")?,
        error: text(row, "error")?,
        app_name: text(row, "app_name")?,
        success: flag(row, "success")?,
        created_by_display_name: text(row, "created_by_display_name")?,
        display_name: text(row, "display_name")?,
        input: text(row, "input")?,
        app_id: int(row, "app_id")?,
        message: text(row, "message")?,
        ref_type: text(row, "ref_type")?,
        job_template_id: int(row, "job_template_id")?,
        container_name: text(row, "container_name")?,
        output: text(row, "output")?,
        api_key: text(row, "api_key")?,
        account_id: int(row, "account_id")?,
        status_eta: int(row, "status_eta")?,
        timer_sub_category: text(row, "timer_sub_category")?,
        process_type_name: text(row, "process_type_name")?,
        task_set_name: text(row, "task_set_name")?,
        container_id: int(row, "container_id")?,
        job_template_name: text(row, "job_template_name")?,
        task_set_id: int(row, "task_set_id")?,
        last_updated: text(row, "last_updated")?,
        server_group_name: text(row, "server_group_name")?,
        sub_id: int(row, "sub_id")?,
        deleted: flag(row, "deleted")?,
        task_id: int(row, "task_id")?,
        unique_id: text(row, "unique_id")?,
        percent: row.get::<_, Option<f64>>("percent")?.unwrap_or_default(),
        timer_category: text(row, "timer_category")?,
        reason: text(row, "reason")?,
        end_date: text(row, "end_date")?,
        duration: int(row, "duration")?,
        instance_name: text(row, "instance_name")?,
        start_date: text(row, "start_date")?,
        zone_id: int(row, "zone_id")?,
        input_format: text(row, "input_format")?,
        server_id: int(row, "server_id")?,
        exit_code: text(row, "exit_code")?,
        integration_id: int(row, "integration_id")?,
        ref_id: int(row, "ref_id")?,
        instance_id: int(row, "instance_id")?,
        server_group_id: int(row, "server_group_id")?,
        task_name: text(row, "task_name")?,
        created_by: text(row, "created_by")?,
        status: text(row, "status")?,
        process_result: text(row, "process_result")?,
        description: text(row, "description")?,
        event_title: text(row, "event_title")?,
    })
}

#[async_trait]
impl ProcessStore for SqliteProcessStore {
    async fn processes_above(&self, id: i64) -> Result<Vec<ProcessRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM process WHERE id > ?1 ORDER BY id ASC",
            PROCESS_COLUMNS
        ))?;

        let rows = stmt.query_map(params![id], read_process)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    async fn processes_by_ids(&self, ids: &[i64]) -> Result<Vec<ProcessRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.lock().await;
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = db.prepare(&format!(
                "SELECT {} FROM process WHERE id IN ({}) ORDER BY id ASC",
                PROCESS_COLUMNS, placeholders
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), read_process)?;
            for row in rows {
                results.push(row?);
            }
        }
        results.sort_by_key(|p| p.id);
        debug!("Looked up {} of {} tracked processes", results.len(), ids.len());
        Ok(results)
    }

    async fn max_process_id(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let max = db.query_row("SELECT COALESCE(MAX(id), 0) FROM process", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(max)
    }

    async fn process_types(&self) -> Result<ProcessTypeLookup> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT code, name FROM process_type")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(ProcessTypeLookup::from_pairs(pairs))
    }
}

/// Creates the `process` and `process_type` tables in a scratch database.
#[cfg(test)]
pub(crate) fn create_test_schema(db: &Connection) {
    db.execute_batch(
        "CREATE TABLE process (
            id INTEGER PRIMARY KEY,
            sub_type TEXT, updated_by_id INTEGER, output_format TEXT, date_created TEXT,
            server_name TEXT, created_by_id INTEGER, process_type_id INTEGER, updated_by TEXT,
            updated_by_display_name TEXT, error TEXT, app_name TEXT, success INTEGER,
            created_by_display_name TEXT, display_name TEXT, input TEXT, app_id INTEGER,
            message TEXT, ref_type TEXT, job_template_id INTEGER, container_name TEXT,
            output TEXT, api_key TEXT, account_id INTEGER, status_eta INTEGER,
            timer_sub_category TEXT, process_type_name TEXT, task_set_name TEXT,
            container_id INTEGER, job_template_name TEXT, task_set_id INTEGER,
            last_updated TEXT, server_group_name TEXT, sub_id INTEGER, deleted INTEGER,
            task_id INTEGER, unique_id TEXT, percent REAL, timer_category TEXT, reason TEXT,
            end_date TEXT, duration INTEGER, instance_name TEXT, start_date TEXT,
            zone_id INTEGER, input_format TEXT, server_id INTEGER, exit_code TEXT,
            integration_id INTEGER, ref_id INTEGER, instance_id INTEGER,
            server_group_id INTEGER, task_name TEXT, created_by TEXT, status TEXT NOT NULL,
            process_result TEXT, description TEXT, event_title TEXT
        );
        CREATE TABLE process_type (
            id INTEGER PRIMARY KEY,
            code TEXT,
            name TEXT,
            image_code TEXT
        );",
    )
    .expect("create test schema");
}

#[cfg(test)]
pub(crate) fn insert_test_process(
    db: &Connection,
    id: i64,
    status: &str,
    task_name: Option<&str>,
    account_id: Option<i64>,
) {
    db.execute(
        "INSERT INTO process (id, status, task_name, account_id) VALUES (?1, ?2, ?3, ?4)",
        params![id, status, task_name, account_id],
    )
    .expect("insert test process");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (SqliteProcessStore, Arc<Mutex<Connection>>) {
        let db = Connection::open_in_memory().expect("in-memory db");
        create_test_schema(&db);
        let store = SqliteProcessStore::from_connection(db);
        let handle = store.db.clone();
        (store, handle)
    }

    #[tokio::test]
    async fn processes_above_returns_ascending_rows_past_cursor() {
        let (store, db) = test_store();
        {
            let db = db.lock().await;
            insert_test_process(&db, 3, "complete", None, None);
            insert_test_process(&db, 1, "complete", None, None);
            insert_test_process(&db, 2, "executing", Some("backup"), Some(7));
        }

        let rows = store.processes_above(1).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(rows[0].status, "executing");
        assert_eq!(rows[0].task_name, "backup");
        assert_eq!(rows[0].account_id, 7);
    }

    #[tokio::test]
    async fn null_columns_read_as_zero_values() {
        let (store, db) = test_store();
        {
            let db = db.lock().await;
            insert_test_process(&db, 1, "failed", None, None);
        }

        let rows = store.processes_above(0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task_name, "");
        assert_eq!(rows[0].account_id, 0);
        assert!(!rows[0].success);
        assert_eq!(rows[0].percent, 0.0);
    }

    #[tokio::test]
    async fn processes_by_ids_only_returns_requested_rows() {
        let (store, db) = test_store();
        {
            let db = db.lock().await;
            for id in 1..=5 {
                insert_test_process(&db, id, "complete", None, None);
            }
        }

        let rows = store.processes_by_ids(&[4, 2]).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 4]);

        assert!(store.processes_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn processes_by_ids_handles_more_ids_than_one_statement_binds() {
        let (store, db) = test_store();
        {
            let db = db.lock().await;
            for id in 1..=1200 {
                insert_test_process(&db, id, "executing", None, None);
            }
        }

        let ids: Vec<i64> = (1..=1200).rev().collect();
        let rows = store.processes_by_ids(&ids).await.unwrap();
        assert_eq!(rows.len(), 1200);
        assert_eq!(rows.first().map(|p| p.id), Some(1));
        assert_eq!(rows.last().map(|p| p.id), Some(1200));
    }

    #[tokio::test]
    async fn max_process_id_is_zero_for_empty_table() {
        let (store, db) = test_store();
        assert_eq!(store.max_process_id().await.unwrap(), 0);

        {
            let db = db.lock().await;
            insert_test_process(&db, 41, "complete", None, None);
            insert_test_process(&db, 12, "complete", None, None);
        }
        assert_eq!(store.max_process_id().await.unwrap(), 41);
    }

    #[tokio::test]
    async fn process_types_load_code_to_name() {
        let (store, db) = test_store();
        {
            let db = db.lock().await;
            db.execute_batch(
                "INSERT INTO process_type (id, code, name, image_code) VALUES
                    (1, 'testProcessTypeCode1', 'test process type name 1', 'not used'),
                    (2, 'testProcessTypeCode2', 'test process type name 2', 'not used'),
                    (3, 'testProcessTypeCode3', 'test process type name 3', 'not used');",
            )
            .unwrap();
        }

        let lookup = store.process_types().await.unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(
            lookup.name_for("testProcessTypeCode2"),
            Some("test process type name 2")
        );
    }

    #[tokio::test]
    async fn ping_fails_without_process_table() {
        let store = SqliteProcessStore::from_connection(Connection::open_in_memory().unwrap());
        assert!(store.ping().await.is_err());
    }

    #[test]
    fn open_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteProcessStore::open(dir.path().join("absent.db")).is_err());
    }
}
