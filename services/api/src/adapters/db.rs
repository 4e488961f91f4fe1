//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the storage-facing ports from the `core` crate: file storage, upload
//! counts, the task store and the class directory. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use syllabus_core::domain::{
    ClassContext, DocumentMetadata, NewTask, PersistedTask, StoredDocument, TaskType,
};
use syllabus_core::ports::{
    ClassDirectory, FileStorage, PortError, PortResult, RateLimitStore, TaskStore,
};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a `sqlx` failure onto the port error the core understands.
fn port_error(e: sqlx::Error, not_found: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(not_found()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn parse_task_type(raw: &str) -> PortResult<TaskType> {
    Ok(match raw {
        "homework" => TaskType::Homework,
        "lab" => TaskType::Lab,
        "assignment" => TaskType::Assignment,
        "project" => TaskType::Project,
        "exam" => TaskType::Exam,
        "quiz" => TaskType::Quiz,
        "midterm" => TaskType::Midterm,
        "final" => TaskType::Final,
        other => return Err(PortError::Unexpected(format!("Unknown task type '{other}' in tasks table"))),
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    storage_path: String,
}
impl DocumentRecord {
    fn to_domain(self) -> StoredDocument {
        StoredDocument {
            path: self.storage_path,
            url: format!("/documents/{}", self.id),
        }
    }
}

#[derive(FromRow)]
struct ClassRecord {
    id: Uuid,
    name: String,
    term_start: NaiveDate,
    term_end: Option<NaiveDate>,
}
impl ClassRecord {
    fn to_domain(self) -> ClassContext {
        ClassContext {
            class_id: self.id,
            name: self.name,
            term_start: self.term_start,
            term_end: self.term_end,
        }
    }
}

#[derive(FromRow)]
struct TaskRecord {
    id: Uuid,
    class_id: Uuid,
    title: String,
    due_date: NaiveDate,
    task_type: String,
}
impl TaskRecord {
    fn to_domain(self) -> PortResult<PersistedTask> {
        Ok(PersistedTask {
            id: self.id,
            title: self.title,
            class_id: self.class_id,
            due_date: self.due_date,
            task_type: parse_task_type(&self.task_type)?,
        })
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl FileStorage for DbAdapter {
    async fn upload_document(
        &self,
        bytes: &[u8],
        metadata: &DocumentMetadata,
    ) -> PortResult<StoredDocument> {
        let id = Uuid::new_v4();
        let path = format!("{}/{}/{}", metadata.user_id, id, metadata.file_name);
        let record = sqlx::query_as::<_, DocumentRecord>(
            "INSERT INTO documents (id, user_id, class_id, storage_path, file_name, media_type, content) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id, storage_path",
        )
        .bind(id)
        .bind(metadata.user_id)
        .bind(metadata.class_id)
        .bind(&path)
        .bind(&metadata.file_name)
        .bind(&metadata.media_type)
        .bind(bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, || format!("Class {} not found", metadata.class_id)))?;
        Ok(record.to_domain())
    }

    async fn get_document_bytes(&self, path: &str) -> PortResult<Vec<u8>> {
        let (content,): (Vec<u8>,) =
            sqlx::query_as("SELECT content FROM documents WHERE storage_path = $1")
                .bind(path)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| port_error(e, || format!("Document {} not found", path)))?;
        Ok(content)
    }
}

#[async_trait]
impl RateLimitStore for DbAdapter {
    async fn get_recent_upload_count(&self, user_id: Uuid, window_seconds: u64) -> PortResult<u32> {
        let window = i64::try_from(window_seconds).unwrap_or(i64::MAX / 1000);
        let since = Utc::now() - chrono::Duration::seconds(window);
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM documents WHERE user_id = $1 AND created_at >= $2")
                .bind(user_id)
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| port_error(e, || format!("User {} not found", user_id)))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl TaskStore for DbAdapter {
    async fn create_task(&self, task: &NewTask) -> PortResult<PersistedTask> {
        let record = sqlx::query_as::<_, TaskRecord>(
            "INSERT INTO tasks (id, class_id, title, due_date, task_type) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, class_id, title, due_date, task_type",
        )
        .bind(Uuid::new_v4())
        .bind(task.class_id)
        .bind(&task.title)
        .bind(task.due_date)
        .bind(task.task_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, || format!("Class {} not found", task.class_id)))?;
        record.to_domain()
    }

    async fn list_tasks_for_class(&self, class_id: Uuid) -> PortResult<Vec<PersistedTask>> {
        let records = sqlx::query_as::<_, TaskRecord>(
            "SELECT id, class_id, title, due_date, task_type FROM tasks WHERE class_id = $1 ORDER BY due_date ASC",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| port_error(e, || format!("Class {} not found", class_id)))?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

#[async_trait]
impl ClassDirectory for DbAdapter {
    async fn get_class_context(&self, class_id: Uuid, user_id: Uuid) -> PortResult<ClassContext> {
        let record = sqlx::query_as::<_, ClassRecord>(
            "SELECT id, name, term_start, term_end FROM classes WHERE id = $1 AND user_id = $2",
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, || format!("Class {} not found", class_id)))?;
        Ok(record.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_types_round_trip_through_their_column_value() {
        for task_type in [TaskType::Homework, TaskType::Midterm, TaskType::Final] {
            assert_eq!(parse_task_type(task_type.as_str()).unwrap(), task_type);
        }
        assert!(parse_task_type("reading").is_err());
    }

    #[test]
    fn pool_exhaustion_is_reported_as_unavailable() {
        let err = port_error(sqlx::Error::PoolTimedOut, || "unused".to_string());
        assert!(matches!(err, PortError::Unavailable(_)));
        let err = port_error(sqlx::Error::RowNotFound, || "Class 1 not found".to_string());
        assert!(matches!(err, PortError::NotFound(msg) if msg == "Class 1 not found"));
    }
}
