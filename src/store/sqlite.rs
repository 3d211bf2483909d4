use std::{path::Path, sync::RwLock, time::Duration};

use indoc::indoc;
use miette::{miette, Context, IntoDiagnostic, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use super::{TaskFileRecord, TaskLogRecord, TaskRecord, TaskState, TaskStats, TaskStore};

/// SQLite-backed [`TaskStore`].
#[derive(Debug)]
pub struct Sqlite {
    conn: RwLock<Connection>,
}

unsafe impl Sync for Sqlite {}

impl Sqlite {
    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute_batch(indoc! {"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tasks (
                task_id       TEXT PRIMARY KEY,
                status        TEXT NOT NULL,
                url           TEXT NOT NULL,
                start_time    TEXT NOT NULL,
                end_time      TEXT NOT NULL,
                progress      TEXT,
                error_message TEXT,
                created_at    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_files (
                task_id    TEXT NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
                file_type  TEXT NOT NULL,
                file_name  TEXT NOT NULL,
                file_path  TEXT NOT NULL,
                file_size  INTEGER,
                created_at INTEGER NOT NULL,
                UNIQUE(task_id, file_type)
            );

            CREATE TABLE IF NOT EXISTS task_logs (
                task_id    TEXT NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
                level      TEXT NOT NULL,
                message    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
        "})
        .into_diagnostic()
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn into_record(
    (task_id, status, url, start_time, end_time, progress, error_message, created_at): (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        i64,
    ),
) -> Result<TaskRecord> {
    let state =
        TaskState::parse(&status).ok_or_else(|| miette!("Unknown task status '{status}'"))?;

    Ok(TaskRecord {
        task_id,
        state,
        url,
        start_time,
        end_time,
        progress,
        error_message,
        created_at,
    })
}

impl TaskStore for Sqlite {
    fn open(path: &Path) -> Result<Self> {
        let store = Self {
            conn: RwLock::new(
                Connection::open(path)
                    .into_diagnostic()
                    .wrap_err("Could not open sqlite file")?,
            ),
        };

        store.create_tables().wrap_err("Could not create tables")?;

        Ok(store)
    }

    fn put_task(&self, task: &TaskRecord) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute(
            indoc! {"
                INSERT INTO tasks (
                    task_id, status, url, start_time, end_time,
                    progress, error_message, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(task_id) DO UPDATE SET
                    status = excluded.status,
                    url = excluded.url,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    progress = excluded.progress,
                    error_message = excluded.error_message
            "},
            params![
                task.task_id,
                task.state.as_str(),
                task.url,
                task.start_time,
                task.end_time,
                task.progress,
                task.error_message,
                now_unix(),
            ],
        )
        .into_diagnostic()
        .wrap_err("Could not upsert task row")?;

        Ok(())
    }

    fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let conn = self.conn.read().unwrap();

        let row = conn
            .query_row(
                indoc! {"
                    SELECT task_id, status, url, start_time, end_time,
                           progress, error_message, created_at
                    FROM tasks WHERE task_id = ?
                "},
                [task_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .into_diagnostic()
            .wrap_err("Could not query task row")?;

        row.map(into_record).transpose()
    }

    fn list_tasks(&self, filter: Option<TaskState>) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.read().unwrap();

        let mut stmt = conn
            .prepare(indoc! {"
                SELECT task_id, status, url, start_time, end_time,
                       progress, error_message, created_at
                FROM tasks
                WHERE (?1 IS NULL OR status = ?1)
                ORDER BY created_at DESC, rowid DESC
            "})
            .into_diagnostic()?;

        let rows = stmt
            .query_map([filter.map(TaskState::as_str)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })
            .into_diagnostic()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .into_diagnostic()
            .wrap_err("Could not list task rows")?;

        rows.into_iter().map(into_record).collect()
    }

    fn delete_task(&self, task_id: &str) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute("DELETE FROM tasks WHERE task_id = ?", [task_id])
            .into_diagnostic()
            .wrap_err("Could not delete task row")?;

        Ok(())
    }

    fn record_file(&self, task_id: &str, kind: &str, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_size = path.metadata().ok().map(|meta| meta.len());

        let conn = self.conn.write().unwrap();

        conn.execute(
            indoc! {"
                INSERT INTO task_files (task_id, file_type, file_name, file_path, file_size, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(task_id, file_type) DO UPDATE SET
                    file_name = excluded.file_name,
                    file_path = excluded.file_path,
                    file_size = excluded.file_size,
                    created_at = excluded.created_at
            "},
            params![
                task_id,
                kind,
                file_name,
                path.to_string_lossy().into_owned(),
                file_size,
                now_unix(),
            ],
        )
        .into_diagnostic()
        .wrap_err("Could not record task file")?;

        Ok(())
    }

    fn files(&self, task_id: &str) -> Result<Vec<TaskFileRecord>> {
        let conn = self.conn.read().unwrap();

        let mut stmt = conn
            .prepare(indoc! {"
                SELECT file_type, file_name, file_path, file_size
                FROM task_files
                WHERE task_id = ?
                ORDER BY created_at DESC, rowid DESC
            "})
            .into_diagnostic()?;

        let rows = stmt
            .query_map([task_id], |row| {
                Ok(TaskFileRecord {
                    kind: row.get(0)?,
                    file_name: row.get(1)?,
                    file_path: row.get(2)?,
                    file_size: row.get(3)?,
                })
            })
            .into_diagnostic()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .into_diagnostic()
            .wrap_err("Could not list task files")?;

        Ok(rows)
    }

    fn append_log(&self, task_id: &str, level: &str, message: &str) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute(
            "INSERT INTO task_logs (task_id, level, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, level, message, now_unix()],
        )
        .into_diagnostic()
        .wrap_err("Could not append task log")?;

        Ok(())
    }

    fn logs(&self, task_id: &str, limit: usize) -> Result<Vec<TaskLogRecord>> {
        let conn = self.conn.read().unwrap();

        let mut stmt = conn
            .prepare(indoc! {"
                SELECT level, message, created_at
                FROM task_logs
                WHERE task_id = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?2
            "})
            .into_diagnostic()?;

        let rows = stmt
            .query_map(params![task_id, limit as i64], |row| {
                Ok(TaskLogRecord {
                    level: row.get(0)?,
                    message: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .into_diagnostic()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .into_diagnostic()
            .wrap_err("Could not list task logs")?;

        Ok(rows)
    }

    fn stats(&self) -> Result<TaskStats> {
        let conn = self.conn.read().unwrap();

        conn.query_row(
            indoc! {"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'pending'),
                    COUNT(*) FILTER (WHERE status = 'processing'),
                    COUNT(*) FILTER (WHERE status = 'completed'),
                    COUNT(*) FILTER (WHERE status = 'failed'),
                    COUNT(*) FILTER (WHERE status = 'cancelled')
                FROM tasks
            "},
            [],
            |row| {
                Ok(TaskStats {
                    total: row.get::<_, i64>(0)? as usize,
                    pending: row.get::<_, i64>(1)? as usize,
                    processing: row.get::<_, i64>(2)? as usize,
                    completed: row.get::<_, i64>(3)? as usize,
                    failed: row.get::<_, i64>(4)? as usize,
                    cancelled: row.get::<_, i64>(5)? as usize,
                })
            },
        )
        .into_diagnostic()
        .wrap_err("Could not compute task stats")
    }

    fn delete_finished_before(&self, age: Duration) -> Result<usize> {
        let cutoff = now_unix() - age.as_secs() as i64;
        let conn = self.conn.write().unwrap();

        conn.execute(
            indoc! {"
                DELETE FROM tasks
                WHERE created_at < ?
                AND status IN ('completed', 'failed', 'cancelled')
            "},
            [cutoff],
        )
        .into_diagnostic()
        .wrap_err("Could not clean up stale tasks")
    }
}
