/*!
SQLite-backed checkpointer.

Uses the serde persistence models (see [`crate::runtimes::persistence`])
to encode state, frontier, and pending-interrupt metadata as JSON columns.
The `(session_id, step)` primary key enforces the append-only contract at
the database level: an attempted overwrite surfaces as
[`CheckpointerError::DuplicateStep`].

Schema:

- `sessions(id, concurrency_limit, created_at)`
- `steps(session_id, step, status, state_json, frontier_json,
  pending_interrupt_json, ran_nodes_json, skipped_nodes_json,
  updated_channels_json, created_at)`
*/

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, Result,
};
use crate::runtimes::persistence::{
    PersistedCheckpoint, PersistedFrontierEntry, PersistedState, from_json_str, to_json_string,
};
use crate::types::NodeKind;

/// Durable checkpointer over a SQLite database.
pub struct SQLiteCheckpointer {
    pool: SqlitePool,
}

fn backend_err(e: sqlx::Error) -> CheckpointerError {
    CheckpointerError::Backend(e.to_string())
}

fn serde_err(e: crate::runtimes::persistence::PersistenceError) -> CheckpointerError {
    CheckpointerError::Serialization {
        message: e.to_string(),
    }
}

impl SQLiteCheckpointer {
    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await.map_err(backend_err)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                concurrency_limit INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(backend_err)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS steps (
                session_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                status TEXT NOT NULL,
                state_json TEXT NOT NULL,
                frontier_json TEXT NOT NULL,
                pending_interrupt_json TEXT,
                ran_nodes_json TEXT NOT NULL,
                skipped_nodes_json TEXT NOT NULL,
                updated_channels_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, step)
            )",
        )
        .execute(&pool)
        .await
        .map_err(backend_err)?;
        Ok(Self { pool })
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<Checkpoint> {
        let session_id: String = row.get("session_id");
        let step: i64 = row.get("step");
        let status: String = row.get("status");
        let state_json: String = row.get("state_json");
        let frontier_json: String = row.get("frontier_json");
        let pending_interrupt_json: Option<String> = row.get("pending_interrupt_json");
        let ran_nodes_json: String = row.get("ran_nodes_json");
        let skipped_nodes_json: String = row.get("skipped_nodes_json");
        let updated_channels_json: String = row.get("updated_channels_json");
        let created_at: String = row.get("created_at");
        let concurrency_limit: i64 = row.get("concurrency_limit");

        let persisted = PersistedCheckpoint {
            session_id,
            step: step as u64,
            status,
            state: from_json_str::<PersistedState>(&state_json).map_err(serde_err)?,
            frontier: from_json_str::<Vec<PersistedFrontierEntry>>(&frontier_json)
                .map_err(serde_err)?,
            pending_interrupt: match pending_interrupt_json {
                Some(json) => Some(from_json_str(&json).map_err(serde_err)?),
                None => None,
            },
            concurrency_limit: concurrency_limit as usize,
            created_at,
            ran_nodes: from_json_str(&ran_nodes_json).map_err(serde_err)?,
            skipped_nodes: from_json_str(&skipped_nodes_json).map_err(serde_err)?,
            updated_channels: from_json_str(&updated_channels_json).map_err(serde_err)?,
        };
        Ok(Checkpoint::from(persisted))
    }
}

#[async_trait]
impl Checkpointer for SQLiteCheckpointer {
    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let state_json =
            to_json_string(&PersistedState::from(&checkpoint.state)).map_err(serde_err)?;
        let frontier: Vec<PersistedFrontierEntry> = checkpoint
            .frontier
            .iter()
            .map(PersistedFrontierEntry::from)
            .collect();
        let frontier_json = to_json_string(&frontier).map_err(serde_err)?;
        let pending_interrupt_json = match &checkpoint.pending_interrupt {
            Some(token) => Some(to_json_string(token).map_err(serde_err)?),
            None => None,
        };
        let encode_kinds =
            |kinds: &[NodeKind]| kinds.iter().map(|k| k.encode()).collect::<Vec<_>>();
        let ran_nodes_json =
            to_json_string(&encode_kinds(&checkpoint.ran_nodes)).map_err(serde_err)?;
        let skipped_nodes_json =
            to_json_string(&encode_kinds(&checkpoint.skipped_nodes)).map_err(serde_err)?;
        let updated_channels_json =
            to_json_string(&checkpoint.updated_channels).map_err(serde_err)?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, concurrency_limit, created_at) VALUES (?, ?, ?)")
            .bind(&checkpoint.session_id)
            .bind(checkpoint.concurrency_limit as i64)
            .bind(checkpoint.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        let insert = sqlx::query(
            "INSERT INTO steps (
                session_id, step, status, state_json, frontier_json,
                pending_interrupt_json, ran_nodes_json, skipped_nodes_json,
                updated_channels_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.session_id)
        .bind(checkpoint.step as i64)
        .bind(checkpoint.status.as_str())
        .bind(&state_json)
        .bind(&frontier_json)
        .bind(&pending_interrupt_json)
        .bind(&ran_nodes_json)
        .bind(&skipped_nodes_json)
        .bind(&updated_channels_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CheckpointerError::DuplicateStep {
                    session_id: checkpoint.session_id,
                    step: checkpoint.step,
                })
            }
            Err(e) => Err(backend_err(e)),
        }
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT st.*, se.concurrency_limit
             FROM steps st JOIN sessions se ON se.id = st.session_id
             WHERE st.session_id = ?
             ORDER BY st.step DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    #[instrument(skip(self), err)]
    async fn load_history(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT st.*, se.concurrency_limit
             FROM steps st JOIN sessions se ON se.id = st.session_id
             WHERE st.session_id = ?
             ORDER BY st.step ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.iter().map(Self::row_to_checkpoint).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM sessions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }
}
