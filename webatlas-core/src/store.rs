use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::frontier::Checkpoint;
use crate::graph::GraphSnapshot;
use crate::model::{current_timestamp, SessionStatus};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn drop(path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Optimize for frequent checkpoint writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Crawl sessions, one per orchestrator run
            CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    target_url TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed', 'stopped')),
    roles TEXT NOT NULL,      -- JSON array of role names
    configuration TEXT        -- JSON configuration used
);

-- Single-slot resume checkpoint, overwritten before every navigation
CREATE TABLE IF NOT EXISTS checkpoint (
    id INTEGER PRIMARY KEY CHECK(id = 1),
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    saved_at INTEGER NOT NULL,
    payload TEXT NOT NULL,    -- JSON Checkpoint
    FOREIGN KEY(session_id) REFERENCES crawl_sessions(id) ON DELETE CASCADE
);

-- Completed per-role subgraphs
CREATE TABLE IF NOT EXISTS role_graphs (
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    completed_at INTEGER NOT NULL,
    snapshot TEXT NOT NULL,   -- JSON GraphSnapshot
    PRIMARY KEY(session_id, role),
    FOREIGN KEY(session_id) REFERENCES crawl_sessions(id) ON DELETE CASCADE
);

-- Merged multi-role graph, one per session
CREATE TABLE IF NOT EXISTS merged_graphs (
    session_id TEXT PRIMARY KEY,
    merged_at INTEGER NOT NULL,
    snapshot TEXT NOT NULL,   -- JSON GraphSnapshot
    FOREIGN KEY(session_id) REFERENCES crawl_sessions(id) ON DELETE CASCADE
);

-- Stored identities, keyed by role name
CREATE TABLE IF NOT EXISTS credentials (
    role TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    secret TEXT NOT NULL,
    login_url TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_role_graphs_session ON role_graphs(session_id);
            ",
        )?;
        Ok(())
    }

    // Session management
    pub fn create_session(&self, target_url: &str, roles: &[String]) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let timestamp = current_timestamp();
        let roles_json = serde_json::to_string(roles)?;

        self.conn.execute(
            "INSERT INTO crawl_sessions (id, target_url, start_time, status, roles) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&session_id, target_url, timestamp, "running", roles_json],
        )?;

        Ok(session_id)
    }

    pub fn finish_session(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let timestamp = current_timestamp();
        self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status.as_str(), timestamp, session_id],
        )?;
        Ok(())
    }

    // Checkpoint slot: last write wins, exactly one row
    pub fn save_checkpoint(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        let payload = serde_json::to_string(checkpoint)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoint (id, session_id, role, saved_at, payload)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![session_id, &checkpoint.role, checkpoint.saved_at, payload],
        )?;
        debug!(role = %checkpoint.role, "checkpoint saved");
        Ok(())
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM checkpoint WHERE id = 1")?;
        let payload: Option<String> = stmt.query_row([], |row| row.get(0)).optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn clear_checkpoint(&self) -> Result<()> {
        self.conn.execute("DELETE FROM checkpoint WHERE id = 1", [])?;
        Ok(())
    }

    // Role subgraph persistence
    pub fn save_role_graph(
        &self,
        session_id: &str,
        role: &str,
        snapshot: &GraphSnapshot,
    ) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO role_graphs (session_id, role, completed_at, snapshot)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role, current_timestamp(), json],
        )?;
        Ok(())
    }

    pub fn load_role_graph(&self, session_id: &str, role: &str) -> Result<Option<GraphSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT snapshot FROM role_graphs WHERE session_id = ?1 AND role = ?2",
        )?;
        let json: Option<String> = stmt
            .query_row(params![session_id, role], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn list_role_graphs(&self, session_id: &str) -> Result<Vec<(String, GraphSnapshot)>> {
        let mut stmt = self.conn.prepare(
            "SELECT role, snapshot FROM role_graphs WHERE session_id = ?1 ORDER BY completed_at",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut graphs = Vec::with_capacity(rows.len());
        for (role, json) in rows {
            graphs.push((role, serde_json::from_str(&json)?));
        }
        Ok(graphs)
    }

    pub fn save_merged_graph(&self, session_id: &str, snapshot: &GraphSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO merged_graphs (session_id, merged_at, snapshot)
             VALUES (?1, ?2, ?3)",
            params![session_id, current_timestamp(), json],
        )?;
        Ok(())
    }

    pub fn load_merged_graph(&self, session_id: &str) -> Result<Option<GraphSnapshot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT snapshot FROM merged_graphs WHERE session_id = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![session_id], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // Credential storage
    pub fn store_credential(
        &self,
        role: &str,
        username: &str,
        secret: &str,
        login_url: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO credentials (role, username, secret, login_url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![role, username, secret, login_url, current_timestamp()],
        )?;
        Ok(())
    }

    pub fn get_credential(
        &self,
        role: &str,
    ) -> Result<Option<(String, String, Option<String>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, secret, login_url FROM credentials WHERE role = ?1")?;
        let row = stmt
            .query_row(params![role], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?;
        Ok(row)
    }
}
