//! Multi-identity session management: one sequential role pass per
//! identity, then a deterministic merge of whatever completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info};

use webatlas_core::merge::merge_role_graphs;
use webatlas_core::model::{RoleCrawlSession, SessionStatus};
use webatlas_core::{Database, GraphSnapshot};

use crate::agent::AgentDeps;
use crate::collab::AuthenticationHandler;
use crate::config::CrawlConfig;
use crate::error::{EngineError, Result};
use crate::messages::CrawlEvent;
use crate::orchestrator::{Orchestrator, RoleCredential};

pub const DEFAULT_ROLE: &str = "default";

/// What a finished session hands back to the caller.
#[derive(Debug)]
pub struct CrawlReport {
    pub session_id: String,
    pub merged: GraphSnapshot,
    pub roles: Vec<RoleCrawlSession>,
}

pub struct SessionManager {
    db: Arc<Mutex<Database>>,
    config: CrawlConfig,
    deps: AgentDeps,
    auth: Arc<dyn AuthenticationHandler>,
    events: mpsc::UnboundedSender<CrawlEvent>,
    stop: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(
        db: Arc<Mutex<Database>>,
        config: CrawlConfig,
        deps: AgentDeps,
        auth: Arc<dyn AuthenticationHandler>,
        events: mpsc::UnboundedSender<CrawlEvent>,
    ) -> Self {
        Self {
            db,
            config,
            deps,
            auth,
            events,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag ends the current role pass at the next BFS
    /// step and skips any roles not yet started; the last checkpoint
    /// stands.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Crawl the target once per role, in the given order, then merge.
    /// A role whose pass hard-fails is recorded and skipped; the
    /// session only fails outright when no role completes.
    pub async fn run(&self, target_url: &str, roles: &[String]) -> Result<CrawlReport> {
        let roles: Vec<String> = if roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            roles.to_vec()
        };

        let session_id = self.locked_db(|db| db.create_session(target_url, &roles))?;
        info!(session_id, target_url, ?roles, "crawl session started");

        let orchestrator = Orchestrator::new(
            self.config.clone(),
            self.deps.clone(),
            self.auth.clone(),
            self.db.clone(),
            session_id.clone(),
            self.events.clone(),
            self.stop.clone(),
        );

        let mut sessions = Vec::with_capacity(roles.len());
        let mut completed: Vec<(String, GraphSnapshot)> = Vec::new();

        for role in &roles {
            if self.stop.load(Ordering::Relaxed) {
                info!(role, "stop requested, remaining roles skipped");
                break;
            }
            let mut record = RoleCrawlSession::started(role);
            let credential = match self.credential_for(role) {
                Ok(credential) => credential,
                Err(e) => {
                    error!(role, error = %e, "role skipped");
                    self.emit(CrawlEvent::RoleFailed {
                        role: role.clone(),
                        error: e.to_string(),
                    });
                    record.fail(e.to_string());
                    sessions.push(record);
                    continue;
                }
            };

            match orchestrator
                .run_role_crawl(role, target_url, credential.as_ref())
                .await
            {
                Ok(snapshot) => {
                    self.locked_db(|db| db.save_role_graph(&session_id, role, &snapshot))?;
                    self.emit(CrawlEvent::RoleCompleted {
                        role: role.clone(),
                        nodes: snapshot.stats.node_count,
                        edges: snapshot.stats.edge_count,
                    });
                    completed.push((role.clone(), snapshot.clone()));
                    if self.stop.load(Ordering::Relaxed) {
                        record.stop(snapshot);
                    } else {
                        record.complete(snapshot);
                    }
                }
                Err(e) => {
                    error!(role, error = %e, "role pass failed");
                    self.emit(CrawlEvent::RoleFailed {
                        role: role.clone(),
                        error: e.to_string(),
                    });
                    record.fail(e.to_string());
                }
            }
            sessions.push(record);
        }

        let stopped = self.stop.load(Ordering::Relaxed);
        if completed.is_empty() && !stopped {
            self.locked_db(|db| db.finish_session(&session_id, SessionStatus::Failed))?;
            let first_error = sessions
                .iter()
                .filter_map(|s| s.error.clone())
                .next()
                .unwrap_or_else(|| "no role pass completed".to_string());
            return Err(EngineError::Other(format!(
                "session {} failed: {}",
                session_id, first_error
            )));
        }

        let merged = merge_role_graphs(&completed);
        let final_status = if stopped {
            SessionStatus::Stopped
        } else {
            SessionStatus::Completed
        };
        self.locked_db(|db| {
            db.save_merged_graph(&session_id, &merged)?;
            db.clear_checkpoint()?;
            db.finish_session(&session_id, final_status)
        })?;
        info!(
            session_id,
            nodes = merged.stats.node_count,
            edges = merged.stats.edge_count,
            "crawl session finished"
        );

        Ok(CrawlReport {
            session_id,
            merged,
            roles: sessions,
        })
    }

    /// The default role crawls anonymously; every other role needs a
    /// stored identity.
    fn credential_for(&self, role: &str) -> Result<Option<RoleCredential>> {
        if role == DEFAULT_ROLE {
            return Ok(None);
        }
        let stored = self.locked_db(|db| db.get_credential(role))?;
        match stored {
            Some((username, secret, login_url)) => {
                let login_url = login_url.ok_or_else(|| EngineError::AuthenticationFailure {
                    role: role.to_string(),
                    reason: "credential has no login URL".to_string(),
                })?;
                Ok(Some(RoleCredential {
                    username,
                    secret,
                    login_url,
                }))
            }
            None => Err(EngineError::AuthenticationFailure {
                role: role.to_string(),
                reason: "no stored credential".to_string(),
            }),
        }
    }

    fn locked_db<T>(
        &self,
        f: impl FnOnce(&Database) -> webatlas_core::error::Result<T>,
    ) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| EngineError::Other("database lock poisoned".to_string()))?;
        f(&db).map_err(EngineError::from)
    }

    fn emit(&self, event: CrawlEvent) {
        let _ = self.events.send(event);
    }
}
