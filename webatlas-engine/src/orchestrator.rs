//! The persistent side of the crawl: fetches pages, spins up one agent
//! per page, persists every checkpoint the agent hands back and decides
//! what happens when a navigation never completes.

use reqwest::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use webatlas_core::model::{current_timestamp, LinkTask, Transition};
use webatlas_core::{Checkpoint, Database, Frontier, GraphSnapshot, StateGraph};

use crate::agent::{AgentDeps, ExplorationAgent, LoadedPage};
use crate::collab::AuthenticationHandler;
use crate::config::CrawlConfig;
use crate::error::{EngineError, Result};
use crate::messages::{AgentMessage, CrawlEvent};
use crate::monitor::{MemoryMonitor, MemoryPressure};
use crate::synthetic::synthesize_page;

/// Stored identity for an authenticated role pass.
#[derive(Debug, Clone)]
pub struct RoleCredential {
    pub username: String,
    pub secret: String,
    pub login_url: String,
}

enum StepOutcome {
    Navigate(LinkTask),
    Complete(GraphSnapshot),
    StopEarly,
}

pub struct Orchestrator {
    config: CrawlConfig,
    deps: AgentDeps,
    auth: Arc<dyn AuthenticationHandler>,
    db: Arc<Mutex<Database>>,
    session_id: String,
    events: mpsc::UnboundedSender<CrawlEvent>,
    monitor: MemoryMonitor,
    /// Operator stop request, checked between BFS steps.
    stop: Arc<AtomicBool>,
    /// Normalized URLs with a navigation in flight. A second request
    /// for the same target is dropped, not queued.
    nav_locks: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        config: CrawlConfig,
        deps: AgentDeps,
        auth: Arc<dyn AuthenticationHandler>,
        db: Arc<Mutex<Database>>,
        session_id: String,
        events: mpsc::UnboundedSender<CrawlEvent>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let monitor = MemoryMonitor::new(
            config.memory_warning_bytes,
            config.memory_critical_bytes,
        );
        Self {
            config,
            deps,
            auth,
            db,
            session_id,
            events,
            monitor,
            stop,
            nav_locks: Mutex::new(HashSet::new()),
        }
    }

    /// One full breadth-first pass over the target as a single role.
    /// Each page gets a fresh agent; the agent's checkpoint is the only
    /// state that survives between pages.
    pub async fn run_role_crawl(
        &self,
        role: &str,
        seed_url: &str,
        credential: Option<&RoleCredential>,
    ) -> Result<GraphSnapshot> {
        let origin = origin_of(seed_url)?;
        let client = self.make_client()?;

        if let Some(cred) = credential {
            self.auth
                .authenticate(&client, role, &cred.username, &cred.secret, &cred.login_url)
                .await?;
        }

        self.locked_db(|db| db.clear_checkpoint())?;
        self.emit(CrawlEvent::RoleStarted {
            role: role.to_string(),
        });
        info!(role, seed_url, "role crawl started");

        let mut pending: Option<LinkTask> = None;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return self.partial_graph("stop requested");
            }
            let target = pending
                .as_ref()
                .map(|t| t.target_url.clone())
                .unwrap_or_else(|| seed_url.to_string());

            let fetched = self.navigate(&client, &target).await;
            match fetched {
                Ok(page) => {
                    let checkpoint = self.locked_db(|db| db.load_checkpoint())?;
                    let arrival = pending.take();
                    match self
                        .run_agent_step(page, arrival, checkpoint, role, &origin)
                        .await
                    {
                        Ok(StepOutcome::Navigate(task)) => pending = Some(task),
                        Ok(StepOutcome::Complete(snapshot)) => {
                            info!(role, nodes = snapshot.stats.node_count, "role crawl complete");
                            return Ok(snapshot);
                        }
                        Ok(StepOutcome::StopEarly) => {
                            return self.partial_graph("memory pressure");
                        }
                        Err(EngineError::ReadinessTimeout { attempts }) => {
                            warn!(role, attempts, "agent never became ready, finalizing with partial graph");
                            return self.partial_graph("agent readiness timeout");
                        }
                        Err(e) => return Err(e),
                    }
                }
                // Timeouts and transport failures on a frontier task
                // still leave a mark; only an unreachable seed is fatal.
                Err(e) => match pending.take() {
                    Some(task)
                        if matches!(
                            e,
                            EngineError::NavigationTimeout { .. } | EngineError::Http(_)
                        ) =>
                    {
                        warn!(url = %task.target_url, error = %e, "navigation failed");
                        self.emit(CrawlEvent::NavigationTimedOut {
                            url: task.target_url.clone(),
                        });
                        match self.timeout_fallback(&client, task, role).await? {
                            Some(next) => pending = Some(next),
                            None => {
                                return self.partial_graph("frontier exhausted after timeout")
                            }
                        }
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    /// Fetch one page under the navigation timeout and lock. An SPA
    /// redirect shell triggers a single re-navigation to the route it
    /// encodes.
    async fn navigate(&self, client: &Client, target: &str) -> Result<LoadedPage> {
        let normalized = self.deps.normalizer.normalize(target);
        self.acquire_nav_lock(&normalized)?;
        let result = self.fetch_with_timeout(client, target).await;
        self.release_nav_lock(&normalized);
        let page = result?;

        let shell_path = Url::parse(&page.url).map(|u| u.path().to_string()).ok();
        let canonical = self.deps.normalizer.normalize(&page.url);
        let canonical_path = Url::parse(&canonical).map(|u| u.path().to_string()).ok();
        if let (Some(shell), Some(real)) = (shell_path, canonical_path) {
            if shell == "/" && real != "/" {
                debug!(from = %page.url, to = %canonical, "SPA redirect shell, re-navigating");
                self.acquire_nav_lock(&canonical)?;
                let result = self.fetch_with_timeout(client, &canonical).await;
                self.release_nav_lock(&canonical);
                return result;
            }
        }
        Ok(page)
    }

    async fn fetch_with_timeout(&self, client: &Client, target: &str) -> Result<LoadedPage> {
        let timeout = self.config.navigation_timeout;
        let fetch = async {
            let response = client.get(target).send().await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let html = response.text().await?;
            Ok::<_, EngineError>(LoadedPage {
                url: final_url,
                status,
                html,
            })
        };
        match tokio::time::timeout(timeout, fetch).await {
            Ok(page) => page,
            Err(_) => Err(EngineError::NavigationTimeout {
                url: target.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Spawn an agent on the page, wait out the readiness handshake,
    /// then drain its messages in order.
    async fn run_agent_step(
        &self,
        page: LoadedPage,
        arrival: Option<LinkTask>,
        checkpoint: Option<Checkpoint>,
        role: &str,
        origin: &str,
    ) -> Result<StepOutcome> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = ExplorationAgent::new(
            page,
            arrival,
            checkpoint,
            role,
            origin,
            self.config.clone(),
            self.deps.clone(),
            tx,
        );
        let handle = tokio::spawn(agent.run());

        // Readiness handshake: the agent must report in before we
        // trust anything else it sends.
        let retry = self.config.readiness_retry;
        let mut ready = false;
        for _ in 0..retry.max_attempts {
            match tokio::time::timeout(retry.interval, rx.recv()).await {
                Ok(Some(AgentMessage::Ready { degraded })) => {
                    if !degraded.is_empty() {
                        warn!(?degraded, "agent ready in degraded mode");
                    }
                    ready = true;
                    break;
                }
                Ok(Some(other)) => {
                    // Ready is always the first message; anything else
                    // means the protocol broke.
                    handle.abort();
                    return Err(EngineError::Other(format!(
                        "agent spoke before readiness: {:?}",
                        other
                    )));
                }
                Ok(None) => {
                    handle.abort();
                    return Err(EngineError::BootstrapPartial(
                        "agent channel closed during bootstrap".to_string(),
                    ));
                }
                Err(_) => continue,
            }
        }
        if !ready {
            handle.abort();
            return Err(EngineError::ReadinessTimeout {
                attempts: retry.max_attempts,
            });
        }

        let mut outcome = None;
        let mut stop_early = false;
        while let Some(message) = rx.recv().await {
            match message {
                AgentMessage::Ready { .. } => {}
                AgentMessage::DeepDiscoveryComplete { links_found } => {
                    debug!(links_found, "deep discovery pass finished");
                }
                AgentMessage::SaveCheckpoint(cp) => {
                    let (pressure, used) = self.monitor.assess(&cp)?;
                    self.locked_db(|db| db.save_checkpoint(&self.session_id, &cp))?;
                    match pressure {
                        MemoryPressure::Normal => {}
                        MemoryPressure::Warning => {
                            self.emit(CrawlEvent::MemoryWarning { used_bytes: used });
                            // Incremental export so a later crash loses
                            // nothing already crawled.
                            self.locked_db(|db| {
                                db.save_role_graph(&self.session_id, role, &cp.graph)
                            })?;
                            // Shed near-duplicate nodes so the state
                            // stops growing.
                            let mut graph = StateGraph::import(cp.graph.clone());
                            let normalizer = self.deps.normalizer.clone();
                            let removed = graph
                                .prune_near_duplicates(|a, b| normalizer.is_same_page(a, b));
                            if removed > 0 {
                                let pruned = Checkpoint::new(
                                    graph.export(),
                                    cp.frontier.clone(),
                                    cp.current_depth,
                                    cp.max_depth,
                                    role,
                                );
                                self.locked_db(|db| {
                                    db.save_checkpoint(&self.session_id, &pruned)
                                })?;
                            }
                        }
                        MemoryPressure::Critical => {
                            self.emit(CrawlEvent::MemoryWarning { used_bytes: used });
                            // Crawl-wide stop: remaining roles are
                            // skipped too, the last checkpoint stands.
                            self.stop.store(true, Ordering::Relaxed);
                            stop_early = true;
                        }
                    }
                    self.emit_capture(role, &cp);
                }
                AgentMessage::RequestNavigation(task) => outcome = Some(StepOutcome::Navigate(*task)),
                AgentMessage::CrawlComplete(snapshot) => {
                    outcome = Some(StepOutcome::Complete(*snapshot))
                }
            }
        }
        handle
            .await
            .map_err(|e| EngineError::Other(format!("agent task failed: {}", e)))??;

        if stop_early {
            return Ok(StepOutcome::StopEarly);
        }
        outcome.ok_or_else(|| {
            EngineError::Other("agent exited without navigation or completion".to_string())
        })
    }

    /// A navigation that timed out still leaves a mark: a synthetic
    /// node for the target, the edge that pointed at it, and an
    /// updated checkpoint. Returns the next task, or None when the
    /// frontier is spent.
    async fn timeout_fallback(
        &self,
        client: &Client,
        task: LinkTask,
        role: &str,
    ) -> Result<Option<LinkTask>> {
        let checkpoint = self
            .locked_db(|db| db.load_checkpoint())?
            .ok_or_else(|| EngineError::Other("timeout fallback without checkpoint".to_string()))?;

        let mut graph = StateGraph::import(checkpoint.graph);
        let mut frontier = Frontier::from_snapshot(checkpoint.frontier);

        let normalized = self.deps.normalizer.normalize(&task.target_url);
        let synthetic = synthesize_page(client, &task, &normalized, role).await;
        let synthetic_hash = synthetic.state_hash.clone();
        let depth = synthetic.depth;
        graph.add_node(synthetic);
        if graph.contains_node(&task.source_hash) {
            let _ = graph.add_edge(Transition {
                from_hash: task.source_hash.clone(),
                to_hash: synthetic_hash.clone(),
                action: format!("click:{}", task.link_text),
                metadata: serde_json::Value::Null,
                role: role.to_string(),
                timestamp: current_timestamp(),
            });
        }
        frontier.mark_visited(&normalized);

        let normalizer = self.deps.normalizer.clone();
        let next = frontier.dequeue_next(|u| normalizer.normalize(u));

        let updated = Checkpoint::new(
            graph.export(),
            frontier.snapshot(),
            checkpoint.current_depth,
            checkpoint.max_depth,
            role,
        );
        self.emit(CrawlEvent::PageCaptured {
            role: role.to_string(),
            url: normalized,
            depth,
            synthetic: true,
            nodes_total: updated.graph.stats.node_count,
            frontier_len: updated.frontier.queue.len(),
        });
        self.locked_db(|db| db.save_checkpoint(&self.session_id, &updated))?;
        Ok(next)
    }

    /// The best graph we have when a pass ends abnormally: whatever the
    /// last checkpoint recorded.
    fn partial_graph(&self, reason: &str) -> Result<GraphSnapshot> {
        info!(reason, "finalizing role pass with checkpointed state");
        let checkpoint = self.locked_db(|db| db.load_checkpoint())?;
        // A pass can end before the seed page was ever captured.
        Ok(match checkpoint {
            Some(cp) => cp.graph,
            None => StateGraph::new().export(),
        })
    }

    fn make_client(&self) -> Result<Client> {
        // Fresh cookie jar per role pass; identities never bleed.
        Client::builder()
            .user_agent(&self.config.user_agent)
            .cookie_store(true)
            .timeout(self.config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(EngineError::from)
    }

    fn acquire_nav_lock(&self, normalized_url: &str) -> Result<()> {
        let mut locks = self
            .nav_locks
            .lock()
            .map_err(|_| EngineError::Other("navigation lock poisoned".to_string()))?;
        if !locks.insert(normalized_url.to_string()) {
            return Err(EngineError::NavigationInFlight(normalized_url.to_string()));
        }
        Ok(())
    }

    fn release_nav_lock(&self, normalized_url: &str) {
        if let Ok(mut locks) = self.nav_locks.lock() {
            locks.remove(normalized_url);
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

    fn emit_capture(&self, role: &str, checkpoint: &Checkpoint) {
        let current = checkpoint
            .graph
            .current_hash
            .as_ref()
            .and_then(|h| checkpoint.graph.nodes.iter().find(|n| &n.state_hash == h));
        if let Some(node) = current {
            self.emit(CrawlEvent::PageCaptured {
                role: role.to_string(),
                url: node.normalized_url.clone(),
                depth: node.depth,
                synthetic: node.synthetic,
                nodes_total: checkpoint.graph.stats.node_count,
                frontier_len: checkpoint.frontier.queue.len(),
            });
        }
    }
}

pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| EngineError::InvalidUrl(e.to_string()))?;
    if !parsed.has_host() {
        return Err(EngineError::InvalidUrl(format!("no host in {}", url)));
    }
    Ok(parsed[..url::Position::BeforePath].to_string())
}
