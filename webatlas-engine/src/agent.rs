//! The per-page exploration agent.
//!
//! An agent is born on a freshly loaded page, restores the crawl state
//! from the last checkpoint, captures the page as a graph node, feeds
//! the frontier, saves a new checkpoint and finally asks for the
//! navigation that destroys it. All orchestrator-bound traffic goes
//! through one in-order message channel; the checkpoint message is
//! always sent before the navigation request so a crash between the
//! two never loses state.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use webatlas_core::hash::state_fingerprint;
use webatlas_core::model::{current_timestamp, DiscoverySource, LinkCandidate, LinkTask, PageState, Transition};
use webatlas_core::{Checkpoint, Frontier, StateGraph, UrlNormalizer};

use crate::collab::{extract_title, LinkExtractor, StateFingerprinter};
use crate::config::CrawlConfig;
use crate::error::Result;
use crate::messages::AgentMessage;
use crate::plugins::PluginRegistry;

/// A page the orchestrator fetched for this agent.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// Collaborators shared by every agent incarnation of a role pass.
#[derive(Clone)]
pub struct AgentDeps {
    pub extractor: Arc<dyn LinkExtractor>,
    pub fingerprinter: Arc<dyn StateFingerprinter>,
    pub plugins: PluginRegistry,
    pub normalizer: UrlNormalizer,
}

pub struct ExplorationAgent {
    page: LoadedPage,
    /// The task that navigated here; None on the seed page.
    arrival: Option<LinkTask>,
    graph: StateGraph,
    frontier: Frontier,
    depth: usize,
    role: String,
    config: CrawlConfig,
    deps: AgentDeps,
    messages: mpsc::UnboundedSender<AgentMessage>,
    /// Origin the crawl is scoped to.
    origin: String,
}

impl ExplorationAgent {
    /// Build an agent on a loaded page, resuming from a checkpoint when
    /// one exists. A missing checkpoint means this is the seed page of
    /// a fresh role pass.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: LoadedPage,
        arrival: Option<LinkTask>,
        checkpoint: Option<Checkpoint>,
        role: &str,
        origin: &str,
        config: CrawlConfig,
        deps: AgentDeps,
        messages: mpsc::UnboundedSender<AgentMessage>,
    ) -> Self {
        let (graph, frontier, depth) = match checkpoint {
            Some(cp) => {
                let depth = arrival.as_ref().map(|t| t.depth).unwrap_or(cp.current_depth);
                (
                    StateGraph::import(cp.graph),
                    Frontier::from_snapshot(cp.frontier),
                    depth,
                )
            }
            None => (StateGraph::new(), Frontier::new(), 0),
        };
        Self {
            page,
            arrival,
            graph,
            frontier,
            depth,
            role: role.to_string(),
            config,
            deps,
            messages,
            origin: origin.to_string(),
        }
    }

    /// One full incarnation: bootstrap, capture, extract, queue, then
    /// either request navigation or declare the role pass complete.
    pub async fn run(mut self) -> Result<()> {
        // Let the page settle before touching it.
        tokio::time::sleep(self.config.stabilization_delay).await;

        let degraded = self.deps.plugins.enable_all(&self.page.html);
        self.send(AgentMessage::Ready {
            degraded: degraded.clone(),
        });

        let state_hash = self.capture(&degraded);

        if self.config.deep_discovery && !self.frontier.deep_discovery_done() {
            self.deep_discovery(&state_hash);
        }

        let candidates = self.deps.extractor.extract(&self.page.html, &self.page.url);
        self.queue_candidates(candidates, &state_hash, DiscoverySource::Dom);

        // Checkpoint the pre-dequeue state. On restore the next
        // incarnation marks its own URL visited, which makes the stale
        // head skip itself in dequeue_next.
        let checkpoint = Checkpoint::new(
            self.graph.export(),
            self.frontier.snapshot(),
            self.depth,
            self.config.max_depth,
            &self.role,
        );
        self.send(AgentMessage::SaveCheckpoint(Box::new(checkpoint)));

        let normalizer = self.deps.normalizer.clone();
        match self.frontier.dequeue_next(|u| normalizer.normalize(u)) {
            Some(task) => {
                debug!(url = %task.target_url, depth = task.depth, "requesting navigation");
                self.send(AgentMessage::RequestNavigation(Box::new(task)));
            }
            None => {
                info!(role = %self.role, nodes = self.graph.node_count(), "frontier exhausted");
                self.send(AgentMessage::CrawlComplete(Box::new(self.graph.export())));
            }
        }
        Ok(())
    }

    fn capture(&mut self, degraded: &[String]) -> String {
        let normalized = self.deps.normalizer.normalize(&self.page.url);
        // Restore-on-page: this URL is now visited regardless of how we
        // got here.
        self.frontier.mark_visited(&normalized);

        let signature = self.deps.fingerprinter.signature(&self.page.html);
        let path_and_query = path_and_query(&normalized);
        let state_hash = state_fingerprint(&path_and_query, &signature);

        let features = self
            .deps
            .plugins
            .collect_all(&self.page.html, &self.page.url, degraded);

        let state = PageState {
            state_hash: state_hash.clone(),
            url: self.page.url.clone(),
            normalized_url: normalized,
            title: extract_title(&self.page.html),
            timestamp: current_timestamp(),
            role: self.role.clone(),
            depth: self.depth,
            synthetic: false,
            features,
        };
        let fresh = self.graph.add_node(state);
        debug!(hash = %state_hash, fresh, "captured page state");

        if let Some(task) = &self.arrival {
            if self.graph.contains_node(&task.source_hash) && task.source_hash != state_hash {
                let action = if task.link_text.is_empty() {
                    format!("goto:{}", task.target_url)
                } else {
                    format!("click:{}", task.link_text)
                };
                // Both endpoints verified above.
                let _ = self.graph.add_edge(Transition {
                    from_hash: task.source_hash.clone(),
                    to_hash: state_hash.clone(),
                    action,
                    metadata: serde_json::Value::Null,
                    role: self.role.clone(),
                    timestamp: current_timestamp(),
                });
            }
        }
        // set_current can only fail for an unknown hash; we just added it.
        let _ = self.graph.set_current(&state_hash);
        state_hash
    }

    /// One-shot widened sweep: src/href/action attributes beyond plain
    /// anchors. Runs on the first page that gets to it, then latches.
    fn deep_discovery(&mut self, state_hash: &str) {
        let candidates = deep_scan(&self.page.html, &self.page.url);
        let found = candidates.len();
        self.queue_candidates(candidates, state_hash, DiscoverySource::DeepScan);
        self.frontier.set_deep_discovery_done();
        self.send(AgentMessage::DeepDiscoveryComplete { links_found: found });
    }

    fn queue_candidates(
        &mut self,
        candidates: Vec<LinkCandidate>,
        source_hash: &str,
        source: DiscoverySource,
    ) {
        for candidate in candidates {
            let normalized = self.deps.normalizer.normalize(&candidate.href);
            if !self.deps.normalizer.same_origin(&normalized, &self.origin) {
                continue;
            }
            // Self-links and query variants of the current page.
            if self.deps.normalizer.is_same_page(&normalized, &self.page.url) {
                continue;
            }
            let task = LinkTask {
                target_url: candidate.href.clone(),
                source_hash: source_hash.to_string(),
                link_text: candidate.text.clone(),
                depth: self.depth + 1,
                task_hash: webatlas_core::hash::url_hash(&normalized),
                discovery_source: source,
            };
            let graph = &self.graph;
            match self.frontier.enqueue(task, &normalized, self.config.max_depth, |u| {
                graph.contains_url(u)
            }) {
                Ok(()) => {}
                Err(rejection) => {
                    debug!(url = %candidate.href, ?rejection, "candidate rejected");
                }
            }
        }
    }

    fn send(&self, message: AgentMessage) {
        // Receiver dropping means the orchestrator is gone; nothing
        // useful left to do.
        let _ = self.messages.send(message);
    }
}

fn path_and_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) => match u.query() {
            Some(q) => format!("{}?{}", u.path(), q),
            None => u.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

fn deep_scan(html: &str, base_url: &str) -> Vec<LinkCandidate> {
    use scraper::{Html, Selector};
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("[href], [src], form[action]") else {
        return Vec::new();
    };
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for element in document.select(&selector) {
        let value = element.value();
        if value.name() == "a" {
            // Anchors are the DOM extractor's job.
            continue;
        }
        let raw = value
            .attr("href")
            .or_else(|| value.attr("src"))
            .or_else(|| value.attr("action"))
            .unwrap_or("");
        if raw.is_empty() || raw.starts_with("data:") || raw.starts_with("javascript:") {
            continue;
        }
        let Ok(mut resolved) = base.join(raw) else {
            continue;
        };
        resolved.set_fragment(None);
        // Asset files don't produce page states.
        let path = resolved.path().to_lowercase();
        if [".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            continue;
        }
        out.push(LinkCandidate {
            href: resolved.to_string(),
            text: String::new(),
            title: String::new(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DomLinkExtractor, SemanticFingerprinter};

    fn deps() -> AgentDeps {
        AgentDeps {
            extractor: Arc::new(DomLinkExtractor),
            fingerprinter: Arc::new(SemanticFingerprinter),
            plugins: PluginRegistry::new(),
            normalizer: UrlNormalizer::new(),
        }
    }

    fn page(url: &str, html: &str) -> LoadedPage {
        LoadedPage {
            url: url.to_string(),
            status: 200,
            html: html.to_string(),
        }
    }

    fn fast_config() -> CrawlConfig {
        CrawlConfig::new()
            .with_stabilization_delay(std::time::Duration::from_millis(0))
            .with_deep_discovery(false)
    }

    async fn run_agent(
        p: LoadedPage,
        arrival: Option<LinkTask>,
        checkpoint: Option<Checkpoint>,
    ) -> Vec<AgentMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = ExplorationAgent::new(
            p,
            arrival,
            checkpoint,
            "default",
            "https://x.example/",
            fast_config(),
            deps(),
            tx,
        );
        agent.run().await.unwrap();
        let mut messages = Vec::new();
        while let Ok(m) = rx.try_recv() {
            messages.push(m);
        }
        messages
    }

    #[tokio::test]
    async fn seed_page_checkpoints_before_requesting_navigation() {
        let html = r#"<html><head><title>Home</title></head><body>
            <a href="/a">A</a><a href="/b">B</a>
        </body></html>"#;
        let messages = run_agent(page("https://x.example/", html), None, None).await;

        let positions: Vec<&str> = messages
            .iter()
            .map(|m| match m {
                AgentMessage::Ready { .. } => "ready",
                AgentMessage::SaveCheckpoint(_) => "checkpoint",
                AgentMessage::RequestNavigation(_) => "navigate",
                AgentMessage::CrawlComplete(_) => "complete",
                AgentMessage::DeepDiscoveryComplete { .. } => "deep",
            })
            .collect();
        assert_eq!(positions, vec!["ready", "checkpoint", "navigate"]);

        // BFS: the first discovered link goes first.
        let AgentMessage::RequestNavigation(task) = &messages[2] else {
            panic!("expected navigation request");
        };
        assert_eq!(task.target_url, "https://x.example/a");
        assert_eq!(task.depth, 1);

        // The checkpoint still holds both tasks: restore must re-skip
        // via the visited set, not via a shortened queue.
        let AgentMessage::SaveCheckpoint(cp) = &messages[1] else {
            panic!("expected checkpoint");
        };
        assert_eq!(cp.frontier.queue.len(), 2);
    }

    #[tokio::test]
    async fn restored_agent_skips_its_own_page_in_the_queue() {
        // First incarnation on the seed.
        let seed_html = r#"<html><body><a href="/a">A</a></body></html>"#;
        let messages = run_agent(page("https://x.example/", seed_html), None, None).await;
        let AgentMessage::SaveCheckpoint(cp) = &messages[1] else {
            panic!("expected checkpoint");
        };
        let AgentMessage::RequestNavigation(task) = &messages[2] else {
            panic!("expected navigation request");
        };

        // Second incarnation lands on /a with the pre-dequeue
        // checkpoint; /a heads the queue but must not be navigated to
        // again. No further links: the pass completes.
        let messages = run_agent(
            page("https://x.example/a", "<html><body>leaf</body></html>"),
            Some((**task).clone()),
            Some((**cp).clone()),
        )
        .await;
        assert!(matches!(messages.last(), Some(AgentMessage::CrawlComplete(_))));

        let AgentMessage::CrawlComplete(snapshot) = messages.last().unwrap() else {
            unreachable!()
        };
        assert_eq!(snapshot.stats.node_count, 2);
        assert_eq!(snapshot.stats.edge_count, 1);
        assert_eq!(snapshot.edges[0].action, "click:A");
    }

    #[tokio::test]
    async fn two_links_to_one_page_yield_one_task() {
        let html = r#"<html><body>
            <a href="/promo?utm_source=banner">Promo</a>
            <a href="/promo">Promo again</a>
        </body></html>"#;
        let messages = run_agent(page("https://x.example/", html), None, None).await;
        let AgentMessage::SaveCheckpoint(cp) = &messages[1] else {
            panic!("expected checkpoint");
        };
        assert_eq!(cp.frontier.queue.len(), 1);
    }

    #[tokio::test]
    async fn cross_origin_links_are_ignored() {
        let html = r#"<html><body><a href="https://other.example/x">Out</a></body></html>"#;
        let messages = run_agent(page("https://x.example/", html), None, None).await;
        assert!(matches!(messages.last(), Some(AgentMessage::CrawlComplete(_))));
    }

    #[tokio::test]
    async fn deep_discovery_runs_once_and_latches() {
        let html = r#"<html><body>
            <iframe src="/embedded"></iframe>
            <form action="/search"></form>
            <img src="/logo.png"/>
            <script src="/app.js"></script>
        </body></html>"#;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = ExplorationAgent::new(
            page("https://x.example/", html),
            None,
            None,
            "default",
            "https://x.example/",
            fast_config().with_deep_discovery(true),
            deps(),
            tx,
        );
        agent.run().await.unwrap();

        let mut deep_links = None;
        let mut checkpoint = None;
        while let Ok(m) = rx.try_recv() {
            match m {
                AgentMessage::DeepDiscoveryComplete { links_found } => {
                    deep_links = Some(links_found)
                }
                AgentMessage::SaveCheckpoint(cp) => checkpoint = Some(cp),
                _ => {}
            }
        }
        // Assets filtered; iframe and form targets survive.
        assert_eq!(deep_links, Some(2));
        assert!(checkpoint.unwrap().frontier.deep_discovery_done);
    }
}
