//! Placeholder nodes for pages that could not be navigated to.
//!
//! When a navigation times out the crawl still records that the link
//! exists: a synthetic node with identity derived from the canonical
//! target URL, enriched with whatever a cheap HEAD probe returns. A
//! later successful capture of the same URL supersedes the placeholder.

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use webatlas_core::hash::url_hash;
use webatlas_core::model::{current_timestamp, LinkTask, PageState};

/// HEAD probe budget; deliberately far below the navigation timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn synthesize_page(
    client: &Client,
    task: &LinkTask,
    normalized_url: &str,
    role: &str,
) -> PageState {
    let mut features = json!({ "fallback": { "reason": "navigation_timeout" } });
    let mut title = placeholder_title(task);

    match tokio::time::timeout(PROBE_TIMEOUT, client.head(&task.target_url).send()).await {
        Ok(Ok(response)) => {
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let content_length = response.content_length();
            debug!(url = %task.target_url, status, "HEAD probe for synthetic node");
            features["fallback"]["status"] = json!(status);
            features["fallback"]["content_type"] = json!(content_type);
            if let Some(len) = content_length {
                features["fallback"]["content_length"] = json!(len);
            }
        }
        _ => {
            // Probe failed too; the minimal placeholder stands.
            debug!(url = %task.target_url, "HEAD probe failed, minimal synthetic node");
        }
    }

    if title.is_empty() {
        title = normalized_url.to_string();
    }

    PageState {
        state_hash: url_hash(normalized_url),
        url: task.target_url.clone(),
        normalized_url: normalized_url.to_string(),
        title,
        timestamp: current_timestamp(),
        role: role.to_string(),
        depth: task.depth,
        synthetic: true,
        features,
    }
}

fn placeholder_title(task: &LinkTask) -> String {
    let text = task.link_text.trim();
    if text.is_empty() {
        String::new()
    } else {
        format!("{} (unconfirmed)", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webatlas_core::model::DiscoverySource;

    fn task(url: &str, text: &str) -> LinkTask {
        LinkTask {
            target_url: url.to_string(),
            source_hash: "src".to_string(),
            link_text: text.to_string(),
            depth: 2,
            task_hash: url_hash(url),
            discovery_source: DiscoverySource::Dom,
        }
    }

    #[tokio::test]
    async fn synthetic_identity_comes_from_canonical_url() {
        let client = Client::new();
        // Unroutable address: probe fails fast, minimal node results.
        let t1 = task("http://127.0.0.1:1/page?utm_source=a", "Pricing");
        let t2 = task("http://127.0.0.1:1/page", "Other text");
        let normalized = "http://127.0.0.1:1/page";

        let n1 = synthesize_page(&client, &t1, normalized, "default").await;
        let n2 = synthesize_page(&client, &t2, normalized, "default").await;

        assert_eq!(n1.state_hash, n2.state_hash);
        assert!(n1.synthetic);
        assert_eq!(n1.depth, 2);
        assert_eq!(n1.title, "Pricing (unconfirmed)");
        assert_eq!(n1.features["fallback"]["reason"], "navigation_timeout");
    }

    #[tokio::test]
    async fn empty_link_text_falls_back_to_url_title() {
        let client = Client::new();
        let t = task("http://127.0.0.1:1/x", "  ");
        let n = synthesize_page(&client, &t, "http://127.0.0.1:1/x", "default").await;
        assert_eq!(n.title, "http://127.0.0.1:1/x");
    }
}
