//! Page collaborators: link extraction, state fingerprinting, titles
//! and authentication. The orchestrator treats these as trait objects
//! so alternate implementations can slot in per deployment.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use webatlas_core::LinkCandidate;

use crate::error::{EngineError, Result};

/// Extracts outgoing link candidates from a loaded page.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, html: &str, base_url: &str) -> Vec<LinkCandidate>;
}

/// Produces the semantic element signature a state fingerprint is
/// built from.
pub trait StateFingerprinter: Send + Sync {
    fn signature(&self, html: &str) -> String;
}

/// Logs a role in on the shared HTTP client before its crawl pass.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    async fn authenticate(
        &self,
        client: &Client,
        role: &str,
        username: &str,
        secret: &str,
        login_url: &str,
    ) -> Result<()>;
}

/// Anchor-tag extractor. Resolves hrefs against the page URL and skips
/// non-navigational schemes.
#[derive(Debug, Default)]
pub struct DomLinkExtractor;

impl LinkExtractor for DomLinkExtractor {
    fn extract(&self, html: &str, base_url: &str) -> Vec<LinkCandidate> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(absolute) = resolve_href(base_url, href) else {
                continue;
            };
            let text = element.text().collect::<String>().trim().to_string();
            let title = element.value().attr("title").unwrap_or("").to_string();
            debug!(href = %absolute, "found link candidate");
            candidates.push(LinkCandidate {
                href: absolute,
                text,
                title,
            });
        }
        candidates
    }
}

fn resolve_href(base: &str, href: &str) -> Option<String> {
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
        || href.starts_with('#')
    {
        return None;
    }
    let base_url = Url::parse(base).ok()?;
    let mut resolved = base_url.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Signature over interactive elements: `tag:type:name` per element,
/// document order, joined by `|`. Two pages with the same interaction
/// surface produce the same signature even when their copy differs.
#[derive(Debug, Default)]
pub struct SemanticFingerprinter;

const SEMANTIC_TAGS: &str = "form, input, button, a, select, textarea";

impl StateFingerprinter for SemanticFingerprinter {
    fn signature(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse(SEMANTIC_TAGS) else {
            return String::new();
        };

        let mut parts = Vec::new();
        for element in document.select(&selector) {
            let value = element.value();
            let tag = value.name();
            let type_attr = value.attr("type").unwrap_or("");
            let name_attr = value
                .attr("name")
                .or_else(|| value.attr("id"))
                .unwrap_or("");
            parts.push(format!("{}:{}:{}", tag, type_attr, name_attr));
        }
        parts.join("|")
    }
}

pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Form-POST login against a fixed endpoint. Session continuity comes
/// from the client's cookie store, so the same client must be used for
/// the crawl that follows.
#[derive(Debug, Default)]
pub struct FormAuthenticator {
    /// Field names posted to the login endpoint.
    pub username_field: String,
    pub secret_field: String,
}

impl FormAuthenticator {
    pub fn new() -> Self {
        Self {
            username_field: "username".to_string(),
            secret_field: "password".to_string(),
        }
    }

    pub fn with_fields(mut self, username_field: &str, secret_field: &str) -> Self {
        self.username_field = username_field.to_string();
        self.secret_field = secret_field.to_string();
        self
    }
}

#[async_trait]
impl AuthenticationHandler for FormAuthenticator {
    async fn authenticate(
        &self,
        client: &Client,
        role: &str,
        username: &str,
        secret: &str,
        login_url: &str,
    ) -> Result<()> {
        debug!(role, login_url, "authenticating role");
        let response = client
            .post(login_url)
            .form(&[
                (self.username_field.as_str(), username),
                (self.secret_field.as_str(), secret),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            warn!(role, %status, "login rejected");
            return Err(EngineError::AuthenticationFailure {
                role: role.to_string(),
                reason: format!("login endpoint returned {}", status),
            });
        }
        Ok(())
    }
}
