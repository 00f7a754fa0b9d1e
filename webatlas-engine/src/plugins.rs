//! Optional feature modules attached to each captured state.
//!
//! Modules are registered by name at a single seam; the engine never
//! needs to know concrete types. A module that fails to enable leaves
//! the agent degraded but never blocks the crawl - only core capture
//! is load-bearing.

use scraper::{Html, Selector};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;

pub trait FeatureModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Probe the page once per agent incarnation. Err marks the module
    /// degraded for this page.
    fn enable(&self, _html: &str) -> Result<()> {
        Ok(())
    }

    /// Feature data merged into the captured state's blob under this
    /// module's name.
    fn collect(&self, html: &str, url: &str) -> Result<serde_json::Value>;
}

#[derive(Default, Clone)]
pub struct PluginRegistry {
    modules: Vec<Arc<dyn FeatureModule>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, module: Arc<dyn FeatureModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Enable every module against the page; returns the names that
    /// failed and are skipped for this incarnation.
    pub fn enable_all(&self, html: &str) -> Vec<String> {
        let mut degraded = Vec::new();
        for module in &self.modules {
            if let Err(e) = module.enable(html) {
                warn!(module = module.name(), error = %e, "feature module disabled for this page");
                degraded.push(module.name().to_string());
            }
        }
        degraded
    }

    /// Run every non-degraded module and merge their outputs into one
    /// object keyed by module name. Collection errors skip the module.
    pub fn collect_all(&self, html: &str, url: &str, degraded: &[String]) -> serde_json::Value {
        let mut blob = serde_json::Map::new();
        for module in &self.modules {
            if degraded.iter().any(|d| d == module.name()) {
                continue;
            }
            match module.collect(html, url) {
                Ok(value) => {
                    blob.insert(module.name().to_string(), value);
                }
                Err(e) => {
                    warn!(module = module.name(), error = %e, "feature collection failed");
                }
            }
        }
        serde_json::Value::Object(blob)
    }
}

/// Counts forms and their input fields on the page.
#[derive(Debug, Default)]
pub struct FormInventory;

impl FeatureModule for FormInventory {
    fn name(&self) -> &'static str {
        "forms"
    }

    fn collect(&self, html: &str, _url: &str) -> Result<serde_json::Value> {
        let document = Html::parse_document(html);
        let forms = Selector::parse("form")
            .map(|s| document.select(&s).count())
            .unwrap_or(0);
        let inputs = Selector::parse("input, select, textarea")
            .map(|s| document.select(&s).count())
            .unwrap_or(0);
        Ok(json!({ "count": forms, "inputs": inputs }))
    }
}
