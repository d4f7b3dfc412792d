use std::collections::BTreeMap;

use roxmltree::Document;
use serde::{Deserialize, Serialize};

use super::xml::{element_text, find_anywhere};
use super::CheckError;

/// One metric reported by a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Daemon type code, e.g. `s`, `i`, `L`, `n`.
    pub metric_type: Option<String>,
    pub value: Option<String>,
}

/// Outcome of a check test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckState {
    pub state: Option<String>,
    pub available: bool,
    pub status: Option<String>,
    /// `last_run` as reported by the daemon.
    pub timestamp: Option<String>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl CheckState {
    /// Decode a test result, failing on malformed documents.
    pub fn parse(xml: &str) -> Result<Self, CheckError> {
        let doc = Document::parse(xml)?;
        let text = |path: &[&str]| find_anywhere(&doc, path).map(element_text);

        let metrics = find_anywhere(&doc, &["state", "metrics"])
            .map(|node| {
                node.children()
                    .filter(|c| c.is_element())
                    .filter_map(|c| {
                        let name = c.attribute("name")?;
                        let value = MetricValue {
                            metric_type: c.attribute("type").map(str::to_string),
                            value: c.text().map(str::to_string),
                        };
                        Some((name.to_string(), value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            state: text(&["state", "state"]),
            available: text(&["state", "availability"]).as_deref() == Some("available"),
            status: text(&["state", "status"]),
            timestamp: text(&["last_run"]),
            metrics,
        })
    }

    /// Decode a test result; a malformed document yields state `error`.
    pub fn from_xml(xml: &str) -> Self {
        Self::parse(xml).unwrap_or_else(|_| Self {
            state: Some("error".to_string()),
            ..Self::default()
        })
    }

    pub fn metric(&self, name: &str) -> Option<&str> {
        self.metrics.get(name).and_then(|m| m.value.as_deref())
    }
}
