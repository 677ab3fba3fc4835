//! Agent catalog.
//!
//! Maps the identifiers shown in the chat UI to the upstream agent that
//! serves them. The catalog is configured once at startup and never mutated.

use serde::{Deserialize, Serialize};

/// A chat agent the UI can talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Key used by the UI to select the agent.
    pub ui_key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Agent identifier in the upstream service (allow-list entry).
    pub upstream_agent: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "blue".to_string()
}

impl AgentDescriptor {
    pub fn new(
        ui_key: impl Into<String>,
        upstream_agent: impl Into<String>,
        icon: impl Into<String>,
        theme: impl Into<String>,
    ) -> Self {
        let ui_key = ui_key.into();
        Self {
            display_name: ui_key.clone(),
            ui_key,
            upstream_agent: upstream_agent.into(),
            icon: icon.into(),
            theme: theme.into(),
        }
    }

    /// Whether `key` names this agent, either by UI key (case-insensitive)
    /// or by exact upstream identifier.
    pub fn matches(&self, key: &str) -> bool {
        self.upstream_agent == key || self.ui_key.eq_ignore_ascii_case(key)
    }
}

/// Built-in agents.
pub fn default_catalog() -> Vec<AgentDescriptor> {
    vec![
        AgentDescriptor::new("Agent Analytic Vente", "AGENT_VENTES", "💼", "blue"),
        AgentDescriptor::new("Agent Analytic OLGA", "AGENT_OPPORTUNITE", "🎯", "pink"),
        AgentDescriptor::new("Agent Analytic STOCK", "AGENT_STOCK", "📦", "green"),
    ]
}

pub fn find_agent<'a>(catalog: &'a [AgentDescriptor], key: &str) -> Option<&'a AgentDescriptor> {
    catalog.iter().find(|a| a.matches(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_ui_key_or_upstream_id() {
        let catalog = default_catalog();
        assert_eq!(
            find_agent(&catalog, "agent analytic olga").map(|a| a.upstream_agent.as_str()),
            Some("AGENT_OPPORTUNITE")
        );
        assert_eq!(
            find_agent(&catalog, "AGENT_STOCK").map(|a| a.ui_key.as_str()),
            Some("Agent Analytic STOCK")
        );
        assert!(find_agent(&catalog, "agent_stock").is_none());
    }

    #[test]
    fn theme_defaults_when_missing() {
        let agent: AgentDescriptor = serde_json::from_str(
            r#"{"ui_key": "x", "display_name": "X", "upstream_agent": "AGENT_X"}"#,
        )
        .unwrap();
        assert_eq!(agent.theme, "blue");
        assert_eq!(agent.icon, "");
    }
}
