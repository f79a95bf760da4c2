use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::chat::RoutingDecision;

/// Per-request bag threaded through one routing cycle. Not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Empty until the coordinator assigns one.
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// How many handlers have touched this request.
    #[serde(default)]
    pub handler_visits: u32,
    #[serde(default)]
    pub last_decision: Option<RoutingDecision>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Context {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Assign a fresh opaque session id if none is set, returning the id.
    pub fn ensure_session(&mut self) -> &str {
        if self.session_id.trim().is_empty() {
            self.session_id = uuid::Uuid::new_v4().to_string();
        }
        &self.session_id
    }

    pub fn record_decision(&mut self, decision: RoutingDecision) {
        self.last_decision = Some(decision);
        self.handler_visits += 1;
    }
}
