//! Chat request/response and routing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub const MAX_MESSAGE_CHARS: usize = 1000;

    /// Check the message length contract (1..=1000 characters).
    pub fn validate(&self) -> Result<(), String> {
        let len = self.message.chars().count();
        if len == 0 {
            return Err("message must not be empty".into());
        }
        if len > Self::MAX_MESSAGE_CHARS {
            return Err(format!(
                "message must be at most {} characters, got {len}",
                Self::MAX_MESSAGE_CHARS
            ));
        }
        Ok(())
    }
}

/// The closed set of handlers a message can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    HumanHandoff,
    Journey,
    GeneralKnowledge,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 3] = [
        HandlerKind::HumanHandoff,
        HandlerKind::Journey,
        HandlerKind::GeneralKnowledge,
    ];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::HumanHandoff => "human_handoff",
            HandlerKind::Journey => "journey",
            HandlerKind::GeneralKnowledge => "general_knowledge",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandlerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown handler: {s}"))
    }
}

/// Router output. Names exactly one handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub handler: HandlerKind,
    pub confidence: f64,
    pub reasoning: String,
}

/// Terminal artifact returned to the caller.
///
/// Field names on the wire follow the public chat contract
/// (`response`, `agent_used`, `escalated_to_human`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(rename = "response")]
    pub response_text: String,
    /// A handler wire name, or `error_handler` for the coordinator boundary.
    #[serde(rename = "agent_used")]
    pub handler_used: String,
    pub session_id: String,
    #[serde(rename = "escalated_to_human")]
    pub escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}
