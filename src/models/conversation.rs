use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DecisionMode, TurnRole};

/// One immutable entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(session_id: &str, role: TurnRole, text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// How the orchestrator routed a message, returned to clients and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFrame {
    pub mode: DecisionMode,
    pub intent: String,
    pub llm: Option<String>,
    pub route_reason: String,
}

impl DecisionFrame {
    pub fn new(mode: DecisionMode, intent: &str, route_reason: &str) -> Self {
        Self {
            mode,
            intent: intent.to_string(),
            llm: None,
            route_reason: route_reason.to_string(),
        }
    }

    pub fn with_llm(mut self, llm: Option<String>) -> Self {
        self.llm = llm;
        self
    }
}

/// One row of the conversation log (per handled chat turn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    pub session_id: String,
    pub mode: DecisionMode,
    pub intent: String,
    pub route_reason: String,
    pub center_claim: String,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}
