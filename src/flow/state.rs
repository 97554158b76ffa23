//! Conversation state: who is talking and where they are in a flow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Step name stored once a flow has reached a terminal route.
pub const TERMINAL_STEP: &str = "done";

/// The logical phone line a webhook arrived on.
///
/// Lines change prompt wording only; every line walks the same steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Line {
    #[default]
    Normal,
    Onboarding,
    Master,
}

impl Line {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Onboarding => "onboarding",
            Self::Master => "master",
        }
    }

    /// Parse a stored line name. Unknown names fall back to `Normal`.
    pub fn parse(s: &str) -> Self {
        match s {
            "onboarding" => Self::Onboarding,
            "master" => Self::Master,
            _ => Self::Normal,
        }
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key: a phone number on a particular line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub phone: String,
    pub line: Line,
}

impl CallerIdentity {
    pub fn new(phone: impl Into<String>, line: Line) -> Self {
        Self {
            phone: phone.into().trim().to_string(),
            line,
        }
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.phone, self.line)
    }
}

/// Persisted progress through a flow.
///
/// `current_step` is either a step of `flow_name` or [`TERMINAL_STEP`]. The
/// engine repairs anything else on the next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub flow_name: String,
    pub current_step: String,
    #[serde(default)]
    pub collected_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub line: Line,
}

impl FlowState {
    pub fn new(flow_name: impl Into<String>, current_step: impl Into<String>, line: Line) -> Self {
        Self {
            flow_name: flow_name.into(),
            current_step: current_step.into(),
            collected_fields: BTreeMap::new(),
            line,
        }
    }

    /// Whether the flow has run to completion.
    pub fn is_terminal(&self) -> bool {
        self.current_step == TERMINAL_STEP
    }

    /// Look up a collected field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.collected_fields.get(name).map(String::as_str)
    }
}
