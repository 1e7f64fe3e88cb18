use crate::FlowGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Format version written into every flow document
pub const FLOW_FORMAT_VERSION: &str = "0.1.1";

/// Lifecycle state of a stored flow declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Initializing,
    Developing,
    Testing,
    Deployed,
    Running,
    Disabled,
    LoadFailed,
}

impl FlowState {
    pub const ALL: [FlowState; 7] = [
        FlowState::Initializing,
        FlowState::Developing,
        FlowState::Testing,
        FlowState::Deployed,
        FlowState::Running,
        FlowState::Disabled,
        FlowState::LoadFailed,
    ];

    pub fn can_transition_to(&self, target: FlowState) -> bool {
        use FlowState::*;

        matches!(
            (self, target),
            (Initializing, Developing | Initializing | LoadFailed)
                | (Developing, Testing | Deployed | Disabled | Developing | LoadFailed)
                | (Testing, Testing | Deployed | Developing | Disabled | Running | LoadFailed)
                | (Deployed, Deployed | Developing | Testing | Disabled | Running | LoadFailed)
                | (Running, Running | Deployed | Testing | Disabled)
                | (Disabled, Disabled | Deployed)
                | (LoadFailed, LoadFailed | Developing | Deployed | Disabled)
        )
    }

    pub fn next_states(&self) -> Vec<FlowState> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Initializing => "initializing",
            FlowState::Developing => "developing",
            FlowState::Testing => "testing",
            FlowState::Deployed => "deployed",
            FlowState::Running => "running",
            FlowState::Disabled => "disabled",
            FlowState::LoadFailed => "load_failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FlowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown flow state: {s}"))
    }
}

/// Outcome of a requested state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: FlowState, to: FlowState },
    Rejected { current: FlowState, requested: FlowState },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// What kind of flow a graph assembles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowCategory {
    #[default]
    Common,
    ChatFlow,
}

/// A stored flow declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    pub uid: Uuid,
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    #[serde(default)]
    pub state: FlowState,
    #[serde(default)]
    pub flow_category: FlowCategory,
    pub version: String,
    pub flow_data: FlowGraph,
    pub error_message: Option<String>,
    pub gmt_modified: DateTime<Utc>,
}

impl FlowDocument {
    pub fn new(name: impl Into<String>, flow_data: FlowGraph) -> Self {
        let name = name.into();
        Self {
            uid: Uuid::new_v4(),
            label: name.clone(),
            name,
            description: None,
            state: FlowState::default(),
            flow_category: FlowCategory::default(),
            version: FLOW_FORMAT_VERSION.to_string(),
            flow_data,
            error_message: None,
            gmt_modified: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Moves to `to` if the lifecycle allows it; otherwise keeps the current
    /// state and reports the rejection.
    pub fn transition(&mut self, to: FlowState) -> Transition {
        let from = self.state;
        if !from.can_transition_to(to) {
            tracing::warn!(flow = %self.name, %from, requested = %to, "Rejected flow state transition");
            return Transition::Rejected {
                current: from,
                requested: to,
            };
        }
        self.state = to;
        self.gmt_modified = Utc::now();
        if to != FlowState::LoadFailed {
            self.error_message = None;
        }
        tracing::debug!(flow = %self.name, %from, %to, "Flow state changed");
        Transition::Applied { from, to }
    }

    /// Records a load failure; rejected like any other transition when the
    /// current state does not allow it.
    pub fn mark_load_failed(&mut self, message: impl Into<String>) -> Transition {
        let outcome = self.transition(FlowState::LoadFailed);
        if outcome.is_applied() {
            self.error_message = Some(message.into());
        }
        outcome
    }

    pub fn is_version_compatible(&self) -> bool {
        is_version_compatible(&self.version)
    }
}

/// Whether a document written with `version` can be read by this format:
/// major and minor components must match.
pub fn is_version_compatible(version: &str) -> bool {
    fn major_minor(v: &str) -> Option<(u64, u64)> {
        let mut parts = v.trim().trim_start_matches('v').split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        Some((major, minor))
    }
    match (major_minor(version), major_minor(FLOW_FORMAT_VERSION)) {
        (Some(theirs), Some(ours)) => theirs == ours,
        _ => false,
    }
}
