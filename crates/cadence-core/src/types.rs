//! Runtime data model shared across the workspace: the entities named in
//! the system's component design, independent of how any one crate stores
//! or transports them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
    pub superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            username: username.into(),
            password_hash: password_hash.into(),
            active: true,
            superuser: false,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
    Failed,
}

impl ProjectStatus {
    /// `archived` is terminal and read-only; every other state can still move.
    pub fn can_transition_to(&self, target: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, target),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Active, Failed)
                | (Paused, Failed)
                | (Draft, Archived)
                | (Active, Archived)
                | (Paused, Archived)
                | (Completed, Archived)
                | (Failed, Archived)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub requirements: String,
    pub status: ProjectStatus,
    pub workspace_path: String,
    pub progress: u8,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner_id: Uuid, name: impl Into<String>, requirements: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            description: None,
            requirements: requirements.into(),
            status: ProjectStatus::Draft,
            workspace_path: workspace_path.into(),
            progress: 0,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `completed` requires `progress == 100`; every other transition is
    /// unconditional on progress. Callers are responsible for setting
    /// `progress` to 100 before calling this with `Completed`.
    pub fn try_transition(&mut self, target: ProjectStatus) -> Result<(), ProjectTransitionError> {
        if target == ProjectStatus::Completed && self.progress != 100 {
            return Err(ProjectTransitionError::IncompleteProgress(self.progress));
        }
        if !self.status.can_transition_to(target) {
            return Err(ProjectTransitionError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectTransitionError {
    #[error("cannot complete project at {0}% progress")]
    IncompleteProgress(u8),
    #[error("invalid project transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ProjectStatus,
        to: ProjectStatus,
    },
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Full,
    Partial,
    Test,
    Deployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Retrying,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProductManager,
    Architect,
    Engineer,
    QaEngineer,
    ProjectManager,
    Custom,
}

impl AgentRole {
    /// The four pipeline stages in execution order.
    pub const PIPELINE: [AgentRole; 4] = [
        AgentRole::ProductManager,
        AgentRole::Architect,
        AgentRole::Engineer,
        AgentRole::QaEngineer,
    ];

    /// Cumulative progress percentage reached after this stage completes.
    pub fn cumulative_progress(&self) -> u8 {
        match self {
            AgentRole::ProductManager => 25,
            AgentRole::Architect => 50,
            AgentRole::Engineer => 75,
            AgentRole::QaEngineer => 90,
            AgentRole::ProjectManager | AgentRole::Custom => 0,
        }
    }

    /// Parses the snake_case wire form used in URLs and job payloads.
    pub fn parse(role: &str) -> Result<Self, CoreError> {
        match role {
            "product_manager" => Ok(AgentRole::ProductManager),
            "architect" => Ok(AgentRole::Architect),
            "engineer" => Ok(AgentRole::Engineer),
            "qa_engineer" => Ok(AgentRole::QaEngineer),
            "project_manager" => Ok(AgentRole::ProjectManager),
            "custom" => Ok(AgentRole::Custom),
            other => Err(CoreError::validation("role", format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub role: AgentRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub execution_type: ExecutionType,
    pub status: ExecutionStatus,
    pub agent_logs: Vec<AgentLogEntry>,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Execution {
    pub fn new(project_id: Uuid, user_id: Uuid, execution_type: ExecutionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            execution_type,
            status: ExecutionStatus::Pending,
            agent_logs: Vec::new(),
            output: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
            retry_count: 0,
            max_retries: 3,
        }
    }

    pub fn log(&mut self, role: AgentRole, message: impl Into<String>) {
        self.agent_logs.push(AgentLogEntry {
            role,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Mark a terminal status and set `duration_seconds`. The invariant
    /// `completed_at.is_some() iff status.is_terminal()` is enforced here:
    /// this is the only place either field is written after construction.
    pub fn finish(&mut self, status: ExecutionStatus) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.duration_seconds = Some((now - self.started_at).num_seconds());
        self.completed_at = Some(now);
        self.status = status;
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Execution state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    Start,
    Complete,
    Pause,
    Resume,
    Cancel,
    Fail,
    Timeout,
    Retry,
}

impl std::fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid execution transition: {status:?} cannot handle {event}")]
pub struct ExecutionTransitionError {
    pub status: ExecutionStatus,
    pub event: ExecutionEvent,
}

/// Drives `ExecutionStatus` per the diagram in the workflow driver's
/// design: pending/running/paused with four terminal states and a
/// `failed → retrying → pending` retry loop.
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    current: ExecutionStatus,
    history: Vec<(ExecutionStatus, ExecutionEvent, ExecutionStatus)>,
}

impl ExecutionStateMachine {
    pub fn new(initial: ExecutionStatus) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> ExecutionStatus {
        self.current
    }

    pub fn transition(
        &mut self,
        event: ExecutionEvent,
    ) -> Result<ExecutionStatus, ExecutionTransitionError> {
        use ExecutionEvent::*;
        use ExecutionStatus::*;

        let next = match (self.current, event) {
            (Pending, Start) => Running,
            (Running, Complete) => Completed,
            (Running, Pause) => Paused,
            (Paused, Resume) => Running,
            (Running, Cancel) | (Paused, Cancel) | (Pending, Cancel) => Cancelled,
            (Running, Fail) | (Pending, Fail) => Failed,
            (Running, Timeout) => Timeout,
            (Failed, Retry) => Pending,
            _ => {
                return Err(ExecutionTransitionError {
                    status: self.current,
                    event,
                })
            }
        };

        tracing::debug!(from = ?self.current, ?event, to = ?next, "execution transition");
        self.history.push((self.current, event, next));
        self.current = next;
        Ok(next)
    }

    pub fn can_transition(&self, event: ExecutionEvent) -> bool {
        use ExecutionEvent::*;
        use ExecutionStatus::*;
        matches!(
            (self.current, event),
            (Pending, Start)
                | (Running, Complete)
                | (Running, Pause)
                | (Paused, Resume)
                | (Running, Cancel)
                | (Paused, Cancel)
                | (Pending, Cancel)
                | (Running, Fail)
                | (Pending, Fail)
                | (Running, Timeout)
                | (Failed, Retry)
        )
    }

    pub fn history(&self) -> &[(ExecutionStatus, ExecutionEvent, ExecutionStatus)] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    OpenAi,
    AzureOpenAi,
    Groq,
    Ollama,
    Anthropic,
    Cohere,
}

impl ModelProvider {
    pub fn name(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::AzureOpenAi => "azure_openai",
            ModelProvider::Groq => "groq",
            ModelProvider::Ollama => "ollama",
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::Cohere => "cohere",
        }
    }

    /// Parses the snake_case wire form used in URLs and job payloads.
    pub fn parse(provider: &str) -> Result<Self, CoreError> {
        match provider {
            "openai" => Ok(ModelProvider::OpenAi),
            "azure_openai" => Ok(ModelProvider::AzureOpenAi),
            "groq" => Ok(ModelProvider::Groq),
            "ollama" => Ok(ModelProvider::Ollama),
            "anthropic" => Ok(ModelProvider::Anthropic),
            "cohere" => Ok(ModelProvider::Cohere),
            other => Err(CoreError::validation("provider", format!("unknown provider '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: AgentRole,
    pub provider: ModelProvider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub parameters: serde_json::Value,
    pub system_prompt: Option<String>,
    pub active: bool,
    pub default: bool,
}

impl AgentConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(user_id: Uuid, role: AgentRole, provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role,
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            parameters: serde_json::Value::Null,
            system_prompt: None,
            active: true,
            default: false,
        }
    }

    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentConfigError::OutOfRange("temperature", 0.0, 2.0));
        }
        if self.max_tokens == 0 {
            return Err(AgentConfigError::NotPositive("max_tokens"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(AgentConfigError::OutOfRange("top_p", 0.0, 1.0));
        }
        if !(-2.0..=2.0).contains(&self.frequency_penalty) {
            return Err(AgentConfigError::OutOfRange("frequency_penalty", -2.0, 2.0));
        }
        if !(-2.0..=2.0).contains(&self.presence_penalty) {
            return Err(AgentConfigError::OutOfRange("presence_penalty", -2.0, 2.0));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("{0} must be in [{1}, {2}]")]
    OutOfRange(&'static str, f32, f32),
    #[error("{0} must be > 0")]
    NotPositive(&'static str),
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Retrying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low = 1,
    Normal = 5,
    High = 10,
    Critical = 20,
}

// ---------------------------------------------------------------------------
// StreamEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    Agent,
    Execution,
    Log,
    File,
    Status,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low = 1,
    Normal = 5,
    High = 10,
    Critical = 20,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: StreamEventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub execution_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub priority: EventPriority,
    pub metadata: Option<serde_json::Value>,
}

impl StreamEvent {
    pub fn new(event_type: StreamEventType, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            source: source.into(),
            execution_id: None,
            project_id: None,
            priority: EventPriority::Normal,
            metadata: None,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Connection / Subscriber
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
}

impl ConnectionInfo {
    pub fn new(id: Uuid, user_id: Uuid, project_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            project_id,
            connected_at: now,
            last_activity: now,
            message_count: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn increment_message_count(&mut self) {
        self.message_count += 1;
        self.touch();
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_completes_only_at_full_progress() {
        let mut p = Project::new(Uuid::new_v4(), "P", "build X", "/tmp/p");
        p.status = ProjectStatus::Active;
        p.progress = 99;
        assert!(p.try_transition(ProjectStatus::Completed).is_err());
        p.progress = 100;
        assert!(p.try_transition(ProjectStatus::Completed).is_ok());
        assert_eq!(p.status, ProjectStatus::Completed);
    }

    #[test]
    fn archived_is_terminal() {
        let archived = ProjectStatus::Archived;
        assert!(!archived.can_transition_to(ProjectStatus::Active));
        assert!(!archived.can_transition_to(ProjectStatus::Draft));
    }

    #[test]
    fn execution_state_machine_happy_path() {
        let mut sm = ExecutionStateMachine::new(ExecutionStatus::Pending);
        assert_eq!(sm.transition(ExecutionEvent::Start).unwrap(), ExecutionStatus::Running);
        assert_eq!(sm.transition(ExecutionEvent::Pause).unwrap(), ExecutionStatus::Paused);
        assert_eq!(sm.transition(ExecutionEvent::Resume).unwrap(), ExecutionStatus::Running);
        assert_eq!(sm.transition(ExecutionEvent::Complete).unwrap(), ExecutionStatus::Completed);
        assert_eq!(sm.history().len(), 4);
    }

    #[test]
    fn execution_retry_loop() {
        let mut sm = ExecutionStateMachine::new(ExecutionStatus::Running);
        assert_eq!(sm.transition(ExecutionEvent::Fail).unwrap(), ExecutionStatus::Failed);
        assert_eq!(sm.transition(ExecutionEvent::Retry).unwrap(), ExecutionStatus::Pending);
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut sm = ExecutionStateMachine::new(ExecutionStatus::Completed);
        assert!(sm.transition(ExecutionEvent::Start).is_err());
    }

    #[test]
    fn execution_finish_sets_duration_and_completed_at_together() {
        let mut e = Execution::new(Uuid::new_v4(), Uuid::new_v4(), ExecutionType::Full);
        assert!(e.completed_at.is_none());
        assert!(e.duration_seconds.is_none());
        e.finish(ExecutionStatus::Completed);
        assert!(e.completed_at.is_some());
        assert!(e.duration_seconds.is_some());
    }

    #[test]
    fn agent_config_rejects_out_of_range_temperature() {
        let mut cfg = AgentConfig::new(Uuid::new_v4(), AgentRole::Engineer, ModelProvider::OpenAi, "gpt-4");
        cfg.temperature = 2.0;
        assert!(cfg.validate().is_ok());
        cfg.temperature = 2.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn agent_config_rejects_zero_max_tokens() {
        let mut cfg = AgentConfig::new(Uuid::new_v4(), AgentRole::Engineer, ModelProvider::OpenAi, "gpt-4");
        cfg.max_tokens = 1;
        assert!(cfg.validate().is_ok());
        cfg.max_tokens = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn role_pipeline_is_ordered_with_cumulative_progress() {
        let progresses: Vec<u8> = AgentRole::PIPELINE.iter().map(|r| r.cumulative_progress()).collect();
        assert_eq!(progresses, vec![25, 50, 75, 90]);
    }

    #[test]
    fn agent_role_parse_round_trips_every_variant() {
        for role in [
            AgentRole::ProductManager,
            AgentRole::Architect,
            AgentRole::Engineer,
            AgentRole::QaEngineer,
            AgentRole::ProjectManager,
            AgentRole::Custom,
        ] {
            let wire = serde_json::to_value(role).unwrap();
            let parsed = AgentRole::parse(wire.as_str().unwrap()).unwrap();
            assert_eq!(parsed, role);
        }
        assert!(AgentRole::parse("nonsense").is_err());
    }

    #[test]
    fn model_provider_parse_round_trips_name() {
        for provider in [
            ModelProvider::OpenAi,
            ModelProvider::AzureOpenAi,
            ModelProvider::Groq,
            ModelProvider::Ollama,
            ModelProvider::Anthropic,
            ModelProvider::Cohere,
        ] {
            assert_eq!(ModelProvider::parse(provider.name()).unwrap(), provider);
        }
        assert!(ModelProvider::parse("nonsense").is_err());
    }
}
