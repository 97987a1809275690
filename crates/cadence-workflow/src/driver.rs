//! Drives one execution through the four-stage pipeline.

use std::sync::Arc;

use cadence_core::config::ProvidersConfig;
use cadence_core::store::Store;
use cadence_core::types::{
    AgentRole, EventPriority, Execution, ExecutionEvent, ExecutionStateMachine, ExecutionStatus,
    ModelProvider, Project, ProjectStatus, StreamEvent, StreamEventType,
};
use cadence_intelligence::registry::{ClientRegistry, ProviderCredentials};
use cadence_intelligence::{GenerateParams, ModelClientError};
use thiserror::Error;

use crate::prompts::PromptRegistry;
use crate::roles::role_config;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("core error: {0}")]
    Core(#[from] cadence_core::error::CoreError),
    #[error("execution {0} not found")]
    ExecutionNotFound(uuid::Uuid),
    #[error("project {0} not found")]
    ProjectNotFound(uuid::Uuid),
    #[error("invalid execution transition: {0}")]
    Transition(#[from] cadence_core::types::ExecutionTransitionError),
}

/// Destination for progress events the driver emits as it runs. Kept
/// decoupled from any particular transport — `cadence-bridge`'s event
/// bus implements this to fan events out over websockets.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: StreamEvent);
}

/// An `EventSink` that drops every event. Useful for driver tests and for
/// running a pipeline with no connected subscribers.
pub struct NullEventSink;

#[async_trait::async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: StreamEvent) {}
}

pub struct WorkflowDriver {
    store: Arc<Store>,
    registry: Arc<ClientRegistry>,
    prompts: PromptRegistry,
    sink: Arc<dyn EventSink>,
    providers: ProvidersConfig,
}

impl WorkflowDriver {
    pub fn new(store: Arc<Store>, registry: Arc<ClientRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_providers_config(store, registry, sink, ProvidersConfig::default())
    }

    pub fn with_providers_config(
        store: Arc<Store>,
        registry: Arc<ClientRegistry>,
        sink: Arc<dyn EventSink>,
        providers: ProvidersConfig,
    ) -> Self {
        Self {
            store,
            registry,
            prompts: PromptRegistry::new(),
            sink,
            providers,
        }
    }

    /// Run every stage of [`AgentRole::PIPELINE`] for `execution_id`,
    /// updating `Execution`/`Project` state and emitting events as each
    /// stage starts and finishes. A stage that fails to produce output
    /// (missing agent config, unreachable provider, model error) logs
    /// the error and moves on to the next stage rather than aborting the
    /// whole run — per-role failures don't block the rest of the pipeline.
    pub async fn run(&self, execution_id: uuid::Uuid) -> Result<Execution, WorkflowError> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or(WorkflowError::ExecutionNotFound(execution_id))?;
        let mut project = self
            .store
            .get_project(execution.project_id)
            .await?
            .ok_or(WorkflowError::ProjectNotFound(execution.project_id))?;

        let mut state = ExecutionStateMachine::new(execution.status);
        execution.status = state.transition(ExecutionEvent::Start)?;
        self.store.update_execution(&execution).await?;

        if project.status == ProjectStatus::Draft {
            if let Err(err) = project.try_transition(ProjectStatus::Active) {
                tracing::warn!(error = %err, "failed to transition project to active");
            }
            self.store.update_project(&project).await?;
        }

        self.emit(
            StreamEventType::Execution,
            "workflow_driver",
            serde_json::json!({ "event": "execution_start", "execution_id": execution_id }),
            EventPriority::Normal,
            &execution,
        )
        .await;

        for role in AgentRole::PIPELINE {
            self.run_stage(role, &mut execution, &mut project).await;
        }

        let status = state.transition(ExecutionEvent::Complete)?;
        execution.finish(status);
        self.store.update_execution(&execution).await?;

        project.progress = 100;
        if let Err(err) = project.try_transition(ProjectStatus::Completed) {
            tracing::warn!(error = %err, "failed to transition project to completed");
        }
        self.store.update_project(&project).await?;

        self.emit(
            StreamEventType::Execution,
            "workflow_driver",
            serde_json::json!({ "event": "execution_complete", "execution_id": execution_id }),
            EventPriority::Normal,
            &execution,
        )
        .await;

        Ok(execution)
    }

    async fn run_stage(&self, role: AgentRole, execution: &mut Execution, project: &mut Project) {
        self.emit(
            StreamEventType::Status,
            "workflow_driver",
            serde_json::json!({ "event": "stage_start", "role": role }),
            EventPriority::Normal,
            execution,
        )
        .await;

        match self.execute_stage(role, execution, project).await {
            Ok(message) => {
                execution.log(role, message.clone());
                project.progress = role.cumulative_progress();
                self.emit(
                    StreamEventType::Agent,
                    "workflow_driver",
                    serde_json::json!({ "event": "agent_message", "role": role, "message": message }),
                    EventPriority::Normal,
                    execution,
                )
                .await;
                self.emit(
                    StreamEventType::Status,
                    "workflow_driver",
                    serde_json::json!({ "event": "progress_update", "progress": project.progress }),
                    EventPriority::High,
                    execution,
                )
                .await;
            }
            Err(err) => {
                let message = format!("stage {role} failed: {err}");
                tracing::warn!(%role, error = %err, "pipeline stage failed, continuing");
                execution.log(role, message.clone());
                self.emit(
                    StreamEventType::System,
                    "workflow_driver",
                    serde_json::json!({ "event": "error", "role": role, "message": message }),
                    EventPriority::Critical,
                    execution,
                )
                .await;
            }
        }

        if let Err(err) = self.store.update_execution(execution).await {
            tracing::error!(error = %err, "failed to persist execution after stage");
        }
        if let Err(err) = self.store.update_project(project).await {
            tracing::error!(error = %err, "failed to persist project progress after stage");
        }
    }

    async fn execute_stage(
        &self,
        role: AgentRole,
        execution: &Execution,
        project: &Project,
    ) -> Result<String, ModelClientError> {
        let config = self
            .store
            .get_default_agent_config(execution.user_id, role)
            .await
            .map_err(|e| ModelClientError::HttpError(e.to_string()))?
            .ok_or_else(|| {
                ModelClientError::Unsupported(format!("no default agent config for role {role}"))
            })?;

        let credentials = resolve_credentials(config.provider, &self.providers);
        let client = self.registry.client(config.provider.name(), &config.model, &credentials, true)?;

        if !client.validate_connection().await {
            return Err(ModelClientError::HttpError(format!(
                "provider {} unreachable",
                config.provider.name()
            )));
        }

        let cfg = role_config(role);
        let template = self
            .prompts
            .get(&role)
            .expect("built-in template exists for every pipeline role");
        let prompt = template.render_task(&project.name, &project.requirements, "");
        let prompt = cfg.pre_execute(&prompt).unwrap_or(prompt);

        let params = GenerateParams {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            extra: config.parameters.clone(),
        };

        let response = client.generate(&prompt, &params).await?;
        Ok(cfg.post_execute(&response.text).unwrap_or(response.text))
    }

    async fn emit(
        &self,
        event_type: StreamEventType,
        source: &str,
        data: serde_json::Value,
        priority: EventPriority,
        execution: &Execution,
    ) {
        let event = StreamEvent::new(event_type, source, data)
            .with_priority(priority)
            .with_execution(execution.id)
            .with_project(execution.project_id);
        self.sink.publish(event).await;
    }
}

/// Reads the env var `cfg` names for `provider`'s credentials. Absent
/// vars leave the corresponding field `None`; the registry's factory for
/// that provider is what actually rejects a missing-but-required value.
fn resolve_credentials(provider: ModelProvider, cfg: &ProvidersConfig) -> ProviderCredentials {
    match provider {
        ModelProvider::OpenAi => ProviderCredentials {
            api_key: std::env::var(&cfg.openai_api_key_env).ok(),
            ..Default::default()
        },
        ModelProvider::AzureOpenAi => ProviderCredentials {
            api_key: std::env::var(&cfg.azure_openai_api_key_env).ok(),
            base_url: std::env::var(&cfg.azure_openai_endpoint_env).ok(),
            ..Default::default()
        },
        ModelProvider::Groq => ProviderCredentials {
            api_key: std::env::var(&cfg.groq_api_key_env).ok(),
            ..Default::default()
        },
        ModelProvider::Ollama => ProviderCredentials {
            base_url: std::env::var(&cfg.ollama_base_url_env).ok(),
            ..Default::default()
        },
        ModelProvider::Anthropic => ProviderCredentials {
            api_key: std::env::var(&cfg.anthropic_api_key_env).ok(),
            ..Default::default()
        },
        ModelProvider::Cohere => ProviderCredentials {
            api_key: std::env::var(&cfg.cohere_api_key_env).ok(),
            ..Default::default()
        },
    }
}
