//! Message Router (C8): dispatches a [`ClientMessage`] to a handler and
//! always returns a [`HandlerResponse`] — a failed command never closes
//! the connection that sent it.

use std::sync::Arc;

use cadence_core::error::CoreError;
use cadence_core::store::Store;
use cadence_core::types::{AgentConfig, ExecutionType, ModelProvider};
use cadence_queue::{Job, JobPriority, TaskQueue};
use cadence_workflow::WorkflowDriver;
use serde_json::json;
use uuid::Uuid;

use crate::protocol::{ClientMessage, HandlerResponse};
use crate::registry::ConnectionRegistry;

pub const RUN_EXECUTION_JOB: &str = "run_execution";

pub struct Router {
    store: Arc<Store>,
    driver: Arc<WorkflowDriver>,
    connections: Arc<ConnectionRegistry>,
    queue: Option<Arc<TaskQueue>>,
}

impl Router {
    pub fn new(
        store: Arc<Store>,
        driver: Arc<WorkflowDriver>,
        connections: Arc<ConnectionRegistry>,
        queue: Option<Arc<TaskQueue>>,
    ) -> Self {
        Self {
            store,
            driver,
            connections,
            queue,
        }
    }

    /// Handle one command from `user_id`'s session `connection_id`. Every
    /// branch returns `Ok`-shaped `HandlerResponse`s even on failure;
    /// `Err` is reserved for transport-level problems the caller, not the
    /// session, should act on (there are none in this implementation).
    pub async fn dispatch(&self, user_id: Uuid, connection_id: Uuid, message: ClientMessage) -> HandlerResponse {
        self.connections.touch(connection_id).await;

        match message {
            ClientMessage::StartAgent { project_id, role: _ } => {
                self.start_agent(user_id, project_id).await
            }
            ClientMessage::CancelExecution { execution_id } => {
                self.transition_execution(user_id, execution_id, cadence_core::types::ExecutionEvent::Cancel)
                    .await
            }
            ClientMessage::PauseExecution { execution_id } => {
                self.transition_execution(user_id, execution_id, cadence_core::types::ExecutionEvent::Pause)
                    .await
            }
            ClientMessage::ResumeExecution { execution_id } => {
                self.transition_execution(user_id, execution_id, cadence_core::types::ExecutionEvent::Resume)
                    .await
            }
            ClientMessage::GetProject { project_id } => self.get_project(user_id, project_id).await,
            ClientMessage::UpdateProject {
                project_id,
                name,
                description,
                requirements,
            } => self.update_project(user_id, project_id, name, description, requirements).await,
            ClientMessage::GetProjectStatus { project_id } => self.get_project(user_id, project_id).await,
            ClientMessage::GetExecution { execution_id } => self.get_execution(user_id, execution_id).await,
            ClientMessage::GetExecutionLogs { execution_id } => {
                self.get_execution_logs(user_id, execution_id).await
            }
            ClientMessage::GetFile { project_id, path } => self.get_file(user_id, project_id, &path).await,
            ClientMessage::ListFiles { project_id, path } => {
                self.list_files(user_id, project_id, path.as_deref()).await
            }
            ClientMessage::GetAgentConfig { role } => self.get_agent_config(user_id, &role).await,
            ClientMessage::UpdateAgentConfig {
                role,
                provider,
                model,
                temperature,
                max_tokens,
            } => {
                self.update_agent_config(user_id, &role, provider, model, temperature, max_tokens)
                    .await
            }
            ClientMessage::Subscribe { .. } => {
                HandlerResponse::ok("subscribe", json!({ "subscribed": true }))
            }
            ClientMessage::Unsubscribe => HandlerResponse::ok("unsubscribe", json!({ "subscribed": false })),
            ClientMessage::Ping => HandlerResponse::ok("pong", json!({})),
            ClientMessage::Heartbeat => HandlerResponse::ok("heartbeat", json!({})),
        }
    }

    async fn start_agent(&self, user_id: Uuid, project_id: Uuid) -> HandlerResponse {
        let project = match self.store.get_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => return err_from(CoreError::not_found("project")),
            Err(e) => return err_from(e),
        };

        let execution = cadence_core::types::Execution::new(project.id, user_id, ExecutionType::Full);
        if let Err(e) = self.store.create_execution(&execution).await {
            return err_from(e);
        }

        match &self.queue {
            Some(queue) => {
                let job = Job::new(
                    RUN_EXECUTION_JOB,
                    json!({ "execution_id": execution.id }),
                    JobPriority::Normal,
                );
                if let Err(e) = queue.enqueue(job).await {
                    return HandlerResponse::err("start_agent", e.to_string());
                }
            }
            None => {
                let driver = self.driver.clone();
                let execution_id = execution.id;
                tokio::spawn(async move {
                    if let Err(e) = driver.run(execution_id).await {
                        tracing::error!(error = %e, "workflow run failed");
                    }
                });
            }
        }

        HandlerResponse::ok("start_agent", json!({ "execution_id": execution.id }))
    }

    async fn transition_execution(
        &self,
        user_id: Uuid,
        execution_id: Uuid,
        event: cadence_core::types::ExecutionEvent,
    ) -> HandlerResponse {
        let mut execution = match self.store.get_execution(execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => return err_from(CoreError::not_found("execution")),
            Err(e) => return err_from(e),
        };
        if execution.user_id != user_id {
            return err_from(CoreError::Authorization);
        }

        let mut state = cadence_core::types::ExecutionStateMachine::new(execution.status);
        match state.transition(event) {
            Ok(status) => {
                execution.status = status;
                if let Err(e) = self.store.update_execution(&execution).await {
                    return err_from(e);
                }
                HandlerResponse::ok("execution_status", json!({ "execution_id": execution_id, "status": status }))
            }
            Err(e) => HandlerResponse::err("execution_status", e.to_string()),
        }
    }

    async fn get_project(&self, user_id: Uuid, project_id: Uuid) -> HandlerResponse {
        match self.store.get_project(project_id).await {
            Ok(Some(project)) if project.owner_id == user_id => HandlerResponse::ok("project", json!(project)),
            Ok(Some(_)) => err_from(CoreError::Authorization),
            Ok(None) => err_from(CoreError::not_found("project")),
            Err(e) => err_from(e),
        }
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        name: Option<String>,
        description: Option<String>,
        requirements: Option<String>,
    ) -> HandlerResponse {
        let mut project = match self.store.get_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => return err_from(CoreError::not_found("project")),
            Err(e) => return err_from(e),
        };
        if project.owner_id != user_id {
            return err_from(CoreError::Authorization);
        }

        if let Some(name) = name {
            project.name = name;
        }
        if let Some(description) = description {
            project.description = Some(description);
        }
        if let Some(requirements) = requirements {
            project.requirements = requirements;
        }

        match self.store.update_project(&project).await {
            Ok(()) => HandlerResponse::ok("project", json!(project)),
            Err(e) => err_from(e),
        }
    }

    async fn get_execution(&self, user_id: Uuid, execution_id: Uuid) -> HandlerResponse {
        match self.store.get_execution(execution_id).await {
            Ok(Some(execution)) if execution.user_id == user_id => {
                HandlerResponse::ok("execution", json!(execution))
            }
            Ok(Some(_)) => err_from(CoreError::Authorization),
            Ok(None) => err_from(CoreError::not_found("execution")),
            Err(e) => err_from(e),
        }
    }

    async fn get_execution_logs(&self, user_id: Uuid, execution_id: Uuid) -> HandlerResponse {
        match self.store.get_execution(execution_id).await {
            Ok(Some(execution)) if execution.user_id == user_id => {
                HandlerResponse::ok("execution_logs", json!(execution.agent_logs))
            }
            Ok(Some(_)) => err_from(CoreError::Authorization),
            Ok(None) => err_from(CoreError::not_found("execution")),
            Err(e) => err_from(e),
        }
    }

    async fn get_file(&self, user_id: Uuid, project_id: Uuid, path: &str) -> HandlerResponse {
        let project = match self.store.get_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => return err_from(CoreError::not_found("project")),
            Err(e) => return err_from(e),
        };
        if project.owner_id != user_id {
            return err_from(CoreError::Authorization);
        }

        match crate::workspace::resolve(&project.workspace_path, path) {
            Ok(resolved) => match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => HandlerResponse::ok("file", json!({ "path": path, "content": content })),
                Err(e) => HandlerResponse::err("file", e.to_string()),
            },
            Err(e) => err_from(e),
        }
    }

    async fn list_files(&self, user_id: Uuid, project_id: Uuid, path: Option<&str>) -> HandlerResponse {
        let project = match self.store.get_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => return err_from(CoreError::not_found("project")),
            Err(e) => return err_from(e),
        };
        if project.owner_id != user_id {
            return err_from(CoreError::Authorization);
        }

        let dir = match crate::workspace::resolve(&project.workspace_path, path.unwrap_or(".")) {
            Ok(dir) => dir,
            Err(e) => return err_from(e),
        };

        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) => return HandlerResponse::err("list_files", e.to_string()),
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            entries.push(entry.file_name().to_string_lossy().to_string());
        }

        HandlerResponse::ok("list_files", json!({ "entries": entries }))
    }

    async fn get_agent_config(&self, user_id: Uuid, role: &str) -> HandlerResponse {
        let role = match cadence_core::types::AgentRole::parse(role) {
            Ok(role) => role,
            Err(e) => return err_from(e),
        };
        match self.store.get_default_agent_config(user_id, role).await {
            Ok(Some(config)) => HandlerResponse::ok("agent_config", json!(config)),
            Ok(None) => err_from(CoreError::not_found("agent_config")),
            Err(e) => err_from(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_agent_config(
        &self,
        user_id: Uuid,
        role: &str,
        provider: Option<String>,
        model: Option<String>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> HandlerResponse {
        let role = match cadence_core::types::AgentRole::parse(role) {
            Ok(role) => role,
            Err(e) => return err_from(e),
        };

        let mut config = match self.store.get_default_agent_config(user_id, role).await {
            Ok(Some(config)) => config,
            Ok(None) => AgentConfig::new(user_id, role, ModelProvider::OpenAi, "gpt-4o-mini"),
            Err(e) => return err_from(e),
        };

        if let Some(provider) = provider.and_then(|p| ModelProvider::parse(&p).ok()) {
            config.provider = provider;
        }
        if let Some(model) = model {
            config.model = model;
        }
        if let Some(temperature) = temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = max_tokens {
            config.max_tokens = max_tokens;
        }

        match self.store.upsert_agent_config(&config).await {
            Ok(()) => HandlerResponse::ok("agent_config", json!(config)),
            Err(e) => err_from(e),
        }
    }
}

fn err_from(err: impl Into<CoreError>) -> HandlerResponse {
    let err = err.into();
    HandlerResponse::err("error", err.to_string())
}
