//! SQLite-backed repository for users, projects, executions, and agent
//! configs. The spec treats this as an external collaborator ("a
//! transactional store with async access is assumed"); this module is the
//! concrete realization that makes the rest of the workspace runnable.

use std::path::Path;

use chrono::Utc;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{
    AgentConfig, AgentLogEntry, Execution, ExecutionStatus, ExecutionType, ModelProvider, Project,
    ProjectStatus, User,
};

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    let s = serde_json::to_string(val).expect("serialize enum");
    s.trim_matches('"').to_string()
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> T {
    let quoted = format!("\"{raw}\"");
    serde_json::from_str(&quoted).expect("deserialize enum")
}

fn parse_dt(raw: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .expect("valid date")
        .with_timezone(&Utc)
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS users (
                        id            TEXT PRIMARY KEY,
                        email         TEXT NOT NULL UNIQUE,
                        username      TEXT NOT NULL UNIQUE,
                        password_hash TEXT NOT NULL,
                        active        INTEGER NOT NULL,
                        superuser     INTEGER NOT NULL,
                        created_at    TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS projects (
                        id             TEXT PRIMARY KEY,
                        owner_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        name           TEXT NOT NULL,
                        description    TEXT,
                        requirements   TEXT NOT NULL,
                        status         TEXT NOT NULL,
                        workspace_path TEXT NOT NULL UNIQUE,
                        progress       INTEGER NOT NULL,
                        metadata       TEXT,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);

                    CREATE TABLE IF NOT EXISTS executions (
                        id               TEXT PRIMARY KEY,
                        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                        user_id          TEXT NOT NULL REFERENCES users(id),
                        execution_type   TEXT NOT NULL,
                        status           TEXT NOT NULL,
                        agent_logs       TEXT NOT NULL,
                        output           TEXT,
                        error_message    TEXT,
                        started_at       TEXT NOT NULL,
                        completed_at     TEXT,
                        duration_seconds INTEGER,
                        retry_count      INTEGER NOT NULL,
                        max_retries      INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_executions_project ON executions(project_id);

                    CREATE TABLE IF NOT EXISTS agent_configs (
                        id                 TEXT PRIMARY KEY,
                        user_id            TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        role               TEXT NOT NULL,
                        provider           TEXT NOT NULL,
                        model              TEXT NOT NULL,
                        temperature        REAL NOT NULL,
                        max_tokens         INTEGER NOT NULL,
                        top_p              REAL NOT NULL,
                        frequency_penalty  REAL NOT NULL,
                        presence_penalty   REAL NOT NULL,
                        parameters         TEXT,
                        system_prompt      TEXT,
                        active             INTEGER NOT NULL,
                        is_default         INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_agent_configs_user_role
                        ON agent_configs(user_id, role);
                    ",
                )?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn create_user(&self, user: &User) -> Result<(), CoreError> {
        let (id, email, username, password_hash, active, superuser, created_at) = (
            user.id.to_string(),
            user.email.clone(),
            user.username.clone(),
            user.password_hash.clone(),
            user.active,
            user.superuser,
            user.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, email, username, password_hash, active, superuser, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    rusqlite::params![id, email, username, password_hash, active, superuser, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE") {
                    CoreError::Conflict("email or username already registered".into())
                } else {
                    CoreError::Storage(e.to_string())
                }
            })
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let email = email.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, username, password_hash, active, superuser, created_at
                     FROM users WHERE email = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![email])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_user(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, username, password_hash, active, superuser, created_at
                     FROM users WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_user(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn create_project(&self, project: &Project) -> Result<(), CoreError> {
        let p = project.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO projects (id, owner_id, name, description, requirements, status,
                        workspace_path, progress, metadata, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                    rusqlite::params![
                        p.id.to_string(),
                        p.owner_id.to_string(),
                        p.name,
                        p.description,
                        p.requirements,
                        enum_to_sql(&p.status),
                        p.workspace_path,
                        p.progress,
                        p.metadata.as_ref().map(|v| v.to_string()),
                        p.created_at.to_rfc3339(),
                        p.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn update_project(&self, project: &Project) -> Result<(), CoreError> {
        let p = project.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE projects SET name=?2, description=?3, requirements=?4, status=?5,
                        progress=?6, metadata=?7, updated_at=?8 WHERE id=?1",
                    rusqlite::params![
                        p.id.to_string(),
                        p.name,
                        p.description,
                        p.requirements,
                        enum_to_sql(&p.status),
                        p.progress,
                        p.metadata.as_ref().map(|v| v.to_string()),
                        p.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Option<Project>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, name, description, requirements, status,
                            workspace_path, progress, metadata, created_at, updated_at
                     FROM projects WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_project(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn list_projects_for_owner(&self, owner_id: Uuid) -> Result<Vec<Project>, CoreError> {
        let owner_id = owner_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, name, description, requirements, status,
                            workspace_path, progress, metadata, created_at, updated_at
                     FROM projects WHERE owner_id = ?1 ORDER BY created_at DESC",
                )?;
                let mut rows = stmt.query(rusqlite::params![owner_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_project(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    pub async fn create_execution(&self, execution: &Execution) -> Result<(), CoreError> {
        let e = execution.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO executions (id, project_id, user_id, execution_type, status,
                        agent_logs, output, error_message, started_at, completed_at,
                        duration_seconds, retry_count, max_retries)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
                    rusqlite::params![
                        e.id.to_string(),
                        e.project_id.to_string(),
                        e.user_id.to_string(),
                        enum_to_sql(&e.execution_type),
                        enum_to_sql(&e.status),
                        serde_json::to_string(&e.agent_logs).unwrap(),
                        e.output.as_ref().map(|v| v.to_string()),
                        e.error_message,
                        e.started_at.to_rfc3339(),
                        e.completed_at.map(|d| d.to_rfc3339()),
                        e.duration_seconds,
                        e.retry_count,
                        e.max_retries,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn update_execution(&self, execution: &Execution) -> Result<(), CoreError> {
        let e = execution.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE executions SET status=?2, agent_logs=?3, output=?4, error_message=?5,
                        completed_at=?6, duration_seconds=?7, retry_count=?8 WHERE id=?1",
                    rusqlite::params![
                        e.id.to_string(),
                        enum_to_sql(&e.status),
                        serde_json::to_string(&e.agent_logs).unwrap(),
                        e.output.as_ref().map(|v| v.to_string()),
                        e.error_message,
                        e.completed_at.map(|d| d.to_rfc3339()),
                        e.duration_seconds,
                        e.retry_count,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, user_id, execution_type, status, agent_logs,
                            output, error_message, started_at, completed_at,
                            duration_seconds, retry_count, max_retries
                     FROM executions WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_execution(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Agent configs
    // -----------------------------------------------------------------------

    /// Enforces "at most one `default=true` row per `(user_id, role)`" by
    /// clearing any existing default for the role before inserting one
    /// flagged as default, inside the same connection call.
    pub async fn upsert_agent_config(&self, config: &AgentConfig) -> Result<(), CoreError> {
        let c = config.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if c.default {
                    tx.execute(
                        "UPDATE agent_configs SET is_default = 0 WHERE user_id = ?1 AND role = ?2",
                        rusqlite::params![c.user_id.to_string(), enum_to_sql(&c.role)],
                    )?;
                }
                tx.execute(
                    "INSERT INTO agent_configs (id, user_id, role, provider, model, temperature,
                        max_tokens, top_p, frequency_penalty, presence_penalty, parameters,
                        system_prompt, active, is_default)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                     ON CONFLICT(id) DO UPDATE SET
                        provider=excluded.provider, model=excluded.model,
                        temperature=excluded.temperature, max_tokens=excluded.max_tokens,
                        top_p=excluded.top_p, frequency_penalty=excluded.frequency_penalty,
                        presence_penalty=excluded.presence_penalty, parameters=excluded.parameters,
                        system_prompt=excluded.system_prompt, active=excluded.active,
                        is_default=excluded.is_default",
                    rusqlite::params![
                        c.id.to_string(),
                        c.user_id.to_string(),
                        enum_to_sql(&c.role),
                        enum_to_sql(&c.provider),
                        c.model,
                        c.temperature,
                        c.max_tokens,
                        c.top_p,
                        c.frequency_penalty,
                        c.presence_penalty,
                        c.parameters.to_string(),
                        c.system_prompt,
                        c.active,
                        c.default,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_default_agent_config(
        &self,
        user_id: Uuid,
        role: crate::types::AgentRole,
    ) -> Result<Option<AgentConfig>, CoreError> {
        let user_id = user_id.to_string();
        let role = enum_to_sql(&role);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, role, provider, model, temperature, max_tokens, top_p,
                            frequency_penalty, presence_penalty, parameters, system_prompt,
                            active, is_default
                     FROM agent_configs WHERE user_id = ?1 AND role = ?2 AND is_default = 1",
                )?;
                let mut rows = stmt.query(rusqlite::params![user_id, role])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_agent_config(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let created_at_str: String = row.get(6)?;
    Ok(User {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        active: row.get(4)?,
        superuser: row.get(5)?,
        created_at: parse_dt(&created_at_str),
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let id_str: String = row.get(0)?;
    let owner_id_str: String = row.get(1)?;
    let status_str: String = row.get(5)?;
    let metadata_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    Ok(Project {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        owner_id: Uuid::parse_str(&owner_id_str).expect("valid uuid"),
        name: row.get(2)?,
        description: row.get(3)?,
        requirements: row.get(4)?,
        status: enum_from_sql::<ProjectStatus>(&status_str),
        workspace_path: row.get(6)?,
        progress: row.get(7)?,
        metadata: metadata_str.map(|s| serde_json::from_str(&s).expect("valid json")),
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    let id_str: String = row.get(0)?;
    let project_id_str: String = row.get(1)?;
    let user_id_str: String = row.get(2)?;
    let execution_type_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let agent_logs_str: String = row.get(5)?;
    let output_str: Option<String> = row.get(6)?;
    let started_at_str: String = row.get(8)?;
    let completed_at_str: Option<String> = row.get(9)?;

    Ok(Execution {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        project_id: Uuid::parse_str(&project_id_str).expect("valid uuid"),
        user_id: Uuid::parse_str(&user_id_str).expect("valid uuid"),
        execution_type: enum_from_sql::<ExecutionType>(&execution_type_str),
        status: enum_from_sql::<ExecutionStatus>(&status_str),
        agent_logs: serde_json::from_str::<Vec<AgentLogEntry>>(&agent_logs_str)
            .expect("valid json"),
        output: output_str.map(|s| serde_json::from_str(&s).expect("valid json")),
        error_message: row.get(7)?,
        started_at: parse_dt(&started_at_str),
        completed_at: completed_at_str.map(|s| parse_dt(&s)),
        duration_seconds: row.get(10)?,
        retry_count: row.get(11)?,
        max_retries: row.get(12)?,
    })
}

fn row_to_agent_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentConfig> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let provider_str: String = row.get(3)?;
    let parameters_str: Option<String> = row.get(10)?;

    Ok(AgentConfig {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        user_id: Uuid::parse_str(&user_id_str).expect("valid uuid"),
        role: enum_from_sql(&role_str),
        provider: enum_from_sql::<ModelProvider>(&provider_str),
        model: row.get(4)?,
        temperature: row.get(5)?,
        max_tokens: row.get(6)?,
        top_p: row.get(7)?,
        frequency_penalty: row.get(8)?,
        presence_penalty: row.get(9)?,
        parameters: parameters_str
            .map(|s| serde_json::from_str(&s).expect("valid json"))
            .unwrap_or(serde_json::Value::Null),
        system_prompt: row.get(11)?,
        active: row.get(12)?,
        default: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentConfig, AgentRole, ExecutionType, ModelProvider, ProjectStatus};

    #[tokio::test]
    async fn user_email_uniqueness_is_enforced() {
        let store = Store::new_in_memory().await.unwrap();
        let user = User::new("a@b.c", "ab", "hash");
        store.create_user(&user).await.unwrap();

        let dup = User::new("a@b.c", "other", "hash2");
        let result = store.create_user(&dup).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn project_roundtrips() {
        let store = Store::new_in_memory().await.unwrap();
        let user = User::new("a@b.c", "ab", "hash");
        store.create_user(&user).await.unwrap();

        let mut project = Project::new(user.id, "P", "build X", "/tmp/p");
        store.create_project(&project).await.unwrap();

        project.status = ProjectStatus::Active;
        project.progress = 50;
        store.update_project(&project).await.unwrap();

        let loaded = store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProjectStatus::Active);
        assert_eq!(loaded.progress, 50);
    }

    #[tokio::test]
    async fn only_one_default_agent_config_per_user_role() {
        let store = Store::new_in_memory().await.unwrap();
        let user = User::new("a@b.c", "ab", "hash");
        store.create_user(&user).await.unwrap();

        let mut first = AgentConfig::new(user.id, AgentRole::Engineer, ModelProvider::OpenAi, "gpt-4");
        first.default = true;
        store.upsert_agent_config(&first).await.unwrap();

        let mut second = AgentConfig::new(user.id, AgentRole::Engineer, ModelProvider::Anthropic, "claude");
        second.default = true;
        store.upsert_agent_config(&second).await.unwrap();

        let default = store
            .get_default_agent_config(user.id, AgentRole::Engineer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default.id, second.id);
    }

    #[tokio::test]
    async fn execution_roundtrips_with_logs() {
        let store = Store::new_in_memory().await.unwrap();
        let user = User::new("a@b.c", "ab", "hash");
        store.create_user(&user).await.unwrap();
        let project = Project::new(user.id, "P", "build X", "/tmp/p");
        store.create_project(&project).await.unwrap();

        let mut execution = Execution::new(project.id, user.id, ExecutionType::Full);
        execution.log(AgentRole::ProductManager, "drafted the brief");
        store.create_execution(&execution).await.unwrap();

        execution.finish(ExecutionStatus::Completed);
        store.update_execution(&execution).await.unwrap();

        let loaded = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.agent_logs.len(), 1);
        assert!(loaded.completed_at.is_some());
    }
}
