//! Per-role execution configuration for the four pipeline stages.

use cadence_core::types::AgentRole;

/// Behavior specific to one stage of the pipeline: the tools it's allowed
/// to invoke, how many turns it gets, and hooks run before and after
/// generation. System prompts themselves live in [`crate::prompts`].
pub trait RoleConfig: Send + Sync {
    fn role(&self) -> AgentRole;
    fn allowed_tools(&self) -> Vec<String>;
    fn max_turns(&self) -> u32;

    /// Called with the rendered prompt before it's sent to the model.
    /// Returning `Some(..)` replaces the prompt.
    fn pre_execute(&self, _prompt: &str) -> Option<String> {
        None
    }

    /// Called with the model's raw output before it's logged.
    /// Returning `Some(..)` replaces the output.
    fn post_execute(&self, _output: &str) -> Option<String> {
        None
    }

    /// A model override for this role. None of the four built-in stages
    /// need one; a custom role registered at runtime might.
    fn preferred_model(&self) -> Option<&str> {
        None
    }
}

pub struct ProductManagerRole;

impl RoleConfig for ProductManagerRole {
    fn role(&self) -> AgentRole {
        AgentRole::ProductManager
    }

    fn allowed_tools(&self) -> Vec<String> {
        vec!["read_requirements".into()]
    }

    fn max_turns(&self) -> u32 {
        1
    }
}

pub struct ArchitectRole;

impl RoleConfig for ArchitectRole {
    fn role(&self) -> AgentRole {
        AgentRole::Architect
    }

    fn allowed_tools(&self) -> Vec<String> {
        vec!["read_requirements".into(), "read_product_brief".into()]
    }

    fn max_turns(&self) -> u32 {
        1
    }
}

pub struct EngineerRole;

impl RoleConfig for EngineerRole {
    fn role(&self) -> AgentRole {
        AgentRole::Engineer
    }

    fn allowed_tools(&self) -> Vec<String> {
        vec!["read_design".into(), "write_code".into()]
    }

    fn max_turns(&self) -> u32 {
        3
    }
}

pub struct QaEngineerRole;

impl RoleConfig for QaEngineerRole {
    fn role(&self) -> AgentRole {
        AgentRole::QaEngineer
    }

    fn allowed_tools(&self) -> Vec<String> {
        vec!["read_implementation".into(), "run_tests".into()]
    }

    fn max_turns(&self) -> u32 {
        2
    }

    fn post_execute(&self, output: &str) -> Option<String> {
        if output.trim().is_empty() {
            Some("QA produced no findings.".to_string())
        } else {
            None
        }
    }
}

/// Resolves the built-in [`RoleConfig`] for a pipeline role. `ProjectManager`
/// and `Custom` fall back to the engineer profile until a caller registers
/// something more specific.
pub fn role_config(role: AgentRole) -> Box<dyn RoleConfig> {
    match role {
        AgentRole::ProductManager => Box::new(ProductManagerRole),
        AgentRole::Architect => Box::new(ArchitectRole),
        AgentRole::Engineer => Box::new(EngineerRole),
        AgentRole::QaEngineer => Box::new(QaEngineerRole),
        AgentRole::ProjectManager | AgentRole::Custom => Box::new(EngineerRole),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_roles_each_resolve_a_config() {
        for role in AgentRole::PIPELINE {
            let config = role_config(role);
            assert_eq!(config.role(), role);
            assert!(config.max_turns() >= 1);
        }
    }

    #[test]
    fn qa_engineer_flags_empty_output() {
        let config = QaEngineerRole;
        assert_eq!(
            config.post_execute("   ").as_deref(),
            Some("QA produced no findings.")
        );
        assert!(config.post_execute("found a bug").is_none());
    }

    #[test]
    fn default_hooks_are_no_ops() {
        let config = ProductManagerRole;
        assert!(config.pre_execute("anything").is_none());
        assert!(config.preferred_model().is_none());
    }
}
