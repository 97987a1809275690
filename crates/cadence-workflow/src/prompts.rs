//! Prompt templates for the four pipeline stages.
//!
//! Each [`AgentRole`] in [`AgentRole::PIPELINE`] has a built-in system
//! prompt; a project may override any of them by dropping a matching
//! file under `.claude/prompts/`. Variables in a template are expanded
//! at render time: `{title}`, `{description}`, `{context}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cadence_core::types::AgentRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub role: AgentRole,
    pub name: String,
    pub template: String,
    pub source: PromptSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    BuiltIn,
    File(PathBuf),
}

impl PromptTemplate {
    pub fn render(&self, vars: &HashMap<String, String>) -> String {
        let mut output = self.template.clone();
        for (key, value) in vars {
            output = output.replace(&format!("{{{key}}}"), value);
        }
        output
    }

    pub fn render_task(&self, title: &str, description: &str, context: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("title".into(), title.into());
        vars.insert("description".into(), description.into());
        vars.insert("context".into(), context.into());
        self.render(&vars)
    }
}

#[derive(Debug)]
pub struct PromptRegistry {
    templates: HashMap<AgentRole, PromptTemplate>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            templates: HashMap::new(),
        };
        reg.load_defaults();
        reg
    }

    pub fn get(&self, role: &AgentRole) -> Option<&PromptTemplate> {
        self.templates.get(role)
    }

    pub fn set(&mut self, template: PromptTemplate) {
        self.templates.insert(template.role, template);
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Load project-specific prompt overrides from `.claude/prompts/*.md`.
    pub fn load_from_project(&mut self, project_root: &Path) {
        let prompts_dir = project_root.join(".claude").join("prompts");
        let Ok(entries) = std::fs::read_dir(&prompts_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "md") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let name = path.file_stem().unwrap_or_default().to_string_lossy().to_string();
            if let Some(role) = role_from_prompt_name(&name) {
                self.set(PromptTemplate {
                    role,
                    name: name.clone(),
                    template: content,
                    source: PromptSource::File(path),
                });
            }
        }
    }

    fn load_defaults(&mut self) {
        for tpl in built_in_templates() {
            self.templates.insert(tpl.role, tpl);
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn role_from_prompt_name(name: &str) -> Option<AgentRole> {
    match name {
        "product_manager" => Some(AgentRole::ProductManager),
        "architect" => Some(AgentRole::Architect),
        "engineer" => Some(AgentRole::Engineer),
        "qa_engineer" => Some(AgentRole::QaEngineer),
        _ => None,
    }
}

fn built_in_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate {
            role: AgentRole::ProductManager,
            name: "product_manager".into(),
            template: PRODUCT_MANAGER_PROMPT.into(),
            source: PromptSource::BuiltIn,
        },
        PromptTemplate {
            role: AgentRole::Architect,
            name: "architect".into(),
            template: ARCHITECT_PROMPT.into(),
            source: PromptSource::BuiltIn,
        },
        PromptTemplate {
            role: AgentRole::Engineer,
            name: "engineer".into(),
            template: ENGINEER_PROMPT.into(),
            source: PromptSource::BuiltIn,
        },
        PromptTemplate {
            role: AgentRole::QaEngineer,
            name: "qa_engineer".into(),
            template: QA_ENGINEER_PROMPT.into(),
            source: PromptSource::BuiltIn,
        },
    ]
}

const PRODUCT_MANAGER_PROMPT: &str = "\
You are the product manager for this project. Turn the following \
requirements into a concrete product brief: goals, user stories, and \
acceptance criteria. Be specific enough that an architect can design \
against it without guessing.

Project: {title}
Requirements: {description}
Context: {context}";

const ARCHITECT_PROMPT: &str = "\
You are the architect for this project. Given the product brief below, \
produce a technical design: module boundaries, data model, and the \
key interfaces between components. Flag any requirement that is \
ambiguous or under-specified.

Project: {title}
Product brief: {description}
Context: {context}";

const ENGINEER_PROMPT: &str = "\
You are the engineer implementing this project. Given the technical \
design below, produce the implementation plan and the code changes \
needed to satisfy it. Call out any design decision you had to make \
that the architect didn't specify.

Project: {title}
Technical design: {description}
Context: {context}";

const QA_ENGINEER_PROMPT: &str = "\
You are the QA engineer reviewing this project. Given the \
implementation below, identify correctness issues, missing edge-case \
handling, and test coverage gaps. Be concrete: name the file, the \
input, and the expected versus actual behavior.

Project: {title}
Implementation: {description}
Context: {context}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_loads_all_four_pipeline_roles() {
        let registry = PromptRegistry::new();
        assert_eq!(registry.count(), 4);
        for role in AgentRole::PIPELINE {
            assert!(registry.get(&role).is_some(), "missing template for {role:?}");
        }
    }

    #[test]
    fn render_task_substitutes_all_three_variables() {
        let registry = PromptRegistry::new();
        let tpl = registry.get(&AgentRole::ProductManager).unwrap();
        let rendered = tpl.render_task("Widget API", "build a CRUD API", "greenfield project");
        assert!(rendered.contains("Widget API"));
        assert!(rendered.contains("build a CRUD API"));
        assert!(rendered.contains("greenfield project"));
        assert!(!rendered.contains("{title}"));
    }

    #[test]
    fn set_overrides_existing_template() {
        let mut registry = PromptRegistry::new();
        registry.set(PromptTemplate {
            role: AgentRole::Engineer,
            name: "engineer".into(),
            template: "custom template {title}".into(),
            source: PromptSource::BuiltIn,
        });
        assert_eq!(registry.get(&AgentRole::Engineer).unwrap().template, "custom template {title}");
        assert_eq!(registry.count(), 4);
    }

    #[test]
    fn unrecognized_prompt_filename_maps_to_none() {
        assert!(role_from_prompt_name("not_a_role").is_none());
    }
}
