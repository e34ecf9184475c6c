//! Skill registration — one skill per intent, last registration wins.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use millwright_core::types::Intent;

use crate::skill::Skill;

#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<Intent, Arc<dyn Skill>>,
    all: Vec<Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.all.push(skill.clone());
        for intent in skill.intents() {
            if let Some(previous) = self.skills.insert(*intent, skill.clone()) {
                info!(
                    intent = %intent,
                    replaced = previous.name(),
                    by = skill.name(),
                    "skill re-registered for intent"
                );
            } else {
                info!(intent = %intent, skill = skill.name(), "registered skill");
            }
        }
    }

    pub fn get(&self, intent: Intent) -> Option<Arc<dyn Skill>> {
        self.skills.get(&intent).cloned()
    }

    pub fn all_skills(&self) -> &[Arc<dyn Skill>] {
        &self.all
    }

    pub fn skill_names(&self) -> Vec<&'static str> {
        self.all.iter().map(|s| s.name()).collect()
    }

    /// Register every built-in skill, skipping names in `disabled`.
    pub fn register_builtins(&mut self, disabled: &[String]) {
        use crate::builtin::*;

        let builtins: Vec<Arc<dyn Skill>> = vec![
            Arc::new(diagnose::DiagnoseSkill),
            Arc::new(status::StatusSkill),
            Arc::new(photo::PhotoSkill),
            Arc::new(work_order::WorkOrderSkill),
            Arc::new(admin::AdminSkill),
            Arc::new(help::HelpSkill),
            Arc::new(search::SearchSkill),
            Arc::new(shell::ShellSkill),
            Arc::new(diagram::DiagramSkill),
            Arc::new(gist::GistSkill),
            Arc::new(project::ProjectSkill),
            Arc::new(chat::ChatSkill),
        ];
        for skill in builtins {
            if disabled.iter().any(|d| d == skill.name()) {
                info!(skill = skill.name(), "skill disabled by config");
                continue;
            }
            self.register(skill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_user_facing_intent() {
        let mut registry = SkillRegistry::new();
        registry.register_builtins(&[]);
        for intent in [
            Intent::Diagnose,
            Intent::Status,
            Intent::Photo,
            Intent::WorkOrder,
            Intent::Chat,
            Intent::Admin,
            Intent::Help,
            Intent::Search,
            Intent::Shell,
            Intent::Diagram,
            Intent::Gist,
            Intent::Project,
            Intent::Unknown,
        ] {
            assert!(registry.get(intent).is_some(), "no skill for {intent}");
        }
    }

    #[test]
    fn disabled_skills_are_skipped() {
        let mut registry = SkillRegistry::new();
        registry.register_builtins(&["shell".to_string()]);
        assert!(registry.get(Intent::Shell).is_none());
        assert!(!registry.skill_names().contains(&"shell"));
    }
}
