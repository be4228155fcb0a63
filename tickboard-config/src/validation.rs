use std::collections::HashSet;

use crate::models::ProjectConfig;

/// Non-fatal configuration problem surfaced at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Drop duplicate ids (first wins) and flag missing project folders.
pub(crate) fn dedupe_projects(
    projects: Vec<ProjectConfig>,
    warnings: &mut ConfigWarnings,
) -> Vec<ProjectConfig> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(projects.len());

    for project in projects {
        if project.id.trim().is_empty() {
            warnings.push(format!(
                "project at {} has an empty id and was skipped",
                project.path.display()
            ));
            continue;
        }

        if !seen.insert(project.id.clone()) {
            warnings.push_with_hint(
                format!("duplicate project id '{}' ignored", project.id),
                "Project ids must be unique; rename one of the entries",
            );
            continue;
        }

        if !project.path.exists() {
            warnings.push(format!(
                "project '{}' path {} does not exist",
                project.id,
                project.path.display()
            ));
        }

        kept.push(project);
    }

    kept
}
