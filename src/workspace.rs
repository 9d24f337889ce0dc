//! The project a session is currently working on.

use crate::error::PanelError;
use crate::expand::expand_path;
use crate::project::{Project, ProjectError};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESET_SUBPROJECT: &str = "reset";

/// Snapshot of the selected project as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryInfo {
    pub name: String,
    pub config_file: PathBuf,
    pub sample_count: usize,
    pub output_dir: PathBuf,
    pub summary_html: String,
    pub subprojects: Vec<String>,
    pub active_subproject: Option<String>,
}

impl SummaryInfo {
    fn of(project: &Project) -> Self {
        Self {
            name: project.name().to_string(),
            config_file: project.config_file().to_path_buf(),
            sample_count: project.num_samples(),
            output_dir: project.output_dir().to_path_buf(),
            summary_html: format!("{}_summary.html", project.name()),
            subprojects: project.subprojects().to_vec(),
            active_subproject: project.active_subproject().map(str::to_string),
        }
    }

    /// Status line for the subproject picker.
    pub fn subproject_text(&self) -> String {
        match &self.active_subproject {
            Some(name) => format!("Activated subproject: {}", name),
            None => "No subproject activated".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveProject {
    config_file: PathBuf,
    project: Project,
    summary: SummaryInfo,
}

impl ActiveProject {
    /// Load `path` from disk; nothing is cached between calls.
    pub fn select(path: &str) -> Result<Self, ProjectError> {
        let config_file = expand_path(path);
        let project = Project::load(&config_file)?;
        let summary = SummaryInfo::of(&project);
        info!(config = %config_file.display(), name = %summary.name,
              samples = summary.sample_count, "project selected");
        Ok(Self {
            config_file,
            project,
            summary,
        })
    }

    /// Activate `name`, or go back to the base project for `"reset"`.
    pub fn activate_subproject(&mut self, name: &str) -> Result<&SummaryInfo, ProjectError> {
        if name == RESET_SUBPROJECT {
            self.project = Project::load(&self.config_file)?;
        } else {
            self.project.activate_subproject(name)?;
        }
        self.summary = SummaryInfo::of(&self.project);
        info!(subproject = %name, samples = self.summary.sample_count, "subproject changed");
        Ok(&self.summary)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn summary(&self) -> &SummaryInfo {
        &self.summary
    }
}

/// Summary of the session's project, if one was ever selected.
pub fn describe(active: Option<&ActiveProject>) -> Result<&SummaryInfo, PanelError> {
    active
        .map(ActiveProject::summary)
        .ok_or(PanelError::NoProjectSelected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::write_fixture;
    use std::fs;

    #[test]
    fn describe_without_selection_fails() {
        assert!(matches!(describe(None), Err(PanelError::NoProjectSelected)));
    }

    #[test]
    fn select_then_describe_reflects_the_new_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alpha = write_fixture(dir.path(), "alpha");
        let beta = write_fixture(dir.path(), "beta");
        fs::write(
            beta.parent().expect("parent").join("samples.csv"),
            "sample\nx\ny\n",
        )
        .expect("csv");

        let mut active = ActiveProject::select(&alpha.to_string_lossy()).expect("alpha");
        assert_eq!(describe(Some(&active)).expect("describe").sample_count, 3);

        active = ActiveProject::select(&beta.to_string_lossy()).expect("beta");
        let info = describe(Some(&active)).expect("describe");
        assert_eq!(info.name, "beta");
        assert_eq!(info.sample_count, 2);
        assert_eq!(info.summary_html, "beta_summary.html");
    }

    #[test]
    fn reselecting_the_same_path_reloads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alpha = write_fixture(dir.path(), "alpha");
        let first = ActiveProject::select(&alpha.to_string_lossy()).expect("first");
        assert_eq!(first.summary().sample_count, 3);

        fs::write(
            alpha.parent().expect("parent").join("samples.csv"),
            "sample\nonly\n",
        )
        .expect("csv");
        let second = ActiveProject::select(&alpha.to_string_lossy()).expect("second");
        assert_eq!(second.summary().sample_count, 1);
    }

    #[test]
    fn reset_restores_base_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alpha = write_fixture(dir.path(), "alpha");
        let mut active = ActiveProject::select(&alpha.to_string_lossy()).expect("select");

        let info = active.activate_subproject("small").expect("small");
        assert_eq!(info.sample_count, 1);
        assert_eq!(info.subproject_text(), "Activated subproject: small");

        let info = active.activate_subproject(RESET_SUBPROJECT).expect("reset");
        assert_eq!(info.sample_count, 3);
        assert!(info.active_subproject.is_none());
        assert_eq!(info.subproject_text(), "No subproject activated");
    }

    #[test]
    fn unknown_subproject_keeps_previous_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alpha = write_fixture(dir.path(), "alpha");
        let mut active = ActiveProject::select(&alpha.to_string_lossy()).expect("select");
        assert!(active.activate_subproject("missing").is_err());
        assert_eq!(active.summary().sample_count, 3);
    }
}
