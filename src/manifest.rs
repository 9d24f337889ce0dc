//! Loads the manifest listing the project configs offered on the start page.

use crate::error::PanelError;
use crate::expand::{expand_path, expand_user, glob_if_exists};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "CARAVEL";
pub const CONFIG_PRJ_KEY: &str = "projects";

#[derive(Debug, Deserialize)]
struct Manifest {
    projects: Option<Vec<String>>,
}

/// Manifest location: the explicit value wins over the environment variable.
pub fn manifest_path(explicit: Option<&Path>) -> Result<PathBuf, PanelError> {
    let raw = match explicit {
        Some(path) => path.to_string_lossy().into_owned(),
        None => std::env::var(CONFIG_ENV_VAR).map_err(|_| {
            PanelError::Config(format!(
                "Please set the environment variable {} or provide a YAML file \
                 listing paths to project config files",
                CONFIG_ENV_VAR
            ))
        })?,
    };
    Ok(PathBuf::from(expand_user(&raw)))
}

/// Concrete project config paths, in manifest order then glob order.
pub fn load_projects(manifest: &Path) -> Result<Vec<PathBuf>, PanelError> {
    if !manifest.is_file() {
        return Err(PanelError::Config(format!(
            "Project configs list isn't a file: {}",
            manifest.display()
        )));
    }
    let text = fs::read_to_string(manifest).map_err(|e| {
        PanelError::Config(format!("Cannot read {}: {}", manifest.display(), e))
    })?;
    let parsed: Manifest = serde_yaml::from_str(&text).map_err(|e| {
        PanelError::Config(format!("Invalid manifest {}: {}", manifest.display(), e))
    })?;
    let patterns = parsed.projects.ok_or_else(|| {
        PanelError::Config(format!(
            "'{}' key not in the projects list file {}",
            CONFIG_PRJ_KEY,
            manifest.display()
        ))
    })?;

    let projects: Vec<PathBuf> = patterns
        .iter()
        .flat_map(|pattern| {
            let expanded = expand_path(pattern);
            debug!(pattern = %pattern, expanded = %expanded.display(), "expanding project pattern");
            glob_if_exists(&expanded.to_string_lossy())
        })
        .collect();
    info!(manifest = %manifest.display(), count = projects.len(), "loaded project list");
    Ok(projects)
}
