//! Project configuration model: name, samples, output directory, subprojects.

use crate::expand::expand_path;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Cannot read project config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Project config {path} is not valid YAML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Project config {0} must be a YAML mapping")]
    NotAMapping(PathBuf),
    #[error("Project config {0} has no metadata.output_dir")]
    MissingOutputDir(PathBuf),
    #[error("Cannot read sample annotation {path}: {source}")]
    Annotation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Subproject '{name}' not found. Available: {}", available.join(", "))]
    UnknownSubproject { name: String, available: Vec<String> },
}

/// A loaded project config, optionally with one subproject overlay applied.
#[derive(Debug, Clone)]
pub struct Project {
    config_file: PathBuf,
    base: Mapping,
    name: String,
    output_dir: PathBuf,
    sample_count: usize,
    subprojects: Vec<String>,
    active_subproject: Option<String>,
}

impl Project {
    pub fn load(config_file: &Path) -> Result<Self, ProjectError> {
        let text = fs::read_to_string(config_file).map_err(|source| ProjectError::Read {
            path: config_file.to_path_buf(),
            source,
        })?;
        let doc: Value = serde_yaml::from_str(&text).map_err(|source| ProjectError::Parse {
            path: config_file.to_path_buf(),
            source,
        })?;
        let base = match doc {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => return Err(ProjectError::NotAMapping(config_file.to_path_buf())),
        };

        let subprojects = base
            .get("subprojects")
            .and_then(Value::as_mapping)
            .map(|m| m.keys().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let mut project = Self {
            config_file: config_file.to_path_buf(),
            base,
            name: String::new(),
            output_dir: PathBuf::new(),
            sample_count: 0,
            subprojects,
            active_subproject: None,
        };
        let effective = project.base.clone();
        project.apply(&effective)?;
        Ok(project)
    }

    /// Layer the named subproject over the base document.
    ///
    /// Activation always starts from the base config, so activating two
    /// subprojects in a row does not stack them.
    pub fn activate_subproject(&mut self, name: &str) -> Result<(), ProjectError> {
        let overlay = self
            .base
            .get("subprojects")
            .and_then(Value::as_mapping)
            .and_then(|m| m.get(name))
            .cloned()
            .ok_or_else(|| ProjectError::UnknownSubproject {
                name: name.to_string(),
                available: self.subprojects.clone(),
            })?;

        let mut effective = self.base.clone();
        if let Value::Mapping(overlay) = overlay {
            merge(&mut effective, &overlay);
        }
        self.apply(&effective)?;
        self.active_subproject = Some(name.to_string());
        Ok(())
    }

    fn apply(&mut self, doc: &Mapping) -> Result<(), ProjectError> {
        let config_dir = self
            .config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let metadata = doc.get("metadata").and_then(Value::as_mapping);
        let output_dir = metadata
            .and_then(|m| m.get("output_dir"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProjectError::MissingOutputDir(self.config_file.clone()))?;

        let annotation = metadata
            .and_then(|m| m.get("sample_annotation").or_else(|| m.get("sample_table")))
            .and_then(Value::as_str);
        let sample_count = match annotation {
            Some(table) => count_rows(&resolve(&config_dir, table))?,
            None => doc
                .get("samples")
                .and_then(Value::as_sequence)
                .map(Vec::len)
                .unwrap_or(0),
        };

        // Nothing is assigned until every field resolved.
        self.name = doc
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_name(&self.config_file));
        self.output_dir = resolve(&config_dir, output_dir);
        self.sample_count = sample_count;
        Ok(())
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn num_samples(&self) -> usize {
        self.sample_count
    }

    pub fn subprojects(&self) -> &[String] {
        &self.subprojects
    }

    pub fn active_subproject(&self) -> Option<&str> {
        self.active_subproject.as_deref()
    }
}

fn default_name(config_file: &Path) -> String {
    config_file
        .parent()
        .and_then(Path::file_name)
        .or_else(|| config_file.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn resolve(config_dir: &Path, raw: &str) -> PathBuf {
    let path = expand_path(raw);
    if path.is_absolute() {
        path
    } else {
        config_dir.join(path)
    }
}

/// Data rows of a CSV table: non-blank lines after the header.
fn count_rows(path: &Path) -> Result<usize, ProjectError> {
    let text = fs::read_to_string(path).map_err(|source| ProjectError::Annotation {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
        .saturating_sub(1))
}

/// Recursive mapping merge; overlay values win, nested mappings merge.
fn merge(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a project with a 3-sample base table and a 1-sample `small`
    /// subproject. Returns the config path.
    pub(crate) fn write_fixture(dir: &Path, name: &str) -> PathBuf {
        let project_dir = dir.join(name);
        fs::create_dir_all(&project_dir).expect("mkdir");
        fs::write(project_dir.join("samples.csv"), "sample,file\na,1\nb,2\nc,3\n").expect("csv");
        fs::write(project_dir.join("small.csv"), "sample,file\na,1\n").expect("csv");
        let config = project_dir.join("config.yaml");
        fs::write(
            &config,
            format!(
                "name: {name}\n\
                 metadata:\n  output_dir: results\n  sample_annotation: samples.csv\n\
                 subprojects:\n  small:\n    metadata:\n      sample_annotation: small.csv\n"
            ),
        )
        .expect("config");
        config
    }

    #[test]
    fn loads_name_output_dir_and_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write_fixture(dir.path(), "alpha");
        let project = Project::load(&config).expect("load");
        assert_eq!(project.name(), "alpha");
        assert_eq!(project.output_dir(), dir.path().join("alpha").join("results"));
        assert_eq!(project.num_samples(), 3);
        assert_eq!(project.subprojects(), ["small".to_string()]);
        assert!(project.active_subproject().is_none());
    }

    #[test]
    fn subproject_overlay_changes_sample_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write_fixture(dir.path(), "alpha");
        let mut project = Project::load(&config).expect("load");
        project.activate_subproject("small").expect("activate");
        assert_eq!(project.num_samples(), 1);
        assert_eq!(project.active_subproject(), Some("small"));
    }

    #[test]
    fn top_level_list_is_not_a_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("config.yaml");
        fs::write(&config, "- output_dir: results\n").expect("config");
        let err = Project::load(&config).unwrap_err();
        assert!(matches!(err, ProjectError::NotAMapping(ref p) if p == &config));
        assert!(err.to_string().contains("must be a YAML mapping"));
    }

    #[test]
    fn unknown_subproject_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write_fixture(dir.path(), "alpha");
        let mut project = Project::load(&config).expect("load");
        let err = project.activate_subproject("huge").unwrap_err();
        assert!(matches!(err, ProjectError::UnknownSubproject { ref name, .. } if name == "huge"));
        assert_eq!(project.num_samples(), 3);
    }

    #[test]
    fn inline_samples_and_default_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let project_dir = dir.path().join("beta");
        fs::create_dir_all(&project_dir).expect("mkdir");
        let config = project_dir.join("project_config.yaml");
        fs::write(
            &config,
            "metadata:\n  output_dir: /tmp/beta_out\nsamples:\n  - a\n  - b\n",
        )
        .expect("write");
        let project = Project::load(&config).expect("load");
        assert_eq!(project.name(), "beta");
        assert_eq!(project.num_samples(), 2);
        assert_eq!(project.output_dir(), Path::new("/tmp/beta_out"));
        assert!(project.subprojects().is_empty());
    }

    #[test]
    fn missing_output_dir_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("c.yaml");
        fs::write(&config, "name: c\n").expect("write");
        assert!(matches!(
            Project::load(&config),
            Err(ProjectError::MissingOutputDir(_))
        ));
    }
}
