//! Makes a project's generated summary report reachable over HTTP.
//!
//! A request is served from the output directory of the project the session
//! has selected when the names agree. Otherwise it falls back to the
//! directories published so far, keyed by project name.

use crate::error::PanelError;
use crate::workspace::SummaryInfo;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryLink {
    Available { href: String, file_name: String },
    NotAvailable { file_name: String },
}

#[derive(Debug, Default)]
pub struct SummaryPublisher {
    roots: RwLock<HashMap<String, PathBuf>>,
}

impl SummaryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose the project's output directory if its summary report exists.
    ///
    /// Publishing a name that is already registered keeps the existing entry.
    pub async fn publish(&self, info: &SummaryInfo) -> SummaryLink {
        let report = info.output_dir.join(&info.summary_html);
        if !tokio::fs::metadata(&report)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            debug!(report = %report.display(), "summary not generated yet");
            return SummaryLink::NotAvailable {
                file_name: info.summary_html.clone(),
            };
        }

        let mut roots = self.roots.write().await;
        if let Some(existing) = roots.get(&info.name) {
            if existing != &info.output_dir {
                warn!(
                    project = %info.name,
                    published = %existing.display(),
                    requested = %info.output_dir.display(),
                    "another directory is already published under this name"
                );
            } else {
                debug!(project = %info.name, "summary directory already published");
            }
        } else {
            info!(project = %info.name, dir = %info.output_dir.display(), "publishing summary directory");
            roots.insert(info.name.clone(), info.output_dir.clone());
        }

        SummaryLink::Available {
            href: format!("{}/summary/{}", info.name, info.summary_html),
            file_name: info.summary_html.clone(),
        }
    }

    /// Resolve `relative` inside the directory published as `name`.
    pub async fn resolve(&self, name: &str, relative: &str) -> Result<PathBuf, PanelError> {
        let root = self
            .roots
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or(PanelError::NotFound)?;
        resolve_within(&root, relative).await
    }
}

/// Resolve `relative` inside `root`, refusing anything that leaves it.
pub async fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, PanelError> {
    let requested = Path::new(relative);
    if !requested
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        warn!(path = %relative, "rejected summary path outside the published directory");
        return Err(PanelError::NotFound);
    }

    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| PanelError::NotFound)?;
    let candidate = tokio::fs::canonicalize(root.join(requested))
        .await
        .map_err(|_| PanelError::NotFound)?;
    // Symlinks may still point elsewhere.
    if !candidate.starts_with(&root) {
        warn!(path = %relative, "rejected summary path resolving outside the published directory");
        return Err(PanelError::NotFound);
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn summary_for(output_dir: &Path) -> SummaryInfo {
        SummaryInfo {
            name: "alpha".to_string(),
            config_file: output_dir.join("config.yaml"),
            sample_count: 3,
            output_dir: output_dir.to_path_buf(),
            summary_html: "alpha_summary.html".to_string(),
            subprojects: Vec::new(),
            active_subproject: None,
        }
    }

    #[tokio::test]
    async fn missing_report_is_not_available() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = SummaryPublisher::new();
        let link = publisher.publish(&summary_for(dir.path())).await;
        assert_eq!(
            link,
            SummaryLink::NotAvailable {
                file_name: "alpha_summary.html".to_string()
            }
        );
        assert!(publisher.resolve("alpha", "alpha_summary.html").await.is_err());
    }

    #[tokio::test]
    async fn publishing_twice_returns_the_same_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("alpha_summary.html"), "<html></html>").expect("write");
        let publisher = SummaryPublisher::new();
        let info = summary_for(dir.path());

        let first = publisher.publish(&info).await;
        let second = publisher.publish(&info).await;
        assert_eq!(first, second);
        assert_eq!(
            first,
            SummaryLink::Available {
                href: "alpha/summary/alpha_summary.html".to_string(),
                file_name: "alpha_summary.html".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn same_name_from_another_directory_keeps_the_first() {
        let base = tempfile::tempdir().expect("tempdir");
        let (a, b) = (base.path().join("a"), base.path().join("b"));
        for dir in [&a, &b] {
            fs::create_dir_all(dir).expect("mkdir");
            fs::write(dir.join("alpha_summary.html"), "ok").expect("write");
        }
        let publisher = SummaryPublisher::new();
        let first = publisher.publish(&summary_for(&a)).await;
        let second = publisher.publish(&summary_for(&b)).await;
        assert_eq!(first, second);

        let registered = publisher.resolve("alpha", "alpha_summary.html").await.expect("file");
        assert!(registered.starts_with(fs::canonicalize(&a).expect("canonical")));
        let own = resolve_within(&b, "alpha_summary.html").await.expect("file");
        assert!(own.starts_with(fs::canonicalize(&b).expect("canonical")));
    }

    #[tokio::test]
    async fn resolves_nested_files_and_rejects_traversal() {
        let base = tempfile::tempdir().expect("tempdir");
        let out = base.path().join("out");
        fs::create_dir_all(out.join("reports")).expect("mkdir");
        fs::write(out.join("alpha_summary.html"), "ok").expect("write");
        fs::write(out.join("reports").join("s1.html"), "ok").expect("write");
        fs::write(base.path().join("secret.txt"), "no").expect("write");

        let publisher = SummaryPublisher::new();
        publisher.publish(&summary_for(&out)).await;

        let nested = publisher.resolve("alpha", "reports/s1.html").await.expect("nested");
        assert!(nested.ends_with("reports/s1.html"));
        assert!(publisher.resolve("alpha", "../secret.txt").await.is_err());
        assert!(publisher.resolve("alpha", "reports/../../secret.txt").await.is_err());
        assert!(publisher.resolve("alpha", "/etc/passwd").await.is_err());
        assert!(publisher.resolve("beta", "alpha_summary.html").await.is_err());
    }

    #[tokio::test]
    async fn symlinks_out_of_the_directory_are_rejected() {
        let base = tempfile::tempdir().expect("tempdir");
        let out = base.path().join("out");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("alpha_summary.html"), "ok").expect("write");
        fs::write(base.path().join("secret.txt"), "no").expect("write");
        std::os::unix::fs::symlink(base.path().join("secret.txt"), out.join("link.txt"))
            .expect("symlink");

        let publisher = SummaryPublisher::new();
        publisher.publish(&summary_for(&out)).await;
        assert!(publisher.resolve("alpha", "link.txt").await.is_err());
    }
}
