//! Actions the pipeline tool understands and the options each one accepts.

use crate::error::PanelError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    Check,
    Destroy,
    Summarize,
}

const RUN_OPTIONS: &[&str] = &[
    "--ignore-flags",
    "--allow-duplicate-names",
    "--compute",
    "--env",
    "--limit",
    "--lump",
    "--lumpn",
    "--file-checks",
    "--dry-run",
    "--exclude-protocols",
    "--include-protocols",
    "--sp",
];

const CHECK_OPTIONS: &[&str] = &[
    "--all-folders",
    "--file-checks",
    "--dry-run",
    "--exclude-protocols",
    "--include-protocols",
    "--sp",
];

const DESTROY_OPTIONS: &[&str] = &[
    "--file-checks",
    "--force-yes",
    "--dry-run",
    "--exclude-protocols",
    "--include-protocols",
    "--sp",
];

const SUMMARIZE_OPTIONS: &[&str] = &[
    "--file-checks",
    "--dry-run",
    "--exclude-protocols",
    "--include-protocols",
    "--sp",
];

impl Action {
    pub const ALL: [Action; 4] = [Action::Run, Action::Check, Action::Destroy, Action::Summarize];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Run => "run",
            Action::Check => "check",
            Action::Destroy => "destroy",
            Action::Summarize => "summarize",
        }
    }

    /// Long option names offered for this action. Independent of any project.
    pub fn options(self) -> &'static [&'static str] {
        match self {
            Action::Run => RUN_OPTIONS,
            Action::Check => CHECK_OPTIONS,
            Action::Destroy => DESTROY_OPTIONS,
            Action::Summarize => SUMMARIZE_OPTIONS,
        }
    }

    pub fn accepts(self, option: &str) -> bool {
        self.options().contains(&option)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Run
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PanelError::UnknownAction(s.to_string()))
    }
}
