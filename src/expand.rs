//! `~` / environment-variable expansion and globbing for config paths.

use std::path::PathBuf;

/// Replace a leading `~` with the user's home directory.
pub fn expand_user(input: &str) -> String {
    let rest = match input.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return input.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), rest),
        None => input.to_string(),
    }
}

/// Substitute `$NAME` and `${NAME}` with environment values.
///
/// Unset variables and malformed references are left as written.
pub fn expand_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

fn expand_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &rest[pos + 1 + consumed..];
    }
    out.push_str(rest);
    out
}

/// `~` first, then environment variables.
pub fn expand_path(input: &str) -> PathBuf {
    PathBuf::from(expand_vars(&expand_user(input)))
}

/// All matches of `pattern` in glob order, or the pattern itself when nothing
/// matches (or it is not a valid glob).
pub fn glob_if_exists(pattern: &str) -> Vec<PathBuf> {
    let matches: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            tracing::debug!(pattern, error = %e, "not a valid glob pattern");
            Vec::new()
        }
    };
    if matches.is_empty() {
        vec![PathBuf::from(pattern)]
    } else {
        matches
    }
}
