//! Environment-variable expansion for target paths.
//!
//! Resolution is deterministic and side-effect-free: it rewrites the path
//! string, never touches the filesystem, and never fails. References that
//! cannot be resolved (unknown name, malformed syntax) are left verbatim
//! so path resolution can never block collection.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `$NAME` and `${NAME}` references.
fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static pattern compiles")
    })
}

/// Expand variable references in `path` through `lookup`.
pub fn expand<F>(path: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    var_pattern()
        .replace_all(path, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand variable references against the process environment.
pub fn expand_env(path: &str) -> String {
    expand(path, |name| std::env::var(name).ok())
}
