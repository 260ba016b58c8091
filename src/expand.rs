//! Preprocessing applied to a raw line before it is split into a chain.
//!
//! Expansion works on plain text and knows nothing about operators, so a
//! value containing `;` or `|` takes part in chain and pipeline splitting.

use crate::env::Environment;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

const GLOB_CHARS: &[char] = &['*', '?', '['];

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+)|(\?))").expect("static regex is valid")
    })
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\s|;&<>]+").expect("static regex is valid"))
}

/// Replace `$NAME`, `${NAME}` and `$?`. Unset variables become empty; a lone
/// `$` is kept.
pub fn expand_variables(line: &str, env: &Environment) -> String {
    variable_pattern()
        .replace_all(line, |caps: &Captures| {
            if caps.get(3).is_some() {
                return env.last_status.exit_code().to_string();
            }
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get_var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Replace each word containing `*`, `?` or `[` with the sorted paths it
/// matches relative to `cwd`. Words matching nothing are kept as typed.
pub fn expand_globs(line: &str, cwd: &Path) -> String {
    word_pattern()
        .replace_all(line, |caps: &Captures| {
            let word = &caps[0];
            glob_word(word, cwd).unwrap_or_else(|| word.to_string())
        })
        .into_owned()
}

fn glob_word(word: &str, cwd: &Path) -> Option<String> {
    if !word.contains(GLOB_CHARS) {
        return None;
    }
    let relative = !Path::new(word).is_absolute();
    let pattern = if relative {
        cwd.join(word).to_string_lossy().into_owned()
    } else {
        word.to_string()
    };
    let paths = glob::glob(&pattern)
        .map_err(|e| log::debug!("not a glob pattern `{word}`: {e}"))
        .ok()?;

    let matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| {
            let shown = if relative {
                path.strip_prefix(cwd).map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            };
            shown.to_string_lossy().into_owned()
        })
        .collect();
    if matches.is_empty() {
        None
    } else {
        Some(matches.join(" "))
    }
}

/// Variable expansion followed by wildcard expansion.
pub fn expand_line(line: &str, env: &Environment) -> String {
    let expanded = expand_variables(line, env);
    expand_globs(&expanded, &env.current_dir)
}
