//! Small helpers shared across the crate that don't belong to any one module.

pub mod units;

use std::path::{Path, PathBuf};

/// Expand a leading `~` into `$HOME`, the way a shell would for an unquoted path.
pub fn tilde_expansion(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// Split a shell-style argument string into a `Vec<String>`, honoring quoting.
pub fn parse_string_as_args(s: &str) -> anyhow::Result<Vec<String>> {
    shell_words::split(s).map_err(|e| anyhow::anyhow!("could not parse argument string: {e}"))
}

/// Resolve a plugin path to an absolute, executable, regular file.
///
/// Looks the name up on `PATH` if it isn't already a path, then canonicalizes
/// and verifies it.
pub fn resolve_plugin_path(raw: &str) -> anyhow::Result<PathBuf> {
    let candidate = tilde_expansion(raw);
    let resolved = if candidate.components().count() > 1 || candidate.is_absolute() {
        candidate
    } else {
        which::which(&candidate)
            .map_err(|e| anyhow::anyhow!("could not locate plugin '{raw}' on PATH: {e}"))?
    };

    let resolved = resolved
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("could not canonicalize plugin path '{raw}': {e}"))?;

    verify_plugin_path(&resolved)?;
    Ok(resolved)
}

fn verify_plugin_path(path: &Path) -> anyhow::Result<()> {
    let meta = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("plugin path '{}' does not exist: {e}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("plugin path '{}' is not a regular file", path.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            anyhow::bail!("plugin path '{}' is not executable", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_home() {
        std::env::set_var("HOME", "/home/alice");
        assert_eq!(tilde_expansion("~/bin/foo"), PathBuf::from("/home/alice/bin/foo"));
    }

    #[test]
    fn tilde_leaves_absolute_paths_alone() {
        assert_eq!(tilde_expansion("/usr/bin/foo"), PathBuf::from("/usr/bin/foo"));
    }

    #[test]
    fn parses_quoted_args() {
        let args = parse_string_as_args("--name \"hello world\" --flag").unwrap();
        assert_eq!(args, vec!["--name", "hello world", "--flag"]);
    }

    #[test]
    fn resolve_plugin_path_accepts_an_executable_file() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin");
        std::fs::File::create(&path).unwrap().write_all(b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolved = resolve_plugin_path(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved, path.canonicalize().unwrap());
    }

    #[test]
    fn resolve_plugin_path_rejects_a_non_executable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin");
        std::fs::File::create(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(resolve_plugin_path(path.to_str().unwrap()).is_err());
    }
}
