//! Fixed naming conventions and the runtime inputs that locate commands.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Directory names recognised as command stores: a visible one and a hidden one.
pub const STORE_DIR_NAMES: [&str; 2] = ["ash", ".ash"];

/// A file `<name>.ash` inside a store is the command `<name>`.
pub const SCRIPT_SUFFIX: &str = ".ash";

/// Reserved name of the completion command.
pub const COMPLETE_COMMAND: &str = "--complete--";

/// Environment variable holding the tracing filter.
pub const LOG_ENV: &str = "ASH_LOG";

/// Sanctioned roots taken from `PATH`, in search order.
#[must_use]
pub fn path_roots_from_env() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| path_roots_from(&path))
        .unwrap_or_default()
}

/// Split a `PATH`-style value and resolve every entry to its real path.
/// Entries that do not exist are dropped.
#[must_use]
pub fn path_roots_from(path: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(path)
        .filter(|entry| !entry.as_os_str().is_empty())
        .filter_map(|entry| match resolve_path(&entry) {
            Some(root) => Some(root),
            None => {
                tracing::debug!("ignoring PATH entry {}", entry.display());
                None
            }
        })
        .collect()
}

/// Absolute, symlink-free form of `path`, if it exists.
#[must_use]
pub fn resolve_path(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok()
}

/// The directory lookups start from: the override if given, else the
/// process working directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be determined.
pub fn resolve_here(working_dir: Option<PathBuf>) -> std::io::Result<PathBuf> {
    match working_dir {
        Some(dir) => std::fs::canonicalize(dir),
        None => std::env::current_dir(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsString;

    #[test]
    fn test_path_roots_resolve_and_skip_missing() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("bin");
        std::fs::create_dir(&real).unwrap();
        let joined: OsString = std::env::join_paths([
            real.clone(),
            dir.path().join("missing"),
            dir.path().join("bin/../bin"),
        ])
        .unwrap();

        let roots = path_roots_from(&joined);
        let expected = std::fs::canonicalize(&real).unwrap();
        assert_eq!(roots, vec![expected.clone(), expected]);
    }

    #[test]
    fn test_resolve_here_override() {
        let dir = tempfile::tempdir().unwrap();
        let here = resolve_here(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(here, std::fs::canonicalize(dir.path()).unwrap());
        assert!(resolve_here(Some(dir.path().join("nope"))).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_here_defaults_to_current_dir() {
        let temp = tempfile::tempdir().unwrap();
        let temp_path = temp.path().canonicalize().unwrap();
        let original_cwd = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_path).unwrap();
        let here = resolve_here(None);
        std::env::set_current_dir(original_cwd).unwrap();

        assert_eq!(here.unwrap(), temp_path);
    }
}
