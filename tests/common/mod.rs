//! Common test helpers shared across integration tests

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)] // Not all helpers are used by every test file

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Helper to get the compiled binary path
pub fn get_binary_path() -> PathBuf {
    // Get the directory where cargo places test binaries
    let mut path = env::current_exe().unwrap();
    path.pop(); // Remove test executable name

    // Check if we're in a 'deps' directory (integration tests)
    if path.ends_with("deps") {
        path.pop(); // Go up to debug or release
    }

    path.push("ash");

    // If the binary doesn't exist in debug, try building it first
    if !path.exists() {
        let build_output = Command::new("cargo")
            .args(["build", "--bin", "ash"])
            .output()
            .expect("Failed to build binary");

        assert!(
            build_output.status.success(),
            "Failed to build ash binary: {}",
            String::from_utf8_lossy(&build_output.stderr)
        );
    }

    path
}

/// A scratch tree whose root is resolved, so paths compare equal to the
/// real paths ash reports.
pub struct Workspace {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Workspace { _dir: dir, root }
    }

    /// Create a directory (and parents) under the root.
    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Write a command script under the root.
    pub fn script(&self, relative: &str, source: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    /// An ash invocation from `here` that trusts the workspace root in
    /// addition to the inherited `PATH`.
    pub fn ash(&self, here: &Path) -> Command {
        let mut cmd = Command::new(get_binary_path());
        cmd.current_dir(here)
            .env("PATH", path_with(&self.root))
            .env_remove("ASH_LOG");
        cmd
    }

    /// An ash invocation whose `PATH` does not include the workspace.
    pub fn ash_untrusted(&self, here: &Path) -> Command {
        let mut cmd = Command::new(get_binary_path());
        cmd.current_dir(here).env_remove("ASH_LOG");
        cmd
    }
}

/// `root` followed by the entries of the current `PATH`.
pub fn path_with(root: &Path) -> std::ffi::OsString {
    let inherited = env::var_os("PATH").unwrap_or_default();
    let entries = std::iter::once(root.to_path_buf()).chain(env::split_paths(&inherited));
    env::join_paths(entries).unwrap()
}

/// Helper to check if a tool is available on the system
pub fn is_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Package version for testing --version flag
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
