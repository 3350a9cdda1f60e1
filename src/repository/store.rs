//! Command stores: a directory of scripts, or the table of built-ins.

use super::command::{Command, FileCommand, SpecialCommand};
use super::CommandRepository;
use crate::config::{COMPLETE_COMMAND, SCRIPT_SUFFIX};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Names that may be looked up: no dots or path separators.
#[allow(clippy::expect_used)]
static COMMAND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^./\\]+$").expect("command name pattern is valid"));

/// Files that enumerate as commands: `<name>.ash`.
#[allow(clippy::expect_used)]
static COMMAND_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^.]+)\.ash$").expect("command file pattern is valid"));

#[derive(Debug)]
pub enum CommandStore {
    File(FileCommandStore),
    Special(SpecialCommandStore),
}

impl CommandStore {
    #[must_use]
    pub fn lookup_command(&self, name: &str) -> Option<Command> {
        match self {
            CommandStore::File(store) => store.lookup_command(name).map(Command::File),
            CommandStore::Special(store) => store.lookup_command(name),
        }
    }

    #[must_use]
    pub fn list_commands(&self) -> Vec<Command> {
        match self {
            CommandStore::File(store) => store.list_commands().into_iter().map(Command::File).collect(),
            CommandStore::Special(_) => Vec::new(),
        }
    }
}

/// A store directory, already resolved to its real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommandStore {
    root: PathBuf,
}

impl FileCommandStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileCommandStore { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn lookup_command(&self, name: &str) -> Option<FileCommand> {
        if !COMMAND_NAME.is_match(name) {
            return None;
        }
        let script = self.root.join(format!("{name}{SCRIPT_SUFFIX}"));
        script.is_file().then(|| FileCommand {
            name: name.to_string(),
            script,
        })
    }

    /// Every script in the store, sorted by name. An unreadable store
    /// lists nothing.
    #[must_use]
    pub fn list_commands(&self) -> Vec<FileCommand> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("cannot list {}: {e}", self.root.display());
                return Vec::new();
            }
        };
        let mut commands: Vec<FileCommand> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let file_name = file_name.to_str()?;
                let name = COMMAND_FILE.captures(file_name)?.get(1)?.as_str().to_string();
                Some(FileCommand {
                    name,
                    script: entry.path(),
                })
            })
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }
}

/// Built-in commands under reserved names. Never listed.
#[derive(Debug, Clone)]
pub struct SpecialCommandStore {
    repository: CommandRepository,
}

impl SpecialCommandStore {
    pub(crate) fn new(repository: CommandRepository) -> Self {
        SpecialCommandStore { repository }
    }

    #[must_use]
    pub fn lookup_command(&self, name: &str) -> Option<Command> {
        if name != COMPLETE_COMMAND {
            return None;
        }
        let repository = self.repository.clone();
        Some(Command::Special(SpecialCommand::new(
            COMPLETE_COMMAND,
            Box::new(move |args: &[String], here: &Path| {
                for completion in repository.completions(args, here) {
                    println!("{completion}");
                }
                Ok(0)
            }),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lookup_requires_plain_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.ash"), "").unwrap();
        let store = FileCommandStore::new(dir.path());

        assert!(store.lookup_command("build").is_some());
        assert!(store.lookup_command("missing").is_none());
        assert!(store.lookup_command("../build").is_none());
        assert!(store.lookup_command("build.ash").is_none());
        assert!(store.lookup_command("").is_none());
    }

    #[test]
    fn test_list_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["test.ash", "build.ash", "notes.txt", "a.b.ash", "deploy.ash"] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        let store = FileCommandStore::new(dir.path());
        let names: Vec<String> = store.list_commands().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["build", "deploy", "test"]);
    }

    #[test]
    fn test_missing_store_lists_nothing() {
        let store = FileCommandStore::new("/nonexistent/ash");
        assert!(store.list_commands().is_empty());
    }

    #[test]
    fn test_special_store_is_never_listed() {
        let store = CommandStore::Special(SpecialCommandStore::new(
            CommandRepository::with_path_roots(Vec::new()),
        ));
        assert!(store.list_commands().is_empty());
        assert!(store.lookup_command(COMPLETE_COMMAND).is_some());
        assert!(store.lookup_command("build").is_none());
    }
}
