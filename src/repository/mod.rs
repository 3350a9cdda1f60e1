//! Command discovery.
//!
//! A command is looked up, in order, in the built-in store, in a store
//! directory (`ash` or `.ash`) of `here` or any of its ancestors, and in a
//! store of any PATH root or its ancestors. The first store that knows the
//! name wins. Store directories whose real path does not live inside a PATH
//! root are skipped without a word, so scripts are only ever taken from
//! places the installer sanctioned.

mod command;
mod store;

pub use command::{Command, FileCommand, SpecialCallback, SpecialCommand};
pub use store::{CommandStore, FileCommandStore, SpecialCommandStore};

use crate::config::{self, STORE_DIR_NAMES};
use crate::script::ScriptEnvironment;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct CommandRepository {
    path_roots: Rc<[PathBuf]>,
}

impl CommandRepository {
    /// A repository whose roots come from the `PATH` of this process.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_path_roots(config::path_roots_from_env())
    }

    /// A repository with explicit roots. Roots are expected to be real
    /// paths already.
    #[must_use]
    pub fn with_path_roots(path_roots: Vec<PathBuf>) -> Self {
        CommandRepository {
            path_roots: path_roots.into(),
        }
    }

    #[must_use]
    pub fn path_roots(&self) -> &[PathBuf] {
        &self.path_roots
    }

    /// Resolve `name` as seen from `here`.
    #[must_use]
    pub fn lookup_command(&self, name: &str, here: &Path) -> Option<Command> {
        let command = self
            .safe_stores(here)
            .find_map(|store| store.lookup_command(name));
        match &command {
            Some(Command::File(file)) => debug!("resolved {name} to {}", file.script.display()),
            Some(Command::Special(_)) => debug!("resolved {name} to a built-in"),
            None => debug!("no store knows {name}"),
        }
        command
    }

    /// Every command visible from `here`, store by store in lookup order.
    /// A name may appear more than once when an ancestor store shadows a
    /// PATH store; the first occurrence is the one lookups resolve.
    pub fn list_commands<'a>(&'a self, here: &'a Path) -> impl Iterator<Item = Command> + 'a {
        self.safe_stores(here)
            .flat_map(|store| store.list_commands())
    }

    /// Stores consulted from `here`, in order, after the safety check.
    pub fn safe_stores<'a>(&'a self, here: &'a Path) -> impl Iterator<Item = CommandStore> + 'a {
        let special = CommandStore::Special(SpecialCommandStore::new(self.clone()));
        let candidates = here
            .ancestors()
            .chain(self.path_roots.iter().flat_map(|root| root.ancestors()));
        std::iter::once(special).chain(
            candidates
                .filter_map(find_command_store)
                .filter(|store| self.is_safe(store))
                .map(|store| CommandStore::File(FileCommandStore::new(store))),
        )
    }

    /// Whether a store directory lives inside a PATH root.
    ///
    /// The real path must start with a root's path and one of its
    /// ancestors must be the same file as that root, so `/opt/toolsXXX`
    /// never passes for `/opt/tools`.
    #[must_use]
    pub fn is_safe(&self, store: &Path) -> bool {
        let Some(resolved) = config::resolve_path(store) else {
            return false;
        };
        let safe = self
            .path_roots
            .iter()
            .filter(|root| has_text_prefix(&resolved, root))
            .any(|root| resolved.ancestors().any(|ancestor| same_file(ancestor, root)));
        if !safe {
            trace!("skipping unsafe store {}", resolved.display());
        }
        safe
    }

    /// Completion candidates for a partial command line.
    ///
    /// With one word, that word is a prefix of a command name. With two,
    /// the first names a command and the second is a prefix of one of its
    /// dispatcher's sub-commands.
    #[must_use]
    pub fn completions(&self, args: &[String], here: &Path) -> Vec<String> {
        match args {
            [prefix] => {
                let mut seen = HashSet::new();
                self.list_commands(here)
                    .map(|command| command.name().to_string())
                    .filter(|name| name.starts_with(prefix.as_str()))
                    .filter(|name| seen.insert(name.clone()))
                    .collect()
            }
            [name, prefix] => self.sub_command_completions(name, prefix, here),
            _ => Vec::new(),
        }
    }

    fn sub_command_completions(&self, name: &str, prefix: &str, here: &Path) -> Vec<String> {
        let Some(Command::File(command)) = self.lookup_command(name, here) else {
            return Vec::new();
        };
        let handler = ScriptEnvironment::load(&command.script).and_then(|env| env.main_handler());
        match handler {
            Ok(Some(handler)) => handler
                .command_names()
                .into_iter()
                .filter(|sub| sub.starts_with(prefix))
                .map(str::to_string)
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("cannot complete arguments of {name}: {e}");
                Vec::new()
            }
        }
    }
}

/// The real path of a recognised store directory directly under `dir`.
/// A plain file with a store name is not a store.
fn find_command_store(dir: &Path) -> Option<PathBuf> {
    STORE_DIR_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_dir())
        .and_then(|candidate| config::resolve_path(&candidate))
}

/// Byte-wise prefix test, unlike [`Path::starts_with`] which compares
/// whole components.
fn has_text_prefix(path: &Path, prefix: &Path) -> bool {
    path.as_os_str()
        .as_encoded_bytes()
        .starts_with(prefix.as_os_str().as_encoded_bytes())
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::COMPLETE_COMMAND;
    use std::fs;
    use tempfile::TempDir;

    struct Tree {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Tree {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = fs::canonicalize(dir.path()).unwrap();
            Tree { _dir: dir, root }
        }

        fn dir(&self, relative: &str) -> PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(&path).unwrap();
            path
        }

        fn script(&self, relative: &str, source: &str) -> PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, source).unwrap();
            path
        }
    }

    fn names(repository: &CommandRepository, here: &Path) -> Vec<String> {
        repository
            .list_commands(here)
            .map(|command| command.name().to_string())
            .collect()
    }

    #[test]
    fn test_textual_prefix_is_not_ancestry() {
        let tree = Tree::new();
        let tools = tree.dir("opt/tools");
        let impostor = tree.dir("opt/toolsXXX/ash");
        let genuine = tree.dir("opt/tools/ash");
        let repository = CommandRepository::with_path_roots(vec![tools]);

        assert!(repository.is_safe(&genuine));
        assert!(!repository.is_safe(&impostor));
        assert!(!repository.is_safe(&tree.root.join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_unsafe() {
        let tree = Tree::new();
        let root = tree.dir("proj");
        let outside = tree.dir("elsewhere/ash");
        tree.script("elsewhere/ash/evil.ash", "@main\nfn m() {}");
        std::os::unix::fs::symlink(&outside, root.join("ash")).unwrap();
        let repository = CommandRepository::with_path_roots(vec![root.clone()]);

        assert!(!repository.is_safe(&root.join("ash")));
        assert!(repository.lookup_command("evil", &root).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_root_is_safe() {
        let tree = Tree::new();
        let root = tree.dir("proj");
        tree.script("proj/ash/build.ash", "@main\nfn m() {}");
        let link = tree.root.join("link");
        std::os::unix::fs::symlink(&root, &link).unwrap();
        let repository = CommandRepository::with_path_roots(vec![root]);

        let command = repository.lookup_command("build", &link).expect("found via link");
        assert!(command.script().unwrap().starts_with(&tree.root.join("proj")));
    }

    #[test]
    fn test_ancestor_store_shadows_path_root() {
        let tree = Tree::new();
        let bin = tree.dir("usr/bin");
        let global = tree.script("usr/bin/ash/build.ash", "@main\nfn m() {}");
        let local = tree.script("home/u/proj/ash/build.ash", "@main\nfn m() {}");
        let here = tree.dir("home/u/proj/sub");
        let repository = CommandRepository::with_path_roots(vec![tree.root.join("home"), bin]);

        let command = repository.lookup_command("build", &here).unwrap();
        assert_eq!(command.script(), Some(local.as_path()));

        let elsewhere = tree.dir("home/other");
        let command = repository.lookup_command("build", &elsewhere).unwrap();
        assert_eq!(command.script(), Some(global.as_path()));
    }

    #[test]
    fn test_unsanctioned_tree_is_invisible() {
        let tree = Tree::new();
        let bin = tree.dir("usr/bin");
        tree.script("tmp/proj/ash/build.ash", "@main\nfn m() {}");
        let here = tree.dir("tmp/proj");
        let repository = CommandRepository::with_path_roots(vec![bin]);

        assert!(repository.lookup_command("build", &here).is_none());
        assert!(names(&repository, &here).is_empty());
    }

    #[test]
    fn test_hidden_store_and_plain_file_named_ash() {
        let tree = Tree::new();
        let bin = tree.dir("usr/bin");
        tree.script("usr/bin/ash", "#!/bin/sh\n");
        tree.script("usr/.ash/deploy.ash", "@main\nfn m() {}");
        let repository = CommandRepository::with_path_roots(vec![tree.root.join("usr")]);

        assert!(repository.lookup_command("deploy", &bin).is_some());
        assert_eq!(names(&repository, &bin), vec!["deploy", "deploy"]);
    }

    #[test]
    fn test_path_roots_are_walked_upward() {
        let tree = Tree::new();
        let bin = tree.dir("opt/tool/bin");
        tree.script("opt/tool/ash/lint.ash", "@main\nfn m() {}");
        let repository = CommandRepository::with_path_roots(vec![tree.root.join("opt"), bin]);

        let here = tree.dir("work");
        assert!(repository.lookup_command("lint", &here).is_some());
    }

    #[test]
    fn test_special_command_is_found_first() {
        let repository = CommandRepository::with_path_roots(Vec::new());
        let command = repository
            .lookup_command(COMPLETE_COMMAND, Path::new("/"))
            .unwrap();
        assert!(matches!(command, Command::Special(_)));
    }

    #[test]
    fn test_completions() {
        let tree = Tree::new();
        tree.script("proj/ash/build.ash", "@main\nfn m() {}");
        tree.script("proj/ash/bench.ash", "@main\nfn m() {}");
        tree.script(
            "proj/ash/server.ash",
            "@dispatcher\nfn usage(args) {}\n@command(\"start\")\nfn s(args) {}\n@command(\"status\")\nfn t() {}\n@command(\"stop\")\nfn u() {}",
        );
        tree.script("proj/sub/ash/build.ash", "@main\nfn m() {}");
        let here = tree.dir("proj/sub");
        let repository = CommandRepository::with_path_roots(vec![tree.root.join("proj")]);

        let complete = |words: &[&str]| {
            let args: Vec<String> = words.iter().map(ToString::to_string).collect();
            repository.completions(&args, &here)
        };
        assert_eq!(complete(&["b"]), vec!["build", "bench"]);
        assert_eq!(complete(&[""]), vec!["build", "bench", "server"]);
        assert_eq!(complete(&["server", "st"]), vec!["start", "status", "stop"]);
        assert_eq!(complete(&["server", "sta"]), vec!["start", "status"]);
        assert!(complete(&["build", ""]).is_empty());
        assert!(complete(&["missing", ""]).is_empty());
        assert!(complete(&[]).is_empty());
    }
}
