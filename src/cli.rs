//! CLI module containing the main entry point logic.

use crate::config::{self, COMPLETE_COMMAND};
use crate::error::AshError;
use crate::repository::{Command, CommandRepository};
use crate::{completion, logging};
use clap::Parser as ClapParser;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "Usage: ash <command> [args...]";

/// CLI arguments for ash.
#[derive(ClapParser)]
#[command(name = "ash")]
#[command(version = PKG_VERSION)]
#[command(about = "Find the nearest command script and run it", long_about = None)]
struct Cli {
    /// Command to run
    #[arg(value_name = "COMMAND")]
    command: Option<String>,

    /// Arguments passed to the command's action
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// List the commands visible from the working directory
    #[arg(short, long)]
    list: bool,

    /// With --list, print JSON instead of text
    #[arg(long, requires = "list")]
    json: bool,

    /// Generate shell completion script
    #[arg(long, value_name = "SHELL")]
    generate_completion: Option<completion::Shell>,

    /// Directory to search for commands from (defaults to the current one)
    #[arg(short = 'C', long = "working-dir", value_name = "PATH")]
    working_dir: Option<PathBuf>,
}

/// One row of `--list` output.
#[derive(Debug, Serialize)]
struct CommandListing {
    name: String,
    script: PathBuf,
}

/// Main CLI logic. Returns the process exit code.
#[must_use]
pub fn run_cli() -> i32 {
    logging::init();

    // The completion command is invoked by shell scripts with arbitrary
    // words after it, so it bypasses option parsing.
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.first().map(String::as_str) == Some(COMPLETE_COMMAND) {
        return dispatch(COMPLETE_COMMAND, &raw[1..], None);
    }

    let cli = Cli::parse();

    if let Some(shell) = cli.generate_completion {
        completion::generate_completion_script(shell);
        return 0;
    }

    if cli.list {
        return match config::resolve_here(cli.working_dir) {
            Ok(here) => {
                list_commands(&CommandRepository::from_env(), &here, cli.json);
                0
            }
            Err(e) => report(&AshError::Io(e)),
        };
    }

    let Some(command) = cli.command else {
        eprintln!("{USAGE}");
        return 1;
    };
    dispatch(&command, &cli.args, cli.working_dir)
}

/// Resolve `name` and run it, mapping every failure to exit code 1.
fn dispatch(name: &str, args: &[String], working_dir: Option<PathBuf>) -> i32 {
    let result = config::resolve_here(working_dir)
        .map_err(AshError::from)
        .and_then(|here| execute(&CommandRepository::from_env(), name, args, &here));
    match result {
        Ok(code) => code,
        Err(e) => report(&e),
    }
}

/// Look up `name` from `here` and execute it.
///
/// # Errors
///
/// [`AshError::CommandNotFound`] when no store knows the name, otherwise
/// whatever the command raises.
pub fn execute(
    repository: &CommandRepository,
    name: &str,
    args: &[String],
    here: &Path,
) -> Result<i32, AshError> {
    debug!(
        "looking up {name} from {} with {} PATH roots",
        here.display(),
        repository.path_roots().len()
    );
    let command = repository
        .lookup_command(name, here)
        .ok_or_else(|| AshError::CommandNotFound(name.to_string()))?;
    command.execute(args, here)
}

fn report(error: &AshError) -> i32 {
    match error {
        AshError::CommandNotFound(_) => eprintln!("{error}"),
        _ => eprintln!("Error: {error}"),
    }
    1
}

/// The first occurrence of each visible file command, in lookup order.
fn visible_commands(repository: &CommandRepository, here: &Path) -> Vec<CommandListing> {
    let mut seen = HashSet::new();
    repository
        .list_commands(here)
        .filter_map(|command| match command {
            Command::File(file) => Some(CommandListing {
                name: file.name,
                script: file.script,
            }),
            Command::Special(_) => None,
        })
        .filter(|listing| seen.insert(listing.name.clone()))
        .collect()
}

fn list_commands(repository: &CommandRepository, here: &Path, json: bool) {
    let commands = visible_commands(repository, here);
    if json {
        match serde_json::to_string_pretty(&commands) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }
    if commands.is_empty() {
        println!("No commands found.");
        return;
    }
    let width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for command in commands {
        println!("  {:width$}  {}", command.name, command.script.display());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_parses_trailing_arguments() {
        let cli = Cli::try_parse_from(["ash", "-C", "/tmp", "deploy", "--force", "-v", "prod"]).unwrap();
        assert_eq!(cli.command.as_deref(), Some("deploy"));
        assert_eq!(cli.args, vec!["--force", "-v", "prod"]);
        assert_eq!(cli.working_dir, Some(PathBuf::from("/tmp")));
        assert!(!cli.list);
    }

    #[test]
    fn test_json_requires_list() {
        assert!(Cli::try_parse_from(["ash", "--json"]).is_err());
        assert!(Cli::try_parse_from(["ash", "--list", "--json"]).is_ok());
    }

    #[test]
    fn test_execute_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let repository = CommandRepository::with_path_roots(Vec::new());
        let err = execute(&repository, "missing", &[], dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "No command \"missing\" found.");
    }

    #[test]
    fn test_visible_commands_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("ash")).unwrap();
        fs::create_dir_all(root.join("sub/ash")).unwrap();
        fs::write(root.join("ash/build.ash"), "").unwrap();
        fs::write(root.join("ash/test.ash"), "").unwrap();
        fs::write(root.join("sub/ash/build.ash"), "").unwrap();
        let repository = CommandRepository::with_path_roots(vec![root.clone()]);

        let listed = visible_commands(&repository, &root.join("sub"));
        let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["build", "test"]);
        assert_eq!(listed[0].script, root.join("sub/ash/build.ash"));
    }
}
