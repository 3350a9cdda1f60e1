//! Shell completion scripts.
//!
//! Each script calls back into `ash --complete-- <words...>`, which prints
//! the matching command names (or a dispatcher's sub-commands) one per line.

use clap::ValueEnum;

/// A shell `--generate-completion` can target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "fish")]
    Fish,
}

impl Shell {
    /// The script to source (bash, zsh) or install (fish).
    #[must_use]
    pub fn script(self) -> &'static str {
        match self {
            Shell::Bash => include_str!("../completions/ash.bash"),
            Shell::Zsh => include_str!("../completions/ash.zsh"),
            Shell::Fish => include_str!("../completions/ash.fish"),
        }
    }
}

pub fn generate_completion_script(shell: Shell) {
    print!("{}", shell.script());
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::COMPLETE_COMMAND;

    #[test]
    fn test_every_script_calls_back_into_ash() {
        for shell in Shell::value_variants() {
            let name = shell
                .to_possible_value()
                .expect("every shell has a name")
                .get_name()
                .to_string();
            let script = shell.script();
            assert!(
                script.contains(&format!("ash {COMPLETE_COMMAND}")),
                "{name} script does not call the completion command"
            );
            assert!(script.contains(&name), "{name} script does not mention its shell");
        }
    }

    #[test]
    fn test_shell_names_parse() {
        assert_eq!(Shell::from_str("zsh", true), Ok(Shell::Zsh));
        assert!(Shell::from_str("powershell", true).is_err());
    }
}
