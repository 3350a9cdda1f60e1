//! # ash
//!
//! Find a command script near the working directory and run it.
//!
//! ## Usage
//!
//! - Run a command: `ash build`, `ash server start --port 8080`
//! - List what is visible from here: `ash --list`
//! - Shell completion: `ash --generate-completion bash`
//!
//! Set `ASH_LOG=debug` to see how a command was resolved.

fn main() {
    std::process::exit(ash::cli::run_cli());
}
