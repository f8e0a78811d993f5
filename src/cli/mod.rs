// src/cli/mod.rs

//! The dispatcher facade and the binary's argument wrapper.

use clap::Parser;

pub mod dispatcher;

/// cmdchain: resolve a command tree from raw arguments and run the matched
/// command through its pipeline.
///
/// Every argument is handed to the dispatcher untouched; the dispatcher, not
/// clap, decides what is a command and what is a flag.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// The raw argument vector, flags included.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_passed_through() {
        let cli = Cli::parse_from(["cmdchain", "--version", "build", "--compiler=swc", "-v"]);
        assert_eq!(cli.args, vec!["--version", "build", "--compiler=swc", "-v"]);
    }
}
