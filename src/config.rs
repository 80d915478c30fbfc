//! Command-line surface: just the handful of flags that change observable
//! behavior. No general options subsystem, no persisted configuration file —
//! the system is stateless across invocations.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::sequences::ShellKind as SeqShellKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellKindArg {
    Bash,
    Zsh,
}

impl From<ShellKindArg> for SeqShellKind {
    fn from(kind: ShellKindArg) -> Self {
        match kind {
            ShellKindArg::Bash => SeqShellKind::Bash,
            ShellKindArg::Zsh => SeqShellKind::Zsh,
        }
    }
}

/// A PTY shell wrapper that reconstructs the live command line from the
/// shell's echo stream and forwards it to an external file-listing display.
#[derive(Debug, Parser)]
#[command(name = "vgseer", version)]
pub struct Cli {
    /// Shell flavor: changes which prompt-delimiter sequences are recognized.
    #[arg(long, value_enum, default_value_t = ShellKindArg::Bash)]
    pub shell_kind: ShellKindArg,

    /// Path to the shell executable to fork.
    #[arg(long, default_value = "/bin/bash")]
    pub shell_path: String,

    /// Shell-init file to source (an rcfile for bash, a ZDOTDIR for zsh).
    #[arg(long)]
    pub init_file: Option<PathBuf>,

    /// Disable the leading/trailing space padding normally inserted around
    /// a filename fed in from the feedback channel.
    #[arg(long)]
    pub no_smart_insert: bool,
}

impl Cli {
    pub fn smart_insert(&self) -> bool {
        !self.no_smart_insert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_are_bash_with_smart_insert_on() {
        let cli = Cli::parse_from(["vgseer"]);
        assert_eq!(cli.shell_kind, ShellKindArg::Bash);
        assert!(cli.smart_insert());
    }

    #[test]
    fn no_smart_insert_flag_disables_padding() {
        let cli = Cli::parse_from(["vgseer", "--no-smart-insert"]);
        assert!(!cli.smart_insert());
    }
}
