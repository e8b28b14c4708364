//! CLI argument definitions for the watchdog binary.

use clap::{Parser, Subcommand, ValueEnum};

/// Output format selection for the `status` command.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Render a human-readable summary.
    #[default]
    Human,
    /// Emit the raw status snapshot as JSON.
    Json,
}

/// Command-line interface for the Warden watchdog service.
///
/// A bare invocation carries no subcommand: that is how the OS service
/// manager launches the binary, so it selects service dispatch.
#[derive(Parser, Debug)]
#[command(name = "wardend", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

/// Management and run-mode subcommands.
#[derive(Subcommand, Debug, Clone, Copy)]
pub(crate) enum Command {
    /// Registers the service with the OS service manager.
    Install,
    /// Stops the service if running and removes its registration.
    Uninstall,
    /// Prints the registered service's current status.
    Status {
        /// Controls how the status snapshot is rendered.
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        output: OutputFormat,
    },
    /// Runs the service in the foreground; Ctrl+C requests a stop.
    Debug,
    /// Connects to the service manager's dispatcher, as a service start does.
    Run,
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::{Cli, Command, OutputFormat};

    #[test]
    fn bare_invocation_selects_service_dispatch() {
        let cli = Cli::try_parse_from(["wardend"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[rstest]
    #[case::install(&["wardend", "install"][..], Command::Install)]
    #[case::uninstall(&["wardend", "uninstall"][..], Command::Uninstall)]
    #[case::debug(&["wardend", "debug"][..], Command::Debug)]
    #[case::run(&["wardend", "run"][..], Command::Run)]
    fn subcommands_parse(#[case] args: &[&str], #[case] expected: Command) {
        let cli = Cli::try_parse_from(args).expect("parse");
        assert!(matches!(cli.command, Some(command) if std::mem::discriminant(&command)
            == std::mem::discriminant(&expected)));
    }

    #[rstest]
    #[case::default(&["wardend", "status"][..], OutputFormat::Human)]
    #[case::json(&["wardend", "status", "--output", "json"][..], OutputFormat::Json)]
    fn status_output_format(#[case] args: &[&str], #[case] expected: OutputFormat) {
        let cli = Cli::try_parse_from(args).expect("parse");
        let Some(Command::Status { output }) = cli.command else {
            panic!("expected status command");
        };
        assert_eq!(output, expected);
    }

    #[test]
    fn unrecognised_argument_is_rejected() {
        assert!(Cli::try_parse_from(["wardend", "bogus"]).is_err());
    }
}
