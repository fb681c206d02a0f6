//! CLI - Command Line Interface for flingdeck
//!
//! Every command is scriptable; output is JSON when `--json` is given or
//! stdout is not a terminal.
//!
//! # Examples
//!
//! ```bash
//! # List installable apps with icons for the first 10 rows
//! flingdeck list --rows 10
//!
//! # Media sources as JSON
//! flingdeck list --kind media --json
//!
//! # Follow catalog changes
//! flingdeck watch --interval 5
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

use flingdeck::controller::RowAction;
use flingdeck::models::ItemKind;

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit status, one code per failure class so scripts can branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Device not found
    DeviceNotFound = 4,
    /// Catalog has no items of the requested kind
    NoItems = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// flingdeck - apps and media on your cast devices
#[derive(Parser, Debug)]
#[command(
    name = "flingdeck",
    version,
    about = "List apps and media sources on nearby cast devices",
    long_about = "Reads the catalog published by a discovery endpoint, lists the \
                  installable apps or media sources it reports and resolves their \
                  icons lazily, the way a scrolling list would.",
    after_help = "EXAMPLES:\n\
                  flingdeck list                       List apps\n\
                  flingdeck list --kind media --json   Media sources as JSON\n\
                  flingdeck select 2 --action launch   Command for row 2\n\
                  flingdeck watch                      Follow catalog changes"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Target device id or name
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Catalog endpoint (overrides config)
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List apps or media sources with their icons
    #[command(visible_alias = "ls")]
    List(ListCmd),

    /// List discovered devices
    #[command(visible_alias = "dev")]
    Devices(DevicesCmd),

    /// Build the install/launch command for a row
    Select(SelectCmd),

    /// Poll the catalog and report changes until interrupted
    Watch(WatchCmd),
}

/// Which catalogue to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    #[value(alias = "app")]
    Apps,
    Media,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Apps => ItemKind::App,
            KindArg::Media => ItemKind::Media,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListCmd {
    /// Catalogue to list
    #[arg(long, short = 'k', value_enum)]
    pub kind: Option<KindArg>,

    /// Number of rows treated as visible (their icons are fetched)
    #[arg(long, short = 'r', default_value = "20")]
    pub rows: usize,

    /// Seconds to wait for icons before giving up
    #[arg(long, short = 't', default_value = "10")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct DevicesCmd {}

/// Action to dispatch for a selected row
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Install,
    Launch,
}

impl From<ActionArg> for RowAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Install => RowAction::Install,
            ActionArg::Launch => RowAction::Launch,
        }
    }
}

#[derive(Args, Debug)]
pub struct SelectCmd {
    /// Row index (0-based)
    pub row: usize,

    /// Catalogue the row belongs to
    #[arg(long, short = 'k', value_enum)]
    pub kind: Option<KindArg>,

    /// What to do with the row
    #[arg(long, short = 'a', value_enum, default_value = "install")]
    pub action: ActionArg,
}

#[derive(Args, Debug)]
pub struct WatchCmd {
    /// Catalogue to follow
    #[arg(long, short = 'k', value_enum)]
    pub kind: Option<KindArg>,

    /// Seconds between polls (overrides config)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Number of rows treated as visible
    #[arg(long, short = 'r', default_value = "20")]
    pub rows: usize,

    /// Stop after this many discovery events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// =============================================================================
// JSON Output
// =============================================================================

/// Envelope written in JSON mode: `data` on success, `error` + `exit_code`
/// on failure
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }
}

impl JsonOutput<()> {
    pub fn failure(msg: impl Into<String>, code: ExitCode) -> Self {
        Self {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Where command results go: JSON on stdout, or lines for a terminal.
/// Progress and errors always go to stderr.
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Emit a command result. `human` renders it when not in JSON mode.
    pub fn emit<T: Serialize>(&self, data: &T, human: impl FnOnce(&Self)) -> ExitCode {
        if !self.json {
            human(self);
            return ExitCode::Success;
        }
        match serde_json::to_string_pretty(&JsonOutput::success(data)) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::Success
            }
            Err(e) => self.error(format!("Failed to serialize: {}", e), ExitCode::Error),
        }
    }

    /// One line of terminal output (dropped in JSON mode)
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Report a failure and hand back its exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            match serde_json::to_string_pretty(&JsonOutput::failure(&msg, code)) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", msg),
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Progress note on stderr; silent with --quiet or --json
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !(self.quiet || self.json) {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_defaults() {
        let cli = Cli::parse_from(["flingdeck", "list"]);
        if let Command::List(cmd) = cli.command {
            assert_eq!(cmd.kind, None);
            assert_eq!(cmd.rows, 20);
            assert_eq!(cmd.timeout, 10);
        } else {
            panic!("Expected List command");
        }
    }

    #[test]
    fn test_list_kind_aliases() {
        let cli = Cli::parse_from(["flingdeck", "ls", "--kind", "app"]);
        if let Command::List(cmd) = cli.command {
            assert_eq!(cmd.kind, Some(KindArg::Apps));
            assert_eq!(ItemKind::from(KindArg::Apps), ItemKind::App);
        } else {
            panic!("Expected List command");
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "flingdeck",
            "--json",
            "--device",
            "Living Room TV",
            "--catalog",
            "http://tv.local/catalog.json",
            "devices",
        ]);
        assert!(cli.json);
        assert!(!cli.quiet);
        assert_eq!(cli.device.as_deref(), Some("Living Room TV"));
        assert_eq!(cli.catalog.as_deref(), Some("http://tv.local/catalog.json"));
        assert!(matches!(cli.command, Command::Devices(_)));
    }

    #[test]
    fn test_select_command() {
        let cli = Cli::parse_from(["flingdeck", "select", "2", "-a", "launch", "-k", "media"]);
        if let Command::Select(cmd) = cli.command {
            assert_eq!(cmd.row, 2);
            assert_eq!(RowAction::from(cmd.action), RowAction::Launch);
            assert_eq!(cmd.kind, Some(KindArg::Media));
        } else {
            panic!("Expected Select command");
        }
    }

    #[test]
    fn test_watch_command() {
        let cli = Cli::parse_from(["flingdeck", "watch", "-i", "3", "-n", "5"]);
        if let Command::Watch(cmd) = cli.command {
            assert_eq!(cmd.interval, Some(3));
            assert_eq!(cmd.count, Some(5));
        } else {
            panic!("Expected Watch command");
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::Error), 1);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::NetworkError), 3);
        assert_eq!(i32::from(ExitCode::DeviceNotFound), 4);
        assert_eq!(i32::from(ExitCode::NoItems), 5);
    }

    #[test]
    fn test_json_error_envelope() {
        let out = JsonOutput::failure("boom", ExitCode::NetworkError);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["error"], "boom");
        assert_eq!(json["exit_code"], 3);
        assert!(json.get("data").is_none());
    }
}
