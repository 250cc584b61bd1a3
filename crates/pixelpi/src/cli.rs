//! Command tree for `pixelpi`, also compiled into `build.rs` for man pages.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pixelpi -- network hub for WLED LED controllers
#[derive(Debug, Parser)]
#[command(
    name = "pixelpi",
    version,
    about = "Run and administer a PixelPi LED controller network hub",
    long_about = "Brings up the wireless access point, addresses USB ethernet adapters,\n\
        keeps the wired-side DHCP service in sync and discovers LED controllers.\n\n\
        `pixelpi run` is the long-running daemon; every other command acts on\n\
        this host directly and exits.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file
    #[arg(long, short = 'c', env = "PIXELPI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PIXELPI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Color the AP state in detail views
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print nothing but errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Rounded table for people
    Table,
    /// Pretty-printed JSON
    Json,
    /// JSON on one line
    JsonCompact,
    /// YAML
    Yaml,
    /// One identifier per line, for scripts
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Color when stdout is a terminal
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Run(RunArgs),

    /// Inspect and address network adapters
    #[command(alias = "adapter", alias = "a")]
    Adapters(AdaptersArgs),

    /// Control the wireless access point
    Ap(ApArgs),

    /// Discover LED controllers on a wired subnet
    Scan(ScanArgs),

    /// Manage DHCP reservations
    #[command(alias = "res", alias = "r")]
    Reservations(ReservationsArgs),

    /// Check the DHCP setup and report host status
    Check,

    /// Inspect and edit the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Log line format
    #[arg(long, env = "PIXELPI_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

// ── Adapters ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AdaptersArgs {
    #[command(subcommand)]
    pub command: AdaptersCommand,
}

#[derive(Debug, Subcommand)]
pub enum AdaptersCommand {
    /// List adapters
    #[command(alias = "ls")]
    List {
        /// Only USB ethernet adapters
        #[arg(long)]
        usb: bool,
    },

    /// Show one adapter
    Get {
        /// Interface name (e.g. eth1)
        id: String,
    },

    /// Assign a static address to a wired adapter
    Configure {
        /// Interface name (e.g. eth1)
        id: String,

        /// Address with prefix (e.g. 10.0.1.1/24)
        address: String,

        /// Isolation domain (defaults to the interface name)
        #[arg(long)]
        isolation_domain: Option<String>,

        /// Also record the plan in the configuration file
        #[arg(long)]
        save: bool,
    },
}

// ── Access point ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ApArgs {
    #[command(subcommand)]
    pub command: ApCommand,
}

#[derive(Debug, Subcommand)]
pub enum ApCommand {
    /// Show the access point state
    #[command(alias = "status")]
    State,

    /// Bring the access point up and wait for it to settle
    Enable(ApEnableArgs),

    /// Take the access point down
    Disable,

    /// Run activation again after a failure
    Retry,

    /// Cycle an active access point
    Restart,

    /// List stations associated with the access point
    Clients,
}

#[derive(Debug, Args)]
pub struct ApEnableArgs {
    /// Network name (overrides configuration)
    #[arg(long)]
    pub ssid: Option<String>,

    /// Radio channel, 1-11 (overrides configuration)
    #[arg(long)]
    pub channel: Option<u8>,

    /// Access point address with prefix (overrides configuration)
    #[arg(long)]
    pub address: Option<String>,

    /// Prompt for the passphrase instead of using the configured one
    #[arg(long)]
    pub ask_passphrase: bool,
}

// ── Scan ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Subnet to scan (e.g. 10.0.1.0/24); defaults to every configured wired subnet
    pub subnet: Option<String>,

    /// Show hosts that could not be probed
    #[arg(long)]
    pub show_errors: bool,
}

// ── Reservations ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReservationsArgs {
    #[command(subcommand)]
    pub command: ReservationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ReservationsCommand {
    /// List reservations
    #[command(alias = "ls")]
    List,

    /// Reserve an address for a hardware address
    Add {
        /// Hardware address (aa:bb:cc:dd:ee:ff)
        mac: String,

        /// Address to reserve
        address: Ipv4Addr,

        /// Human-readable label
        label: String,
    },

    /// Remove a reservation
    #[command(alias = "rm")]
    Remove {
        /// Hardware address (aa:bb:cc:dd:ee:ff)
        mac: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (file + environment)
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store the access point passphrase in the system keyring
    SetPassphrase,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
