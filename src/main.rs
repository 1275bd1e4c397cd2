use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dhcprobe::{
    ArpTable, Config, ConsoleReporter, DhcpClient, Discovery, Error, OuiDatabase, Result, Stats,
    lookup,
};

#[derive(Parser)]
#[command(name = "dhcprobe")]
#[command(author, version, about = "Probe the local network for DHCP servers", long_about = None)]
struct Cli {
    /// Optional JSON settings file; flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Broadcast a DHCP DISCOVER and list the offers that answer it.
    Discover(DiscoverArgs),
    /// Print the effective configuration as JSON.
    ShowConfig,
}

#[derive(Args)]
struct DiscoverArgs {
    /// Network interface to use.
    #[arg(short, long, value_name = "INTERFACE")]
    interface: Option<String>,

    /// Timeout in seconds.
    #[arg(short, long, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Send discovery only and ignore offers.
    #[arg(short, long)]
    send_only: bool,

    /// Don't dump packet contents.
    #[arg(short, long)]
    quiet: bool,

    /// Skip reverse DNS lookups of offerors.
    #[arg(long)]
    no_resolve: bool,

    /// Vendor class identifier to advertise.
    #[arg(long)]
    vendor_class: Option<String>,

    /// IEEE oui.txt or Wireshark manuf file for MAC vendor names.
    #[arg(long, value_name = "FILE")]
    oui: Option<PathBuf>,
}

impl DiscoverArgs {
    fn apply(self, config: &mut Config) {
        if self.interface.is_some() {
            config.interface = self.interface;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if self.vendor_class.is_some() {
            config.vendor_class = self.vendor_class;
        }
        if self.oui.is_some() {
            config.oui_database = self.oui;
        }
        config.send_only |= self.send_only;
        config.quiet |= self.quiet;
        config.resolve_names &= !self.no_resolve;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Discover(args) => {
            args.apply(&mut config);
            config.validate()?;
            discover(&config).await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn discover(config: &Config) -> Result<()> {
    let interface = config
        .interface
        .as_deref()
        .ok_or_else(|| Error::InvalidConfig("a network interface is required (-i)".to_string()))?;

    let mac = lookup::mac_from_interface(interface)?;
    println!("Interface: {} [{}]", interface, mac);

    let timeout = config.timeout();
    let client = if timeout.is_zero() {
        DhcpClient::new_not_listening(Some(interface))?
    } else {
        DhcpClient::new(Some(interface))?
    };

    let vendors = match &config.oui_database {
        Some(path) => OuiDatabase::load(path).unwrap_or_else(|error| {
            warn!("Failed to load OUI database {}: {}", path.display(), error);
            OuiDatabase::default()
        }),
        None => OuiDatabase::default(),
    };

    let mut reporter = ConsoleReporter::new(config.quiet, vendors);
    let mut stats = Stats::new();
    let mut discovery =
        Discovery::new(mac, timeout).with_vendor_class(config.vendor_class_identifier());
    if config.resolve_names {
        discovery = discovery.with_resolver(lookup::name_from_ip);
    }

    let result = tokio::select! {
        result = discovery.run(client, &ArpTable, &mut reporter, &mut stats) => result.map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, stopping discovery");
            Ok(())
        }
    };

    println!("\n{}", stats);
    result
}
