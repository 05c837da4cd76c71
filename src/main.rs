// Command-line front end for the shipmi virtual BMC
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use std::io::stderr;

use shipmi_bmc::{ProviderRegistry, Settings};

mod cmd;

use cmd::chassis::{BootArgs, PowerArgs};

// Define the command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Virtual BMC driven by shell command providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - logs every command line and its output
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,
}

// Define the subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Lists the providers found in the provider directories.
    Providers,
    /// Shows the command templates of a provider (name or .conf file).
    Show {
        /// Provider name or path to a .conf file
        provider: String,
    },
    /// Gets or sets the boot device of a virtual machine.
    Boot(BootArgs),
    /// Queries or changes the power state of a virtual machine.
    Power(PowerArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "shipmi={level},shipmi_bmc={level}",
            level = default_level
        ))
    });
    registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .init();

    let settings = Settings::from_env()?;
    debug!("Settings: {:?}", settings);
    let registry = ProviderRegistry::from_settings(&settings);

    match cli.command {
        Commands::Providers => cmd::providers::list(&registry),
        Commands::Show { provider } => cmd::providers::show(&registry, &provider),
        Commands::Boot(args) => cmd::chassis::run_boot(args, &registry, &settings).await,
        Commands::Power(args) => cmd::chassis::run_power(args, &registry, &settings).await,
    }
}
