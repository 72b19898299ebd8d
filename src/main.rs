mod broadcast;
mod chains;
mod engine;
mod generate;
mod meta;
mod registry;
mod types;
mod write;

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;
use tracing::{Level, error, info};

use crate::{
    generate::GenerateError,
    meta::MetaError,
    registry::{LookupError, RegistryFormat},
    types::{ChainId, DEFAULT_ENV},
    write::WriteError,
};

const DEFAULT_META_FILE: &str = ".forge-utils/meta.json";

#[derive(Debug, Parser)]
#[command(name = "forge-registry", version, about = "Deployment registries from forge broadcast files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors. Cannot be used alongside `-v`
    #[arg(short, long, action = ArgAction::SetTrue, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::INFO,
                1 => Level::DEBUG, // -v
                _ => Level::TRACE, // -vv
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write `deployments.json`: `{env: {chainId: {name: address}}}`
    Deployments {
        /// Directory searched for broadcast files
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Output file, or directory receiving `deployments.json`
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Write `networks.json`: `{network: {name: {address, startBlock}}}`
    Networks {
        /// Broadcast directory, relative to the package when one is given
        #[arg(long, default_value = "broadcast")]
        dir: PathBuf,

        /// Read broadcasts of an installed package
        #[arg(long)]
        package: Option<String>,

        /// Output file, or directory receiving `networks.json`
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Only include broadcasts tagged with this environment
        #[arg(long, default_value = DEFAULT_ENV)]
        env: String,
    },

    /// Merge recorded metadata into the `meta` object of every broadcast file
    AppendMeta {
        #[arg(long, default_value = "broadcast")]
        dir: PathBuf,

        /// JSON object merged first, missing file is ignored
        #[arg(long, default_value = DEFAULT_META_FILE)]
        meta_file: PathBuf,

        /// Extra `key=value` pairs, dotted keys nest (`deployments.Vault=0x..`)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Print the address of a contract recorded in `deployments.json`
    Address {
        #[arg(long, default_value = "deployments.json")]
        deployments: PathBuf,

        #[arg(long)]
        name: String,

        #[arg(long)]
        chain_id: ChainId,

        #[arg(long, default_value = DEFAULT_ENV)]
        env: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Failed to read registry: {0}")]
    Registry(#[from] WriteError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Meta(#[from] MetaError),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = execute(cli.command) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn execute(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Deployments { dir, output } => {
            let (path, summary) = generate::generate(&dir, &output, &RegistryFormat::Deployments)?;
            info!(
                path = %path.display(),
                deployments = summary.deployments,
                custom_deployments = summary.custom_deployments,
                "Wrote deployments"
            );
        }
        Commands::Networks {
            dir,
            package,
            output,
            env,
        } => {
            let input = generate::resolve_input_dir(Path::new("."), package.as_deref(), &dir)?;
            let (path, summary) =
                generate::generate(&input, &output, &RegistryFormat::Networks { env })?;
            info!(
                path = %path.display(),
                deployments = summary.deployments,
                custom_deployments = summary.custom_deployments,
                "Wrote networks"
            );
        }
        Commands::AppendMeta {
            dir,
            meta_file,
            set,
        } => {
            let mut values = meta::load_meta_file(&meta_file)?;

            for assignment in &set {
                let (key, value) = meta::parse_assignment(assignment)?;
                meta::set_path(&mut values, &key, value);
            }

            meta::append_meta(&dir, &values)?;
        }
        Commands::Address {
            deployments,
            name,
            chain_id,
            env,
        } => {
            let registry = write::read_registry(&deployments, &RegistryFormat::Deployments)?;
            let address = registry.deployment_address(Some(&env), chain_id, &name)?;

            println!("{}", address.to_checksum(None));
        }
    }

    Ok(())
}
