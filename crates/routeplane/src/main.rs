mod manifest;
mod output;
mod tracing_setup;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use routeplane_engine::crd::{GlobalConfiguration, TransportServer, VirtualServer, VirtualServerRoute};
use routeplane_engine::{Configuration, EngineConfig};
use tracing::{debug, info};

use manifest::{CreationClock, Manifest};
use output::{OutputFormat, ResourceSummary, StateReport, StepReport};

#[derive(Parser)]
#[command(name = "routeplane")]
#[command(about = "Replay routing manifests through the reconciliation engine", long_about = None)]
struct Cli {
    /// Path to the engine config file (TOML)
    #[arg(short, long, global = true, env = "ROUTEPLANE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply manifests in order and print the changes and problems of every step
    ///
    /// Objects without a creationTimestamp are stamped in the order they are
    /// applied, so on a host conflict the object applied first wins.
    Apply {
        /// Manifest files, applied in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Manifest files whose objects are deleted after all files are applied
        #[arg(long)]
        delete: Vec<PathBuf>,
    },
    /// Apply manifests and print the resulting slot owners
    ///
    /// Objects without a creationTimestamp are stamped in file order.
    Resources {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the CustomResourceDefinitions of the routing resources
    Crds,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(cli.log_json, cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    debug!(ingress_class = %config.ingress_class, "Loaded configuration");

    match cli.command {
        Commands::Apply { files, delete } => {
            let mut configuration = Configuration::new(config);
            let mut clock = CreationClock::starting_at(Utc::now());
            let mut steps = Vec::new();
            for path in &files {
                for manifest in manifest::load(path)? {
                    steps.push(apply(&mut configuration, clock.stamp(manifest)));
                }
            }
            for path in &delete {
                for manifest in manifest::load(path)? {
                    steps.push(self::delete(&mut configuration, manifest));
                }
            }
            info!(steps = steps.len(), "Replayed manifests");
            output::print_steps(&steps, cli.format)
        }
        Commands::Resources { files } => {
            let mut configuration = Configuration::new(config);
            let mut clock = CreationClock::starting_at(Utc::now());
            for path in &files {
                for manifest in manifest::load(path)? {
                    apply(&mut configuration, clock.stamp(manifest));
                }
            }
            let state = StateReport {
                resources: configuration
                    .get_resources()
                    .iter()
                    .map(ResourceSummary::from)
                    .collect(),
                transport_servers: configuration.get_transport_server_metrics(),
            };
            output::print_state(&state, cli.format)
        }
        Commands::Crds => print_crds(),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn describe(manifest: &Manifest) -> String {
    format!("{} {}", manifest.kind(), manifest.key())
}

fn apply(configuration: &mut Configuration, manifest: Manifest) -> StepReport {
    let object = describe(&manifest);
    let (changes, problems, error) = match manifest {
        Manifest::Ingress(o) => with_no_error(configuration.add_or_update_ingress(o)),
        Manifest::VirtualServer(o) => with_no_error(configuration.add_or_update_virtual_server(o)),
        Manifest::VirtualServerRoute(o) => with_no_error(configuration.add_or_update_virtual_server_route(o)),
        Manifest::TransportServer(o) => with_no_error(configuration.add_or_update_transport_server(o)),
        Manifest::GlobalConfiguration(o) => {
            let (changes, problems, result) = configuration.add_or_update_global_configuration(o);
            (changes, problems, result.err().map(|e| e.to_string()))
        }
    };

    let mut report = StepReport::new("apply", object, &changes, &problems);
    report.error = error;
    report
}

fn delete(configuration: &mut Configuration, manifest: Manifest) -> StepReport {
    let object = describe(&manifest);
    let key = manifest.key();
    let (changes, problems) = match manifest {
        Manifest::Ingress(_) => configuration.delete_ingress(&key),
        Manifest::VirtualServer(_) => configuration.delete_virtual_server(&key),
        Manifest::VirtualServerRoute(_) => configuration.delete_virtual_server_route(&key),
        Manifest::TransportServer(_) => configuration.delete_transport_server(&key),
        Manifest::GlobalConfiguration(_) => configuration.delete_global_configuration(),
    };
    StepReport::new("delete", object, &changes, &problems)
}

fn with_no_error<C, P>((changes, problems): (C, P)) -> (C, P, Option<String>) {
    (changes, problems, None)
}

fn print_crds() -> Result<()> {
    let crds = [
        VirtualServer::crd(),
        VirtualServerRoute::crd(),
        TransportServer::crd(),
        GlobalConfiguration::crd(),
    ];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).context("Failed to serialize CRD")?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}
