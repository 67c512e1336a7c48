/*!
 * Portcullis CLI - Command Line Interface
 */

use anyhow::Context;
use clap::{Parser, Subcommand};
use portcullis::{
    config::Config,
    error::{PortcullisError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging, Portcullis, ProvisionRequest, ServiceRequest, ServiceType,
};
use portcullis_sentinel::MaintenanceScheduler;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "portcullis")]
#[command(version, about = "Provision access endpoints and personal policies for workloads", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_value = "portcullis.toml",
        global = true
    )]
    config: PathBuf,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update endpoints for a workload and attach access
    Provision {
        /// Workload (container or pod) id
        workload: String,

        /// Service to expose, as TYPE or TYPE:PORT (repeatable)
        #[arg(short = 's', long = "service", value_name = "TYPE[:PORT]", value_parser = parse_service)]
        services: Vec<(ServiceType, ServiceRequest)>,

        /// Principal granted personal access
        #[arg(short = 'e', long)]
        email: Option<String>,

        /// Namespace used for discovery
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },

    /// Delete a workload's endpoints and any personal policies they orphan
    Teardown {
        /// Workload (container or pod) id
        workload: String,
    },

    /// Run one orphaned-policy sweep
    Sweep,

    /// Run the maintenance scheduler until interrupted
    Run,
}

fn parse_service(value: &str) -> Result<(ServiceType, ServiceRequest), String> {
    let (name, port) = match value.split_once(':') {
        Some((name, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in {:?}", value))?;
            (name, Some(port))
        }
        None => (value, None),
    };

    let service_type = name.parse::<ServiceType>()?;
    Ok((
        service_type,
        ServiceRequest {
            enabled: Some(true),
            port,
        },
    ))
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<PortcullisError>()
                .map(PortcullisError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.verbose |= cli.verbose;
    logging::init_logging(&config)?;

    let portcullis = Portcullis::from_config(&config)?;

    match cli.command {
        Commands::Provision {
            workload,
            services,
            email,
            namespace,
        } => {
            let request = ProvisionRequest {
                services: services.into_iter().collect(),
                principal_email: email,
                namespace,
            };
            let report = portcullis.reconcile_all(&workload, &request).await?;
            print_json(&report)?;
            Ok(report.exit_code())
        }

        Commands::Teardown { workload } => {
            let report = portcullis.teardown(&workload).await?;
            print_json(&report)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Sweep => {
            let run = portcullis.run_maintenance_once().await;
            print_json(&run)?;
            Ok(if run.success { EXIT_SUCCESS } else { EXIT_PARTIAL })
        }

        Commands::Run => {
            let scheduler = MaintenanceScheduler::new(portcullis.collector(), config.maintenance);

            tokio::select! {
                _ = scheduler.run() => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("waiting for Ctrl-C")?;
                    info!("Interrupted; stopping maintenance scheduler");
                }
            }
            Ok(EXIT_SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service() {
        assert_eq!(
            parse_service("web:8080"),
            Ok((ServiceType::Web, ServiceRequest::on_port(8080)))
        );

        let (service_type, request) = parse_service("ssh").unwrap();
        assert_eq!(service_type, ServiceType::Shell);
        assert_eq!(request.port, None);

        assert!(parse_service("web:http").is_err());
        assert!(parse_service("ftp").is_err());
    }

    #[test]
    fn test_cli_parses_provision() {
        let cli = Cli::try_parse_from([
            "portcullis",
            "-c",
            "/etc/portcullis.toml",
            "provision",
            "c1234567",
            "-s",
            "shell",
            "-s",
            "tcp:6379",
            "--email",
            "dev@example.com",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/portcullis.toml"));
        match cli.command {
            Commands::Provision {
                workload, services, ..
            } => {
                assert_eq!(workload, "c1234567");
                assert_eq!(services.len(), 2);
                assert_eq!(services[1], (ServiceType::Tcp, ServiceRequest::on_port(6379)));
            }
            _ => panic!("expected provision"),
        }
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
