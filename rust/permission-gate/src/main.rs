//! permgate - inspect what the admin API lets a token do.

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use permission_gate::{GateConfig, GateError, PermissionGate, StaticToken};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "permgate")]
#[command(about = "Check admin panel permissions for an access token")]
#[command(version)]
struct Cli {
    /// API base URL
    #[arg(long, env = "PERMGATE_URL", global = true)]
    url: Option<String>,

    /// Bearer access token
    #[arg(long, env = "PERMGATE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Freshness window for cached decisions
    #[arg(long, env = "PERMGATE_CACHE_TTL_SECS", global = true)]
    cache_ttl_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the server whether an action on a resource is allowed
    Check {
        resource: String,
        action: String,
    },
    /// List the permissions granted to the token
    Whoami,
    /// Test permission strings against the token's permission list
    Has {
        #[arg(value_name = "PERMISSION", required = true)]
        permissions: Vec<String>,

        /// Require every permission instead of any
        #[arg(long, default_value = "false")]
        all: bool,
    },
    /// Check version
    Version,
}

/// Exit status for a transient failure (sysexits `EX_TEMPFAIL`).
const EXIT_TEMPFAIL: u8 = 75;

/// Exit status for a missing or rejected token (sysexits `EX_NOPERM`).
const EXIT_NOPERM: u8 = 77;

/// Log a failed permission load and pick the exit status for it.
fn failure_status(err: &GateError) -> u8 {
    if err.is_transient() {
        warn!("{} (transient, retry later)", err);
        EXIT_TEMPFAIL
    } else if err.is_auth() {
        error!("{}", err);
        EXIT_NOPERM
    } else {
        error!("{}", err);
        1
    }
}

impl Cli {
    /// Settings from the environment, overridden by command-line flags.
    fn config(&self, base: GateConfig) -> GateConfig {
        let mut config = base;
        if let Some(url) = &self.url {
            config = config.with_base_url(url);
        }
        if let Some(secs) = self.cache_ttl_secs {
            config = config.with_cache_ttl(Duration::from_secs(secs));
        }
        config
    }

    fn gate(&self) -> anyhow::Result<PermissionGate> {
        let config = self.config(GateConfig::from_env());
        info!("Server URL: {}", config.base_url);

        let token = StaticToken::new(self.token.clone().unwrap_or_default());
        Ok(PermissionGate::new(&config, Arc::new(token))?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Check { resource, action } => {
            let gate = cli.gate()?;
            let result = gate.check_permission(resource, action).await;
            if result.allowed {
                println!("allowed {}:{}", resource, action);
                return Ok(ExitCode::SUCCESS);
            }
            match result.reason {
                Some(reason) => println!("denied {}:{} ({})", resource, action, reason),
                None => println!("denied {}:{}", resource, action),
            }
            Ok(ExitCode::FAILURE)
        }
        Commands::Whoami => {
            let gate = cli.gate()?;
            if let Err(e) = gate.reload().await {
                return Ok(ExitCode::from(failure_status(&e)));
            }
            for permission in gate.permissions() {
                println!("{}", permission);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Has { permissions, all } => {
            let gate = cli.gate()?;
            if let Err(e) = gate.reload().await {
                return Ok(ExitCode::from(failure_status(&e)));
            }
            let granted = if *all {
                gate.has_all_permissions(permissions.as_slice())
            } else {
                gate.has_any_permission(permissions.as_slice())
            };
            println!("{}", if granted { "yes" } else { "no" });
            Ok(if granted {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Version => {
            println!("permgate {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
