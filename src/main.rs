//! fast-deploy CLI
//!
//! ```bash
//! # Scaffold a config file in the current directory
//! fast-deploy init
//!
//! # Deploy every target from the default config file
//! fast-deploy --config
//!
//! # Deploy from a specific config file, four hosts at a time
//! fast-deploy --config fleet.config.json --jobs 4
//! ```

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use fast_deploy::{BatchConfig, run_all, run_all_concurrent};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "fast-deploy.config.json";

const TEMPLATE_CONFIG: &str = r#"{
  "host": "203.0.113.10",
  "port": 22,
  "username": "root",
  "password": "******",
  "cname": "nginx",
  "dist": "./build",
  "remoteStatic": "/srv/static/app",
  "debug": true
}
"#;

/// Deploy build artifacts to remote hosts over SSH
#[derive(Parser)]
#[command(name = "fast-deploy", version)]
struct Cli {
    /// Deploy every target from a JSON config file (object or array)
    #[arg(
        short,
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = DEFAULT_CONFIG
    )]
    config: Option<PathBuf>,

    /// Maximum targets in flight at once (1 = strictly sequential)
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a template config file in the current directory
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fast_deploy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Init) = cli.command {
        let cwd = std::env::current_dir()?;
        let written = scaffold_config(&cwd)?;
        info!("created {}", written.display());
        return Ok(());
    }

    let Some(config_path) = cli.config else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let failed = run_batch(&config_path, cli.jobs).await?;
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Load the config file and drive the batch; returns the failed-target count.
async fn run_batch(config_path: &Path, jobs: usize) -> anyhow::Result<usize> {
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(config_path)
    };

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("cannot read config file {}", config_path.display()))?;
    let config: BatchConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", config_path.display()))?;
    let targets = config.into_targets();

    info!("🚀 deployment started ({} targets)", targets.len());
    let results = if jobs > 1 {
        run_all_concurrent(&targets, jobs).await
    } else {
        run_all(&targets).await
    };

    let mut failed = 0;
    for (index, slot) in results.iter().enumerate() {
        if let Some(error) = slot {
            failed += 1;
            warn!("target {} ({}): {error}", index + 1, targets[index].host);
        }
    }
    info!(
        "🏁 deployment finished: {} ok, {} failed",
        results.len() - failed,
        failed
    );
    Ok(failed)
}

/// Write the template config into `dir`.
///
/// Refuses to overwrite an existing config; writes a timestamp-suffixed
/// alternate name instead and leaves the original untouched.
fn scaffold_config(dir: &Path) -> anyhow::Result<PathBuf> {
    let preferred = dir.join(DEFAULT_CONFIG);
    let path = if preferred.exists() {
        warn!("{DEFAULT_CONFIG} already exists");
        let stamp = to_base36(chrono::Utc::now().timestamp_millis() as u64);
        dir.join(format!("fast-deploy-{stamp}.config.json"))
    } else {
        preferred
    };
    std::fs::write(&path, TEMPLATE_CONFIG)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// Base36 rendering of a timestamp, for short collision-free file names.
fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_config_is_valid_json() {
        let config: BatchConfig = serde_json::from_str(TEMPLATE_CONFIG).unwrap();
        let targets = config.into_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].port(), 22);
        assert!(targets[0].validate().is_ok());
    }

    #[test]
    fn test_scaffold_writes_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let written = scaffold_config(dir.path()).unwrap();
        assert_eq!(written, dir.path().join(DEFAULT_CONFIG));
        assert!(written.exists());
    }

    #[test]
    fn test_scaffold_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join(DEFAULT_CONFIG);
        std::fs::write(&existing, "{\"keep\": true}").unwrap();

        let written = scaffold_config(dir.path()).unwrap();
        assert_ne!(written, existing);
        assert!(
            written
                .file_name()
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("fast-deploy-")
        );
        // Original preserved byte for byte.
        assert_eq!(
            std::fs::read_to_string(&existing).unwrap(),
            "{\"keep\": true}"
        );
        // Alternate name carries a base36 stamp, not decimal digits only.
        let stamp = written
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .strip_prefix("fast-deploy-")
            .unwrap()
            .strip_suffix(".config.json")
            .unwrap()
            .to_string();
        assert!(!stamp.is_empty());
        assert!(stamp.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1296), "100");
        assert_eq!(to_base36(46_655), "zzz");
    }

    #[test]
    fn test_cli_parses_bare_config_flag() {
        let cli = Cli::parse_from(["fast-deploy", "--config"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new(DEFAULT_CONFIG)));
        assert_eq!(cli.jobs, 1);
    }

    #[test]
    fn test_cli_parses_config_with_path() {
        let cli = Cli::parse_from(["fast-deploy", "-c", "fleet.config.json", "--jobs", "4"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("fleet.config.json")));
        assert_eq!(cli.jobs, 4);
    }
}
