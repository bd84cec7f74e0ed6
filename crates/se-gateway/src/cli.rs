//! Command line parsing

use anyhow::{Context, bail};

/// Run mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP API + scheduler
    Server,
    /// One reconciliation pass; `None` uses the configured sample size
    Sync(Option<usize>),
    /// Read-only directory metrics
    Metrics,
    /// Metrics with timing and a success flag
    Volumetry,
    /// Apply event retention once
    Cleanup,
    Help,
    Version,
}

impl RunMode {
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            RunMode::Sync(_) | RunMode::Metrics | RunMode::Volumetry | RunMode::Cleanup
        )
    }
}

/// Parse arguments, program name excluded. The first mode flag wins.
pub fn parse_args<I, S>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sync" | "-s" => {
                let sample_size = match iter.peek() {
                    Some(next) if !next.starts_with('-') => {
                        let n: usize = next
                            .parse()
                            .with_context(|| format!("Invalid sample size: {}", next))?;
                        Some(n)
                    }
                    _ => None,
                };
                return Ok(RunMode::Sync(sample_size));
            }
            "--metrics" | "-m" => return Ok(RunMode::Metrics),
            "--volumetry" => return Ok(RunMode::Volumetry),
            "--cleanup" => return Ok(RunMode::Cleanup),
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            _ => {}
        }
    }

    Ok(RunMode::Server)
}

/// Print help message
pub fn print_help() {
    println!("school-events - school directory and calendar sync");
    println!();
    println!("Usage:");
    println!("  school-events               Start server mode (HTTP API + scheduler)");
    println!("  school-events --sync [N]    Run one sync pass over N users and print the outcome");
    println!("  school-events --metrics     Sample the directory and print metrics");
    println!("  school-events --volumetry   Run a timed volumetry analysis");
    println!("  school-events --cleanup     Delete events past the retention horizon");
    println!("  school-events --help        Show this help message");
    println!("  school-events --version     Show version");
    println!();
    println!("Environment Variables:");
    println!("  GRAPH_TENANT_ID       Directory tenant (required)");
    println!("  GRAPH_CLIENT_ID       Application id (required)");
    println!("  GRAPH_CLIENT_SECRET   Application secret (required)");
    println!("  SYNC_SAMPLE_SIZE      Users per sync pass (default: 200)");
    println!("  SYNC_EVENT_WINDOW     Events fetched per user (default: 180)");
    println!("  RETENTION_DAYS        Event retention horizon (default: 30)");
    println!("  API_KEY               Bearer key for /api routes (optional)");
    println!("  API_PORT              HTTP API port (default: 3000)");
    println!("  DB_PATH               SQLite database path");
    println!("  SCHEDULE_ENABLED      Run scheduled jobs in server mode (default: true)");
    println!("  SCHEDULE_CONFIG_PATH  Path to the job list (schedule.toml)");
}
