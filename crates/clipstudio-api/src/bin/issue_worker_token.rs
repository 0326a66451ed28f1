//! Mint a worker bearer token with the active signing key.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use clipstudio_queue::{WorkerKeyring, DEFAULT_WORKER_KIND};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Issue a worker token signed with `WORKER_JWT_SECRET`.
#[derive(Parser, Debug)]
#[command(name = "issue-worker-token")]
struct Cli {
    /// Worker instance id, sent by the worker as `x-worker-id`
    #[arg(default_value = "worker-1", env = "WORKER_ID")]
    worker_id: String,

    /// Worker kind recorded in the token
    #[arg(long, default_value = DEFAULT_WORKER_KIND)]
    kind: String,

    /// Token lifetime in days
    #[arg(long, default_value_t = 365, value_parser = clap::value_parser!(u64).range(1..=3650))]
    ttl_days: u64,
}

impl Cli {
    fn ttl(&self) -> anyhow::Result<Duration> {
        self.ttl_days
            .checked_mul(SECS_PER_DAY)
            .map(Duration::from_secs)
            .context("--ttl-days is too large")
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let keyring = WorkerKeyring::from_env().context("loading worker signing keys")?;
    let token = keyring
        .issue(&cli.worker_id, Some(&cli.kind), cli.ttl()?)
        .context("signing worker token")?;

    eprintln!(
        "issue-worker-token: worker_id={} kind={} kid={} ttl_days={}",
        cli.worker_id,
        cli.kind,
        keyring.active_kid(),
        cli.ttl_days
    );
    println!("{}", token);
    Ok(())
}
