// crates/client/src/bin/jobwatch-tail.rs
//! Follow a jobwatch server and print job changes as they arrive.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use jobwatch_client::{
    ClientConfig, FileVersionStore, MemoryVersionStore, VersionStore, WatchClient,
};
use jobwatch_core::{Job, JobId, JobsView};
use jobwatch_observability::{init_logging, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "jobwatch-tail", version, about = "Follow job changes on a jobwatch server")]
struct Args {
    /// Server base URL.
    #[arg(long, env = "JOBWATCH_URL", default_value = "http://127.0.0.1:47900")]
    url: String,

    /// Finished jobs to request in each snapshot.
    #[arg(long)]
    history_limit: Option<usize>,

    /// Where to persist the last observed version.
    #[arg(long, env = "JOBWATCH_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Keep the observed version in memory only.
    #[arg(long, conflicts_with = "state_file")]
    no_persist: bool,

    #[arg(long, env = "JOBWATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format, "warn,jobwatch_client=info")?;

    let store: Arc<dyn VersionStore> = if args.no_persist {
        Arc::new(MemoryVersionStore::new())
    } else {
        let path = args
            .state_file
            .or_else(FileVersionStore::default_path)
            .context("no state file given and no local data directory")?;
        tracing::info!(path = %path.display(), "persisting watch version");
        Arc::new(FileVersionStore::new(path))
    };

    let config = ClientConfig {
        history_limit: args.history_limit,
        ..ClientConfig::new(args.url)
    };
    let client = WatchClient::new(config, store)?;

    let seen: Mutex<HashMap<JobId, Job>> = Mutex::new(HashMap::new());
    let _listener = client.subscribe(move |view| {
        let mut seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        print_changes(view, &mut seen);
    });

    client.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    client.stop();
    Ok(())
}

fn print_changes(view: &JobsView, seen: &mut HashMap<JobId, Job>) {
    let mut current: HashMap<JobId, Job> = HashMap::new();
    for job in view.active().iter().chain(view.history()) {
        if seen.get(&job.id) != Some(job) {
            println!("{}", describe(view.version(), job));
        }
        current.insert(job.id.clone(), job.clone());
    }
    for id in seen.keys().filter(|id| !current.contains_key(*id)) {
        println!("[v{}] {id} removed", view.version());
    }
    *seen = current;
}

fn describe(version: u64, job: &Job) -> String {
    let progress = &job.progress;
    let mut line = format!(
        "[v{version}] {} {:<9} {} {}/{} {}",
        job.id,
        job.status.as_str(),
        job.title,
        progress.done,
        progress.total,
        progress.unit
    );
    if let Some(note) = &progress.note {
        line.push_str(&format!(" ({note})"));
    }
    if let Some(error) = &job.error {
        line.push_str(&format!(" error: {error}"));
    }
    line
}
