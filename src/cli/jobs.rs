//! Job-queue management commands.
//!
//! Commands for inspecting and repairing the work queue:
//! - `deckcast jobs status` - Show queue status
//! - `deckcast jobs list` - List queue items
//! - `deckcast jobs requeue-stale` - Reset stuck items back to pending

use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;

use crate::config;
use crate::queue::{JobQueue, JobState};

/// Job-queue subcommands
#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// Show queue status
    Status,

    /// List items in the queue
    List {
        /// Filter by state (pending, processing, done, failed)
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Reset items stuck in `processing` back to pending
    RequeueStale {
        /// Minutes an item may sit in `processing` before it counts as stuck
        #[arg(long, default_value = "30")]
        minutes: u64,
    },
}

/// Execute a jobs command
pub async fn execute(command: JobsCommands) -> Result<()> {
    match command {
        JobsCommands::Status => execute_status().await,
        JobsCommands::List { state, limit } => execute_list(state, limit).await,
        JobsCommands::RequeueStale { minutes } => execute_requeue_stale(minutes).await,
    }
}

async fn open_queue() -> Result<JobQueue> {
    let path = config::queue_events_path()?;
    Ok(JobQueue::open(path).await?)
}

fn state_tag(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "PEND",
        JobState::Processing => "PROC",
        JobState::Done => "DONE",
        JobState::Failed => "FAIL",
    }
}

/// Show queue status
async fn execute_status() -> Result<()> {
    let queue = open_queue().await?;
    let status = queue.status().await?;

    println!();
    println!("Job Queue Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Queue file:  {}", config::queue_events_path()?.display());
    println!();
    println!("Queue:");
    println!("  Pending:    {}", status.pending);
    println!("  Processing: {}", status.processing);
    println!("  Done:       {}", status.done);
    println!("  Failed:     {}", status.failed);
    println!("  Total:      {}", status.total());
    println!();

    if !status.recent.is_empty() {
        println!("Recent:");
        for item in &status.recent {
            println!(
                "  [{}] {} ({})",
                state_tag(item.state),
                item.kind.describe(),
                item.id
            );
        }
        println!();
    }

    Ok(())
}

/// List queue items, newest first
async fn execute_list(state_filter: Option<String>, limit: usize) -> Result<()> {
    let queue = open_queue().await?;
    let mut items = queue.list().await?;

    if let Some(filter) = state_filter {
        let wanted: JobState = match filter.to_ascii_lowercase().as_str() {
            "pending" => JobState::Pending,
            "processing" => JobState::Processing,
            "done" => JobState::Done,
            "failed" => JobState::Failed,
            other => anyhow::bail!(
                "unknown state '{}' (valid: pending, processing, done, failed)",
                other
            ),
        };
        items.retain(|item| item.state == wanted);
    }

    if items.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    items.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));

    println!("{:<14} {:<6} {:<8} {}", "ID", "STATE", "ATTEMPT", "JOB");
    println!("{}", "-".repeat(72));

    for item in items.iter().take(limit) {
        println!(
            "{:<14} {:<6} {:<8} {}",
            item.id,
            state_tag(item.state),
            item.attempt(),
            item.kind.describe()
        );
        if let Some(error) = &item.error {
            println!("{:<14} last error: {}", "", error);
        }
    }

    Ok(())
}

/// Reset stuck processing items back to pending
async fn execute_requeue_stale(minutes: u64) -> Result<()> {
    let queue = open_queue().await?;
    let requeued = queue
        .requeue_stale(Duration::from_secs(minutes * 60))
        .await?;

    if requeued == 0 {
        println!("No stuck items older than {} minute(s)", minutes);
    } else {
        println!("Requeued {} stuck item(s)", requeued);
    }

    Ok(())
}
