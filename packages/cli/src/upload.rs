//! The `upload` subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use bucket_browser_cli_utils::{IndicatifProgress, MultiProgress, prompt_conflict};
use bucket_browser_store::ConnectionSlot;
use bucket_browser_upload::item::UploadCandidate;
use bucket_browser_upload::multipart::UploadOptions;
use bucket_browser_upload::queue::UploadQueue;
use bucket_browser_upload::source::FileSource;
use bucket_browser_upload_models::ConflictPolicy;
use clap::ValueEnum;

use crate::output::print_items;
use crate::walk;

/// What to do when an upload target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnConflict {
    /// Prompt for each conflict
    Ask,
    Skip,
    Replace,
    KeepBoth,
}

impl OnConflict {
    const fn policy(self) -> Option<ConflictPolicy> {
        match self {
            Self::Ask => None,
            Self::Skip => Some(ConflictPolicy::Skip),
            Self::Replace => Some(ConflictPolicy::Replace),
            Self::KeepBoth => Some(ConflictPolicy::KeepBoth),
        }
    }
}

pub struct UploadArgs {
    pub paths: Vec<PathBuf>,
    pub to: String,
    pub on_conflict: OnConflict,
    pub part_size_mib: u64,
    pub concurrency: usize,
    pub json: bool,
}

/// Enqueues local paths, settles conflicts, and drains the queue.
///
/// # Errors
///
/// Returns an error if the local files cannot be read, the bucket cannot
/// be reached, a prompt fails, or any upload fails.
pub async fn run(
    slot: &ConnectionSlot,
    multi: &MultiProgress,
    args: UploadArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = walk::collect(&args.paths)?;
    if files.is_empty() {
        log::warn!("Nothing to upload");
        return Ok(());
    }

    let mut candidates = Vec::with_capacity(files.len());
    for file in files {
        let source = FileSource::open(&file.path).await?;
        candidates.push(UploadCandidate::new(file.relative_path, Arc::new(source)));
    }

    let mut queue = UploadQueue::new();
    let summary = queue.enqueue(slot, candidates, &args.to).await?;
    if summary.duplicates > 0 {
        log::info!("Dropped {} duplicate path(s)", summary.duplicates);
    }

    let mut apply_to_all = args.on_conflict.policy();
    for id in queue.conflicts() {
        let policy = match apply_to_all {
            Some(policy) => policy,
            None => {
                let key = queue
                    .get(id)
                    .map(|item| item.target_key().to_string())
                    .unwrap_or_default();
                let choice = multi.suspend(|| prompt_conflict(&key))?;
                if choice.apply_to_all {
                    apply_to_all = Some(choice.policy);
                }
                choice.policy
            }
        };

        if let Err(e) = queue.resolve(slot, id, policy).await {
            log::warn!("Could not resolve conflict: {e}");
        }
    }

    let controller = queue.controller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, canceling the current upload...");
            controller.stop();
        }
    });

    let options = UploadOptions::default()
        .with_part_size(args.part_size_mib.saturating_mul(1024 * 1024))
        .with_concurrency(args.concurrency);
    let drained = queue
        .drain(slot, &options, |item| {
            IndicatifProgress::bytes_bar(multi, item.relative_path())
        })
        .await;
    interrupt.abort();
    let drained = drained?;

    let items = queue.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print_items(&items);
    }
    log::info!("{drained}");

    if drained.failed > 0 {
        return Err(format!("{} upload(s) failed", drained.failed).into());
    }
    Ok(())
}
