#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line file manager for S3-compatible buckets.
//!
//! Uses `indicatif-log-bridge` (via [`bucket_browser_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and upload bars never fight for the terminal.

mod output;
mod upload;
mod walk;

use std::path::PathBuf;

use bucket_browser_store::browse::{folder_stats, list_directory, search};
use bucket_browser_store::manage::{
    create_folder, delete_many, put_text, rename_file, rename_folder,
};
use bucket_browser_store::preview::{DownloadOutcome, download_to, preview_url};
use bucket_browser_store::profile::ProfileSet;
use bucket_browser_store::transfer::{TransferMode, transfer};
use bucket_browser_store::ConnectionSlot;
use bucket_browser_store_models::keys::{basename, is_folder_key};
use bucket_browser_store_models::mime::{CategoryFilter, filter_by_category};
use bucket_browser_store_models::ConflictPolicy;
use clap::{Parser, Subcommand};

use crate::output::{format_size, print_entries};
use crate::upload::{OnConflict, UploadArgs};

#[derive(Parser)]
#[command(name = "bucket_browser", about = "File manager for S3-compatible buckets")]
struct Cli {
    /// Profile file (default: `BUCKET_BROWSER_CONFIG`, then `bucket_browser.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Profile to use (default: the file's `default`, then the first profile)
    #[arg(long, global = true)]
    profile: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured connection profiles
    Profiles,
    /// List a directory (folders first)
    Ls {
        /// Directory prefix (default: bucket root)
        #[arg(default_value = "")]
        prefix: String,
        /// Only show a category (image, video, audio, document, code,
        /// archive, other) or a literal extension
        #[arg(long)]
        category: Option<CategoryFilter>,
    },
    /// Search file and folder names
    Find {
        /// Case-insensitive substring to match
        term: String,
        /// Directory to search under
        #[arg(long, default_value = "")]
        prefix: String,
        /// Only show a category or a literal extension
        #[arg(long)]
        category: Option<CategoryFilter>,
    },
    /// Show total size, object count, and modification range of a folder
    Stats {
        prefix: String,
    },
    /// Upload local files and folders
    Upload {
        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination directory in the bucket
        #[arg(long, default_value = "")]
        to: String,
        /// How to handle keys that already exist
        #[arg(long, value_enum, default_value = "ask")]
        on_conflict: OnConflict,
        /// Multipart part size in MiB
        #[arg(long, default_value_t = 5)]
        part_size_mib: u64,
        /// Concurrent part uploads per file (1-8)
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Download an object
    Get {
        key: String,
        /// Local path (default: the key's file name)
        out: Option<PathBuf>,
        /// Download even if the local file already matches
        #[arg(long)]
        force: bool,
    },
    /// Print a view or download URL for an object
    Url {
        key: String,
        /// Presign a download link with an attachment file name
        #[arg(long)]
        download: bool,
    },
    /// Create a folder
    Mkdir {
        path: String,
    },
    /// Write a small text object
    PutText {
        key: String,
        text: String,
        /// Content type (default: `text/plain; charset=utf-8`)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete objects and folders
    Rm {
        /// Keys to delete (folder keys end with `/`)
        #[arg(required = true)]
        keys: Vec<String>,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Move an object or folder
    Mv {
        src: String,
        dst: String,
        /// replace, skip, or keep-both
        #[arg(long, default_value = "skip")]
        on_conflict: ConflictPolicy,
    },
    /// Copy an object or folder
    Cp {
        src: String,
        dst: String,
        /// replace, skip, or keep-both
        #[arg(long, default_value = "skip")]
        on_conflict: ConflictPolicy,
    },
    /// Rename an object or folder in place
    Rename {
        key: String,
        new_name: String,
    },
}

fn connect(cli: &Cli) -> Result<ConnectionSlot, Box<dyn std::error::Error>> {
    let profiles = ProfileSet::resolve(cli.config.as_deref())?;
    let profile = profiles.select(cli.profile.as_deref())?;
    let mut slot = ConnectionSlot::new();
    slot.connect_profile(profile);
    Ok(slot)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = bucket_browser_cli_utils::init_logger();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Profiles) {
        let profiles = ProfileSet::resolve(cli.config.as_deref())?;
        let default = profiles.select(None)?.name.clone();
        println!("{:<24} {:<8} ENDPOINT", "NAME", "REGION");
        println!("{}", "-".repeat(60));
        for profile in &profiles.profiles {
            let marker = if profile.name == default { " *" } else { "" };
            println!(
                "{:<24} {:<8} {}{marker}",
                profile.name, profile.region, profile.endpoint
            );
        }
        return Ok(());
    }

    let slot = connect(&cli)?;
    let store = slot.require()?;
    let store = store.as_ref();

    match cli.command {
        Commands::Profiles => {}
        Commands::Ls { prefix, category } => {
            let mut entries = list_directory(store, &prefix).await?;
            if let Some(filter) = &category {
                entries = filter_by_category(entries, filter);
            }
            if cli.json {
                print_json(&entries)?;
            } else {
                print_entries(&entries);
            }
        }
        Commands::Find {
            term,
            prefix,
            category,
        } => {
            let mut entries = search(store, &prefix, &term).await?;
            if let Some(filter) = &category {
                entries = filter_by_category(entries, filter);
            }
            log::info!("{} match(es) for {term:?}", entries.len());
            if cli.json {
                print_json(&entries)?;
            } else {
                print_entries(&entries);
            }
        }
        Commands::Stats { prefix } => {
            let stats = folder_stats(store, &prefix).await?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("Objects:  {}", stats.object_count);
                println!("Size:     {}", format_size(stats.total_size));
                if let (Some(first), Some(last)) =
                    (stats.earliest_modified, stats.latest_modified)
                {
                    println!("Modified: {first} .. {last}");
                }
            }
        }
        Commands::Upload {
            paths,
            to,
            on_conflict,
            part_size_mib,
            concurrency,
        } => {
            upload::run(
                &slot,
                &multi,
                UploadArgs {
                    paths,
                    to,
                    on_conflict,
                    part_size_mib,
                    concurrency,
                    json: cli.json,
                },
            )
            .await?;
        }
        Commands::Get { key, out, force } => {
            let out = out.unwrap_or_else(|| PathBuf::from(basename(&key)));
            match download_to(store, &key, &out, force).await? {
                DownloadOutcome::Downloaded { bytes } => {
                    println!("{} -> {} ({})", key, out.display(), format_size(bytes));
                }
                DownloadOutcome::Skipped => println!("{} is up to date", out.display()),
            }
        }
        Commands::Url { key, download } => {
            let url = preview_url(store, &key, download, slot.public_base_url()).await?;
            println!("{url}");
        }
        Commands::Mkdir { path } => {
            let key = create_folder(store, &path).await?;
            println!("Created {key}");
        }
        Commands::PutText {
            key,
            text,
            content_type,
        } => {
            put_text(store, &key, &text, content_type.as_deref()).await?;
            println!("Wrote {} to {key}", format_size(text.len() as u64));
        }
        Commands::Rm { keys, yes } => {
            let prompt = format!("Delete {}?", keys.join(", "));
            if !yes && !multi.suspend(|| bucket_browser_cli_utils::confirm(&prompt))? {
                println!("Nothing deleted.");
                return Ok(());
            }
            let deleted = delete_many(store, &keys).await?;
            println!("Deleted {deleted} object(s)");
        }
        Commands::Mv {
            src,
            dst,
            on_conflict,
        } => {
            let moved = transfer(store, &src, &dst, TransferMode::Move, on_conflict).await?;
            report_transfer(&src, moved);
        }
        Commands::Cp {
            src,
            dst,
            on_conflict,
        } => {
            let copied = transfer(store, &src, &dst, TransferMode::Copy, on_conflict).await?;
            report_transfer(&src, copied);
        }
        Commands::Rename { key, new_name } => {
            let new_key = if is_folder_key(&key) {
                rename_folder(store, &key, &new_name).await?
            } else {
                rename_file(store, &key, &new_name).await?
            };
            println!("{key} -> {new_key}");
        }
    }

    Ok(())
}

fn report_transfer(src: &str, result: Option<String>) {
    match result {
        Some(key) => println!("{src} -> {key}"),
        None => println!("Skipped {src}: destination exists"),
    }
}
