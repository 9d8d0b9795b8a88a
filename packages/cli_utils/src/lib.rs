#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the bucket browser.
//!
//! Provides `indicatif` byte bars behind the upload [`ProgressCallback`]
//! trait, [`init_logger`] which sets up `indicatif-log-bridge` so log lines
//! and bars share the terminal, and the `dialoguer` conflict prompt.

use std::sync::Arc;
use std::time::Duration;

use bucket_browser_upload::progress::ProgressCallback;
use bucket_browser_upload_models::ConflictPolicy;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const PENDING_TEMPLATE: &str = "{spinner:.cyan} {msg} (starting)";
const TRANSFER_TEMPLATE: &str =
    "  {msg:30!} {wide_bar:.green/dim} {bytes}/{total_bytes} {bytes_per_sec} [{eta}]";

/// One upload's byte bar inside a shared [`MultiProgress`].
///
/// Shows a spinner until the source length arrives, then confirmed bytes
/// with throughput and ETA.
pub struct IndicatifProgress {
    bar: ProgressBar,
    transfer_style: ProgressStyle,
}

impl IndicatifProgress {
    #[must_use]
    pub fn bytes_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        let pending = ProgressStyle::with_template(PENDING_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let transfer_style = ProgressStyle::with_template(TRANSFER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bar = multi.add(ProgressBar::new_spinner().with_style(pending));
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        Arc::new(Self {
            bar,
            transfer_style,
        })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.transfer_style.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn set_position(&self, confirmed: u64) {
        self.bar.set_position(confirmed);
    }

    fn finish(&self, outcome: String) {
        self.bar.disable_steady_tick();
        self.bar.abandon_with_message(outcome);
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind an
/// `indicatif-log-bridge` wrapper and hands back the [`MultiProgress`]
/// every bar has to join, so log records never tear a bar mid-redraw.
///
/// Calling it twice keeps the first logger.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();
    let env_logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let max_level = env_logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), env_logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}

/// A conflict decision from [`prompt_conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictChoice {
    pub policy: ConflictPolicy,
    /// Apply the same decision to every remaining conflict.
    pub apply_to_all: bool,
}

const CONFLICT_CHOICES: &[(&str, ConflictPolicy, bool)] = &[
    ("Replace", ConflictPolicy::Replace, false),
    ("Skip", ConflictPolicy::Skip, false),
    ("Keep both", ConflictPolicy::KeepBoth, false),
    ("Replace all", ConflictPolicy::Replace, true),
    ("Skip all", ConflictPolicy::Skip, true),
    ("Keep both for all", ConflictPolicy::KeepBoth, true),
];

/// Asks how to handle an upload whose target key already exists.
///
/// # Errors
///
/// Returns an error if the terminal prompt fails.
pub fn prompt_conflict(key: &str) -> Result<ConflictChoice, dialoguer::Error> {
    let labels: Vec<&str> = CONFLICT_CHOICES.iter().map(|(label, ..)| *label).collect();
    let idx = Select::new()
        .with_prompt(format!("{key} already exists"))
        .items(&labels)
        .default(1)
        .interact()?;

    let (_, policy, apply_to_all) = CONFLICT_CHOICES[idx];
    Ok(ConflictChoice {
        policy,
        apply_to_all,
    })
}

/// Asks for a yes/no confirmation, defaulting to no.
///
/// # Errors
///
/// Returns an error if the terminal prompt fails.
pub fn confirm(prompt: &str) -> Result<bool, dialoguer::Error> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
}
