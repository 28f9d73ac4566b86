use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};
use karaoke_core::{EventSink, PipelineEvent};

const DISCOVERY_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";
const BATCH_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({per_sec}, ETA: {eta})";

/// Traduce los eventos del pipeline a una barra de progreso en la terminal.
pub struct ProgressSink {
    bar: ProgressBar,
    batch_size: usize,
}

impl ProgressSink {
    pub fn new(batch_size: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template(DISCOVERY_TEMPLATE) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("scanning collection");

        Self { bar, batch_size }
    }

    pub fn finish(&self, message: &'static str) {
        self.bar.finish_with_message(message);
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::SongDiscovered { original_index, .. } => {
                if original_index % 100 == 0 {
                    self.bar.set_message(format!("{} songs found", original_index + 1));
                }
            }
            PipelineEvent::SongSkipped { label, reason } => {
                self.bar.println(format!("skipped {label}: {reason}"));
            }
            PipelineEvent::SongDropped {
                original_index,
                reason,
                ..
            } => {
                self.bar.println(format!("dropped song {original_index}: {reason}"));
            }
            PipelineEvent::DiscoveryFinished { songs, skipped } => {
                self.bar.set_length(songs.div_ceil(self.batch_size) as u64);
                if let Ok(style) = ProgressStyle::default_bar().template(BATCH_TEMPLATE) {
                    self.bar.set_style(style.progress_chars("=> "));
                }
                self.bar.set_message(format!("{songs} songs, {skipped} skipped"));
            }
            PipelineEvent::BatchCompleted { .. } => self.bar.inc(1),
            PipelineEvent::BatchFailed { batch_index, reason } => {
                self.bar.inc(1);
                self.bar.println(format!("batch {batch_index} failed: {reason}"));
            }
            PipelineEvent::GroupSealed {
                group_index,
                batches,
                size_bytes,
            } => {
                self.bar.println(format!(
                    "karaoke_{group_index}.zip sealed: {} batches, {}",
                    batches.len(),
                    ByteSize::b(size_bytes)
                ));
            }
            PipelineEvent::RunCancelled => self.bar.abandon_with_message("cancelled"),
            _ => {}
        }
    }
}
