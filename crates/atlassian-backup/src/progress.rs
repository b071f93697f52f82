//! Byte level transfer progress.
//!

use tracing::info;

use crate::context::Context;

/// Report interval when the total size is unknown.
const UNKNOWN_TOTAL_INTERVAL: u64 = 64 * 1024 * 1024;

/// Tracks the bytes transferred for a single file and logs at every 10%.
#[derive(Debug)]
pub struct Progress {
    context: Context,
    label: String,
    total: Option<u64>,
    transferred: u64,
    last_reported: u64,
}

impl Progress {
    /// Start tracking a transfer of `total` bytes, if known.
    pub fn new(context: Context, label: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            context,
            label: label.into(),
            total: total.filter(|total| *total > 0),
            transferred: 0,
            last_reported: 0,
        }
    }

    /// Record `bytes` more bytes transferred.
    pub fn advance(&mut self, bytes: u64) {
        self.transferred = self.transferred.saturating_add(bytes);

        match self.total {
            Some(total) => {
                let percent = self.percent(total);
                let step = percent - percent % 10;
                if step > self.last_reported && step < 100 {
                    self.last_reported = step;
                    info!(
                        "{}{}: {step}% ({}/{} bytes)",
                        self.context, self.label, self.transferred, total
                    );
                }
            }
            None => {
                if self.transferred - self.last_reported >= UNKNOWN_TOTAL_INTERVAL {
                    self.last_reported = self.transferred;
                    info!("{}{}: {} bytes", self.context, self.label, self.transferred);
                }
            }
        }
    }

    /// Log the completed transfer and return the bytes transferred.
    pub fn finish(self) -> u64 {
        info!(
            "{}{}: done, {} bytes",
            self.context, self.label, self.transferred
        );
        self.transferred
    }

    /// The bytes transferred so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    fn percent(&self, total: u64) -> u64 {
        let percent = u128::from(self.transferred) * 100 / u128::from(total);
        u64::try_from(percent.min(100)).unwrap_or(100)
    }
}
