//! User-facing progress output.

use tracing::{error, info};

use keel_stack::{PhaseRow, PhaseStatus};

/// Receives progress while a stack is provisioning.
pub trait ProgressReporter: Send + Sync {
    /// A long-running operation started.
    fn start(&self, message: &str);

    /// The phase rows changed.
    fn rows(&self, rows: &[PhaseRow]);

    /// The operation finished.
    fn stop(&self, message: &str, success: bool);
}

/// Progress reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn start(&self, message: &str) {
        info!("{}", message);
    }

    fn rows(&self, rows: &[PhaseRow]) {
        let done = rows.iter().filter(|r| r.status == PhaseStatus::Complete).count();
        info!("Progress [{}/{}]", done, rows.len());
        for row in rows {
            info!("  {}", row);
        }
    }

    fn stop(&self, message: &str, success: bool) {
        if success {
            info!("{}", message);
        } else {
            error!("{}", message);
        }
    }
}
