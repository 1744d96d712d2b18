//! Names of the metrics cloudmon records about itself.
//!
//! Centralized so the reporter and the CLI agree on them. Names are
//! dot-separated; the reporter turns dots into path segments.

/// Reporter self-monitoring
pub mod reporter {
    /// Ticks that built a non-empty batch, whether or not the write succeeded
    pub const TICKS_TOTAL: &str = "cloudmon.reporter.ticks";
    /// Time series points accepted by the backend
    pub const POINTS_SUBMITTED_TOTAL: &str = "cloudmon.reporter.points_submitted";
    /// Failed backend writes
    pub const SUBMIT_ERRORS_TOTAL: &str = "cloudmon.reporter.submit_errors";
    /// Size of the most recent batch
    pub const LAST_BATCH_SIZE: &str = "cloudmon.reporter.last_batch_size";
}

/// Process-level metrics published by `cloudmon run`
pub mod process {
    /// Seconds since the process started
    pub const UPTIME_SECONDS: &str = "cloudmon.process.uptime_seconds";
}
