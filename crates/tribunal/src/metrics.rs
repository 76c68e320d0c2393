//! Parser for the `/usr/bin/time -v` metrics stream.
//!
//! Each executed test leaves a `time.txt` in its scratch directory containing
//! line-oriented `Key: Value` pairs. The parser converts them into a
//! structured [`Metrics`] record; the orchestrator then enforces the
//! per-problem limits against `elapsed_ms` and `max_rss_kib`.
//!
//! Unknown keys are skipped (locale-variant `time -v` builds emit extra
//! lines), but a parse only succeeds when the elapsed wall clock, maximum
//! resident set size, and exit status were all seen.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Error produced while parsing a metrics file.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to parse {key:?} value {value:?}")]
    BadValue { key: String, value: String },

    #[error("missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("invalid elapsed time format: {0:?}")]
    BadElapsed(String),

    #[error("failed to read metrics file: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured record of one sandboxed run, as reported by `time -v`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub command: String,
    pub user_time_sec: f64,
    pub system_time_sec: f64,
    pub cpu_percent: i64,
    pub elapsed: Duration,
    pub average_shared_text_kib: i64,
    pub average_unshared_data_kib: i64,
    pub average_stack_kib: i64,
    pub average_total_kib: i64,
    pub max_rss_kib: i64,
    pub average_rss_kib: i64,
    pub major_page_faults: i64,
    pub minor_page_faults: i64,
    pub voluntary_context_switches: i64,
    pub involuntary_context_switches: i64,
    pub swaps: i64,
    pub fs_inputs: i64,
    pub fs_outputs: i64,
    pub socket_messages_sent: i64,
    pub socket_messages_received: i64,
    pub signals_delivered: i64,
    pub page_size_bytes: i64,
    pub exit_status: i64,
}

impl Metrics {
    /// Elapsed wall-clock time in whole milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed.as_millis() as i64
    }

    /// Parse the content of a `time -v` stderr capture.
    pub fn parse(content: &str) -> Result<Self, MetricsError> {
        let mut metrics = Metrics::default();
        let mut saw_elapsed = false;
        let mut saw_max_rss = false;
        let mut saw_exit_status = false;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            // Lines without a key-value separator are not metrics (a crashing
            // program may interleave its own stderr); skip them.
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "Command being timed" => {
                    metrics.command = value.trim_matches('"').to_owned();
                }
                "User time (seconds)" => {
                    metrics.user_time_sec = parse_value(key, value)?;
                }
                "System time (seconds)" => {
                    metrics.system_time_sec = parse_value(key, value)?;
                }
                "Percent of CPU this job got" => {
                    metrics.cpu_percent = parse_value(key, value.trim_end_matches('%'))?;
                }
                "Elapsed (wall clock) time (h:mm:ss or m:ss)" => {
                    metrics.elapsed = parse_elapsed(value)?;
                    saw_elapsed = true;
                }
                "Average shared text size (kbytes)" => {
                    metrics.average_shared_text_kib = parse_value(key, value)?;
                }
                "Average unshared data size (kbytes)" => {
                    metrics.average_unshared_data_kib = parse_value(key, value)?;
                }
                "Average stack size (kbytes)" => {
                    metrics.average_stack_kib = parse_value(key, value)?;
                }
                "Average total size (kbytes)" => {
                    metrics.average_total_kib = parse_value(key, value)?;
                }
                "Maximum resident set size (kbytes)" => {
                    metrics.max_rss_kib = parse_value(key, value)?;
                    saw_max_rss = true;
                }
                "Average resident set size (kbytes)" => {
                    metrics.average_rss_kib = parse_value(key, value)?;
                }
                "Major (requiring I/O) page faults" => {
                    metrics.major_page_faults = parse_value(key, value)?;
                }
                "Minor (reclaiming a frame) page faults" => {
                    metrics.minor_page_faults = parse_value(key, value)?;
                }
                "Voluntary context switches" => {
                    metrics.voluntary_context_switches = parse_value(key, value)?;
                }
                "Involuntary context switches" => {
                    metrics.involuntary_context_switches = parse_value(key, value)?;
                }
                "Swaps" => {
                    metrics.swaps = parse_value(key, value)?;
                }
                "File system inputs" => {
                    metrics.fs_inputs = parse_value(key, value)?;
                }
                "File system outputs" => {
                    metrics.fs_outputs = parse_value(key, value)?;
                }
                "Socket messages sent" => {
                    metrics.socket_messages_sent = parse_value(key, value)?;
                }
                "Socket messages received" => {
                    metrics.socket_messages_received = parse_value(key, value)?;
                }
                "Signals delivered" => {
                    metrics.signals_delivered = parse_value(key, value)?;
                }
                "Page size (bytes)" => {
                    metrics.page_size_bytes = parse_value(key, value)?;
                }
                "Exit status" => {
                    metrics.exit_status = parse_value(key, value)?;
                    saw_exit_status = true;
                }
                other => {
                    tracing::warn!(key = other, "skipping unrecognized metrics key");
                }
            }
        }

        if !saw_elapsed {
            return Err(MetricsError::MissingKey(
                "Elapsed (wall clock) time (h:mm:ss or m:ss)",
            ));
        }
        if !saw_max_rss {
            return Err(MetricsError::MissingKey(
                "Maximum resident set size (kbytes)",
            ));
        }
        if !saw_exit_status {
            return Err(MetricsError::MissingKey("Exit status"));
        }

        Ok(metrics)
    }

    /// Load and parse a metrics file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MetricsError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&content)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MetricsError> {
    value.parse().map_err(|_| MetricsError::BadValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

/// Parse `m:ss[.cc]` or `h:mm:ss[.cc]` into a duration.
fn parse_elapsed(value: &str) -> Result<Duration, MetricsError> {
    let bad = || MetricsError::BadElapsed(value.to_owned());

    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => (0u64, m.parse::<u64>().map_err(|_| bad())?, *s),
        [h, m, s] => (
            h.parse::<u64>().map_err(|_| bad())?,
            m.parse::<u64>().map_err(|_| bad())?,
            *s,
        ),
        _ => return Err(bad()),
    };

    let seconds: f64 = seconds.parse().map_err(|_| bad())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(bad());
    }

    let total = (hours * 3600 + minutes * 60) as f64 + seconds;
    Ok(Duration::from_secs_f64(total))
}
