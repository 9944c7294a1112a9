//! `lendwatch ingest`: feed decoded logs from a JSON-lines file into the queue.
//!
//! Each line is one log as the chain listener emits it:
//! ```json
//! {"eventName":"Withdraw","args":["0xc02a…","0x9f8e…","0x9f8e…","1000000000000000000"],"txHash":"0x…"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use lendwatch_core::DecodedLog;
use lendwatch_queue::{Producer, ProducerStats, Worker, WorkerMetrics};

use crate::backends::Backends;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestReport {
    file: String,
    /// Lines that were not a decoded log at all (bad JSON, missing fields).
    unreadable_lines: u64,
    producer: ProducerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker: Option<WorkerMetrics>,
}

pub async fn run(backends: &Backends, file: &Path, drain: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let (logs, unreadable_lines) = parse_lines(&text);
    info!(file = %file.display(), logs = logs.len(), unreadable_lines, "ingesting");

    let producer = Producer::new(backends.queue.clone());
    let stats = producer.run(futures::stream::iter(logs)).await;

    let worker = if drain {
        let worker = backends.worker();
        drain_queue(&worker, Duration::from_millis(backends.config.worker.poll_interval_ms)).await?;
        Some(worker.metrics())
    } else {
        None
    };

    let report = IngestReport {
        file: file.display().to_string(),
        unreadable_lines,
        producer: stats,
        worker,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Parse every non-blank line. Returns the logs and the number of bad lines.
fn parse_lines(text: &str) -> (Vec<DecodedLog>, u64) {
    let mut logs = Vec::new();
    let mut bad = 0;
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = serde_json::from_str::<Value>(line)
            .map_err(|e| e.to_string())
            .and_then(|v| DecodedLog::from_json(&v).map_err(|e| e.to_string()));
        match parsed {
            Ok(log) => logs.push(log),
            Err(e) => {
                bad += 1;
                warn!(line = i + 1, error = %e, "skipping unreadable line");
            }
        }
    }
    (logs, bad)
}

/// Process jobs until nothing is pending, waiting out retry delays.
async fn drain_queue(worker: &Worker, poll: Duration) -> Result<()> {
    loop {
        if worker.process_next().await?.is_some() {
            continue;
        }
        if worker.queue().counts().await?.pending() == 0 {
            return Ok(());
        }
        worker.queue().wait(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_counts_bad_lines() {
        let text = r#"
# sample
{"eventName":"Withdraw","args":["0x1","0x2","0x3","5"],"txHash":"0xaa"}
not json
{"eventName":"Supply","txHash":"0xbb"}
"#;
        let (logs, bad) = parse_lines(text);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_name, "Withdraw");
        assert_eq!(bad, 2);
    }
}
