//! Optional export of per-node and per-file run data.
//!
//! Telemetry never affects results: [`publish`] logs sink failures and moves on.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::IgnoreProfile;
use crate::pipeline::{FileIgnore, RunOutput};
use crate::tree::TreeRecord;

/// Consumer of flattened run data.
pub trait TelemetrySink {
    fn record_tree(&mut self, records: &[TreeRecord]) -> Result<()>;
    fn record_ignores(&mut self, ignores: &[FileIgnore]) -> Result<()>;
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    timestamp: &'a str,
    event: &'static str,
    #[serde(flatten)]
    record: &'a T,
}

#[derive(Serialize)]
struct IgnoreRecord<'a> {
    file_name: &'a str,
    #[serde(flatten)]
    profile: &'a IgnoreProfile,
}

/// Writes one JSON object per line, all stamped with the same run time.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    timestamp: String,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self::with_timestamp(writer, Utc::now())
    }

    pub fn with_timestamp(writer: W, at: DateTime<Utc>) -> Self {
        Self {
            writer,
            timestamp: at.to_rfc3339(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, event: &'static str, record: &T) -> Result<()> {
        let line = Line {
            timestamp: &self.timestamp,
            event,
            record,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn record_tree(&mut self, records: &[TreeRecord]) -> Result<()> {
        for record in records {
            self.write_line("tree", record)?;
        }
        Ok(())
    }

    fn record_ignores(&mut self, ignores: &[FileIgnore]) -> Result<()> {
        for ignore in ignores {
            let record = IgnoreRecord {
                file_name: &ignore.file_name,
                profile: &ignore.profile,
            };
            self.write_line("ignore", &record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Send the run's tree and ignore profiles to `sink`. Failures are logged.
pub fn publish(sink: &mut dyn TelemetrySink, output: &RunOutput) {
    if let Err(e) = sink.record_tree(&output.tree.flatten()) {
        tracing::warn!(error = %e, "failed to record coverage tree telemetry");
    }
    if let Err(e) = sink.record_ignores(&output.ignores) {
        tracing::warn!(error = %e, "failed to record ignore telemetry");
    }
}
