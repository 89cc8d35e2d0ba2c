//! Ingestion progress reporting.
//!
//! Reports observable progress during `ocx ingest` so users see which object
//! is being processed and how much is left. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.
//!
//! The contract is (current, total, message): `current` is monotonic, one
//! step per manifest object plus a final resolution step, and the last event
//! of a successful run has `current == total`.

use std::io::Write;

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion pipeline.
    fn report(&self, current: u64, total: u64, message: &str);
}

/// Human-friendly progress on stderr: "ingest  12 / 340  Catalog.Контрагенты".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, current: u64, total: u64, message: &str) {
        let line = format!(
            "ingest  {} / {}  {}\n",
            format_number(current),
            format_number(total),
            message
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, current: u64, total: u64, message: &str) {
        let obj = serde_json::json!({
            "event": "progress",
            "current": current,
            "total": total,
            "message": message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _current: u64, _total: u64, _message: &str) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to ingest.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
