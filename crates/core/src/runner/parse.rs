//! Progress extraction from tool output lines.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::job::ProgressSource;

static OUT_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"out_time_ms=(\d+)").expect("valid regex"));

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d+):(\d+(?:\.\d+)?)").expect("valid regex"));

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid regex"));

/// Stateful per-job parser. Progress is clamped to `0..=100` and is
/// monotonic: a line that would move the percentage backwards yields
/// nothing.
#[derive(Debug)]
pub(crate) struct ProgressParser {
    source: ProgressSource,
    last: f32,
}

impl ProgressParser {
    pub(crate) fn new(source: &ProgressSource) -> Self {
        Self {
            source: source.clone(),
            last: 0.0,
        }
    }

    /// Extracts a new progress percentage from one output line, if the
    /// line carries one and it advances past the last reported value.
    pub(crate) fn parse_line(&mut self, line: &str) -> Option<f32> {
        let percent = match &self.source {
            ProgressSource::Indeterminate => None,
            ProgressSource::MediaTime { duration_secs } => {
                elapsed_media_secs(line).and_then(|secs| {
                    if *duration_secs > 0.0 {
                        Some(((secs / duration_secs) * 100.0).min(100.0) as f32)
                    } else {
                        None
                    }
                })
            }
            ProgressSource::PercentMarkers => PERCENT_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f32>().ok())
                .map(|p| p.clamp(0.0, 100.0)),
        }?;

        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }
}

/// Elapsed media time in seconds from an ffmpeg status line. Prefers the
/// machine-readable `out_time_ms=` key (microseconds, despite the name)
/// and falls back to the human-readable `time=HH:MM:SS.ss` marker.
fn elapsed_media_secs(line: &str) -> Option<f64> {
    if let Some(caps) = OUT_TIME_RE.captures(line) {
        let us = caps.get(1)?.as_str().parse::<f64>().ok()?;
        return Some(us / 1_000_000.0);
    }

    let caps = CLOCK_RE.captures(line)?;
    let h = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let m = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let s = caps.get(3)?.as_str().parse::<f64>().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}
