use std::fmt::Display;

use crate::error::{Error, Result};

/// A point on the source timeline.
///
/// Both representations are kept around: the canonical `HH:MM:SS` text is
/// what the external tools take on their command lines, while the
/// fractional seconds drive duration arithmetic and subtitle realignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Timecode {
    text: String,
    seconds: f64,
}

impl Timecode {
    /// Parse `HH:MM:SS`, `MM:SS`, or a bare (possibly fractional) seconds
    /// string into its canonical form.
    ///
    /// Canonicalization is idempotent: re-parsing the canonical text
    /// reproduces the same seconds value.
    pub fn parse(input: &str) -> Result<Self> {
        let seconds = parse_seconds(input)?;
        Ok(Self {
            text: format_hms(seconds),
            seconds,
        })
    }

    /// Canonical `HH:MM:SS` form.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// Filesystem-safe form, `:` replaced by `_`.
    pub fn slug(&self) -> String {
        self.text.replace(':', "_")
    }
}

impl Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// The requested segment interval.
///
/// A zero or negative duration is representable on purpose: it is handed
/// to the trim tool verbatim and fails there, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSpan {
    start: Timecode,
    end: Timecode,
}

impl TimeSpan {
    pub fn new(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: Timecode::parse(start)?,
            end: Timecode::parse(end)?,
        })
    }

    pub fn start(&self) -> &Timecode {
        &self.start
    }

    pub fn end(&self) -> &Timecode {
        &self.end
    }

    pub fn duration_seconds(&self) -> f64 {
        self.end.seconds - self.start.seconds
    }

    /// Filesystem-safe `<start>-<end>` form used in artifact filenames.
    pub fn slug(&self) -> String {
        format!("{}-{}", self.start.slug(), self.end.slug())
    }
}

impl Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

fn parse_seconds(input: &str) -> Result<f64> {
    let input = input.trim();
    let invalid = || Error::InvalidTimeFormat(input.to_owned());

    if input.contains(':') {
        let parts = input
            .split(':')
            .map(|part| part.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match parts[..] {
            [minutes, seconds] => Ok(minutes * 60.0 + seconds),
            [hours, minutes, seconds] => Ok(hours * 3600.0 + minutes * 60.0 + seconds),
            _ => Err(invalid()),
        }
    } else {
        input.parse::<f64>().map_err(|_| invalid())
    }
}

/// Whole-second `HH:MM:SS`, the form the trim commands take.
fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Millisecond-precision `HH:MM:SS.mmm` used only in subtitle files.
pub fn vtt_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = seconds % 60.0;
    let whole = secs as u64;
    let millis = ((secs - whole as f64) * 1000.0) as u64;
    format!("{hours:02}:{minutes:02}:{whole:02}.{millis:03}")
}
