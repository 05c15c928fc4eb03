//! Row formatting for the daily log files.
//!
//! Rows are comma-delimited and positional. Values are written unescaped: the
//! producer never sends the delimiter inside a field, and the site labels are
//! checked for it when the configuration is validated.

use crate::record::Record;
use chrono::NaiveDateTime;
use std::fmt::Write;

/// Column header written once at the top of every log file, without terminator.
pub const HEADER: &str = ";SignalType,SerialIndex,time,HomeOwner,Location,press,temp,humid,gas_raw,iaq,s_iaq,eco2,bvoc,gas_percent,clear,Action,Type";

/// Timestamp layout used in the `time` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders decoded records as log rows.
#[derive(Debug, Clone)]
pub struct RowFormatter {
    home_owner: String,
    location: String,
}

impl RowFormatter {
    /// Create a formatter stamping environmental rows with the given site labels.
    pub fn new(home_owner: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            home_owner: home_owner.into(),
            location: location.into(),
        }
    }

    /// Header row including its line terminator.
    pub fn header_line() -> String {
        format!("{HEADER}\n")
    }

    /// Render one row, terminated by a single `\n`.
    pub fn format(&self, record: &Record, sequence: u64, timestamp: NaiveDateTime) -> String {
        let mut line = format!(
            "{},{},{}",
            record.kind().tag(),
            sequence,
            timestamp.format(TIMESTAMP_FORMAT)
        );

        match record {
            Record::Device(text) | Record::Sound(text) => {
                line.push(',');
                // A row is a single line; interior breaks would split it.
                line.extend(
                    text.trim_end_matches(['\r', '\n'])
                        .chars()
                        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c }),
                );
            }
            Record::Environmental(sample) => {
                // Writing into a String cannot fail.
                let _ = write!(line, ",{},{}", self.home_owner, self.location);
                for reading in sample.readings() {
                    let _ = write!(line, ",{}", reading);
                }
            }
        }

        line.push('\n');
        line
    }

    /// Site label written in the `HomeOwner` column.
    pub fn home_owner(&self) -> &str {
        &self.home_owner
    }

    /// Site label written in the `Location` column.
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Default for RowFormatter {
    fn default() -> Self {
        Self::new("HMK", "Toilet")
    }
}
