//! Scan configuration.
//!
//! `ScanOptions` is the raw, serde-friendly form with every option optional.
//! `ScanOptions::validate` checks option dependencies and produces the
//! resolved `ScanSettings` the scan runs with.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelAssignment;
use crate::errors::{Result, ScanError};
use crate::key::{KeyRange, RowKey};
use crate::shape::OutputMode;
use crate::storage::{ColumnSelection, MaxVersions};

pub const DEFAULT_MAX_THREADS: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanOptions {
    /// Row to start the scan at (inclusive).
    ///
    /// Keys are raw bytes. Serialized forms accept either a string or an array
    /// of byte values.
    pub start_row: Option<RowKey>,
    /// Row to stop the scan at (exclusive). Must be set with `start_row`.
    pub end_row: Option<RowKey>,
    /// Maximum number of scan threads. Defaults to 1.
    pub max_threads: Option<usize>,
    /// This replica's channel. Must be set with `max_channels`.
    pub channel: Option<usize>,
    /// Number of replicas sharing the scan. Must be set with `channel`.
    pub max_channels: Option<usize>,
    /// Versions with a timestamp below this are excluded.
    pub min_timestamp: Option<i64>,
    /// Versions to return per cell.
    ///
    /// Unset returns only the latest version. 0 returns ALL versions, it does
    /// not mean zero. Any other value is an exact cap.
    pub max_versions: Option<u32>,
    /// Column families to scan. All families if unset.
    pub column_families: Option<Vec<String>>,
    /// Column qualifiers to scan within each family. Requires
    /// `column_families`.
    pub column_qualifiers: Option<Vec<String>>,
    /// Delay in seconds before each worker starts scanning.
    pub init_delay: Option<f64>,
    pub output: OutputMode,
    /// Report the number of results on each event.
    pub result_count: bool,
}

/// Validated, resolved settings for a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub range: KeyRange,
    pub max_threads: usize,
    pub channels: ChannelAssignment,
    pub min_timestamp: Option<i64>,
    pub max_versions: MaxVersions,
    pub columns: ColumnSelection,
    pub init_delay: Option<Duration>,
    pub output: OutputMode,
    pub result_count: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            range: KeyRange::full(),
            max_threads: DEFAULT_MAX_THREADS,
            channels: ChannelAssignment::Unsharded,
            min_timestamp: None,
            max_versions: MaxVersions::Latest,
            columns: ColumnSelection::All,
            init_delay: None,
            output: OutputMode::default(),
            result_count: false,
        }
    }
}

impl ScanOptions {
    /// Check option dependencies and resolve into settings.
    ///
    /// Runs before any planning, a failure here means the scan never starts.
    pub fn validate(&self) -> Result<ScanSettings> {
        let range = match (&self.start_row, &self.end_row) {
            (Some(start), Some(end)) => KeyRange {
                start: Some(start.clone()),
                end: Some(end.clone()),
            },
            (None, None) => KeyRange::full(),
            _ => {
                return Err(ScanError::invalid_config(
                    "'start_row' and 'end_row' must be set together",
                ));
            }
        };

        let max_threads = self.max_threads.unwrap_or(DEFAULT_MAX_THREADS);
        if max_threads == 0 {
            return Err(ScanError::invalid_config(
                "'max_threads' must be at least 1",
            ));
        }

        let channels = match (self.channel, self.max_channels) {
            (Some(channel), Some(max_channels)) => {
                if max_channels == 0 {
                    return Err(ScanError::invalid_config(
                        "'max_channels' must be at least 1",
                    ));
                }
                if channel >= max_channels {
                    return Err(ScanError::invalid_config(format!(
                        "'channel' ({channel}) must be less than 'max_channels' ({max_channels})"
                    )));
                }
                ChannelAssignment::Channel {
                    channel,
                    max_channels,
                }
            }
            (None, None) => ChannelAssignment::Unsharded,
            _ => {
                return Err(ScanError::invalid_config(
                    "'channel' and 'max_channels' must be set together",
                ));
            }
        };

        if self.column_qualifiers.is_some() && self.column_families.is_none() {
            return Err(ScanError::invalid_config(
                "'column_qualifiers' requires 'column_families'",
            ));
        }
        let columns = ColumnSelection::from_names(
            self.column_families.as_deref(),
            self.column_qualifiers.as_deref(),
        );

        let init_delay = match self.init_delay {
            None => None,
            Some(secs) if secs == 0.0 => None,
            Some(secs) if secs > 0.0 => match Duration::try_from_secs_f64(secs) {
                Ok(delay) => Some(delay),
                Err(e) => {
                    return Err(ScanError::invalid_config(format!(
                        "'init_delay' of {secs} seconds is out of range: {e}"
                    )));
                }
            },
            Some(secs) => {
                return Err(ScanError::invalid_config(format!(
                    "'init_delay' must be a non-negative number of seconds, got {secs}"
                )));
            }
        };

        if let OutputMode::Record { fields } = &self.output {
            if fields.is_empty() {
                return Err(ScanError::invalid_config(
                    "record output requires at least one field",
                ));
            }
        }

        Ok(ScanSettings {
            range,
            max_threads,
            channels,
            min_timestamp: self.min_timestamp,
            max_versions: MaxVersions::from_option(self.max_versions),
            columns,
            init_delay,
            output: self.output.clone(),
            result_count: self.result_count,
        })
    }
}
