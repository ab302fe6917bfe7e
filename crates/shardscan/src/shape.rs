//! Shaping rows into output events.
//!
//! The output mode is resolved once from configuration. Cell mode emits one
//! event per non-empty (row, family, qualifier), record mode emits one event
//! per row with the configured fields populated.
use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::key::RowKey;
use crate::storage::Row;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputMode {
    /// One event per (row, family, qualifier) with at least one version.
    Cell {
        #[serde(default)]
        value: CellValueMode,
    },
    /// One event per row.
    ///
    /// Field names are matched against column qualifiers. If several families
    /// share a qualifier, the first family in key order wins.
    Record { fields: Vec<String> },
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Cell {
            value: CellValueMode::Latest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValueMode {
    /// Only the newest version of the cell.
    #[default]
    Latest,
    /// Every returned version, newest first.
    AllVersions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub timestamp: i64,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Latest(Version),
    Versions(Vec<Version>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEvent {
    pub row: RowKey,
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: CellValue,
    /// Always 1 when result counting is enabled.
    pub result_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEvent {
    pub row: RowKey,
    /// Populated fields only.
    pub fields: BTreeMap<String, Bytes>,
    /// Number of populated fields when result counting is enabled.
    pub result_count: Option<u32>,
}

impl RecordEvent {
    pub fn populated(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Cell(CellEvent),
    Record(RecordEvent),
}

impl ScanEvent {
    pub fn row(&self) -> &RowKey {
        match self {
            ScanEvent::Cell(cell) => &cell.row,
            ScanEvent::Record(record) => &record.row,
        }
    }

    pub fn result_count(&self) -> Option<u32> {
        match self {
            ScanEvent::Cell(cell) => cell.result_count,
            ScanEvent::Record(record) => record.result_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RowShaper {
    mode: OutputMode,
    result_count: bool,
}

impl RowShaper {
    pub fn new(mode: OutputMode, result_count: bool) -> Self {
        RowShaper { mode, result_count }
    }

    pub fn mode(&self) -> &OutputMode {
        &self.mode
    }

    /// Shape a row, passing every produced event to `emit`.
    ///
    /// Returns the number of events emitted. Stops at the first error from
    /// `emit`.
    pub fn shape<E, F>(&self, row: Row, emit: F) -> Result<usize, E>
    where
        F: FnMut(ScanEvent) -> Result<(), E>,
    {
        match &self.mode {
            OutputMode::Cell { value } => self.shape_cells(row, *value, emit),
            OutputMode::Record { fields } => self.shape_record(row, fields, emit),
        }
    }

    fn shape_cells<E, F>(&self, row: Row, value_mode: CellValueMode, mut emit: F) -> Result<usize, E>
    where
        F: FnMut(ScanEvent) -> Result<(), E>,
    {
        let Row { key, families } = row;
        let mut emitted = 0;

        for (family, qualifiers) in families {
            for (qualifier, versions) in qualifiers {
                let value = match value_mode {
                    CellValueMode::Latest => match versions.into_iter().next_back() {
                        Some((timestamp, value)) => CellValue::Latest(Version { timestamp, value }),
                        None => continue,
                    },
                    CellValueMode::AllVersions => {
                        if versions.is_empty() {
                            continue;
                        }
                        CellValue::Versions(
                            versions
                                .into_iter()
                                .rev()
                                .map(|(timestamp, value)| Version { timestamp, value })
                                .collect(),
                        )
                    }
                };

                emit(ScanEvent::Cell(CellEvent {
                    row: key.clone(),
                    family: family.clone(),
                    qualifier,
                    value,
                    result_count: self.result_count.then_some(1),
                }))?;
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    fn shape_record<E, F>(&self, row: Row, field_names: &[String], mut emit: F) -> Result<usize, E>
    where
        F: FnMut(ScanEvent) -> Result<(), E>,
    {
        let mut fields = BTreeMap::new();
        for name in field_names {
            let newest = row.families.values().find_map(|qualifiers| {
                qualifiers
                    .get(name.as_bytes())
                    .and_then(|versions| versions.values().next_back())
            });
            if let Some(value) = newest {
                fields.insert(name.clone(), value.clone());
            }
        }

        let populated = fields.len() as u32;
        emit(ScanEvent::Record(RecordEvent {
            row: row.key,
            fields,
            result_count: self.result_count.then_some(populated),
        }))?;

        Ok(1)
    }
}
