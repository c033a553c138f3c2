//! Question progress and answer types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;

/// A snapshot of how far a question has progressed.
///
/// Re-fetched on every poll tick; never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultInfo {
    /// Question the snapshot belongs to.
    pub question_id: Option<ObjectId>,
    /// Estimated number of reporting agents. Zero or negative means unknown.
    pub estimated_total: i64,
    /// Rows reported so far.
    pub row_count: u64,
    /// Agents that evaluated the filter group.
    pub tested: u64,
    /// Agents that passed the filter group.
    pub passed: u64,
    /// When the server produced the snapshot.
    pub observed_at: Option<DateTime<Utc>>,
}

impl ResultInfo {
    /// Fraction of the estimated agents that have reported.
    ///
    /// Returns `None` while the estimate is zero or negative, which means the
    /// server has no data yet rather than a complete answer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_fraction(&self) -> Option<f64> {
        if self.estimated_total <= 0 {
            return None;
        }
        Some(self.row_count as f64 / self.estimated_total as f64)
    }
}

/// One column of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    /// Column header (usually the sensor name).
    pub name: String,
    /// Hash of the sensor producing the column.
    pub what_hash: Option<u64>,
    /// Server result type label.
    pub result_type: Option<String>,
}

/// One answer row. Each cell may carry several values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    /// Number of agents that reported this exact row.
    pub count: u64,
    /// Cell values, in column order.
    pub cells: Vec<Vec<String>>,
}

/// The realized answer to a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSet {
    /// Question the answer belongs to.
    pub question_id: Option<ObjectId>,
    /// Column definitions.
    pub columns: Vec<Column>,
    /// Answer rows.
    pub rows: Vec<Row>,
    /// Rows reported.
    pub row_count: u64,
    /// Estimated reporting agents.
    pub estimated_total: i64,
    /// Agents that evaluated the filter group.
    pub tested: u64,
    /// Agents that passed the filter group.
    pub passed: u64,
}

impl ResultSet {
    /// Copy progress metadata from a result info snapshot.
    ///
    /// Bulk export payloads carry only columns and rows, so totals come from
    /// the latest snapshot instead.
    pub fn overlay(&mut self, info: &ResultInfo) {
        if self.question_id.is_none() {
            self.question_id = info.question_id;
        }
        self.row_count = info.row_count;
        self.estimated_total = info.estimated_total;
        self.tested = info.tested;
        self.passed = info.passed;
    }

    /// Column headers in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Formats a bulk export can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma separated text.
    #[default]
    Csv,
    /// Encoded result document, returned as text.
    Xml,
    /// Encoded result document decoded into a [`ResultSet`].
    #[serde(rename = "xml_obj")]
    XmlObject,
    /// Common Event Format text.
    Cef,
}

impl ExportFormat {
    /// Numeric format code sent with the export start request.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Csv => 0,
            Self::Xml | Self::XmlObject => 1,
            Self::Cef => 2,
        }
    }

    /// Whether the payload is decoded into a [`ResultSet`].
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::XmlObject)
    }

    /// File extension for report files.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xml | Self::XmlObject => "xml",
            Self::Cef => "cef",
        }
    }

    /// Wire name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::XmlObject => "xml_obj",
            Self::Cef => "cef",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            "xml_obj" => Ok(Self::XmlObject),
            "cef" => Ok(Self::Cef),
            other => Err(CoreError::UnknownFormat(other.to_string())),
        }
    }
}

/// Answer data as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultData {
    /// A decoded result set.
    Set(ResultSet),
    /// Opaque encoded export text.
    Encoded {
        /// Format the text is in.
        format: ExportFormat,
        /// Raw export text.
        text: String,
    },
}

impl ResultData {
    /// Render the data as text suitable for a report file.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a result set cannot be rendered.
    pub fn to_report_text(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Set(set) => serde_json::to_string_pretty(set),
            Self::Encoded { text, .. } => Ok(text.clone()),
        }
    }
}
