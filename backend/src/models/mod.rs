//! Domain models for auction results and their published series.
//!
//! # Structure
//!
//! ```text
//! AuctionRecord (one per source row)
//! ├── identifier: "IT0005580094"
//! ├── auction_date: 2025-10-10
//! ├── description: "BTP 3,15% 01.10.2031"
//! └── metrics: [offered, min, max, required, assigned]   (Option<f64> each)
//!
//! SeriesSet (one per identifier and month)
//! ├── identifier / month / description
//! └── series: 5 x Series { kind, points: [(date, value)] }
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// Metric Kind
// =============================================================================

/// The five auction amounts published per identifier.
///
/// Declaration order is the fixed output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Offered,
    MinOffered,
    MaxOffered,
    Required,
    Assigned,
}

impl MetricKind {
    /// All kinds in output order.
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Offered,
        MetricKind::MinOffered,
        MetricKind::MaxOffered,
        MetricKind::Required,
        MetricKind::Assigned,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Offered => "offered",
            MetricKind::MinOffered => "min_offered",
            MetricKind::MaxOffered => "max_offered",
            MetricKind::Required => "required",
            MetricKind::Assigned => "assigned",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Auction Record
// =============================================================================

/// A classified source row.
///
/// Only constructed once the identifier passed filtering and the date parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionRecord {
    pub identifier: String,
    pub auction_date: NaiveDate,
    pub description: String,
    /// Indexed by [`MetricKind::index`]. `None` means no value, not zero.
    pub metrics: [Option<f64>; 5],
    /// 1-based row number in the source sheet.
    pub source_row: usize,
}

impl AuctionRecord {
    pub fn metric(&self, kind: MetricKind) -> Option<f64> {
        self.metrics[kind.index()]
    }

    pub fn month(&self) -> MonthKey {
        MonthKey::of(self.auction_date)
    }
}

// =============================================================================
// Month Key
// =============================================================================

/// Calendar month, ordered chronologically, displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Returns `None` for a month outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// `YYYYMMDD` of the last day of the month, used in artifact names.
    pub fn stamp(&self) -> String {
        self.last_day().format("%Y%m%d").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = y.parse().map_err(|_| format!("invalid year '{}'", y))?;
        let month: u32 = m.parse().map_err(|_| format!("invalid month '{}'", m))?;
        MonthKey::new(year, month).ok_or_else(|| format!("month out of range: {}", s))
    }
}

impl Serialize for MonthKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Series
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// One metric over time for one identifier. Points ascend by date;
/// same-date points keep source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub kind: MetricKind,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// First value recorded for `date` (first-match-wins).
    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.date == date)
            .and_then(|p| p.value)
    }
}

/// All five series of one identifier within one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSet {
    pub identifier: String,
    pub month: MonthKey,
    pub description: String,
    /// Always five entries, in [`MetricKind::ALL`] order.
    pub series: Vec<Series>,
}

impl SeriesSet {
    pub fn get(&self, kind: MetricKind) -> Option<&Series> {
        self.series.iter().find(|s| s.kind == kind)
    }

    /// Distinct dates across every series, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.date))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

// =============================================================================
// Metadata Row
// =============================================================================

/// Column names of the META sheet, in order.
pub const METADATA_COLUMNS: [&str; 16] = [
    "CODE",
    "DESCRIPTION",
    "FREQUENCY",
    "MULTIPLIER",
    "AGGREGATION_TYPE",
    "UNIT_TYPE",
    "DATA_TYPE",
    "DATA_UNIT",
    "SEASONALLY_ADJUSTED",
    "ANNUALIZED",
    "PROVIDER_MEASURE_URL",
    "PROVIDER",
    "SOURCE",
    "SOURCE_DESCRIPTION",
    "COUNTRY",
    "DATASET",
];

/// Descriptor of one published series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetadataRow {
    pub code: String,
    pub description: String,
    pub frequency: String,
    pub multiplier: String,
    pub aggregation_type: String,
    pub unit_type: String,
    pub data_type: String,
    pub data_unit: String,
    pub seasonally_adjusted: String,
    pub annualized: String,
    pub provider_measure_url: String,
    pub provider: String,
    pub source: String,
    pub source_description: String,
    pub country: String,
    pub dataset: String,
}

impl MetadataRow {
    /// Field values aligned with [`METADATA_COLUMNS`].
    pub fn values(&self) -> [&str; 16] {
        [
            &self.code,
            &self.description,
            &self.frequency,
            &self.multiplier,
            &self.aggregation_type,
            &self.unit_type,
            &self.data_type,
            &self.data_unit,
            &self.seasonally_adjusted,
            &self.annualized,
            &self.provider_measure_url,
            &self.provider,
            &self.source,
            &self.source_description,
            &self.country,
            &self.dataset,
        ]
    }
}

// =============================================================================
// Output Bundle
// =============================================================================

/// Paths written for one identifier and month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBundle {
    pub identifier: String,
    pub month: MonthKey,
    pub data_path: PathBuf,
    pub meta_path: PathBuf,
    pub archive_path: Option<PathBuf>,
    /// False when DATA/META exist only inside the archive.
    pub loose_files: bool,
}
