//! Auction date parsing and month partitioning.
//!
//! Filtered rows become typed [`AuctionRecord`]s once their date parses;
//! the rest are dropped and counted. Records are then bucketed by calendar
//! month and the configured [`MonthSelection`] picks the scopes to publish.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use crate::classify::CandidateRow;
use crate::config::{DateFormats, MonthSelection};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::models::{AuctionRecord, MonthKey};
use crate::sheet::Cell;

/// Parse an auction date cell. Numbers are never dates.
pub fn parse_auction_date(cell: &Cell, formats: &DateFormats) -> Option<NaiveDate> {
    match cell {
        Cell::Date(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_text(s.trim(), &formats.input),
        _ => None,
    }
}

fn parse_date_text(s: &str, formats: &[String]) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt).ok().or_else(|| {
            NaiveDateTime::parse_from_str(s, &format!("{} %H:%M:%S", fmt))
                .ok()
                .map(|dt| dt.date())
        })
    })
}

/// Type the filtered rows, dropping those without a valid date.
pub fn into_records(
    rows: Vec<CandidateRow>,
    formats: &DateFormats,
    diags: &mut Diagnostics,
) -> Vec<AuctionRecord> {
    let total = rows.len();
    let records: Vec<AuctionRecord> = rows
        .into_iter()
        .filter_map(|row| {
            let auction_date = parse_auction_date(&row.date, formats)?;
            Some(AuctionRecord {
                identifier: row.identifier,
                auction_date,
                description: row.description,
                metrics: row.metrics,
                source_row: row.source_row,
            })
        })
        .collect();

    diags.push(Diagnostic::DatesDropped {
        count: total - records.len(),
    });
    records
}

/// Bucket records by month; source order is kept inside each bucket.
pub fn partition(records: Vec<AuctionRecord>) -> BTreeMap<MonthKey, Vec<AuctionRecord>> {
    let mut buckets: BTreeMap<MonthKey, Vec<AuctionRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.month()).or_default().push(record);
    }
    buckets
}

/// Records of one published month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthScope {
    pub month: MonthKey,
    pub records: Vec<AuctionRecord>,
}

impl MonthScope {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Apply `selection` to the buckets.
///
/// - `Auto` returns the latest month, or nothing when there is no data.
/// - `Specific` always returns exactly one scope, empty if the month is absent.
/// - `All` returns every bucket in ascending order.
pub fn select(
    mut buckets: BTreeMap<MonthKey, Vec<AuctionRecord>>,
    selection: MonthSelection,
) -> Vec<MonthScope> {
    match selection {
        MonthSelection::Auto => buckets
            .pop_last()
            .map(|(month, records)| vec![MonthScope { month, records }])
            .unwrap_or_default(),
        MonthSelection::Specific(month) => vec![MonthScope {
            month,
            records: buckets.remove(&month).unwrap_or_default(),
        }],
        MonthSelection::All => buckets
            .into_iter()
            .map(|(month, records)| MonthScope { month, records })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: &str, d: NaiveDate, row: usize) -> AuctionRecord {
        AuctionRecord {
            identifier: id.to_string(),
            auction_date: d,
            description: String::new(),
            metrics: [None; 5],
            source_row: row,
        }
    }

    fn candidate(date: Cell) -> CandidateRow {
        CandidateRow {
            source_row: 6,
            identifier: "IT0000000001".into(),
            date,
            description: String::new(),
            metrics: [None; 5],
        }
    }

    #[test]
    fn test_parse_day_first() {
        let formats = DateFormats::default();
        assert_eq!(parse_auction_date(&Cell::text("03/02/2025"), &formats), Some(date(2025, 2, 3)));
        assert_eq!(parse_auction_date(&Cell::text("03-02-2025"), &formats), Some(date(2025, 2, 3)));
        assert_eq!(
            parse_auction_date(&Cell::text("03/02/2025 00:00:00"), &formats),
            Some(date(2025, 2, 3))
        );
        assert_eq!(parse_auction_date(&Cell::text("2025-02-03"), &formats), Some(date(2025, 2, 3)));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let formats = DateFormats::default();
        assert_eq!(parse_auction_date(&Cell::text("31/02/2025"), &formats), None);
        assert_eq!(parse_auction_date(&Cell::text("n.d."), &formats), None);
        assert_eq!(parse_auction_date(&Cell::Number(45678.0), &formats), None);
        assert_eq!(parse_auction_date(&Cell::Empty, &formats), None);
    }

    #[test]
    fn test_parse_date_cell() {
        let dt = date(2025, 10, 10).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parse_auction_date(&Cell::Date(dt), &DateFormats::default()), Some(date(2025, 10, 10)));
    }

    #[test]
    fn test_into_records_counts_drops() {
        let mut diags = Diagnostics::new();
        let records = into_records(
            vec![candidate(Cell::text("10/10/2025")), candidate(Cell::text("bad")), candidate(Cell::Empty)],
            &DateFormats::default(),
            &mut diags,
        );
        assert_eq!(records.len(), 1);
        assert!(diags.iter().any(|d| *d == Diagnostic::DatesDropped { count: 2 }));
    }

    #[test]
    fn test_partition_completeness() {
        let records = vec![
            record("A", date(2025, 9, 30), 6),
            record("B", date(2025, 10, 1), 7),
            record("A", date(2025, 9, 1), 8),
        ];
        let buckets = partition(records.clone());
        let total: usize = buckets.values().map(Vec::len).sum();
        assert_eq!(total, records.len());
        for (month, rows) in &buckets {
            assert!(rows.iter().all(|r| r.month() == *month));
        }
        // source order kept within a bucket
        let sept = &buckets[&MonthKey::new(2025, 9).unwrap()];
        assert_eq!(sept[0].source_row, 6);
        assert_eq!(sept[1].source_row, 8);
    }

    #[test]
    fn test_select_auto_latest() {
        let buckets = partition(vec![
            record("A", date(2025, 10, 2), 6),
            record("B", date(2025, 9, 2), 7),
        ]);
        let scopes = select(buckets, MonthSelection::Auto);
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].month.to_string(), "2025-10");
        assert_eq!(scopes[0].records.len(), 1);
    }

    #[test]
    fn test_select_auto_empty() {
        assert!(select(BTreeMap::new(), MonthSelection::Auto).is_empty());
    }

    #[test]
    fn test_select_specific_absent() {
        let buckets = partition(vec![record("A", date(2025, 10, 2), 6)]);
        let month = MonthKey::new(2025, 1).unwrap();
        let scopes = select(buckets, MonthSelection::Specific(month));
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].month.to_string(), "2025-01");
        assert!(scopes[0].is_empty());
    }

    #[test]
    fn test_select_all_ascending() {
        let buckets = partition(vec![
            record("A", date(2025, 10, 2), 6),
            record("B", date(2024, 12, 2), 7),
            record("C", date(2025, 3, 2), 8),
        ]);
        let months: Vec<String> = select(buckets, MonthSelection::All)
            .iter()
            .map(|s| s.month.to_string())
            .collect();
        assert_eq!(months, vec!["2024-12", "2025-03", "2025-10"]);
    }
}
