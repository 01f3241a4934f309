//! Group one month of auction records into per-identifier series.
//!
//! # Architecture
//!
//! ```text
//! Records (one per auction row)           →  SeriesSet (one per ISIN)
//! ┌──────────────────────────────────┐       ┌──────────────────────────────┐
//! │ IT..94  2025-10-10  ofr 3000 ... │       │ IT..94                       │
//! │ IT..12  2025-10-03  ofr 1500 ... │  →    │ OFR: [(10-03, ..), (10-10,..)]│
//! │ IT..94  2025-10-03  ofr 2750 ... │       │ MIN/MAX/REQ/ASGN: ...        │
//! └──────────────────────────────────┘       ├──────────────────────────────┤
//!                                            │ IT..12  ...                  │
//!                                            └──────────────────────────────┘
//! ```
//!
//! Identifiers are emitted in order of first appearance. Points within a
//! series ascend by date; ties keep source order so the first row of a
//! given date is the one rendered.

use std::collections::HashMap;

use crate::models::{AuctionRecord, MetricKind, MonthKey, Series, SeriesPoint, SeriesSet};

/// Build one [`SeriesSet`] per identifier present in `records`.
pub fn build_series(month: MonthKey, records: &[AuctionRecord]) -> Vec<SeriesSet> {
    let mut order: Vec<&str> = Vec::new();
    let mut builders: HashMap<&str, SeriesBuilder> = HashMap::new();

    for record in records {
        let id = record.identifier.as_str();
        builders
            .entry(id)
            .or_insert_with(|| {
                order.push(id);
                SeriesBuilder::new(id, month)
            })
            .add(record);
    }

    order
        .into_iter()
        .filter_map(|id| builders.remove(id))
        .map(SeriesBuilder::build)
        .collect()
}

/// Accumulates the rows of one identifier.
struct SeriesBuilder<'a> {
    identifier: &'a str,
    month: MonthKey,
    rows: Vec<&'a AuctionRecord>,
}

impl<'a> SeriesBuilder<'a> {
    fn new(identifier: &'a str, month: MonthKey) -> Self {
        Self {
            identifier,
            month,
            rows: Vec::new(),
        }
    }

    fn add(&mut self, record: &'a AuctionRecord) {
        self.rows.push(record);
    }

    fn build(mut self) -> SeriesSet {
        // stable: same-date rows stay in source order
        self.rows.sort_by_key(|r| r.auction_date);

        let description = self
            .rows
            .first()
            .map(|r| r.description.clone())
            .unwrap_or_default();

        let series = MetricKind::ALL
            .iter()
            .map(|&kind| Series {
                kind,
                points: self
                    .rows
                    .iter()
                    .map(|r| SeriesPoint {
                        date: r.auction_date,
                        value: r.metric(kind),
                    })
                    .collect(),
            })
            .collect();

        SeriesSet {
            identifier: self.identifier.to_string(),
            month: self.month,
            description,
            series,
        }
    }
}
