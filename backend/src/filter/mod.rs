//! Identifier filtering with widening tiers.
//!
//! Tiers are tried in order and the first one that keeps at least one row
//! wins:
//!
//! 1. strict    `^IT\d{11}$`
//! 2. relaxed   `IT` followed by digits, anywhere in the value
//! 3. non-empty anything except `""` and `nan`
//!
//! The relaxed tiers can admit rows that are not securities (notes, totals).
//! They are kept for compatibility with older files and always reported
//! through [`Diagnostic::IdentifierTier`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::CandidateRow;
use crate::diagnostics::{Diagnostic, Diagnostics, IdentifierTier};

static STRICT_ISIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^IT\d{11}$").expect("valid strict ISIN regex"));

static RELAXED_ISIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IT\d+").expect("valid relaxed ISIN regex"));

impl IdentifierTier {
    pub const ORDER: [IdentifierTier; 3] = [
        IdentifierTier::Strict,
        IdentifierTier::Relaxed,
        IdentifierTier::NonEmpty,
    ];

    pub fn accepts(self, identifier: &str) -> bool {
        match self {
            IdentifierTier::Strict => STRICT_ISIN.is_match(identifier),
            IdentifierTier::Relaxed => RELAXED_ISIN.is_match(identifier),
            IdentifierTier::NonEmpty => !identifier.is_empty() && identifier != "nan",
        }
    }
}

/// Keep the rows accepted by the first tier that matches anything.
///
/// Returns an empty vector, and reports the last tier, when no tier matches.
pub fn filter_identifiers(rows: Vec<CandidateRow>, diags: &mut Diagnostics) -> Vec<CandidateRow> {
    for tier in IdentifierTier::ORDER {
        let matched = rows.iter().filter(|r| tier.accepts(&r.identifier)).count();
        if matched > 0 || tier == IdentifierTier::NonEmpty {
            diags.push(Diagnostic::IdentifierTier { tier, matched });
            return rows
                .into_iter()
                .filter(|r| tier.accepts(&r.identifier))
                .collect();
        }
    }
    Vec::new()
}
