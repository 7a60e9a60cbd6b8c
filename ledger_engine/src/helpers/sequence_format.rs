//! # Business identifiers
//!
//! Human-readable identifiers (`INV-0001`, `SG0042`, `SGSER0007`, `SGTPL/25-26/0004`) are a prefix followed by a
//! zero-padded counter. Each [`SequenceScope`] owns one counter in the `sequences` table. The functions here are pure;
//! allocation itself lives in the database layer.
use std::fmt::Display;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: usize = 4;

/// An Indian financial year, running from 1 April to 31 March. Displayed as `yy-yy`, e.g. `25-26`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalYear {
    start_year: i32,
}

impl FiscalYear {
    pub fn new(start_year: i32) -> Self {
        Self { start_year }
    }

    pub fn containing(date: NaiveDate) -> Self {
        let start_year = if date.month() >= 4 { date.year() } else { date.year() - 1 };
        Self { start_year }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }
}

impl Display for FiscalYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self.start_year.rem_euclid(100);
        let end = (self.start_year + 1).rem_euclid(100);
        write!(f, "{start:02}-{end:02}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceScope {
    Invoice,
    Subscription,
    Subscriber,
    /// Order (tax invoice) numbers restart every financial year.
    TaxInvoice(FiscalYear),
    Custom { key: String, prefix: String, width: usize },
}

impl SequenceScope {
    /// The key of this scope's row in the `sequences` table.
    pub fn key(&self) -> String {
        match self {
            SequenceScope::Invoice => "invoice".to_string(),
            SequenceScope::Subscription => "subscription".to_string(),
            SequenceScope::Subscriber => "subscriber".to_string(),
            SequenceScope::TaxInvoice(fy) => format!("tax_invoice/{fy}"),
            SequenceScope::Custom { key, .. } => key.clone(),
        }
    }

    pub fn prefix(&self) -> String {
        match self {
            SequenceScope::Invoice => "INV-".to_string(),
            SequenceScope::Subscription => "SGSER".to_string(),
            SequenceScope::Subscriber => "SG".to_string(),
            SequenceScope::TaxInvoice(fy) => format!("SGTPL/{fy}/"),
            SequenceScope::Custom { prefix, .. } => prefix.clone(),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            SequenceScope::Custom { width, .. } => *width,
            _ => DEFAULT_WIDTH,
        }
    }

    /// The identifier handed out when a scope is used for the first time.
    pub fn default_id(&self) -> String {
        format_id(self, 1)
    }
}

impl Display for SequenceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Formats `value` as an identifier in `scope`. Counters wider than the scope's width are not truncated.
pub fn format_id(scope: &SequenceScope, value: i64) -> String {
    format!("{}{:0width$}", scope.prefix(), value, width = scope.width())
}

/// Extracts the trailing counter from a previously issued identifier, e.g. `SGTPL/25-26/0042` gives 42.
///
/// Returns `None` if the identifier does not end in digits, or the digits do not fit in an `i64`.
pub fn parse_suffix(id: &str) -> Option<i64> {
    let digits = id.chars().rev().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    id[id.len() - digits..].parse::<i64>().ok()
}
