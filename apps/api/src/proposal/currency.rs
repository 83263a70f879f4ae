//! Money and date formatting for rendered proposals.
//!
//! Amounts are carried in minor units (cents) so that the rendered line items
//! always add up to the rendered subtotal. No exchange rates are applied.

use chrono::{DateTime, NaiveDate};

/// Display convention for one ISO 4217 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    /// 1,234,567.00
    Thousands,
    /// 12,34,567.00
    Indian,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyFormatter {
    code: String,
    symbol: Option<&'static str>,
    grouping: Grouping,
}

impl CurrencyFormatter {
    pub fn new(code: &str) -> Self {
        let code = code.trim().to_uppercase();
        let (symbol, grouping) = match code.as_str() {
            "USD" => (Some("$"), Grouping::Thousands),
            "EUR" => (Some("€"), Grouping::Thousands),
            "GBP" => (Some("£"), Grouping::Thousands),
            "INR" => (Some("₹"), Grouping::Indian),
            _ => (None, Grouping::Thousands),
        };
        Self {
            code,
            symbol,
            grouping,
        }
    }

    /// Formats an amount given in minor units, e.g. `500000` USD → `$5,000.00`.
    pub fn format_minor(&self, minor: i64) -> String {
        let sign = if minor < 0 { "-" } else { "" };
        let abs = minor.unsigned_abs();
        let whole = group_digits(&(abs / 100).to_string(), self.grouping);
        let number = format!("{whole}.{:02}", abs % 100);
        match self.symbol {
            Some(symbol) => format!("{sign}{symbol}{number}"),
            None => format!("{sign}{} {number}", self.code),
        }
    }
}

fn group_digits(digits: &str, grouping: Grouping) -> String {
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(len - 3);
    let group = match grouping {
        Grouping::Thousands => 3,
        Grouping::Indian => 2,
    };

    let head: Vec<char> = head.chars().collect();
    let mut parts: Vec<String> = head
        .rchunks(group)
        .map(|chunk| chunk.iter().collect())
        .collect();
    parts.reverse();
    format!("{},{tail}", parts.join(","))
}

/// Long-form date (`October 18, 2026`) for an ISO-8601 timestamp or date.
///
/// Unparseable input is returned unchanged.
pub fn format_long_date(raw: &str) -> String {
    const LONG: &str = "%B %-d, %Y";
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.format(LONG).to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed.get(..10).unwrap_or(trimmed), "%Y-%m-%d") {
        return date.format(LONG).to_string();
    }
    raw.to_string()
}
