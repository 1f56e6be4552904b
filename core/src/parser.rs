//! Document field parser.
//!
//! Contract: given raw OCR text and the declared document type, extract
//! a best-effort sparse field set. Unmatched fields stay absent — no
//! input text is an error. Labels cover the English and Turkish forms
//! seen in e-invoice exports.

use crate::types::DocumentType;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Bumped whenever extraction heuristics change, so stored ParsedData
/// rows can be traced back to the parser that produced them.
pub const PARSER_VERSION: &str = "2.1";

/// Sparse field set extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub parser_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ParsedFields {
    pub fn field_count(&self) -> usize {
        [
            self.invoice_number.is_some(),
            self.issue_date.is_some(),
            self.due_date.is_some(),
            self.total_amount.is_some(),
            self.currency.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

lazy_static! {
    static ref INVOICE_NO_RE: Regex = Regex::new(
        r"(?i)(?:invoice|fatura)\s*(?:no|number|num|nr)?\s*[:#.]\s*([A-Za-z0-9][A-Za-z0-9/-]{2,})"
    )
    .unwrap();
    static ref DATE_RE: Regex =
        Regex::new(r"(\d{1,2})[./](\d{1,2})[./](\d{4})|(\d{4})-(\d{2})-(\d{2})").unwrap();
    static ref AMOUNT_RE: Regex = Regex::new(r"\d[\d.,]*").unwrap();
    static ref CURRENCY_RE: Regex = Regex::new(r"\b(TRY|USD|EUR|GBP)\b|(₺)|(\$)|(€)|(£)").unwrap();
}

const DUE_LABELS: &[&str] = &["due", "payment due", "son ödeme", "vade"];
const ISSUE_LABELS: &[&str] = &["issue", "invoice date", "düzenleme", "tarih", "date"];
const TOTAL_LABELS: &[&str] = &[
    "grand total",
    "total due",
    "amount due",
    "toplam",
    "genel toplam",
    "tutar",
    "total",
];
const BALANCE_LABELS: &[&str] = &["closing balance", "balance", "bakiye"];

/// Parse raw OCR text into a sparse field set, keyed by document type.
pub fn parse_document(text: &str, doc_type: DocumentType) -> ParsedFields {
    let mut parsed = ParsedFields {
        parser_version: PARSER_VERSION.to_string(),
        ..ParsedFields::default()
    };

    match doc_type {
        DocumentType::Invoice | DocumentType::Other => {
            parsed.invoice_number = extract_invoice_number(text);
            parsed.due_date = labeled_date(text, DUE_LABELS, &[]);
            parsed.issue_date = labeled_date(text, ISSUE_LABELS, DUE_LABELS);
            parsed.total_amount = labeled_amount(text, TOTAL_LABELS);
            parsed.currency = extract_currency(text);
        }
        DocumentType::Receipt => {
            parsed.issue_date = first_date(text);
            parsed.total_amount = labeled_amount(text, TOTAL_LABELS);
            parsed.currency = extract_currency(text);
        }
        DocumentType::BankStatement => {
            parsed.issue_date = first_date(text);
            parsed.total_amount = labeled_amount(text, BALANCE_LABELS);
            parsed.currency = extract_currency(text);
        }
    }

    parsed
}

fn extract_invoice_number(text: &str) -> Option<String> {
    INVOICE_NO_RE
        .captures(text)
        .map(|cap| cap[1].to_string())
}

/// First date on a line carrying one of `labels`, skipping lines that
/// also carry one of `exclude` (keeps "Due Date" lines out of the
/// issue-date scan).
fn labeled_date(text: &str, labels: &[&str], exclude: &[&str]) -> Option<NaiveDate> {
    for line in text.lines() {
        let lower = line.to_lowercase();
        if exclude.iter().any(|label| lower.contains(label)) {
            continue;
        }
        if labels.iter().any(|label| lower.contains(label)) {
            if let Some(date) = DATE_RE.captures(line).and_then(parse_date_captures) {
                return Some(date);
            }
        }
    }
    None
}

fn first_date(text: &str) -> Option<NaiveDate> {
    DATE_RE.captures(text).and_then(parse_date_captures)
}

fn parse_date_captures(cap: regex::Captures<'_>) -> Option<NaiveDate> {
    if let (Some(d), Some(m), Some(y)) = (cap.get(1), cap.get(2), cap.get(3)) {
        // dd.mm.yyyy / dd/mm/yyyy
        let day: u32 = d.as_str().parse().ok()?;
        let month: u32 = m.as_str().parse().ok()?;
        let year: i32 = y.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    } else if let (Some(y), Some(m), Some(d)) = (cap.get(4), cap.get(5), cap.get(6)) {
        let year: i32 = y.as_str().parse().ok()?;
        let month: u32 = m.as_str().parse().ok()?;
        let day: u32 = d.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    } else {
        None
    }
}

/// Last amount on the last line carrying one of `labels`. Totals sit at
/// the bottom of real documents, so the last labeled line wins.
fn labeled_amount(text: &str, labels: &[&str]) -> Option<f64> {
    let mut found = None;
    for line in text.lines() {
        let lower = line.to_lowercase();
        if labels.iter().any(|label| lower.contains(label)) {
            if let Some(m) = AMOUNT_RE.find_iter(line).last() {
                if let Some(amount) = parse_amount(m.as_str()) {
                    found = Some(amount);
                }
            }
        }
    }
    found
}

/// Normalize `1.234,56`, `1,234.56`, `1234.56`, and `10.000` shapes.
/// A single trailing group of 1-2 digits is a decimal part; everything
/// else is a thousands separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim_matches(|c: char| !c.is_ascii_digit());
    if raw.is_empty() {
        return None;
    }

    let has_dot = raw.contains('.');
    let has_comma = raw.contains(',');

    let normalized = if has_dot && has_comma {
        let last_dot = raw.rfind('.').unwrap_or(0);
        let last_comma = raw.rfind(',').unwrap_or(0);
        if last_comma > last_dot {
            // 1.234,56 — comma is the decimal separator
            raw.replace('.', "").replace(',', ".")
        } else {
            // 1,234.56
            raw.replace(',', "")
        }
    } else if has_dot || has_comma {
        let sep = if has_dot { '.' } else { ',' };
        let parts: Vec<&str> = raw.split(sep).collect();
        let tail_len = parts.last().map(|p| p.len()).unwrap_or(0);
        if parts.len() == 2 && (1..=2).contains(&tail_len) {
            // single separator with a short tail: decimal
            raw.replace(',', ".")
        } else {
            // thousands groups: 10.000 / 1,234,567
            raw.replace(sep, "")
        }
    } else {
        raw.to_string()
    };

    normalized.parse::<f64>().ok()
}

fn extract_currency(text: &str) -> Option<String> {
    CURRENCY_RE.captures(text).map(|cap| {
        if let Some(code) = cap.get(1) {
            code.as_str().to_string()
        } else if cap.get(2).is_some() {
            "TRY".to_string()
        } else if cap.get(3).is_some() {
            "USD".to_string()
        } else if cap.get(4).is_some() {
            "EUR".to_string()
        } else {
            "GBP".to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_invoice() {
        let text = "ACME Ltd\n\
                    Invoice No: INV-2024-0042\n\
                    Invoice Date: 15.03.2024\n\
                    Due Date: 14.04.2024\n\
                    Grand Total: 1.234,56 TRY\n";
        let parsed = parse_document(text, DocumentType::Invoice);
        assert_eq!(parsed.invoice_number.as_deref(), Some("INV-2024-0042"));
        assert_eq!(
            parsed.issue_date,
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(parsed.due_date, NaiveDate::from_ymd_opt(2024, 4, 14));
        assert_eq!(parsed.total_amount, Some(1234.56));
        assert_eq!(parsed.currency.as_deref(), Some("TRY"));
        assert_eq!(parsed.parser_version, PARSER_VERSION);
    }

    #[test]
    fn turkish_labels_and_iso_dates() {
        let text = "Fatura No: GIB2024000017\n\
                    Düzenleme Tarihi: 2024-06-01\n\
                    Son Ödeme: 2024-07-01\n\
                    Genel Toplam: 10.000 ₺\n";
        let parsed = parse_document(text, DocumentType::Invoice);
        assert_eq!(parsed.invoice_number.as_deref(), Some("GIB2024000017"));
        assert_eq!(parsed.issue_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(parsed.due_date, NaiveDate::from_ymd_opt(2024, 7, 1));
        assert_eq!(parsed.total_amount, Some(10000.0));
        assert_eq!(parsed.currency.as_deref(), Some("TRY"));
    }

    #[test]
    fn unparseable_text_yields_a_sparse_map_not_an_error() {
        let parsed = parse_document("%%% ??? garbage €€€", DocumentType::Invoice);
        assert!(parsed.invoice_number.is_none());
        assert!(parsed.issue_date.is_none());
        assert!(parsed.due_date.is_none());
        assert!(parsed.total_amount.is_none());
        // the lone currency symbol still matches; everything else is absent
        assert!(parsed.field_count() <= 1);
    }

    #[test]
    fn amount_shapes() {
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("10.000"), Some(10000.0));
        assert_eq!(parse_amount("1,234,567"), Some(1234567.0));
        assert_eq!(parse_amount("42"), Some(42.0));
    }

    #[test]
    fn invalid_calendar_dates_are_dropped() {
        let text = "Invoice No: X-1\nInvoice Date: 31.02.2024\n";
        let parsed = parse_document(text, DocumentType::Invoice);
        assert!(parsed.issue_date.is_none());
    }

    #[test]
    fn receipt_takes_the_first_date() {
        let text = "Receipt 12/05/2024\nToplam: 86,40\n";
        let parsed = parse_document(text, DocumentType::Receipt);
        assert_eq!(parsed.issue_date, NaiveDate::from_ymd_opt(2024, 5, 12));
        assert_eq!(parsed.total_amount, Some(86.40));
    }
}
