//! Shared primitive types used across the entire scoring core.

use serde::{Deserialize, Serialize};

/// An isolated customer account. Every scored entity belongs to exactly
/// one tenant; no query may aggregate across tenants.
pub type TenantId = String;

/// A stable, unique identifier for any entity (company, document,
/// invoice, transaction, job, alert).
pub type EntityId = String;

/// Qualitative risk bucket derived from a numeric score through the
/// tenant's configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of entity a score or alert is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Document,
    Company,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(Self::Document),
            "company" => Some(Self::Company),
            _ => None,
        }
    }
}

/// Declared type of an uploaded document. Drives which parser
/// heuristics apply; it is a claim by the uploader, not a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    BankStatement,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::BankStatement => "bank_statement",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(Self::Invoice),
            "receipt" => Some(Self::Receipt),
            "bank_statement" => Some(Self::BankStatement),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}
