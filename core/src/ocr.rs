//! OCR boundary.
//!
//! The surrounding platform runs uploads through an external OCR
//! service; the core only needs "bytes in, text out" behind a trait so
//! the pipeline can be wired and exercised without it.

use crate::error::RiskResult;

pub trait OcrEngine: Send {
    fn extract_text(&self, bytes: &[u8]) -> RiskResult<String>;
}

/// Reads the payload as UTF-8 text (lossy). Suitable for text exports,
/// e-invoice XML dumps, and tests; scanned images need a real engine
/// behind the same trait.
pub struct PlainTextOcr;

impl OcrEngine for PlainTextOcr {
    fn extract_text(&self, bytes: &[u8]) -> RiskResult<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
