//! Ledger queries: invoices and transactions consumed by the scorers.

use super::RiskStore;
use crate::error::RiskResult;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub company_id: String,
    pub external_number: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub counterparty: Option<String>,
    pub source_document_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub txn_id: String,
    pub company_id: String,
    pub posted_at: NaiveDateTime,
    pub amount: f64,
    pub direction: String, // "debit" | "credit"
    pub counterparty: Option<String>,
    pub category: Option<String>,
}

fn invoice_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRecord> {
    Ok(InvoiceRecord {
        invoice_id: row.get(0)?,
        company_id: row.get(1)?,
        external_number: row.get(2)?,
        issue_date: row.get(3)?,
        due_date: row.get(4)?,
        total_amount: row.get(5)?,
        counterparty: row.get(6)?,
        source_document_id: row.get(7)?,
    })
}

const INVOICE_COLUMNS: &str = "invoice_id, company_id, external_number, issue_date,
             due_date, total_amount, counterparty, source_document_id";

impl RiskStore {
    // ── Invoice ────────────────────────────────────────────────

    pub fn insert_invoice(&self, tenant: &str, inv: &InvoiceRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO invoice (
                invoice_id, tenant_id, company_id, external_number, issue_date,
                due_date, total_amount, counterparty, source_document_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                inv.invoice_id,
                tenant,
                inv.company_id,
                inv.external_number,
                inv.issue_date,
                inv.due_date,
                inv.total_amount,
                inv.counterparty,
                inv.source_document_id,
            ],
        )?;
        Ok(())
    }

    pub fn invoices_for_company(
        &self,
        tenant: &str,
        company_id: &str,
    ) -> RiskResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice
             WHERE tenant_id = ?1 AND company_id = ?2
             ORDER BY issue_date ASC, invoice_id ASC"
        ))?;
        let rows = stmt.query_map(params![tenant, company_id], invoice_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn invoices_in_window(
        &self,
        tenant: &str,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RiskResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice
             WHERE tenant_id = ?1 AND company_id = ?2
               AND issue_date >= ?3 AND issue_date <= ?4
             ORDER BY issue_date ASC, invoice_id ASC"
        ))?;
        let rows = stmt.query_map(params![tenant, company_id, from, to], invoice_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Invoices in the tenant sharing an external number, optionally
    /// excluding one invoice id (the invoice being checked itself).
    pub fn invoices_with_number(
        &self,
        tenant: &str,
        external_number: &str,
        exclude_invoice: Option<&str>,
    ) -> RiskResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice
             WHERE tenant_id = ?1 AND external_number = ?2
               AND (?3 IS NULL OR invoice_id != ?3)
             ORDER BY issue_date ASC, invoice_id ASC"
        ))?;
        let rows = stmt.query_map(
            params![tenant, external_number, exclude_invoice],
            invoice_row_mapper,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Duplicate count for document scoring: invoices sharing the
    /// number, ignoring any invoice registered from that same document.
    pub fn count_invoices_with_number_excluding_document(
        &self,
        tenant: &str,
        external_number: &str,
        document_id: &str,
    ) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM invoice
                 WHERE tenant_id = ?1 AND external_number = ?2
                   AND (source_document_id IS NULL OR source_document_id != ?3)",
                params![tenant, external_number, document_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn invoice_count(&self, tenant: &str, company_id: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM invoice WHERE tenant_id = ?1 AND company_id = ?2",
                params![tenant, company_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transaction(&self, tenant: &str, txn: &TransactionRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO transactions (
                txn_id, tenant_id, company_id, posted_at, amount,
                direction, counterparty, category
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                txn.txn_id,
                tenant,
                txn.company_id,
                txn.posted_at,
                txn.amount,
                txn.direction,
                txn.counterparty,
                txn.category,
            ],
        )?;
        Ok(())
    }

    /// Transactions in the half-open window [from, to).
    pub fn transactions_in_window(
        &self,
        tenant: &str,
        company_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> RiskResult<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT txn_id, company_id, posted_at, amount, direction, counterparty, category
             FROM transactions
             WHERE tenant_id = ?1 AND company_id = ?2
               AND posted_at >= ?3 AND posted_at < ?4
             ORDER BY posted_at ASC, txn_id ASC",
        )?;
        let rows = stmt.query_map(params![tenant, company_id, from, to], |row| {
            Ok(TransactionRecord {
                txn_id: row.get(0)?,
                company_id: row.get(1)?,
                posted_at: row.get(2)?,
                amount: row.get(3)?,
                direction: row.get(4)?,
                counterparty: row.get(5)?,
                category: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn transaction_count(&self, tenant: &str, company_id: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE tenant_id = ?1 AND company_id = ?2",
                params![tenant, company_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
