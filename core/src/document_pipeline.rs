//! Document processing pipeline.
//!
//! PIPELINE ORDER (fixed, documented):
//!   upload -> stored bytes + document row + pending job
//!   process -> OCR -> parse -> features -> document score
//!
//! RULES:
//!   - Parsing never fails a document: unreadable text produces a
//!     sparse field map and the pipeline keeps going.
//!   - Scoring and alerting are side-effects of processing: failures
//!     are logged, the document still completes.
//!   - Any hard step failure (storage, OCR, persistence) marks the
//!     document failed; the job row records the error for retry.

use crate::{
    error::{RiskError, RiskResult},
    event::RiskEvent,
    feature_extractor,
    ocr::OcrEngine,
    parser,
    rule_engine::RuleEngine,
    storage::ObjectStorage,
    store::{DocumentRecord, RiskStore},
    types::{DocumentType, EntityId, TenantId},
};
use chrono::NaiveDate;
use uuid::Uuid;

pub struct DocumentPipeline {
    ocr: Box<dyn OcrEngine>,
    engine: RuleEngine,
}

impl DocumentPipeline {
    /// The OCR engine is injected so callers choose the backend; the
    /// pipeline itself has no process-global configuration.
    pub fn new(ocr: Box<dyn OcrEngine>, config: crate::config::RiskConfig) -> Self {
        Self {
            ocr,
            engine: RuleEngine::new(config),
        }
    }

    /// Store the raw bytes and create the document plus its pending
    /// processing job. Returns the new document id.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_document(
        &self,
        store: &RiskStore,
        storage: &dyn ObjectStorage,
        tenant: &TenantId,
        company_id: &EntityId,
        doc_type: DocumentType,
        storage_path: &str,
        bytes: &[u8],
        as_of: NaiveDate,
    ) -> RiskResult<EntityId> {
        if store.get_company(tenant, company_id)?.is_none() {
            return Err(RiskError::not_found("company", tenant, company_id));
        }

        storage.put(tenant, storage_path, bytes)?;

        let document_id = format!("doc-{}", Uuid::new_v4());
        let document = DocumentRecord {
            document_id: document_id.clone(),
            company_id: company_id.clone(),
            doc_type,
            storage_path: storage_path.to_string(),
            status: "uploaded".to_string(),
            uploaded_on: as_of,
            processed_on: None,
        };
        store.insert_document(tenant, &document)?;

        let job_id = format!("job-{}", Uuid::new_v4());
        store.insert_job(tenant, &job_id, &document_id, as_of)?;

        let event = RiskEvent::DocumentUploaded {
            tenant_id: tenant.clone(),
            document_id: document_id.clone(),
            company_id: company_id.clone(),
            doc_type: doc_type.as_str().to_string(),
        };
        if let Err(e) = store.append_audit(tenant, &document_id, &event, as_of) {
            log::warn!("tenant={tenant} upload audit failed for {document_id}: {e}");
        }

        log::info!(
            "tenant={tenant} uploaded {} document {document_id} for company {company_id}",
            doc_type.as_str()
        );
        Ok(document_id)
    }

    /// Run one document through OCR, parsing, feature extraction, and
    /// scoring. Marks the document processed or failed.
    pub fn process_document(
        &self,
        store: &RiskStore,
        storage: &dyn ObjectStorage,
        tenant: &TenantId,
        document_id: &EntityId,
        as_of: NaiveDate,
    ) -> RiskResult<()> {
        let document = store
            .get_document(tenant, document_id)?
            .ok_or_else(|| RiskError::not_found("document", tenant, document_id))?;

        store.update_document_status(tenant, document_id, "processing", None)?;

        match self.run_steps(store, storage, tenant, &document, as_of) {
            Ok(flag_count) => {
                store.update_document_status(tenant, document_id, "processed", Some(as_of))?;
                let event = RiskEvent::DocumentProcessed {
                    tenant_id: tenant.clone(),
                    document_id: document_id.clone(),
                    parser_version: parser::PARSER_VERSION.to_string(),
                    flag_count,
                };
                if let Err(e) = store.append_audit(tenant, document_id, &event, as_of) {
                    log::warn!("tenant={tenant} process audit failed for {document_id}: {e}");
                }
                Ok(())
            }
            Err(e) => {
                store.update_document_status(tenant, document_id, "failed", Some(as_of))?;
                let event = RiskEvent::DocumentFailed {
                    tenant_id: tenant.clone(),
                    document_id: document_id.clone(),
                    error: e.to_string(),
                };
                if let Err(audit_err) = store.append_audit(tenant, document_id, &event, as_of) {
                    log::warn!(
                        "tenant={tenant} failure audit failed for {document_id}: {audit_err}"
                    );
                }
                log::warn!("tenant={tenant} document {document_id} failed: {e}");
                Err(e)
            }
        }
    }

    fn run_steps(
        &self,
        store: &RiskStore,
        storage: &dyn ObjectStorage,
        tenant: &TenantId,
        document: &DocumentRecord,
        as_of: NaiveDate,
    ) -> RiskResult<usize> {
        let bytes = storage.get(tenant, &document.storage_path)?;
        let text = self.ocr.extract_text(&bytes)?;

        let parsed = parser::parse_document(&text, document.doc_type);
        store.save_parsed_data(tenant, &document.document_id, &parsed)?;

        let features =
            feature_extractor::extract_for_document(store, tenant, &document.document_id, &parsed)?;
        store.save_risk_features(tenant, &document.document_id, &features)?;

        // Scoring is a risk side-effect of processing: log, don't fail.
        if let Err(e) =
            self.engine
                .evaluate_document(store, tenant, &document.document_id, as_of)
        {
            log::warn!(
                "tenant={tenant} scoring failed for document {}: {e}",
                document.document_id
            );
        }

        Ok(features.flags.len())
    }
}
