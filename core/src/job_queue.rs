//! Poll-and-process job queue.
//!
//! One worker claims the oldest pending job, runs the document
//! pipeline, and records the outcome. A failing job goes back to
//! pending until the attempt cap parks it as failed. No distributed
//! coordination: the job table is the whole mechanism.

use crate::{
    config::RiskConfig,
    document_pipeline::DocumentPipeline,
    error::RiskResult,
    event::RiskEvent,
    storage::ObjectStorage,
    store::RiskStore,
    types::EntityId,
};
use chrono::NaiveDate;

pub struct JobQueue {
    max_attempts: u32,
}

impl JobQueue {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_attempts: config.max_job_attempts,
        }
    }

    /// Claim and run the next pending job. Returns the document id it
    /// worked on, or None when the queue is drained.
    pub fn process_next(
        &self,
        store: &RiskStore,
        storage: &dyn ObjectStorage,
        pipeline: &DocumentPipeline,
        as_of: NaiveDate,
    ) -> RiskResult<Option<EntityId>> {
        let Some(job) = store.claim_next_job()? else {
            return Ok(None);
        };

        match pipeline.process_document(store, storage, &job.tenant_id, &job.document_id, as_of) {
            Ok(()) => {
                store.mark_job(&job.job_id, "succeeded", None)?;
            }
            Err(e) => {
                let error = e.to_string();
                if job.attempts >= self.max_attempts {
                    store.mark_job(&job.job_id, "failed", Some(&error))?;
                    let event = RiskEvent::JobFailed {
                        tenant_id: job.tenant_id.clone(),
                        job_id: job.job_id.clone(),
                        document_id: job.document_id.clone(),
                        attempts: job.attempts,
                        error: error.clone(),
                    };
                    if let Err(audit_err) =
                        store.append_audit(&job.tenant_id, &job.job_id, &event, as_of)
                    {
                        log::warn!("job audit failed for {}: {audit_err}", job.job_id);
                    }
                    log::warn!(
                        "job {} parked as failed after {} attempts: {error}",
                        job.job_id,
                        job.attempts
                    );
                } else {
                    store.mark_job(&job.job_id, "pending", Some(&error))?;
                    log::info!(
                        "job {} attempt {} failed, retrying: {error}",
                        job.job_id,
                        job.attempts
                    );
                }
            }
        }

        Ok(Some(job.document_id))
    }

    /// Process until the queue is empty. Returns how many jobs ran,
    /// counting retries.
    pub fn drain(
        &self,
        store: &RiskStore,
        storage: &dyn ObjectStorage,
        pipeline: &DocumentPipeline,
        as_of: NaiveDate,
    ) -> RiskResult<usize> {
        let mut processed = 0;
        while self
            .process_next(store, storage, pipeline, as_of)?
            .is_some()
        {
            processed += 1;
        }
        Ok(processed)
    }
}
