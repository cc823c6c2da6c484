// src/scheduler/task.rs
//! One candidate's trip through verification, arbitration and fetching.

use super::worker_pool::TaskOutcome;
use crate::arbitration::{ArbitrationOutcome, LlmArbitrator};
use crate::fetching::{FetchReport, FetchStrategySelector};
use crate::model::{
    Candidate, CleanedRecord, Confidence, FetchAttempt, FetchStatus, ReasonCode,
    VerificationConfidence,
};
use crate::types::{NormalizedUrl, ValidatedUrl};
use crate::verification::{SearchVerifier, Verification};
use std::sync::Arc;

impl TaskOutcome for CleanedRecord {
    fn is_failure(&self) -> bool {
        CleanedRecord::is_failure(self)
    }
}

/// A candidate together with the snapshot version its record belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningJob {
    pub candidate: Candidate,
    pub version_tag: Arc<str>,
}

impl CleaningJob {
    pub fn new(candidate: Candidate, version_tag: impl Into<Arc<str>>) -> Self {
        Self {
            candidate,
            version_tag: version_tag.into(),
        }
    }

    /// Record for a task that died before producing one.
    pub fn panicked(&self) -> CleanedRecord {
        CleanedRecord::failed(&self.candidate, ReasonCode::TaskPanicked, &self.version_tag)
    }
}

/// The per-candidate pipeline shared by all workers.
pub struct CandidatePipeline {
    verifier: SearchVerifier,
    arbitrator: LlmArbitrator,
    fetcher: FetchStrategySelector,
}

impl CandidatePipeline {
    pub fn new(
        verifier: SearchVerifier,
        arbitrator: LlmArbitrator,
        fetcher: FetchStrategySelector,
    ) -> Self {
        Self {
            verifier,
            arbitrator,
            fetcher,
        }
    }

    /// Produces the candidate's record. Never fails: every problem becomes
    /// a recorded confidence and reason.
    pub async fn process(&self, job: &CleaningJob) -> CleanedRecord {
        let candidate = &job.candidate;
        let version_tag = &*job.version_tag;
        if let Some(field) = candidate.missing_field() {
            log::warn!("Candidate {} is missing its {}", candidate.key(), field);
            return CleanedRecord::failed(candidate, ReasonCode::InvalidCandidate, version_tag);
        }
        let proposed = match ValidatedUrl::parse(&candidate.proposed_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Candidate {} has an unusable URL: {}", candidate.key(), e);
                return CleanedRecord::failed(candidate, ReasonCode::InvalidCandidate, version_tag);
            }
        };
        let ctx = RecordContext {
            candidate,
            version_tag,
        };

        let verification = self.verifier.verify(candidate, &proposed).await;
        let verified = verification
            .result
            .resolved_url
            .as_deref()
            .and_then(|url| ValidatedUrl::parse(url).ok());

        let record = match (verification.result.confidence, verified) {
            (VerificationConfidence::NoMatch, _) | (_, None) => {
                self.resolve_unmatched(&ctx, &verification).await
            }
            (confidence, Some(url)) => {
                self.confirm_verified(&ctx, confidence, url, &verification)
                    .await
            }
        };

        log::info!(
            "{}: {} ({})",
            candidate.key(),
            record.confidence,
            record
                .final_url
                .as_deref()
                .unwrap_or("no url")
        );
        record
    }

    /// Search agreed with a URL; fetch it, and ask the model only if the
    /// page cannot be retrieved.
    async fn confirm_verified(
        &self,
        ctx: &RecordContext<'_>,
        confidence: VerificationConfidence,
        url: ValidatedUrl,
        verification: &Verification,
    ) -> CleanedRecord {
        let candidate = ctx.candidate;
        let report = self.fetcher.fetch(&url).await;
        if report.succeeded() {
            return ctx.assemble(Some(&url), confidence.into(), &report, Vec::new(), None);
        }

        log::info!(
            "{}: verified URL {} could not be fetched; arbitrating",
            candidate.key(),
            url
        );
        let outcome = self
            .arbitrator
            .arbitrate(&candidate.brand, &candidate.product, &verification.hits)
            .await;

        match chosen_url(&outcome) {
            Some(chosen) if NormalizedUrl::from_url(&chosen) == NormalizedUrl::from_url(&url) => ctx
                .assemble(
                    Some(&url),
                    Confidence::ResolvedByLlm,
                    &report,
                    Vec::new(),
                    Some(report.failure_reason()),
                ),
            Some(chosen) => {
                let second = self.fetcher.fetch(&chosen).await;
                let reason = (!second.succeeded()).then(|| second.failure_reason());
                ctx.assemble(
                    Some(&chosen),
                    Confidence::ResolvedByLlm,
                    &second,
                    report.attempts,
                    reason,
                )
            }
            None => ctx.assemble(
                None,
                Confidence::Unresolved,
                &report,
                Vec::new(),
                Some(unresolved_reason(&outcome, verification)),
            ),
        }
    }

    /// Search found nothing usable; the model picks among the results or
    /// the candidate stays unresolved.
    async fn resolve_unmatched(
        &self,
        ctx: &RecordContext<'_>,
        verification: &Verification,
    ) -> CleanedRecord {
        let candidate = ctx.candidate;
        let outcome = self
            .arbitrator
            .arbitrate(&candidate.brand, &candidate.product, &verification.hits)
            .await;

        match chosen_url(&outcome) {
            Some(chosen) => {
                let report = self.fetcher.fetch(&chosen).await;
                let reason = (!report.succeeded()).then(|| report.failure_reason());
                ctx.assemble(
                    Some(&chosen),
                    Confidence::ResolvedByLlm,
                    &report,
                    Vec::new(),
                    reason,
                )
            }
            None => CleanedRecord::without_url(
                candidate,
                Confidence::Unresolved,
                Some(unresolved_reason(&outcome, verification)),
                ctx.version_tag,
            ),
        }
    }
}

/// What every record of one job shares.
struct RecordContext<'a> {
    candidate: &'a Candidate,
    version_tag: &'a str,
}

impl RecordContext<'_> {
    fn assemble(
        &self,
        final_url: Option<&ValidatedUrl>,
        confidence: Confidence,
        report: &FetchReport,
        earlier_attempts: Vec<FetchAttempt>,
        reason: Option<ReasonCode>,
    ) -> CleanedRecord {
        let mut fetch_attempts = earlier_attempts;
        fetch_attempts.extend(report.attempts.iter().cloned());

        let fetch_status = if report.succeeded() {
            FetchStatus::Fetched
        } else if fetch_attempts.is_empty() {
            FetchStatus::Skipped
        } else {
            FetchStatus::Failed
        };

        CleanedRecord {
            category: self.candidate.category.clone(),
            brand: self.candidate.brand.clone(),
            product: self.candidate.product.clone(),
            final_url: final_url.map(ToString::to_string),
            confidence,
            fetch_method: report.method(),
            fetch_status,
            page_payload_ref: report.page.as_ref().map(|page| page.key.clone()),
            fetch_attempts,
            reason,
            version_tag: self.version_tag.to_string(),
        }
    }
}

fn chosen_url(outcome: &ArbitrationOutcome) -> Option<ValidatedUrl> {
    match outcome {
        ArbitrationOutcome::Chosen(hit) => match ValidatedUrl::parse(&hit.url) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Arbitration chose an unusable URL {:?}: {}", hit.url, e);
                None
            }
        },
        _ => None,
    }
}

fn unresolved_reason(outcome: &ArbitrationOutcome, verification: &Verification) -> ReasonCode {
    match outcome {
        ArbitrationOutcome::NoneMatch => ReasonCode::ArbitrationNoneMatch,
        ArbitrationOutcome::Failed(_) => ReasonCode::ArbitrationFailed,
        ArbitrationOutcome::InvalidResponse(_) | ArbitrationOutcome::Chosen(_) => {
            ReasonCode::ArbitrationInvalidResponse
        }
        ArbitrationOutcome::NoCandidates => verification
            .result
            .reason
            .unwrap_or(ReasonCode::NoSearchResults),
    }
}
