//! CV visibility unlock workflow.
//!
//! Contact details of a locked CV become visible only after the ledger has
//! committed the matching deduction. The flip never runs without a debit, and
//! CVs that are already unlocked are never billed again.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use hireflow_core::{
    unlock_cost, Cv, CvId, JobId, LedgerError, NewCv, OrganizationId, RelatedEntity, Result,
    TransactionId, TransactionMetadata, UnlockRecord, UserId,
};
use hireflow_store::Store;

use crate::ledger::{CreditLedger, DeductOutcome, DeductionContext};

/// Affordability check for a set of CVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnlockQuote {
    /// Locked CVs that would be billed.
    pub to_unlock: u64,
    /// CVs that are already visible.
    pub already_unlocked: u64,
    /// Whether the balance covers `required_credits`.
    pub has_enough_credits: bool,
    /// Current balance.
    pub available_credits: i64,
    /// Cost of unlocking `to_unlock` CVs.
    pub required_credits: i64,
}

/// Result of an unlock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The request completed; `unlocked_count` may be 0.
    Unlocked {
        /// CVs flipped by this request.
        unlocked_count: u64,
        /// Balance after the request.
        remaining_credits: i64,
        /// The deduction, when anything was billed.
        transaction_id: Option<TransactionId>,
    },
    /// Nothing was billed and no CV changed.
    InsufficientCredits {
        /// Current balance.
        remaining_credits: i64,
        /// Credits the request needed.
        required_credits: i64,
    },
}

/// Per-job unlock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobUnlockStats {
    /// All CVs of the job.
    pub total: u64,
    /// CVs still locked.
    pub locked: u64,
    /// CVs already visible.
    pub unlocked: u64,
    /// Current balance of the organization.
    pub available_credits: i64,
}

/// Gates CV contact details behind credits.
#[derive(Clone)]
pub struct VisibilityService {
    store: Arc<dyn Store>,
    ledger: Arc<CreditLedger>,
}

impl VisibilityService {
    /// Create a service over `store`, billing through `ledger`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ledger: Arc<CreditLedger>) -> Self {
        Self { store, ledger }
    }

    /// Record a classified submission.
    ///
    /// Status and visibility come from `new.ranking` (see [`Cv::new`]).
    ///
    /// # Errors
    ///
    /// `NotFound` if the job does not exist in the organization, `Storage`
    /// on backend failure.
    pub async fn create_cv(&self, new: NewCv) -> Result<Cv> {
        if self
            .store
            .get_job(&new.organization_id, &new.job_id)
            .await?
            .is_none()
        {
            return Err(LedgerError::not_found("job", new.job_id));
        }

        let cv = Cv::new(new);
        self.store.put_cv(&cv).await?;
        tracing::info!(
            organization_id = %cv.organization_id,
            job_id = %cv.job_id,
            cv_id = %cv.id,
            visibility = cv.visibility.as_str(),
            "CV recorded"
        );
        Ok(cv)
    }

    /// Load one CV, redacted while locked.
    ///
    /// # Errors
    ///
    /// `NotFound` if the CV does not exist in the organization.
    pub async fn get_cv(&self, cv_id: CvId, organization_id: &OrganizationId) -> Result<Cv> {
        self.store
            .get_cvs(organization_id, &[cv_id])
            .await?
            .into_iter()
            .next()
            .map(|cv| cv.redacted())
            .ok_or_else(|| LedgerError::not_found("cv", cv_id))
    }

    /// Read-only affordability check. Ids outside the organization are not
    /// counted.
    ///
    /// # Errors
    ///
    /// `Storage` on backend failure.
    pub async fn can_unlock(
        &self,
        cv_ids: &[CvId],
        organization_id: &OrganizationId,
    ) -> Result<UnlockQuote> {
        let cvs = self.store.get_cvs(organization_id, cv_ids).await?;
        let to_unlock = cvs.iter().filter(|cv| cv.is_locked()).count();
        let available_credits = self.ledger.get_balance(organization_id).await?;
        let required_credits = unlock_cost(to_unlock);

        Ok(UnlockQuote {
            to_unlock: to_unlock as u64,
            already_unlocked: (cvs.len() - to_unlock) as u64,
            has_enough_credits: available_credits >= required_credits,
            available_credits,
            required_credits,
        })
    }

    /// Unlock specific CVs.
    ///
    /// # Errors
    ///
    /// - `NotFound` if any id does not resolve within the organization;
    ///   checked before anything is billed.
    /// - `InconsistentState` if the deduction committed but the flip failed.
    /// - Ledger errors from the deduction.
    pub async fn unlock_by_ids(
        &self,
        cv_ids: &[CvId],
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<UnlockOutcome> {
        let mut seen = HashSet::new();
        let requested: Vec<CvId> = cv_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let cvs = self.store.get_cvs(&organization_id, &requested).await?;
        ensure_all_found(&requested, &cvs)?;

        // Keep request order so the deduction references the first requested CV.
        let locked: Vec<CvId> = requested
            .iter()
            .copied()
            .filter(|id| cvs.iter().any(|cv| cv.id == *id && cv.is_locked()))
            .collect();

        let description = format!("Unlock {}", cv_label(locked.len()));
        self.debit_then_flip(organization_id, user_id, &locked, description)
            .await
    }

    /// Unlock the `count` newest locked CVs of a job.
    ///
    /// # Errors
    ///
    /// `NotFound` if the job does not exist in the organization; otherwise as
    /// [`unlock_by_ids`](Self::unlock_by_ids).
    pub async fn unlock_next_by_job(
        &self,
        job_id: JobId,
        count: usize,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<UnlockOutcome> {
        let job = self
            .store
            .get_job(&organization_id, &job_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("job", job_id))?;

        let locked: Vec<CvId> = self
            .store
            .latest_locked_cvs(&organization_id, &job_id, count)
            .await?
            .into_iter()
            .map(|cv| cv.id)
            .collect();

        let description = format!("Unlock {} for job: {}", cv_label(locked.len()), job.title);
        self.debit_then_flip(organization_id, user_id, &locked, description)
            .await
    }

    /// Locked/unlocked counts for a job plus the current balance.
    ///
    /// # Errors
    ///
    /// `NotFound` if the job does not exist in the organization.
    pub async fn job_unlock_stats(
        &self,
        job_id: JobId,
        organization_id: &OrganizationId,
    ) -> Result<JobUnlockStats> {
        if self.store.get_job(organization_id, &job_id).await?.is_none() {
            return Err(LedgerError::not_found("job", job_id));
        }
        let counts = self.store.visibility_counts(organization_id, &job_id).await?;
        let available_credits = self.ledger.get_balance(organization_id).await?;

        Ok(JobUnlockStats {
            total: counts.total(),
            locked: counts.locked,
            unlocked: counts.unlocked,
            available_credits,
        })
    }

    /// Operator repair for a paid-but-still-locked batch.
    ///
    /// Flips the given CVs without billing. Already unlocked CVs are left
    /// alone, so running it twice is harmless. Returns the number of CVs that
    /// changed.
    ///
    /// # Errors
    ///
    /// `NotFound` if any id does not resolve within the organization.
    pub async fn reconcile_unlock(
        &self,
        cv_ids: &[CvId],
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<u64> {
        let mut seen = HashSet::new();
        let requested: Vec<CvId> = cv_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        ensure_all_found(&requested, &self.store.get_cvs(&organization_id, &requested).await?)?;

        let flipped = self
            .store
            .unlock_cvs(&organization_id, &requested, &UnlockRecord::now(user_id))
            .await?;
        tracing::warn!(
            organization_id = %organization_id,
            user_id = %user_id,
            requested = requested.len(),
            flipped = flipped.len(),
            "Unlock reconciled without billing"
        );
        Ok(flipped.len() as u64)
    }

    async fn debit_then_flip(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        locked: &[CvId],
        description: String,
    ) -> Result<UnlockOutcome> {
        let Some(first) = locked.first() else {
            return Ok(UnlockOutcome::Unlocked {
                unlocked_count: 0,
                remaining_credits: self.ledger.get_balance(&organization_id).await?,
                transaction_id: None,
            });
        };

        let context = DeductionContext {
            related_entity: Some(RelatedEntity::cv(*first)),
            description: Some(description),
            performed_by: Some(user_id),
        };

        let (transaction, mut remaining_credits) = match self
            .ledger
            .deduct(organization_id, unlock_cost(locked.len()), context)
            .await?
        {
            DeductOutcome::Applied {
                transaction,
                remaining_balance,
            } => (transaction, remaining_balance),
            DeductOutcome::InsufficientCredits {
                remaining_balance,
                required,
            } => {
                return Ok(UnlockOutcome::InsufficientCredits {
                    remaining_credits: remaining_balance,
                    required_credits: required,
                });
            }
        };

        let record = UnlockRecord::now(user_id);
        let flipped = match self.store.unlock_cvs(&organization_id, locked, &record).await {
            Ok(flipped) => flipped,
            Err(err) => {
                tracing::error!(
                    alert = "unlock_flip_failed",
                    organization_id = %organization_id,
                    transaction_id = %transaction.id,
                    cv_ids = ?locked,
                    error = %err,
                    "Credits deducted but CVs not unlocked"
                );
                return Err(LedgerError::InconsistentState {
                    organization_id,
                    transaction_id: transaction.id,
                    cv_ids: locked.to_vec(),
                    reason: err.to_string(),
                });
            }
        };

        // A concurrent request flipped some of these first; give their credits back.
        let unbilled = locked.len() - flipped.len();
        if unbilled > 0 {
            let metadata = TransactionMetadata::described(format!(
                "Refund for {} already unlocked",
                cv_label(unbilled)
            ))
            .with_external_event_id(format!("unlock-refund:{}", transaction.id))
            .with_performed_by(Some(user_id));

            let refund = self
                .ledger
                .refund(
                    organization_id,
                    unlock_cost(unbilled),
                    Some(RelatedEntity::transaction(transaction.id)),
                    metadata,
                )
                .await
                .map_err(|err| {
                    tracing::error!(
                        alert = "unlock_refund_failed",
                        organization_id = %organization_id,
                        transaction_id = %transaction.id,
                        unbilled,
                        error = %err,
                        "Over-charge refund failed"
                    );
                    err
                })?;
            tracing::warn!(
                organization_id = %organization_id,
                transaction_id = %transaction.id,
                refund_id = %refund.id,
                unbilled,
                "Refunded CVs unlocked concurrently"
            );
            remaining_credits = refund.balance_after;
        }

        tracing::info!(
            organization_id = %organization_id,
            user_id = %user_id,
            transaction_id = %transaction.id,
            unlocked = flipped.len(),
            remaining_credits,
            "CVs unlocked"
        );

        Ok(UnlockOutcome::Unlocked {
            unlocked_count: flipped.len() as u64,
            remaining_credits,
            transaction_id: Some(transaction.id),
        })
    }
}

fn ensure_all_found(requested: &[CvId], cvs: &[Cv]) -> Result<()> {
    let found: HashSet<CvId> = cvs.iter().map(|cv| cv.id).collect();
    match requested.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(LedgerError::not_found("cv", missing)),
        None => Ok(()),
    }
}

fn cv_label(count: usize) -> String {
    if count == 1 {
        "1 CV".to_string()
    } else {
        format!("{count} CVs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hireflow_core::{
        Candidate, CreditTransaction, CvSource, HistoryFilter, Job, Ranking, RankingCategory,
        TransactionPage, TransactionType,
    };
    use hireflow_store::{MemoryStore, StoreError, VisibilityCounts};

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: Arc<CreditLedger>,
        service: VisibilityService,
        org: OrganizationId,
        user: UserId,
        job: Job,
    }

    impl Fixture {
        async fn new(credits: i64) -> Self {
            let store = Arc::new(MemoryStore::new());
            let ledger = Arc::new(CreditLedger::new(store.clone()));
            let service = VisibilityService::new(store.clone(), ledger.clone());
            let org = OrganizationId::generate();
            let job = Job::new(org, "Rust Engineer");
            store.put_job(&job).await.unwrap();
            if credits > 0 {
                ledger
                    .adjust(org, credits, TransactionMetadata::described("seed"))
                    .await
                    .unwrap();
            }
            Self {
                store,
                ledger,
                service,
                org,
                user: UserId::generate(),
                job,
            }
        }

        async fn cv(&self, category: RankingCategory) -> Cv {
            self.service
                .create_cv(new_cv(self.org, self.job.id, category))
                .await
                .unwrap()
        }

        async fn transactions(&self) -> TransactionPage {
            self.ledger
                .history(&self.org, &HistoryFilter::default())
                .await
                .unwrap()
        }
    }

    fn new_cv(org: OrganizationId, job: JobId, category: RankingCategory) -> NewCv {
        NewCv {
            organization_id: org,
            job_id: job,
            candidate: Candidate {
                full_name: "Ada Lovelace".into(),
                email: Some("ada@example.com".into()),
                phone: Some("+44 20 0000 0000".into()),
                ..Candidate::default()
            },
            ranking: Ranking {
                category,
                justification: "test".into(),
                relevance_score: None,
            },
            source: CvSource::LandingPage,
        }
    }

    #[tokio::test]
    async fn not_relevant_cvs_start_unlocked_and_rejected() {
        let fx = Fixture::new(0).await;
        let cv = fx.cv(RankingCategory::NotRelevant).await;
        assert!(!cv.is_locked());
        assert_eq!(cv.status, hireflow_core::CvStatus::Rejected);

        let relevant = fx.cv(RankingCategory::Relevant).await;
        assert!(relevant.is_locked());
    }

    #[tokio::test]
    async fn create_cv_requires_job_in_organization() {
        let fx = Fixture::new(0).await;
        let err = fx
            .service
            .create_cv(new_cv(OrganizationId::generate(), fx.job.id, RankingCategory::Relevant))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "job", .. }));
    }

    #[tokio::test]
    async fn locked_cv_reads_are_redacted() {
        let fx = Fixture::new(1).await;
        let cv = fx.cv(RankingCategory::HighlyRelevant).await;

        let read = fx.service.get_cv(cv.id, &fx.org).await.unwrap();
        assert!(read.candidate.email.is_none());
        assert!(read.candidate.phone.is_none());

        fx.service.unlock_by_ids(&[cv.id], fx.user, fx.org).await.unwrap();
        let read = fx.service.get_cv(cv.id, &fx.org).await.unwrap();
        assert_eq!(read.candidate.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn unlock_bills_and_flips() {
        let fx = Fixture::new(10).await;
        let a = fx.cv(RankingCategory::Relevant).await;
        let b = fx.cv(RankingCategory::Relevant).await;

        let outcome = fx
            .service
            .unlock_by_ids(&[a.id, b.id], fx.user, fx.org)
            .await
            .unwrap();
        let UnlockOutcome::Unlocked {
            unlocked_count,
            remaining_credits,
            transaction_id,
        } = outcome
        else {
            panic!("expected unlock");
        };
        assert_eq!(unlocked_count, 2);
        assert_eq!(remaining_credits, 8);

        let page = fx.transactions().await;
        let deduction = &page.transactions[0];
        assert_eq!(Some(deduction.id), transaction_id);
        assert_eq!(deduction.amount, -2);
        assert_eq!(deduction.related_entity, Some(RelatedEntity::cv(a.id)));
        assert_eq!(deduction.metadata.description.as_deref(), Some("Unlock 2 CVs"));

        let cvs = fx.store.get_cvs(&fx.org, &[a.id, b.id]).await.unwrap();
        for cv in cvs {
            assert!(!cv.is_locked());
            assert_eq!(cv.unlocked_by.len(), 1);
            assert_eq!(cv.unlocked_by[0].user_id, fx.user);
        }
    }

    #[tokio::test]
    async fn second_unlock_is_free_and_idempotent() {
        let fx = Fixture::new(5).await;
        let cv = fx.cv(RankingCategory::Relevant).await;

        fx.service.unlock_by_ids(&[cv.id], fx.user, fx.org).await.unwrap();
        let again = fx.service.unlock_by_ids(&[cv.id], fx.user, fx.org).await.unwrap();

        assert_eq!(
            again,
            UnlockOutcome::Unlocked {
                unlocked_count: 0,
                remaining_credits: 4,
                transaction_id: None
            }
        );
        assert_eq!(fx.transactions().await.pagination.total, 2);
    }

    #[tokio::test]
    async fn partial_batch_bills_only_locked_subset() {
        let fx = Fixture::new(5).await;
        let a = fx.cv(RankingCategory::Relevant).await;
        let b = fx.cv(RankingCategory::Relevant).await;
        let c = fx.cv(RankingCategory::Relevant).await;
        fx.service.unlock_by_ids(&[a.id], fx.user, fx.org).await.unwrap();

        let quote = fx.service.can_unlock(&[a.id, b.id, c.id], &fx.org).await.unwrap();
        assert_eq!(
            quote,
            UnlockQuote {
                to_unlock: 2,
                already_unlocked: 1,
                has_enough_credits: true,
                available_credits: 4,
                required_credits: 2,
            }
        );

        let outcome = fx
            .service
            .unlock_by_ids(&[a.id, b.id, c.id], fx.user, fx.org)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UnlockOutcome::Unlocked {
                unlocked_count: 2,
                remaining_credits: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn insufficient_credits_changes_nothing() {
        let fx = Fixture::new(1).await;
        let a = fx.cv(RankingCategory::Relevant).await;
        let b = fx.cv(RankingCategory::Relevant).await;

        let outcome = fx
            .service
            .unlock_by_ids(&[a.id, b.id], fx.user, fx.org)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::InsufficientCredits {
                remaining_credits: 1,
                required_credits: 2
            }
        );

        let cvs = fx.store.get_cvs(&fx.org, &[a.id, b.id]).await.unwrap();
        assert!(cvs.iter().all(Cv::is_locked));
        assert_eq!(fx.transactions().await.pagination.total, 1);
    }

    #[tokio::test]
    async fn foreign_cv_is_not_found_before_billing() {
        let fx = Fixture::new(5).await;
        let mine = fx.cv(RankingCategory::Relevant).await;

        let other_org = OrganizationId::generate();
        let other_job = Job::new(other_org, "Elsewhere");
        fx.store.put_job(&other_job).await.unwrap();
        let theirs = fx
            .service
            .create_cv(new_cv(other_org, other_job.id, RankingCategory::Relevant))
            .await
            .unwrap();

        let err = fx
            .service
            .unlock_by_ids(&[mine.id, theirs.id], fx.user, fx.org)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "cv", .. }));
        assert_eq!(fx.ledger.get_balance(&fx.org).await.unwrap(), 5);

        let quote = fx.service.can_unlock(&[theirs.id], &fx.org).await.unwrap();
        assert_eq!(quote.to_unlock, 0);
    }

    #[tokio::test]
    async fn unlock_next_by_job_takes_newest_locked() {
        let fx = Fixture::new(10).await;
        let mut ids = Vec::new();
        for minutes in 0..4 {
            let mut cv = Cv::new(new_cv(fx.org, fx.job.id, RankingCategory::Relevant));
            cv.created_at = chrono::Utc::now() - chrono::Duration::minutes(10 - minutes);
            fx.store.put_cv(&cv).await.unwrap();
            ids.push(cv.id);
        }

        let outcome = fx
            .service
            .unlock_next_by_job(fx.job.id, 2, fx.user, fx.org)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UnlockOutcome::Unlocked {
                unlocked_count: 2,
                remaining_credits: 8,
                ..
            }
        ));

        let cvs = fx.store.get_cvs(&fx.org, &ids).await.unwrap();
        let unlocked: Vec<CvId> = cvs.iter().filter(|cv| !cv.is_locked()).map(|cv| cv.id).collect();
        assert_eq!(unlocked.len(), 2);
        assert!(unlocked.contains(&ids[3]) && unlocked.contains(&ids[2]));

        let page = fx.transactions().await;
        assert_eq!(
            page.transactions[0].metadata.description.as_deref(),
            Some("Unlock 2 CVs for job: Rust Engineer")
        );

        let stats = fx.service.job_unlock_stats(fx.job.id, &fx.org).await.unwrap();
        assert_eq!(
            stats,
            JobUnlockStats {
                total: 4,
                locked: 2,
                unlocked: 2,
                available_credits: 8
            }
        );
    }

    #[tokio::test]
    async fn unlock_next_by_job_checks_job_scope() {
        let fx = Fixture::new(10).await;
        let err = fx
            .service
            .unlock_next_by_job(fx.job.id, 1, fx.user, OrganizationId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "job", .. }));

        let outcome = fx
            .service
            .unlock_next_by_job(fx.job.id, 3, fx.user, fx.org)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::Unlocked {
                unlocked_count: 0,
                remaining_credits: 10,
                transaction_id: None
            }
        );
    }

    /// Memory store whose CV flips can be made to fail or to lose races.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_flip: bool,
        steal_first_flip: bool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn latest_transaction(
            &self,
            organization_id: &OrganizationId,
        ) -> hireflow_store::Result<Option<CreditTransaction>> {
            self.inner.latest_transaction(organization_id).await
        }

        async fn append_transaction(
            &self,
            transaction: &CreditTransaction,
        ) -> hireflow_store::Result<()> {
            self.inner.append_transaction(transaction).await
        }

        async fn get_transaction(
            &self,
            transaction_id: &TransactionId,
        ) -> hireflow_store::Result<Option<CreditTransaction>> {
            self.inner.get_transaction(transaction_id).await
        }

        async fn find_by_external_event_id(
            &self,
            event_id: &str,
        ) -> hireflow_store::Result<Option<CreditTransaction>> {
            self.inner.find_by_external_event_id(event_id).await
        }

        async fn list_transactions(
            &self,
            organization_id: &OrganizationId,
            filter: &HistoryFilter,
        ) -> hireflow_store::Result<TransactionPage> {
            self.inner.list_transactions(organization_id, filter).await
        }

        async fn put_job(&self, job: &Job) -> hireflow_store::Result<()> {
            self.inner.put_job(job).await
        }

        async fn get_job(
            &self,
            organization_id: &OrganizationId,
            job_id: &JobId,
        ) -> hireflow_store::Result<Option<Job>> {
            self.inner.get_job(organization_id, job_id).await
        }

        async fn put_cv(&self, cv: &Cv) -> hireflow_store::Result<()> {
            self.inner.put_cv(cv).await
        }

        async fn get_cvs(
            &self,
            organization_id: &OrganizationId,
            cv_ids: &[CvId],
        ) -> hireflow_store::Result<Vec<Cv>> {
            self.inner.get_cvs(organization_id, cv_ids).await
        }

        async fn latest_locked_cvs(
            &self,
            organization_id: &OrganizationId,
            job_id: &JobId,
            limit: usize,
        ) -> hireflow_store::Result<Vec<Cv>> {
            self.inner
                .latest_locked_cvs(organization_id, job_id, limit)
                .await
        }

        async fn unlock_cvs(
            &self,
            organization_id: &OrganizationId,
            cv_ids: &[CvId],
            record: &UnlockRecord,
        ) -> hireflow_store::Result<Vec<CvId>> {
            if self.fail_flip {
                return Err(StoreError::Database("connection reset".into()));
            }
            if self.steal_first_flip {
                // Another request flips the first CV just before this one.
                self.inner
                    .unlock_cvs(organization_id, &cv_ids[..1], record)
                    .await?;
            }
            self.inner.unlock_cvs(organization_id, cv_ids, record).await
        }

        async fn visibility_counts(
            &self,
            organization_id: &OrganizationId,
            job_id: &JobId,
        ) -> hireflow_store::Result<VisibilityCounts> {
            self.inner.visibility_counts(organization_id, job_id).await
        }
    }

    async fn flaky_fixture(
        store: FlakyStore,
        cvs: usize,
    ) -> (VisibilityService, Arc<CreditLedger>, OrganizationId, Vec<CvId>) {
        let store = Arc::new(store);
        let ledger = Arc::new(CreditLedger::new(store.clone()));
        let service = VisibilityService::new(store.clone(), ledger.clone());
        let org = OrganizationId::generate();
        let job = Job::new(org, "Flaky");
        store.put_job(&job).await.unwrap();
        ledger
            .adjust(org, 10, TransactionMetadata::described("seed"))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..cvs {
            let cv = service
                .create_cv(new_cv(org, job.id, RankingCategory::Relevant))
                .await
                .unwrap();
            ids.push(cv.id);
        }
        (service, ledger, org, ids)
    }

    #[tokio::test]
    async fn flip_failure_after_debit_is_inconsistent_state() {
        let (service, ledger, org, ids) = flaky_fixture(
            FlakyStore {
                fail_flip: true,
                ..FlakyStore::default()
            },
            2,
        )
        .await;

        let err = service
            .unlock_by_ids(&ids, UserId::generate(), org)
            .await
            .unwrap_err();
        match err {
            LedgerError::InconsistentState {
                transaction_id,
                cv_ids,
                ..
            } => {
                assert_eq!(cv_ids, ids);
                let tx = ledger
                    .history(&org, &HistoryFilter::default())
                    .await
                    .unwrap()
                    .transactions
                    .remove(0);
                assert_eq!(tx.id, transaction_id);
                assert_eq!(tx.transaction_type, TransactionType::Deduction);
            }
            other => panic!("expected inconsistent state, got {other:?}"),
        }
        assert_eq!(ledger.get_balance(&org).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn reconcile_repairs_paid_but_locked_batch() {
        let fx = Fixture::new(0).await;
        let a = fx.cv(RankingCategory::Relevant).await;
        let b = fx.cv(RankingCategory::Relevant).await;

        let flipped = fx
            .service
            .reconcile_unlock(&[a.id, b.id], fx.user, fx.org)
            .await
            .unwrap();
        assert_eq!(flipped, 2);
        let again = fx
            .service
            .reconcile_unlock(&[a.id, b.id], fx.user, fx.org)
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(fx.transactions().await.pagination.total, 0);
    }

    #[tokio::test]
    async fn concurrently_unlocked_cvs_are_refunded() {
        let (service, ledger, org, ids) = flaky_fixture(
            FlakyStore {
                steal_first_flip: true,
                ..FlakyStore::default()
            },
            3,
        )
        .await;

        let outcome = service
            .unlock_by_ids(&ids, UserId::generate(), org)
            .await
            .unwrap();
        let UnlockOutcome::Unlocked {
            unlocked_count,
            remaining_credits,
            transaction_id: Some(deduction_id),
        } = outcome
        else {
            panic!("expected unlock");
        };
        assert_eq!(unlocked_count, 2);
        assert_eq!(remaining_credits, 8);

        let refund = ledger
            .history(&org, &HistoryFilter::default())
            .await
            .unwrap()
            .transactions
            .remove(0);
        assert_eq!(refund.transaction_type, TransactionType::Refund);
        assert_eq!(refund.amount, 1);
        assert_eq!(
            refund.external_event_id(),
            Some(format!("unlock-refund:{deduction_id}").as_str())
        );
        assert_eq!(refund.related_entity, Some(RelatedEntity::transaction(deduction_id)));
    }
}
