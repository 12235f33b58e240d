//! In-memory storage implementation.
//!
//! All state sits behind one `RwLock`, so an append's head check and its
//! insert happen under the same write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use hireflow_core::{
    CreditTransaction, Cv, CvId, HistoryFilter, Job, JobId, OrganizationId, Pagination,
    TransactionId, TransactionPage, UnlockRecord,
};

use crate::error::Result;
use crate::{check_append, Store, VisibilityCounts};

#[derive(Default)]
struct Inner {
    /// Per-organization ledgers, in sequence order.
    ledgers: HashMap<OrganizationId, Vec<CreditTransaction>>,
    /// Transaction id -> (organization, index into its ledger).
    transactions: HashMap<TransactionId, (OrganizationId, usize)>,
    /// External event id -> transaction id.
    events: HashMap<String, TransactionId>,
    jobs: HashMap<JobId, Job>,
    cvs: HashMap<CvId, Cv>,
}

impl Inner {
    fn transaction(&self, id: &TransactionId) -> Option<&CreditTransaction> {
        let (org, index) = self.transactions.get(id)?;
        self.ledgers.get(org)?.get(*index)
    }
}

/// Process-local [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn latest_transaction(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CreditTransaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledgers
            .get(organization_id)
            .and_then(|ledger| ledger.last())
            .cloned())
    }

    async fn append_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        let mut inner = self.inner.write().await;

        let existing_event = transaction
            .external_event_id()
            .and_then(|event_id| inner.events.get(event_id))
            .and_then(|id| inner.transaction(id))
            .cloned();
        let head = inner
            .ledgers
            .get(&transaction.organization_id)
            .and_then(|ledger| ledger.last());
        check_append(transaction, head, existing_event)?;

        let ledger = inner
            .ledgers
            .entry(transaction.organization_id)
            .or_default();
        let index = ledger.len();
        ledger.push(transaction.clone());
        inner
            .transactions
            .insert(transaction.id, (transaction.organization_id, index));
        if let Some(event_id) = transaction.external_event_id() {
            inner.events.insert(event_id.to_string(), transaction.id);
        }

        Ok(())
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CreditTransaction>> {
        let inner = self.inner.read().await;
        Ok(inner.transaction(transaction_id).cloned())
    }

    async fn find_by_external_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .get(event_id)
            .and_then(|id| inner.transaction(id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        organization_id: &OrganizationId,
        filter: &HistoryFilter,
    ) -> Result<TransactionPage> {
        let filter = filter.clone().normalized();
        let inner = self.inner.read().await;

        let matching: Vec<&CreditTransaction> = inner
            .ledgers
            .get(organization_id)
            .map(|ledger| ledger.iter().rev().filter(|tx| filter.matches(tx)).collect())
            .unwrap_or_default();

        let total = matching.len() as u64;
        let transactions = matching
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(TransactionPage {
            transactions,
            pagination: Pagination::new(total, filter.page, filter.limit),
        })
    }

    async fn put_job(&self, job: &Job) -> Result<()> {
        self.inner.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<Option<Job>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .get(job_id)
            .filter(|job| job.organization_id == *organization_id)
            .cloned())
    }

    async fn put_cv(&self, cv: &Cv) -> Result<()> {
        self.inner.write().await.cvs.insert(cv.id, cv.clone());
        Ok(())
    }

    async fn get_cvs(&self, organization_id: &OrganizationId, cv_ids: &[CvId]) -> Result<Vec<Cv>> {
        let inner = self.inner.read().await;
        let mut seen = std::collections::HashSet::new();
        Ok(cv_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| inner.cvs.get(id))
            .filter(|cv| cv.organization_id == *organization_id)
            .cloned()
            .collect())
    }

    async fn latest_locked_cvs(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<Cv>> {
        let inner = self.inner.read().await;
        let mut locked: Vec<&Cv> = inner
            .cvs
            .values()
            .filter(|cv| {
                cv.organization_id == *organization_id && cv.job_id == *job_id && cv.is_locked()
            })
            .collect();
        locked.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(locked.into_iter().take(limit).cloned().collect())
    }

    async fn unlock_cvs(
        &self,
        organization_id: &OrganizationId,
        cv_ids: &[CvId],
        record: &UnlockRecord,
    ) -> Result<Vec<CvId>> {
        let mut inner = self.inner.write().await;
        let mut changed = Vec::new();
        for id in cv_ids {
            if let Some(cv) = inner
                .cvs
                .get_mut(id)
                .filter(|cv| cv.organization_id == *organization_id)
            {
                if cv.unlock(record.clone()) {
                    changed.push(*id);
                }
            }
        }
        Ok(changed)
    }

    async fn visibility_counts(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<VisibilityCounts> {
        let inner = self.inner.read().await;
        let mut counts = VisibilityCounts::default();
        for cv in inner
            .cvs
            .values()
            .filter(|cv| cv.organization_id == *organization_id && cv.job_id == *job_id)
        {
            if cv.is_locked() {
                counts.locked += 1;
            } else {
                counts.unlocked += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use hireflow_core::{
        Candidate, CvSource, NewCv, NewTransaction, Ranking, RankingCategory,
        TransactionMetadata, TransactionType, UserId,
    };

    async fn append(
        store: &MemoryStore,
        draft: NewTransaction,
    ) -> Result<CreditTransaction> {
        let head = store.latest_transaction(&draft.organization_id).await?;
        let tx = CreditTransaction::next(draft, head.as_ref()).unwrap();
        store.append_transaction(&tx).await?;
        Ok(tx)
    }

    fn locked_cv(org: OrganizationId, job: JobId) -> Cv {
        Cv::new(NewCv {
            organization_id: org,
            job_id: job,
            candidate: Candidate {
                full_name: "Grace Hopper".into(),
                ..Candidate::default()
            },
            ranking: Ranking {
                category: RankingCategory::Relevant,
                justification: String::new(),
                relevance_score: None,
            },
            source: CvSource::Manual,
        })
    }

    #[tokio::test]
    async fn empty_ledger_has_no_head() {
        let store = MemoryStore::new();
        let head = store
            .latest_transaction(&OrganizationId::generate())
            .await
            .unwrap();
        assert!(head.is_none());
    }

    #[tokio::test]
    async fn stale_append_is_a_conflict() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();

        let stale = CreditTransaction::next(
            NewTransaction::new(org, TransactionType::Purchase, 10),
            None,
        )
        .unwrap();
        append(&store, NewTransaction::new(org, TransactionType::Purchase, 5))
            .await
            .unwrap();

        let err = store.append_transaction(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected_sequence: 1,
                ..
            }
        ));
        let head = store.latest_transaction(&org).await.unwrap().unwrap();
        assert_eq!(head.balance_after, 5);
    }

    #[tokio::test]
    async fn duplicate_external_event_returns_existing_row() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let draft = NewTransaction::new(org, TransactionType::Purchase, 50)
            .with_metadata(TransactionMetadata::default().with_external_event_id("evt-1"));

        let first = append(&store, draft.clone()).await.unwrap();
        let err = append(&store, draft).await.unwrap_err();

        match err {
            StoreError::DuplicateEvent { event_id, existing } => {
                assert_eq!(event_id, "evt-1");
                assert_eq!(existing.id, first.id);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let found = store.find_by_external_event_id("evt-1").await.unwrap();
        assert_eq!(found.map(|tx| tx.id), Some(first.id));
    }

    #[tokio::test]
    async fn forged_balance_is_rejected() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let mut tx = CreditTransaction::next(
            NewTransaction::new(org, TransactionType::Purchase, 5),
            None,
        )
        .unwrap();
        tx.balance_after = 500;

        let err = store.append_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransaction(_)));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paginated() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        for amount in 1..=5 {
            append(&store, NewTransaction::new(org, TransactionType::Purchase, amount))
                .await
                .unwrap();
        }
        append(&store, NewTransaction::new(org, TransactionType::Deduction, -2))
            .await
            .unwrap();

        let page = store
            .list_transactions(
                &org,
                &HistoryFilter {
                    page: 1,
                    limit: 4,
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 6);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.transactions.len(), 4);
        assert_eq!(page.transactions[0].sequence, 6);
        assert_eq!(page.transactions[3].sequence, 3);

        let deductions = store
            .list_transactions(
                &org,
                &HistoryFilter {
                    transaction_type: Some(TransactionType::Deduction),
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(deductions.pagination.total, 1);
        assert_eq!(deductions.transactions[0].amount, -2);
    }

    #[tokio::test]
    async fn history_date_range_includes_both_bounds() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let base = chrono::Utc::now() - chrono::Duration::days(10);
        let day = |n: i64| base + chrono::Duration::days(n);

        for n in 0..5 {
            let head = store.latest_transaction(&org).await.unwrap();
            let mut tx = CreditTransaction::next(
                NewTransaction::new(org, TransactionType::Purchase, 1),
                head.as_ref(),
            )
            .unwrap();
            tx.created_at = day(n);
            store.append_transaction(&tx).await.unwrap();
        }

        let page = store
            .list_transactions(
                &org,
                &HistoryFilter {
                    start_date: Some(day(1)),
                    end_date: Some(day(3)),
                    limit: 2,
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);
        let sequences: Vec<u64> = page.transactions.iter().map(|tx| tx.sequence).collect();
        assert_eq!(sequences, vec![4, 3]);

        let after_last = store
            .list_transactions(
                &org,
                &HistoryFilter {
                    start_date: Some(day(5)),
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after_last.pagination.total, 0);
        assert!(after_last.transactions.is_empty());
    }

    #[tokio::test]
    async fn cv_lookups_are_scoped_by_organization() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let other = OrganizationId::generate();
        let job = JobId::generate();
        let cv = locked_cv(org, job);
        store.put_cv(&cv).await.unwrap();

        assert_eq!(store.get_cvs(&org, &[cv.id]).await.unwrap().len(), 1);
        assert!(store.get_cvs(&other, &[cv.id]).await.unwrap().is_empty());

        let changed = store
            .unlock_cvs(&other, &[cv.id], &UnlockRecord::now(UserId::generate()))
            .await
            .unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn unlock_only_changes_locked_cvs() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let job = JobId::generate();
        let cv = locked_cv(org, job);
        store.put_cv(&cv).await.unwrap();
        let record = UnlockRecord::now(UserId::generate());

        assert_eq!(store.unlock_cvs(&org, &[cv.id], &record).await.unwrap(), vec![cv.id]);
        assert!(store.unlock_cvs(&org, &[cv.id], &record).await.unwrap().is_empty());

        let stored = store.get_cvs(&org, &[cv.id]).await.unwrap().remove(0);
        assert_eq!(stored.unlocked_by.len(), 1);

        let counts = store.visibility_counts(&org, &job).await.unwrap();
        assert_eq!(counts, VisibilityCounts { locked: 0, unlocked: 1 });
    }

    #[tokio::test]
    async fn latest_locked_cvs_prefers_newest() {
        let store = MemoryStore::new();
        let org = OrganizationId::generate();
        let job = JobId::generate();
        let mut ids = Vec::new();
        for minutes in 0..4 {
            let mut cv = locked_cv(org, job);
            cv.created_at = chrono::Utc::now() - chrono::Duration::minutes(10 - minutes);
            ids.push(cv.id);
            store.put_cv(&cv).await.unwrap();
        }

        let picked = store.latest_locked_cvs(&org, &job, 2).await.unwrap();
        let picked: Vec<CvId> = picked.into_iter().map(|cv| cv.id).collect();
        assert_eq!(picked, vec![ids[3], ids[2]]);
    }
}
