//! `RocksDB` storage implementation.
//!
//! `RocksDB` has no conditional writes, so appends and CV flips are
//! serialized through a process-wide write lock. The head check and the
//! `WriteBatch` commit happen under the same guard.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use hireflow_core::{
    CreditTransaction, Cv, CvId, HistoryFilter, Job, JobId, OrganizationId, Pagination,
    TransactionId, TransactionPage, UnlockRecord,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{check_append, Store, VisibilityCounts};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn transaction(&self, id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(id))
    }

    fn transaction_at(&self, index_value: &[u8]) -> Result<CreditTransaction> {
        let id = keys::decode_transaction_id(index_value)
            .ok_or_else(|| StoreError::Serialization("malformed ledger index entry".into()))?;
        self.transaction(&id)?.ok_or_else(|| StoreError::NotFound {
            entity: "transaction",
            id: id.to_string(),
        })
    }

    fn event_transaction(&self, event_id: &str) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::EXTERNAL_EVENTS)?;
        self.db
            .get_cf(&cf, keys::external_event_key(event_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|value| self.transaction_at(&value))
            .transpose()
    }

    fn head(&self, organization_id: &OrganizationId) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_ORG)?;
        let prefix = keys::ledger_prefix(organization_id);
        let upper = keys::ledger_key(organization_id, u64::MAX);

        let mut iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                if key.starts_with(&prefix) {
                    self.transaction_at(&value).map(Some)
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn ledger(&self, organization_id: &OrganizationId) -> Result<Vec<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_ORG)?;
        let prefix = keys::ledger_prefix(organization_id);
        let mut transactions = Vec::new();

        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            transactions.push(self.transaction_at(&value)?);
        }

        Ok(transactions)
    }

    fn cv(&self, id: &CvId) -> Result<Option<Cv>> {
        self.get_value(cf::CVS, &keys::cv_key(id))
    }

    /// CV ids of a job in creation order.
    fn job_cv_ids(&self, organization_id: &OrganizationId, job_id: &JobId) -> Result<Vec<CvId>> {
        let cf = self.cf(cf::CVS_BY_JOB)?;
        let prefix = keys::job_cvs_prefix(organization_id, job_id);
        let mut ids = Vec::new();

        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::extract_cv_id(&key) {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn latest_transaction(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CreditTransaction>> {
        self.head(organization_id)
    }

    async fn append_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        let _guard = self.lock()?;

        let existing_event = match transaction.external_event_id() {
            Some(event_id) => self.event_transaction(event_id)?,
            None => None,
        };
        let head = self.head(&transaction.organization_id)?;
        check_append(transaction, head.as_ref(), existing_event)?;

        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_org = self.cf(cf::TRANSACTIONS_BY_ORG)?;
        let cf_events = self.cf(cf::EXTERNAL_EVENTS)?;

        let tx_key = keys::transaction_key(&transaction.id);
        let ledger_key = keys::ledger_key(&transaction.organization_id, transaction.sequence);
        let value = Self::serialize(transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tx, &tx_key, &value);
        batch.put_cf(&cf_by_org, &ledger_key, &tx_key);
        if let Some(event_id) = transaction.external_event_id() {
            batch.put_cf(&cf_events, keys::external_event_key(event_id), &tx_key);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CreditTransaction>> {
        self.transaction(transaction_id)
    }

    async fn find_by_external_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        self.event_transaction(event_id)
    }

    async fn list_transactions(
        &self,
        organization_id: &OrganizationId,
        filter: &HistoryFilter,
    ) -> Result<TransactionPage> {
        let filter = filter.clone().normalized();
        let matching: Vec<CreditTransaction> = self
            .ledger(organization_id)?
            .into_iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .collect();

        let total = matching.len() as u64;
        let transactions = matching
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .collect();

        Ok(TransactionPage {
            transactions,
            pagination: Pagination::new(total, filter.page, filter.limit),
        })
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    async fn put_job(&self, job: &Job) -> Result<()> {
        let cf = self.cf(cf::JOBS)?;
        let value = Self::serialize(job)?;
        self.db
            .put_cf(&cf, keys::job_key(&job.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_job(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<Option<Job>> {
        let job: Option<Job> = self.get_value(cf::JOBS, &keys::job_key(job_id))?;
        Ok(job.filter(|job| job.organization_id == *organization_id))
    }

    // =========================================================================
    // CV Operations
    // =========================================================================

    async fn put_cv(&self, cv: &Cv) -> Result<()> {
        let _guard = self.lock()?;
        let cf_cvs = self.cf(cf::CVS)?;
        let cf_by_job = self.cf(cf::CVS_BY_JOB)?;

        let index_key = keys::job_cv_key(&cv.organization_id, &cv.job_id, cv.created_at, &cv.id);

        let mut batch = WriteBatch::default();
        if let Some(previous) = self.cv(&cv.id)? {
            let previous_key = keys::job_cv_key(
                &previous.organization_id,
                &previous.job_id,
                previous.created_at,
                &previous.id,
            );
            if previous_key != index_key {
                batch.delete_cf(&cf_by_job, previous_key);
            }
        }
        batch.put_cf(&cf_cvs, keys::cv_key(&cv.id), Self::serialize(cv)?);
        batch.put_cf(&cf_by_job, index_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_cvs(&self, organization_id: &OrganizationId, cv_ids: &[CvId]) -> Result<Vec<Cv>> {
        let mut seen = std::collections::HashSet::new();
        let mut cvs = Vec::new();
        for id in cv_ids.iter().filter(|id| seen.insert(**id)) {
            if let Some(cv) = self.cv(id)?.filter(|cv| cv.organization_id == *organization_id) {
                cvs.push(cv);
            }
        }
        Ok(cvs)
    }

    async fn latest_locked_cvs(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<Cv>> {
        let mut locked = Vec::new();
        for id in self.job_cv_ids(organization_id, job_id)?.iter().rev() {
            if locked.len() >= limit {
                break;
            }
            if let Some(cv) = self.cv(id)?.filter(Cv::is_locked) {
                locked.push(cv);
            }
        }
        Ok(locked)
    }

    async fn unlock_cvs(
        &self,
        organization_id: &OrganizationId,
        cv_ids: &[CvId],
        record: &UnlockRecord,
    ) -> Result<Vec<CvId>> {
        let _guard = self.lock()?;
        let cf = self.cf(cf::CVS)?;
        let mut batch = WriteBatch::default();
        let mut changed = Vec::new();

        for id in cv_ids {
            let Some(mut cv) = self.cv(id)? else {
                continue;
            };
            if cv.organization_id != *organization_id || changed.contains(id) {
                continue;
            }
            if cv.unlock(record.clone()) {
                batch.put_cf(&cf, keys::cv_key(id), Self::serialize(&cv)?);
                changed.push(*id);
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(changed)
    }

    async fn visibility_counts(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<VisibilityCounts> {
        let mut counts = VisibilityCounts::default();
        for id in self.job_cv_ids(organization_id, job_id)? {
            match self.cv(&id)? {
                Some(cv) if cv.is_locked() => counts.locked += 1,
                Some(_) => counts.unlocked += 1,
                None => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hireflow_core::{
        Candidate, CvSource, NewCv, NewTransaction, Ranking, RankingCategory,
        TransactionMetadata, TransactionType, UserId,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    async fn append(store: &RocksStore, draft: NewTransaction) -> Result<CreditTransaction> {
        let head = store.latest_transaction(&draft.organization_id).await?;
        let tx = CreditTransaction::next(draft, head.as_ref()).unwrap();
        store.append_transaction(&tx).await?;
        Ok(tx)
    }

    #[tokio::test]
    async fn ledger_head_follows_sequence() {
        let (store, _dir) = create_test_store();
        let org = OrganizationId::generate();
        let other = OrganizationId::generate();

        for amount in [10, 20, 30] {
            append(&store, NewTransaction::new(org, TransactionType::Purchase, amount))
                .await
                .unwrap();
        }
        append(&store, NewTransaction::new(other, TransactionType::Purchase, 7))
            .await
            .unwrap();

        let head = store.latest_transaction(&org).await.unwrap().unwrap();
        assert_eq!(head.sequence, 3);
        assert_eq!(head.balance_after, 60);

        let page = store
            .list_transactions(&org, &HistoryFilter::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.transactions[0].amount, 30);
    }

    #[tokio::test]
    async fn stale_append_conflicts() {
        let (store, _dir) = create_test_store();
        let org = OrganizationId::generate();
        let stale = CreditTransaction::next(
            NewTransaction::new(org, TransactionType::Purchase, 1),
            None,
        )
        .unwrap();
        append(&store, NewTransaction::new(org, TransactionType::Purchase, 2))
            .await
            .unwrap();

        let result = store.append_transaction(&stale).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn duplicate_event_is_detected_after_reopen() {
        let dir = TempDir::new().unwrap();
        let org = OrganizationId::generate();
        let draft = NewTransaction::new(org, TransactionType::Purchase, 100)
            .with_metadata(TransactionMetadata::default().with_external_event_id("txn_01"));

        let first = {
            let store = RocksStore::open(dir.path()).unwrap();
            append(&store, draft.clone()).await.unwrap()
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let result = append(&store, draft).await;
        match result {
            Err(StoreError::DuplicateEvent { existing, .. }) => assert_eq!(existing.id, first.id),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cv_unlock_and_counts() {
        let (store, _dir) = create_test_store();
        let org = OrganizationId::generate();
        let job = Job::new(org, "Backend Engineer");
        store.put_job(&job).await.unwrap();

        let mut ids = Vec::new();
        for minutes in 0..3 {
            let mut cv = Cv::new(NewCv {
                organization_id: org,
                job_id: job.id,
                candidate: Candidate::default(),
                ranking: Ranking {
                    category: RankingCategory::HighlyRelevant,
                    justification: String::new(),
                    relevance_score: Some(90),
                },
                source: CvSource::LandingPage,
            });
            cv.created_at = chrono::Utc::now() - chrono::Duration::minutes(5 - minutes);
            ids.push(cv.id);
            store.put_cv(&cv).await.unwrap();
        }

        let newest = store.latest_locked_cvs(&org, &job.id, 1).await.unwrap();
        assert_eq!(newest[0].id, ids[2]);

        let record = UnlockRecord::now(UserId::generate());
        let changed = store.unlock_cvs(&org, &[ids[2], ids[2]], &record).await.unwrap();
        assert_eq!(changed, vec![ids[2]]);

        let counts = store.visibility_counts(&org, &job.id).await.unwrap();
        assert_eq!(counts, VisibilityCounts { locked: 2, unlocked: 1 });
        assert!(store.get_job(&OrganizationId::generate(), &job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn re_put_cv_moves_its_job_index_entry() {
        let (store, _dir) = create_test_store();
        let org = OrganizationId::generate();
        let job = Job::new(org, "Data Engineer");
        store.put_job(&job).await.unwrap();

        let new_cv = || {
            Cv::new(NewCv {
                organization_id: org,
                job_id: job.id,
                candidate: Candidate::default(),
                ranking: Ranking {
                    category: RankingCategory::Relevant,
                    justification: String::new(),
                    relevance_score: None,
                },
                source: CvSource::Manual,
            })
        };
        let mut moved = new_cv();
        let other = new_cv();
        moved.created_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        store.put_cv(&moved).await.unwrap();
        store.put_cv(&other).await.unwrap();

        moved.created_at = chrono::Utc::now() - chrono::Duration::minutes(30);
        store.put_cv(&moved).await.unwrap();

        assert_eq!(store.job_cv_ids(&org, &job.id).unwrap(), vec![moved.id, other.id]);
        let counts = store.visibility_counts(&org, &job.id).await.unwrap();
        assert_eq!(counts, VisibilityCounts { locked: 2, unlocked: 0 });
        let newest = store.latest_locked_cvs(&org, &job.id, 1).await.unwrap();
        assert_eq!(newest[0].id, other.id);
    }
}
