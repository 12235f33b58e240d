//! Key encoding utilities for `RocksDB`.
//!
//! Multi-part keys are fixed-width and big-endian so that lexicographic order
//! matches ledger order (sequence) and CV age (creation time).

use chrono::{DateTime, Utc};
use hireflow_core::{CvId, JobId, OrganizationId, TransactionId};

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a ledger index key.
///
/// Format: `organization_id (16 bytes) || sequence (8 bytes, big-endian)`
#[must_use]
pub fn ledger_key(organization_id: &OrganizationId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(organization_id.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// Create a prefix for iterating an organization's ledger.
#[must_use]
pub fn ledger_prefix(organization_id: &OrganizationId) -> Vec<u8> {
    organization_id.as_bytes().to_vec()
}

/// Decode a transaction ID stored as an index value.
///
/// Returns `None` if the value is not exactly 16 bytes.
#[must_use]
pub fn decode_transaction_id(value: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Create an external event key.
#[must_use]
pub fn external_event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create a CV key.
#[must_use]
pub fn cv_key(cv_id: &CvId) -> Vec<u8> {
    cv_id.as_bytes().to_vec()
}

/// Create a job key.
#[must_use]
pub fn job_key(job_id: &JobId) -> Vec<u8> {
    job_id.as_bytes().to_vec()
}

/// Create a CV-by-job index key.
///
/// Format: `organization_id (16) || job_id (16) || created_at millis (8) || cv_id (16)`
#[must_use]
pub fn job_cv_key(
    organization_id: &OrganizationId,
    job_id: &JobId,
    created_at: DateTime<Utc>,
    cv_id: &CvId,
) -> Vec<u8> {
    let mut key = job_cvs_prefix(organization_id, job_id);
    key.reserve(24);
    // Flip the sign bit so negative timestamps still sort first.
    #[allow(clippy::cast_sign_loss)]
    let millis = (created_at.timestamp_millis() as u64) ^ (1 << 63);
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(cv_id.as_bytes());
    key
}

/// Create a prefix for iterating a job's CVs.
#[must_use]
pub fn job_cvs_prefix(organization_id: &OrganizationId, job_id: &JobId) -> Vec<u8> {
    let mut key = Vec::with_capacity(56);
    key.extend_from_slice(organization_id.as_bytes());
    key.extend_from_slice(job_id.as_bytes());
    key
}

/// Extract the CV ID from a CV-by-job index key.
///
/// Returns `None` if the key is shorter than 56 bytes.
#[must_use]
pub fn extract_cv_id(key: &[u8]) -> Option<CvId> {
    let bytes: [u8; 16] = key.get(40..56)?.try_into().ok()?;
    Some(CvId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}
