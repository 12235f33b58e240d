//! Job postings, as far as the unlock workflow needs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, OrganizationId};

/// A job posting owned by an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Title shown to recruiters.
    pub title: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create an active job.
    #[must_use]
    pub fn new(organization_id: OrganizationId, title: impl Into<String>) -> Self {
        Self {
            id: JobId::generate(),
            organization_id,
            title: title.into(),
            status: JobStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Whether new submissions are accepted.
    #[must_use]
    pub fn accepts_submissions(&self) -> bool {
        self.status == JobStatus::Active
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Open for submissions.
    Active,
    /// Not published yet.
    Draft,
    /// No longer accepting submissions.
    Closed,
    /// Soft-deleted.
    Deleted,
}
