//! CV records and their visibility state.
//!
//! A CV starts `locked` (contact details hidden) unless the classifier ranked
//! the candidate as not relevant, in which case nothing is gated and the CV
//! starts `unlocked` and `rejected`. Unlocking is one-way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CvId, JobId, OrganizationId, UserId};

/// A candidate submission for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cv {
    /// Unique CV ID.
    pub id: CvId,
    /// Owning organization. Every lookup is scoped by this.
    pub organization_id: OrganizationId,
    /// Job the candidate applied to.
    pub job_id: JobId,
    /// Extracted candidate record.
    pub candidate: Candidate,
    /// Classifier output.
    pub ranking: Ranking,
    /// Review status.
    pub status: CvStatus,
    /// Whether contact details are exposed to the organization.
    pub visibility: Visibility,
    /// Audit trail of unlocks.
    #[serde(default)]
    pub unlocked_by: Vec<UnlockRecord>,
    /// Where the submission came from.
    pub source: CvSource,
    /// When the CV was recorded.
    pub created_at: DateTime<Utc>,
}

impl Cv {
    /// Record a classified submission.
    ///
    /// Status and visibility are derived from `new.ranking.category`.
    #[must_use]
    pub fn new(new: NewCv) -> Self {
        let rejected = new.ranking.category.is_rejection();
        Self {
            id: CvId::generate(),
            organization_id: new.organization_id,
            job_id: new.job_id,
            candidate: new.candidate,
            ranking: new.ranking,
            status: if rejected {
                CvStatus::Rejected
            } else {
                CvStatus::Pending
            },
            visibility: if rejected {
                Visibility::Unlocked
            } else {
                Visibility::Locked
            },
            unlocked_by: Vec::new(),
            source: new.source,
            created_at: Utc::now(),
        }
    }

    /// Whether the CV is still gated.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.visibility == Visibility::Locked
    }

    /// Flip to `unlocked` and record who did it.
    ///
    /// Returns `false` and changes nothing if the CV was already unlocked.
    pub fn unlock(&mut self, record: UnlockRecord) -> bool {
        if !self.is_locked() {
            return false;
        }
        self.visibility = Visibility::Unlocked;
        self.unlocked_by.push(record);
        true
    }

    /// A copy safe to show the organization: contact details are removed
    /// while the CV is locked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut cv = self.clone();
        if cv.is_locked() {
            cv.candidate.email = None;
            cv.candidate.phone = None;
        }
        cv
    }
}

/// Input for [`Cv::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCv {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Target job.
    pub job_id: JobId,
    /// Extracted candidate record.
    pub candidate: Candidate,
    /// Classifier output for this submission.
    pub ranking: Ranking,
    /// Where the submission came from.
    pub source: CvSource,
}

/// Gating state of a CV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Contact details hidden until paid for.
    Locked,
    /// Contact details visible to the whole organization.
    Unlocked,
}

impl Visibility {
    /// Stable lowercase name, as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        }
    }
}

/// Review status of a CV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvStatus {
    /// Awaiting review.
    Pending,
    /// Reviewed by a recruiter.
    Reviewed,
    /// Rejected (automatically or by a recruiter).
    Rejected,
}

/// One entry of the unlock audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// User who triggered the unlock.
    pub user_id: UserId,
    /// When it happened.
    pub unlocked_at: DateTime<Utc>,
}

impl UnlockRecord {
    /// A record stamped with the current time.
    #[must_use]
    pub fn now(user_id: UserId) -> Self {
        Self {
            user_id,
            unlocked_at: Utc::now(),
        }
    }
}

/// Where a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvSource {
    /// Public job landing page.
    LandingPage,
    /// Scanned from a connected mailbox.
    EmailIntegration,
    /// Uploaded by a recruiter.
    Manual,
}

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    /// Relevance bucket.
    pub category: RankingCategory,
    /// Short explanation of the verdict.
    #[serde(default)]
    pub justification: String,
    /// Optional 0-100 score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u8>,
}

/// Relevance bucket assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingCategory {
    /// Strong match.
    #[serde(rename = "Highly Relevant")]
    HighlyRelevant,
    /// Reasonable match.
    #[serde(rename = "Relevant")]
    Relevant,
    /// Discarded automatically.
    #[serde(rename = "Not Relevant")]
    NotRelevant,
}

impl RankingCategory {
    /// Whether the classifier discarded the candidate.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::NotRelevant)
    }
}

/// Structured candidate data extracted from a CV.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Full name.
    pub full_name: String,
    /// Email (gated).
    #[serde(default)]
    pub email: Option<String>,
    /// Phone (gated).
    #[serde(default)]
    pub phone: Option<String>,
    /// Professional summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Skills.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Education history.
    #[serde(default)]
    pub education: Vec<Education>,
    /// Work history.
    #[serde(default)]
    pub experience: Vec<Experience>,
    /// Spoken languages.
    #[serde(default)]
    pub languages: Vec<Language>,
}

/// An education entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    /// Degree name.
    pub degree: String,
    /// Institution.
    pub institution: String,
    /// Graduation year, free text.
    #[serde(default)]
    pub year: Option<String>,
}

/// A work-history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    /// Employer.
    pub company: String,
    /// Role.
    pub position: String,
    /// Date range, free text.
    #[serde(default)]
    pub dates: Option<String>,
    /// Responsibilities.
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

/// A spoken language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Language name.
    pub name: String,
    /// Proficiency.
    pub proficiency: Proficiency,
}

/// Language proficiency levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proficiency {
    /// Native speaker.
    Native,
    /// Fluent.
    Fluent,
    /// Advanced.
    Advanced,
    /// Intermediate.
    Intermediate,
    /// Basic.
    Basic,
}
