//! Sourcing integrations.
//!
//! Provider-specific fields live in the variants of [`IntegrationKind`]; the
//! fields every integration shares live on [`Integration`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrganizationId, UserId};

/// A connected sourcing channel that produces CVs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// Organization the integration feeds.
    pub organization_id: OrganizationId,
    /// User who connected it.
    pub user_id: UserId,
    /// Provider-specific configuration.
    pub kind: IntegrationKind,
    /// Health of the connection.
    pub status: IntegrationStatus,
    /// Last error reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the integration was connected.
    pub created_at: DateTime<Utc>,
}

impl Integration {
    /// Connect a new, active integration.
    #[must_use]
    pub fn connect(organization_id: OrganizationId, user_id: UserId, kind: IntegrationKind) -> Self {
        Self {
            organization_id,
            user_id,
            kind,
            status: IntegrationStatus::Active,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Mark the integration as failing.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.status = IntegrationStatus::Error;
        self.last_error = Some(error.into());
    }

    /// Identity of the integration within its organization.
    ///
    /// Two integrations with the same key are the same connection.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.kind {
            IntegrationKind::Email {
                provider, address, ..
            } => format!("email:{}:{}", provider.as_str(), address.to_lowercase()),
            IntegrationKind::Social { network, handle } => format!("social:{network}:{handle}"),
            IntegrationKind::JobPlatform {
                platform,
                account_id,
            } => format!("job_platform:{platform}:{account_id}"),
        }
    }
}

/// Provider-specific integration data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrationKind {
    /// A mailbox scanned for CV attachments.
    Email {
        /// Mail provider.
        provider: EmailProvider,
        /// Mailbox address.
        address: String,
        /// Last successful sync.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_sync_at: Option<DateTime<Utc>>,
    },
    /// A social network account.
    Social {
        /// Network name.
        network: String,
        /// Account handle.
        handle: String,
    },
    /// A job board account.
    JobPlatform {
        /// Platform name.
        platform: String,
        /// Account identifier on the platform.
        account_id: String,
    },
}

/// Supported mail providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailProvider {
    /// Google mail.
    Gmail,
    /// Microsoft mail.
    Outlook,
}

impl EmailProvider {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
        }
    }
}

/// Connection health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// Working.
    Active,
    /// Last sync failed.
    Error,
    /// Disconnected by the user.
    Disconnected,
}
