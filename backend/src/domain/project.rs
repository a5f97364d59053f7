//! Projects that own ingested runs, and the callers acting on their behalf.

use url::Url;
use uuid::Uuid;

/// A project as resolved by the project directory.
///
/// # Examples
/// ```
/// use flaketrack::domain::Project;
/// use uuid::Uuid;
///
/// let project = Project::new(Uuid::nil(), "payments");
/// assert!(project.matches_identifier("payments"));
/// assert!(project.matches_identifier(&Uuid::nil().to_string()));
/// assert!(project.notification_destination().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Store identifier.
    pub id: Uuid,
    /// Human-facing identifier, unique across projects.
    pub slug: String,
    /// Whether flake notifications are switched on.
    pub notifications_enabled: bool,
    /// Destination for flake notifications.
    pub notification_url: Option<Url>,
}

impl Project {
    /// Create a project with notifications disabled.
    pub fn new(id: Uuid, slug: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            notifications_enabled: false,
            notification_url: None,
        }
    }

    /// Enable notifications towards `url`.
    #[must_use]
    pub fn with_notifications(mut self, url: Url) -> Self {
        self.notifications_enabled = true;
        self.notification_url = Some(url);
        self
    }

    /// Whether `identifier` names this project, by slug or by id.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        identifier == self.slug
            || Uuid::parse_str(identifier).is_ok_and(|parsed| parsed == self.id)
    }

    /// Destination URL when notifications are enabled and configured.
    pub fn notification_destination(&self) -> Option<&Url> {
        if self.notifications_enabled {
            self.notification_url.as_ref()
        } else {
            None
        }
    }
}

/// A presented API key resolved to its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    /// Key row, recorded on the ingestion receipt.
    pub api_key_id: Uuid,
    /// Project the key belongs to.
    pub project: Project,
}

/// The principal submitting an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionCaller {
    /// An API key bound to exactly one project.
    ApiKey(ApiKeyCredential),
    /// A trusted operator (command-line backfill); the project is resolved
    /// from the metadata instead of a credential.
    Operator,
}

impl IngestionCaller {
    /// API key identifier, when the caller authenticated with one.
    pub fn api_key_id(&self) -> Option<Uuid> {
        match self {
            Self::ApiKey(credential) => Some(credential.api_key_id),
            Self::Operator => None,
        }
    }
}
