//! Run-context metadata accompanying an upload.
//!
//! [`RawIngestionMetadata`] is the wire shape: every field optional so a
//! missing value is reported by name rather than as a decoding failure.
//! [`RawIngestionMetadata::validate`] produces the immutable
//! [`IngestionMetadata`] used by the persistence pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Project;

/// Run metadata exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIngestionMetadata {
    /// Declared project slug or id.
    pub project: Option<String>,
    /// Repository full name, e.g. `acme/payments`.
    pub repository: Option<String>,
    /// Workflow display name.
    pub workflow_name: Option<String>,
    /// Workflow file reference.
    pub workflow_ref: Option<String>,
    /// External run identifier.
    pub run_id: Option<i64>,
    /// External run number.
    pub run_number: Option<i64>,
    /// Attempt number, starting at 1.
    pub run_attempt: Option<i64>,
    /// Link to the run in the CI system.
    pub run_url: Option<String>,
    /// Commit under test.
    pub commit_sha: Option<String>,
    /// Branch under test.
    pub branch: Option<String>,
    /// Triggering event, e.g. `push`.
    pub event: Option<String>,
    /// Pull request number, when triggered by one.
    pub pr_number: Option<i64>,
    /// Job name.
    pub job_name: Option<String>,
    /// Matrix variant of the job.
    pub job_variant: Option<String>,
    /// RFC3339 start of the attempt.
    pub started_at: Option<String>,
    /// RFC3339 completion of the attempt.
    pub completed_at: Option<String>,
}

/// Validation failure naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataValidationError {
    /// A required field was absent.
    #[error("{field} is required")]
    Missing {
        /// Offending field.
        field: &'static str,
    },
    /// A required string was blank.
    #[error("{field} must not be empty")]
    Empty {
        /// Offending field.
        field: &'static str,
    },
    /// A numeric identifier was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NotPositive {
        /// Offending field.
        field: &'static str,
        /// Submitted value.
        value: i64,
    },
    /// A number exceeded the stored range.
    #[error("{field} is out of range: {value}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Submitted value.
        value: i64,
    },
    /// A URL field did not parse as an absolute http(s) URL.
    #[error("{field} must be an absolute http(s) URL: {reason}")]
    InvalidUrl {
        /// Offending field.
        field: &'static str,
        /// Parser explanation.
        reason: String,
    },
    /// A timestamp did not parse as RFC3339.
    #[error("{field} must be an RFC3339 timestamp, got `{value}`")]
    InvalidTimestamp {
        /// Offending field.
        field: &'static str,
        /// Submitted value.
        value: String,
    },
    /// The declared project differs from the caller's project.
    #[error("project `{declared}` does not match the project of the credential")]
    ProjectMismatch {
        /// Declared identifier.
        declared: String,
    },
}

impl MetadataValidationError {
    /// Name of the field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field }
            | Self::Empty { field }
            | Self::NotPositive { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::InvalidUrl { field, .. }
            | Self::InvalidTimestamp { field, .. } => field,
            Self::ProjectMismatch { .. } => "project",
        }
    }
}

/// Validated, normalised run metadata.
///
/// Strings are trimmed, `job_variant` defaults to the empty string and both
/// timestamps are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionMetadata {
    project: String,
    repository: String,
    workflow_name: String,
    workflow_ref: String,
    run_id: i64,
    run_number: i64,
    run_attempt: i32,
    run_url: Url,
    commit_sha: String,
    branch: String,
    event: String,
    pr_number: Option<i64>,
    job_name: String,
    job_variant: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl RawIngestionMetadata {
    /// Validate every field, failing on the first offending one.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataValidationError`] naming the field that is missing,
    /// blank, non-positive, not a URL or not an RFC3339 timestamp.
    ///
    /// # Examples
    /// ```
    /// use flaketrack::domain::ingestion_metadata::RawIngestionMetadata;
    ///
    /// let raw: RawIngestionMetadata = serde_json::from_value(serde_json::json!({
    ///     "project": "payments",
    ///     "repository": "acme/payments",
    ///     "workflow_name": "CI",
    ///     "workflow_ref": ".github/workflows/ci.yml@refs/heads/main",
    ///     "run_id": 9001,
    ///     "run_number": 12,
    ///     "run_attempt": 1,
    ///     "run_url": "https://ci.example.com/acme/payments/runs/9001",
    ///     "commit_sha": "0123abcd",
    ///     "branch": "main",
    ///     "event": "push",
    ///     "job_name": "test",
    ///     "started_at": "2026-03-01T10:00:00Z",
    ///     "completed_at": "2026-03-01T10:05:00.250Z"
    /// })).expect("decodes");
    /// let metadata = raw.validate().expect("valid");
    /// assert_eq!(metadata.job_variant(), "");
    /// assert_eq!(metadata.run_attempt(), 1);
    /// ```
    pub fn validate(self) -> Result<IngestionMetadata, MetadataValidationError> {
        let project = required_text("project", self.project)?;
        let repository = required_text("repository", self.repository)?;
        let workflow_name = required_text("workflow_name", self.workflow_name)?;
        let workflow_ref = required_text("workflow_ref", self.workflow_ref)?;
        let run_id = positive("run_id", self.run_id)?;
        let run_number = positive("run_number", self.run_number)?;
        let run_attempt = attempt_number(self.run_attempt)?;
        let run_url = absolute_url("run_url", self.run_url)?;
        let commit_sha = required_text("commit_sha", self.commit_sha)?;
        let branch = required_text("branch", self.branch)?;
        let event = required_text("event", self.event)?;
        let pr_number = self
            .pr_number
            .map(|value| positive("pr_number", Some(value)))
            .transpose()?;
        let job_name = required_text("job_name", self.job_name)?;
        let job_variant = self
            .job_variant
            .map(|value| value.trim().to_owned())
            .unwrap_or_default();
        let started_at = timestamp("started_at", self.started_at)?;
        let completed_at = timestamp("completed_at", self.completed_at)?;

        Ok(IngestionMetadata {
            project,
            repository,
            workflow_name,
            workflow_ref,
            run_id,
            run_number,
            run_attempt,
            run_url,
            commit_sha,
            branch,
            event,
            pr_number,
            job_name,
            job_variant,
            started_at,
            completed_at,
        })
    }
}

impl IngestionMetadata {
    /// Check the declared project against the caller's resolved project.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataValidationError::ProjectMismatch`] when the declared
    /// identifier names neither the slug nor the id of `project`.
    pub fn ensure_project(&self, project: &Project) -> Result<(), MetadataValidationError> {
        if project.matches_identifier(&self.project) {
            Ok(())
        } else {
            Err(MetadataValidationError::ProjectMismatch {
                declared: self.project.clone(),
            })
        }
    }

    /// Declared project slug or id.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Repository full name.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Workflow display name.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Workflow file reference.
    pub fn workflow_ref(&self) -> &str {
        &self.workflow_ref
    }

    /// External run identifier.
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// External run number.
    pub fn run_number(&self) -> i64 {
        self.run_number
    }

    /// Attempt number, at least 1.
    pub fn run_attempt(&self) -> i32 {
        self.run_attempt
    }

    /// Link to the run.
    pub fn run_url(&self) -> &Url {
        &self.run_url
    }

    /// Commit under test.
    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    /// Branch under test.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Triggering event.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Pull request number, if any.
    pub fn pr_number(&self) -> Option<i64> {
        self.pr_number
    }

    /// Job name.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Matrix variant, empty when the job has none.
    pub fn job_variant(&self) -> &str {
        &self.job_variant
    }

    /// Attempt start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Attempt completion.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, MetadataValidationError> {
    let value = value.ok_or(MetadataValidationError::Missing { field })?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MetadataValidationError::Empty { field });
    }
    Ok(trimmed.to_owned())
}

fn positive(field: &'static str, value: Option<i64>) -> Result<i64, MetadataValidationError> {
    let value = value.ok_or(MetadataValidationError::Missing { field })?;
    if value <= 0 {
        return Err(MetadataValidationError::NotPositive { field, value });
    }
    Ok(value)
}

fn attempt_number(value: Option<i64>) -> Result<i32, MetadataValidationError> {
    let value = positive("run_attempt", value)?;
    i32::try_from(value).map_err(|_| MetadataValidationError::OutOfRange {
        field: "run_attempt",
        value,
    })
}

fn absolute_url(field: &'static str, value: Option<String>) -> Result<Url, MetadataValidationError> {
    let text = required_text(field, value)?;
    let url = Url::parse(&text).map_err(|error| MetadataValidationError::InvalidUrl {
        field,
        reason: error.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MetadataValidationError::InvalidUrl {
            field,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}

fn timestamp(
    field: &'static str,
    value: Option<String>,
) -> Result<DateTime<Utc>, MetadataValidationError> {
    let text = required_text(field, value)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| MetadataValidationError::InvalidTimestamp { field, value: text })
}
