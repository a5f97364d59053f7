//! In-memory doubles of the persistence ports.
//!
//! The store keys every table the way the PostgreSQL schema does, so the
//! idempotency rules hold: re-upserting a run, attempt, job or test case
//! returns the existing id, a `(test case, job)` result is stored once and a
//! `(test case, run)` flake event is created once.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flaketrack::domain::flake_detection::{AttemptOutcome, detect_flake, group_attempts};
use flaketrack::domain::flake_stats::FlakeStatistics;
use flaketrack::domain::ports::{
    CredentialResolver, CredentialResolverError, DetectedFlake, FlakeDetectionReport,
    FlakeDetectionRepository, FlakeDetectionRepositoryError, FlakeNotificationPayload,
    FlakeNotifier, FlakeNotifierError, IngestionBatch, IngestionRepository,
    IngestionRepositoryError, PersistedIngestion, ProjectDirectory, ProjectDirectoryError,
};
use flaketrack::domain::report_parser::TestStatus;
use flaketrack::domain::{ApiKeyCredential, Project};
use flaketrack::outbound::persistence::api_key_fingerprint;
use url::Url;
use uuid::Uuid;

type RunKey = (Uuid, String, i64);
type JobKey = (Uuid, String, String);
type TestCaseKey = (Uuid, String, String, String, String);

struct RunRow {
    id: Uuid,
    repository: String,
    workflow_name: String,
}

struct TestCaseRow {
    test_identifier: String,
    job_name: String,
    job_variant: String,
}

struct ResultRow {
    status: TestStatus,
    failure_message: Option<String>,
}

#[derive(Default)]
struct Store {
    projects: Vec<Project>,
    api_keys: HashMap<String, (Uuid, Uuid)>,
    ingestions: u64,
    runs: HashMap<RunKey, RunRow>,
    attempts: HashMap<(Uuid, i32), Uuid>,
    jobs: HashMap<JobKey, Uuid>,
    job_attempts: HashMap<Uuid, (Uuid, i32)>,
    test_cases: HashMap<TestCaseKey, Uuid>,
    test_case_rows: HashMap<Uuid, TestCaseRow>,
    results: HashMap<(Uuid, Uuid), ResultRow>,
    events: HashSet<(Uuid, Uuid)>,
    stats: HashMap<Uuid, FlakeStatistics>,
}

impl Store {
    fn upsert_test_case(&mut self, key: TestCaseKey) -> Uuid {
        if let Some(id) = self.test_cases.get(&key) {
            return *id;
        }
        let id = Uuid::new_v4();
        let (_, _, job_name, job_variant, test_identifier) = key.clone();
        self.test_case_rows.insert(
            id,
            TestCaseRow {
                test_identifier,
                job_name,
                job_variant,
            },
        );
        self.test_cases.insert(key, id);
        id
    }

    fn run_of_job(&self, job_id: Uuid) -> Option<(Uuid, i32)> {
        self.job_attempts.get(&job_id).copied()
    }

    fn statistics_for(&self, test_case_id: Uuid) -> FlakeStatistics {
        let runs: HashSet<Uuid> = self
            .results
            .keys()
            .filter(|(case, _)| *case == test_case_id)
            .filter_map(|(_, job)| self.run_of_job(*job).map(|(run, _)| run))
            .collect();
        let mixed = self
            .events
            .iter()
            .filter(|(case, _)| *case == test_case_id)
            .count();
        FlakeStatistics::from_counts(count(runs.len()), count(mixed))
    }
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Shared in-memory store implementing every driven persistence port.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Store>,
}

impl InMemoryStore {
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a project and one API key for it.
    pub fn with_project(self, project: Project, api_key: &str) -> Self {
        {
            let mut store = self.lock();
            store
                .api_keys
                .insert(api_key_fingerprint(api_key), (Uuid::new_v4(), project.id));
            store.projects.push(project);
        }
        self
    }

    /// Number of stored test results.
    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }

    /// Number of stored flake events.
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Number of ingestion receipts.
    pub fn ingestion_count(&self) -> u64 {
        self.lock().ingestions
    }

    /// Statistics for the test case with `test_identifier`, if any.
    pub fn statistics(&self, test_identifier: &str) -> Option<FlakeStatistics> {
        let store = self.lock();
        let id = store
            .test_case_rows
            .iter()
            .find(|(_, row)| row.test_identifier == test_identifier)
            .map(|(id, _)| *id)?;
        store.stats.get(&id).copied()
    }
}

#[async_trait]
impl IngestionRepository for InMemoryStore {
    async fn persist_ingestion(
        &self,
        batch: &IngestionBatch,
    ) -> Result<PersistedIngestion, IngestionRepositoryError> {
        let mut store = self.lock();
        let metadata = &batch.metadata;
        store.ingestions += 1;

        let run_key = (
            batch.project_id,
            metadata.repository().to_owned(),
            metadata.run_id(),
        );
        let ci_run_id = store
            .runs
            .entry(run_key)
            .or_insert_with(|| RunRow {
                id: Uuid::new_v4(),
                repository: metadata.repository().to_owned(),
                workflow_name: metadata.workflow_name().to_owned(),
            })
            .id;
        let attempt_id = *store
            .attempts
            .entry((ci_run_id, metadata.run_attempt()))
            .or_insert_with(Uuid::new_v4);
        let job_id = *store
            .jobs
            .entry((
                attempt_id,
                metadata.job_name().to_owned(),
                metadata.job_variant().to_owned(),
            ))
            .or_insert_with(Uuid::new_v4);
        store
            .job_attempts
            .insert(job_id, (ci_run_id, metadata.run_attempt()));

        let mut inserted = 0;
        for result in &batch.results {
            let test_case_id = store.upsert_test_case((
                batch.project_id,
                metadata.repository().to_owned(),
                metadata.job_name().to_owned(),
                metadata.job_variant().to_owned(),
                result.test_identifier.clone(),
            ));
            if let std::collections::hash_map::Entry::Vacant(slot) =
                store.results.entry((test_case_id, job_id))
            {
                slot.insert(ResultRow {
                    status: result.status,
                    failure_message: result.failure_message.clone(),
                });
                inserted += 1;
            }
        }

        Ok(PersistedIngestion {
            ingestion_id: Uuid::new_v4(),
            ci_run_id,
            files_stored: batch.files.len() as u64,
            test_results_inserted: inserted,
        })
    }
}

#[async_trait]
impl FlakeDetectionRepository for InMemoryStore {
    async fn record_flakes(
        &self,
        project_id: Uuid,
        ci_run_id: Uuid,
        _detected_at: DateTime<Utc>,
    ) -> Result<FlakeDetectionReport, FlakeDetectionRepositoryError> {
        let mut store = self.lock();
        let (repository, workflow_name) = store
            .runs
            .iter()
            .find(|((owner, _, _), run)| *owner == project_id && run.id == ci_run_id)
            .map(|(_, run)| run)
            .map(|run| (run.repository.clone(), run.workflow_name.clone()))
            .ok_or_else(|| FlakeDetectionRepositoryError::run_not_found(ci_run_id))?;

        let outcomes: Vec<_> = store
            .results
            .iter()
            .filter_map(|((case, job), row)| {
                let (run, attempt) = store.run_of_job(*job)?;
                (run == ci_run_id).then(|| {
                    (
                        *case,
                        AttemptOutcome::new(attempt, row.status, row.failure_message.clone()),
                    )
                })
            })
            .collect();

        let mut flakes = Vec::new();
        for (test_case_id, attempts) in group_attempts(outcomes) {
            let Some(detection) = detect_flake(&attempts) else {
                continue;
            };
            let newly_recorded = store.events.insert((test_case_id, ci_run_id));
            let statistics = store.statistics_for(test_case_id);
            store.stats.insert(test_case_id, statistics);
            let Some(row) = store.test_case_rows.get(&test_case_id) else {
                continue;
            };
            flakes.push(DetectedFlake {
                test_case_id,
                test_identifier: row.test_identifier.clone(),
                job_name: row.job_name.clone(),
                job_variant: row.job_variant.clone(),
                failed_attempt: detection.failed_attempt,
                passed_attempt: detection.passed_attempt,
                failure_message: detection.failure_message,
                newly_recorded,
                statistics,
            });
        }

        Ok(FlakeDetectionReport {
            ci_run_id,
            repository,
            workflow_name,
            flakes,
        })
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryStore {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Project>, ProjectDirectoryError> {
        Ok(self
            .lock()
            .projects
            .iter()
            .find(|project| project.matches_identifier(identifier))
            .cloned())
    }
}

#[async_trait]
impl CredentialResolver for InMemoryStore {
    async fn resolve(
        &self,
        presented_key: &str,
    ) -> Result<Option<ApiKeyCredential>, CredentialResolverError> {
        let store = self.lock();
        let Some((api_key_id, project_id)) =
            store.api_keys.get(&api_key_fingerprint(presented_key)).copied()
        else {
            return Ok(None);
        };
        Ok(store
            .projects
            .iter()
            .find(|project| project.id == project_id)
            .cloned()
            .map(|project| ApiKeyCredential {
                api_key_id,
                project,
            }))
    }
}

/// Notifier recording every delivered payload.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(Url, FlakeNotificationPayload)>>,
}

impl RecordingNotifier {
    /// Payloads delivered so far.
    pub fn delivered(&self) -> Vec<(Url, FlakeNotificationPayload)> {
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl FlakeNotifier for RecordingNotifier {
    async fn send(
        &self,
        destination: &Url,
        payload: &FlakeNotificationPayload,
    ) -> Result<(), FlakeNotifierError> {
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((destination.clone(), payload.clone()));
        Ok(())
    }
}
