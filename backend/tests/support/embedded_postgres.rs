//! Database reset, migration and seeding helpers.
//!
//! Reset and seeding go through `postgres` so `DROP DATABASE` runs outside
//! any Diesel transaction. Schema setup applies the crate's embedded
//! migrations, the same set the server runs at startup.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;
use flaketrack::outbound::persistence::{MIGRATIONS, api_key_fingerprint};
use pg_embedded_setup_unpriv::TestCluster;
use postgres::{Client, NoTls};
use uuid::Uuid;

use super::format_postgres_error;

/// Drop and recreate `name` on `cluster`.
pub fn reset_database(cluster: &TestCluster, name: &str) -> Result<(), String> {
    let admin_url = cluster.connection().database_url("postgres");
    let mut client =
        Client::connect(&admin_url, NoTls).map_err(|err| format_postgres_error(&err))?;
    client
        .batch_execute(&format!("DROP DATABASE IF EXISTS \"{name}\" WITH (FORCE);"))
        .map_err(|err| format_postgres_error(&err))?;
    client
        .batch_execute(&format!("CREATE DATABASE \"{name}\";"))
        .map_err(|err| format_postgres_error(&err))
}

/// Apply every embedded migration to `url`.
pub fn migrate_schema(url: &str) -> Result<(), String> {
    let mut conn = PgConnection::establish(url).map_err(|err| format!("{err:?}"))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|err| format!("migration: {err:?}"))
}

/// Insert a project with an optional webhook and one API key.
pub fn seed_project(
    url: &str,
    slug: &str,
    webhook: Option<&str>,
    api_key: &str,
) -> Result<(Uuid, Uuid), String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let project_id = Uuid::new_v4();
    let api_key_id = Uuid::new_v4();
    client
        .execute(
            "INSERT INTO projects (id, slug, notifications_enabled, notification_webhook_url) \
             VALUES ($1, $2, $3, $4)",
            &[&project_id, &slug, &webhook.is_some(), &webhook],
        )
        .map_err(|err| format_postgres_error(&err))?;
    client
        .execute(
            "INSERT INTO api_keys (id, project_id, key_fingerprint) VALUES ($1, $2, $3)",
            &[&api_key_id, &project_id, &api_key_fingerprint(api_key)],
        )
        .map_err(|err| format_postgres_error(&err))?;
    Ok((project_id, api_key_id))
}

/// Mark the API key as revoked.
pub fn revoke_api_key(url: &str, api_key_id: Uuid) -> Result<(), String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    client
        .execute(
            "UPDATE api_keys SET revoked_at = now() WHERE id = $1",
            &[&api_key_id],
        )
        .map_err(|err| format_postgres_error(&err))?;
    Ok(())
}

/// Identifiers of every stored CI run.
pub fn ci_run_ids(url: &str) -> Result<Vec<Uuid>, String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let rows = client
        .query("SELECT id FROM ci_runs ORDER BY first_seen_at", &[])
        .map_err(|err| format_postgres_error(&err))?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Count rows in `table`.
pub fn count_rows(url: &str, table: &str) -> Result<i64, String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let row = client
        .query_one(&format!("SELECT count(*) FROM {table}"), &[])
        .map_err(|err| format_postgres_error(&err))?;
    Ok(row.get(0))
}

/// Read `(total_runs_seen, mixed_outcome_runs, flake_score)` for a test.
pub fn flake_stats(url: &str, test_identifier: &str) -> Result<(i64, i64, f64), String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let row = client
        .query_one(
            "SELECT s.total_runs_seen, s.mixed_outcome_runs, s.flake_score \
             FROM flake_stats s JOIN test_cases c ON c.id = s.test_case_id \
             WHERE c.test_identifier = $1",
            &[&test_identifier],
        )
        .map_err(|err| format_postgres_error(&err))?;
    Ok((row.get(0), row.get(1), row.get(2)))
}
