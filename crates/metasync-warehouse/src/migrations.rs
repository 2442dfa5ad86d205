use ::duckdb::{Connection, ToSql};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_cache_tables",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS cache_backup_seq START 1;
CREATE SEQUENCE IF NOT EXISTS sync_log_seq START 1;

CREATE TABLE IF NOT EXISTS cache_entries (
    domain TEXT NOT NULL,
    source TEXT NOT NULL,
    patch TEXT NOT NULL,
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    PRIMARY KEY(domain, source, patch)
);

CREATE TABLE IF NOT EXISTS cache_backups (
    id BIGINT PRIMARY KEY DEFAULT nextval('cache_backup_seq'),
    domain TEXT NOT NULL,
    source TEXT NOT NULL,
    patch TEXT NOT NULL,
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    backed_up_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_log (
    id BIGINT PRIMARY KEY DEFAULT nextval('sync_log_seq'),
    run_id TEXT NOT NULL,
    domain TEXT NOT NULL,
    source TEXT NOT NULL,
    patch TEXT NOT NULL,
    status TEXT NOT NULL,
    records BIGINT NOT NULL,
    latency_ms BIGINT NOT NULL,
    message TEXT,
    logged_at TEXT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_cache_backups_key ON cache_backups(domain, source, patch);
CREATE INDEX IF NOT EXISTS idx_cache_entries_patch ON cache_entries(patch);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let params: [&dyn ToSql; 1] = [&migration.version];
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params.as_slice(),
            )?;
        }
    }

    Ok(())
}
