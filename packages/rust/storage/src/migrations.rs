//! SQL migration definitions for the neuraltheft database.
//!
//! Migrations are applied in order on database open. Every statement is
//! idempotent, so re-running a migration against an existing file (including
//! one written before version tracking existed) is harmless.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: players keyed by account uuid",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per resolved account; re-ingestion is a no-op
CREATE TABLE IF NOT EXISTS players (
    "uuid"   TEXT NOT NULL PRIMARY KEY,
    "name"   TEXT,
    "tag"    TEXT,
    "twitch" TEXT
);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
