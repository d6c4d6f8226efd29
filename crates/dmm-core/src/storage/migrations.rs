//! Database Migrations
//!
//! Schema migration definitions for the Index Store (§4.E).

/// Migration definitions, applied in order against `user_version`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, proposals, usage, query log",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Audit history for committed writes",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id              TEXT PRIMARY KEY,
    path            TEXT NOT NULL UNIQUE,
    title           TEXT NOT NULL,
    body            TEXT NOT NULL,
    tags            TEXT NOT NULL DEFAULT '[]',
    scope           TEXT NOT NULL,
    priority        REAL NOT NULL DEFAULT 0.5,
    confidence      TEXT NOT NULL DEFAULT 'active',
    status          TEXT NOT NULL DEFAULT 'active',
    directory       TEXT NOT NULL,
    file_hash       TEXT NOT NULL,
    token_count     INTEGER NOT NULL,
    composite_embedding BLOB,
    directory_embedding BLOB,
    indexed_at      TEXT NOT NULL,
    created         TEXT,
    last_used       TEXT,
    usage_count     INTEGER,
    supersedes      TEXT,
    related         TEXT NOT NULL DEFAULT '[]',
    expires         TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_directory ON memories(directory);
CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(scope);
CREATE INDEX IF NOT EXISTS idx_memories_status ON memories(status);
CREATE INDEX IF NOT EXISTS idx_memories_file_hash ON memories(file_hash);

CREATE TABLE IF NOT EXISTS proposals (
    proposal_id         TEXT PRIMARY KEY,
    proposal_type       TEXT NOT NULL,
    target_path         TEXT NOT NULL,
    reason              TEXT NOT NULL,
    content             TEXT,
    patch               TEXT,
    new_scope           TEXT,
    proposed_by         TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    status              TEXT NOT NULL,
    memory_id           TEXT,
    deprecation_reason  TEXT,
    source_scope        TEXT,
    reviewed_at         TEXT,
    reviewer_notes      TEXT,
    retry_count         INTEGER NOT NULL DEFAULT 0,
    committed_at        TEXT,
    commit_error        TEXT
);

CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status);
CREATE INDEX IF NOT EXISTS idx_proposals_target_path ON proposals(target_path);

CREATE TABLE IF NOT EXISTS query_log (
    query_id            TEXT PRIMARY KEY,
    query_text          TEXT NOT NULL,
    timestamp           TEXT NOT NULL,
    returned_memory_ids TEXT NOT NULL DEFAULT '[]',
    total_tokens        INTEGER NOT NULL,
    duration_ms         REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS usage_records (
    memory_id           TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    times_retrieved      INTEGER NOT NULL DEFAULT 0,
    last_retrieved_at    TEXT,
    avg_rank_position    REAL NOT NULL DEFAULT 0.0
);

CREATE TABLE IF NOT EXISTS system_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS audit_history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    proposal_id     TEXT NOT NULL,
    memory_id       TEXT,
    memory_path     TEXT NOT NULL,
    action          TEXT NOT NULL,
    committed_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_history_memory_path ON audit_history(memory_path);
"#;

/// Applies any migrations newer than the database's current `user_version`.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.pragma_update(None, "user_version", migration.version)?;
        }
    }

    Ok(())
}
