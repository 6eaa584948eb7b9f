use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Errors are non-fatal: in-memory DBs and fresh files legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habits (
            owner               TEXT NOT NULL,
            habit_id            TEXT NOT NULL,
            name                TEXT NOT NULL DEFAULT '',
            domain_codes        TEXT NOT NULL DEFAULT '[]',
            difficulty_level    INTEGER CHECK (difficulty_level BETWEEN 0 AND 199),
            sessions_per_week   INTEGER NOT NULL DEFAULT 0,
            minutes_per_session INTEGER NOT NULL DEFAULT 0,
            completion_rate_30d REAL NOT NULL DEFAULT 0,
            updated_at          INTEGER NOT NULL,
            PRIMARY KEY (owner, habit_id)
        );

        CREATE TABLE IF NOT EXISTS expertise (
            owner                 TEXT NOT NULL,
            domain_code           TEXT NOT NULL,
            domain_name           TEXT NOT NULL,
            experience_points     REAL NOT NULL DEFAULT 0 CHECK (experience_points >= 0),
            expertise_level       INTEGER NOT NULL DEFAULT 0 CHECK (expertise_level BETWEEN 0 AND 199),
            expertise_tier        TEXT NOT NULL DEFAULT 'beginner',
            habit_count           INTEGER NOT NULL DEFAULT 0,
            task_count            INTEGER NOT NULL DEFAULT 0,
            last_activity_at      INTEGER NOT NULL,
            level_at_last_activity INTEGER NOT NULL DEFAULT 0
                CHECK (level_at_last_activity BETWEEN 0 AND 199),
            last_decay_applied_at INTEGER,
            version               INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (owner, domain_code)
        );

        CREATE TABLE IF NOT EXISTS overall_levels (
            owner                   TEXT PRIMARY KEY,
            overall_level           INTEGER NOT NULL CHECK (overall_level BETWEEN 0 AND 199),
            overall_tier            TEXT NOT NULL,
            total_experience_points REAL NOT NULL,
            habit_continuity_power  REAL NOT NULL,
            resilience_score        REAL NOT NULL,
            last_calculated_at      INTEGER NOT NULL,
            version                 INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS behavior_windows (
            owner       TEXT PRIMARY KEY,
            window_json TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS level_history (
            id               TEXT PRIMARY KEY,
            owner            TEXT NOT NULL,
            change_type      TEXT NOT NULL
                CHECK (change_type IN ('overall', 'expertise', 'continuity', 'resilience')),
            domain_code      TEXT,
            old_level        REAL NOT NULL,
            new_level        REAL NOT NULL,
            change_reason    TEXT NOT NULL,
            metrics_snapshot TEXT NOT NULL DEFAULT '{}',
            created_at       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_owner_time
            ON level_history(owner, created_at);
        CREATE INDEX IF NOT EXISTS idx_history_owner_domain
            ON level_history(owner, domain_code, created_at);

        CREATE TRIGGER IF NOT EXISTS level_history_no_update
            BEFORE UPDATE ON level_history
            BEGIN SELECT RAISE(ABORT, 'level_history is append-only'); END;
        CREATE TRIGGER IF NOT EXISTS level_history_no_delete
            BEFORE DELETE ON level_history
            BEGIN SELECT RAISE(ABORT, 'level_history is append-only'); END;

        CREATE TABLE IF NOT EXISTS level_suggestions (
            id               TEXT PRIMARY KEY,
            owner            TEXT NOT NULL,
            habit_id         TEXT NOT NULL,
            suggestion_type  TEXT NOT NULL CHECK (suggestion_type IN ('level_up', 'level_down')),
            current_level    INTEGER NOT NULL,
            target_level     INTEGER NOT NULL,
            proposed_changes TEXT NOT NULL,
            reason           TEXT NOT NULL,
            detected_at      INTEGER NOT NULL,
            status           TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'dismissed')),
            resolved_at      INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_suggestions_owner
            ON level_suggestions(owner, status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_one_pending_per_habit
            ON level_suggestions(owner, habit_id) WHERE status = 'pending';
        ",
    )?;

    match get_schema_version(conn)? {
        Some(found) if found > SCHEMA_VERSION => {
            return Err(StoreError::InvalidData(format!(
                "database schema version {found} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        Some(found) if found < 2 => migrate_decay_base(conn)?,
        _ => {}
    }

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|v| {
            v.parse::<i64>().map_err(|_| {
                StoreError::InvalidData(format!("schema_version {v:?} is not an integer"))
            })
        })
        .transpose()
}

/// Version 1 stored no decay base. Existing records take their current level.
fn migrate_decay_base(conn: &Connection) -> Result<()> {
    let has_column: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM pragma_table_info('expertise')
                        WHERE name = 'level_at_last_activity')",
        [],
        |row| row.get(0),
    )?;
    if !has_column {
        conn.execute_batch(
            "ALTER TABLE expertise ADD COLUMN level_at_last_activity INTEGER NOT NULL DEFAULT 0;
             UPDATE expertise SET level_at_last_activity = expertise_level;",
        )?;
        tracing::info!("migrated expertise to schema version 2");
    }
    Ok(())
}
