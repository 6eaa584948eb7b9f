use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use uuid::Uuid;

use hl_core::{
    BehaviorWindow, ExpertiseRecord, ExpertiseSort, HabitProfile, LevelSuggestion,
    OverallLevelRecord, SuggestionStatus, Tier,
};

use crate::error::{Result, StoreError};
use crate::schema;

pub struct Store {
    conn: Connection,
}

const EXPERTISE_COLUMNS: &str = "owner, domain_code, domain_name, experience_points, expertise_level, \
     habit_count, task_count, last_activity_at, level_at_last_activity, last_decay_applied_at, version";

const OVERALL_COLUMNS: &str = "owner, overall_level, total_experience_points, habit_continuity_power, \
     resilience_score, last_calculated_at, version";

const HABIT_COLUMNS: &str = "owner, habit_id, name, domain_codes, difficulty_level, sessions_per_week, \
     minutes_per_session, completion_rate_30d";

const SUGGESTION_COLUMNS: &str = "id, owner, habit_id, suggestion_type, current_level, target_level, \
     proposed_changes, reason, detected_at, status, resolved_at";

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction. IMMEDIATE takes the write lock up front so
    /// two writers never interleave a read-modify-write on the same file.
    pub fn begin_write(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // --- Owners ---

    /// An owner is known once anything has been recorded for them.
    pub fn owner_exists_on(&self, conn: &Connection, owner: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM overall_levels WHERE owner = ?1)
                 OR EXISTS (SELECT 1 FROM expertise WHERE owner = ?1)
                 OR EXISTS (SELECT 1 FROM habits WHERE owner = ?1)",
            [owner],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn require_owner_on(&self, conn: &Connection, owner: &str) -> Result<()> {
        if self.owner_exists_on(conn, owner)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("owner {owner:?}")))
        }
    }

    // --- Expertise ---

    pub fn get_expertise_on(
        &self,
        conn: &Connection,
        owner: &str,
        domain_code: &str,
    ) -> Result<Option<ExpertiseRecord>> {
        let sql = format!(
            "SELECT {EXPERTISE_COLUMNS} FROM expertise WHERE owner = ?1 AND domain_code = ?2"
        );
        let record = conn
            .query_row(&sql, params![owner, domain_code], expertise_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn list_expertise_on(
        &self,
        conn: &Connection,
        owner: &str,
        sort: ExpertiseSort,
        limit: Option<usize>,
    ) -> Result<Vec<ExpertiseRecord>> {
        let order = match sort {
            ExpertiseSort::Level => "expertise_level DESC, experience_points DESC, domain_code ASC",
            ExpertiseSort::Recent => "last_activity_at DESC, domain_code ASC",
        };
        let sql = format!(
            "SELECT {EXPERTISE_COLUMNS} FROM expertise WHERE owner = ?1 ORDER BY {order} LIMIT ?2"
        );
        let limit = limit.map(|n| n.min(i64::MAX as usize) as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![owner, limit], expertise_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every (owner, domain_code) key, for batch passes.
    pub fn expertise_keys_on(&self, conn: &Connection) -> Result<Vec<(String, String)>> {
        let mut stmt =
            conn.prepare("SELECT owner, domain_code FROM expertise ORDER BY owner, domain_code")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Conditional write. A record with version 0 is inserted; otherwise the
    /// row is updated only if its stored version still matches. Returns the
    /// record with its new version.
    pub fn save_expertise_on(
        &self,
        conn: &Connection,
        record: &ExpertiseRecord,
    ) -> Result<ExpertiseRecord> {
        let key = format!("expertise ({}, {:?})", record.owner, record.domain_code);

        if record.is_new() {
            conn.execute(
                "INSERT INTO expertise (owner, domain_code, domain_name, experience_points,
                     expertise_level, expertise_tier, habit_count, task_count,
                     last_activity_at, level_at_last_activity, last_decay_applied_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)",
                params![
                    record.owner,
                    record.domain_code,
                    record.domain_name,
                    record.experience_points,
                    record.expertise_level,
                    record.expertise_tier.as_str(),
                    record.habit_count,
                    record.task_count,
                    record.last_activity_at,
                    record.level_at_last_activity,
                    record.last_decay_applied_at,
                ],
            )
            .map_err(|e| conflict_on_constraint(e, &key))?;
        } else {
            let rows = conn.execute(
                "UPDATE expertise SET domain_name = ?1, experience_points = ?2,
                     expertise_level = ?3, expertise_tier = ?4, habit_count = ?5,
                     task_count = ?6, last_activity_at = ?7, level_at_last_activity = ?8,
                     last_decay_applied_at = ?9, version = version + 1
                 WHERE owner = ?10 AND domain_code = ?11 AND version = ?12",
                params![
                    record.domain_name,
                    record.experience_points,
                    record.expertise_level,
                    record.expertise_tier.as_str(),
                    record.habit_count,
                    record.task_count,
                    record.last_activity_at,
                    record.level_at_last_activity,
                    record.last_decay_applied_at,
                    record.owner,
                    record.domain_code,
                    record.version,
                ],
            )?;
            if rows == 0 {
                return Err(StoreError::Conflict(format!(
                    "{key} changed since version {}",
                    record.version
                )));
            }
        }

        let mut saved = record.clone();
        saved.version += 1;
        Ok(saved)
    }

    // --- Overall ---

    pub fn get_overall_on(&self, conn: &Connection, owner: &str) -> Result<Option<OverallLevelRecord>> {
        let sql = format!("SELECT {OVERALL_COLUMNS} FROM overall_levels WHERE owner = ?1");
        let record = conn.query_row(&sql, [owner], overall_from_row).optional()?;
        Ok(record)
    }

    pub fn save_overall_on(
        &self,
        conn: &Connection,
        record: &OverallLevelRecord,
    ) -> Result<OverallLevelRecord> {
        let key = format!("overall level ({})", record.owner);

        if record.version == 0 {
            conn.execute(
                "INSERT INTO overall_levels (owner, overall_level, overall_tier,
                     total_experience_points, habit_continuity_power, resilience_score,
                     last_calculated_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
                params![
                    record.owner,
                    record.overall_level,
                    record.overall_tier.as_str(),
                    record.total_experience_points,
                    record.habit_continuity_power,
                    record.resilience_score,
                    record.last_calculated_at,
                ],
            )
            .map_err(|e| conflict_on_constraint(e, &key))?;
        } else {
            let rows = conn.execute(
                "UPDATE overall_levels SET overall_level = ?1, overall_tier = ?2,
                     total_experience_points = ?3, habit_continuity_power = ?4,
                     resilience_score = ?5, last_calculated_at = ?6, version = version + 1
                 WHERE owner = ?7 AND version = ?8",
                params![
                    record.overall_level,
                    record.overall_tier.as_str(),
                    record.total_experience_points,
                    record.habit_continuity_power,
                    record.resilience_score,
                    record.last_calculated_at,
                    record.owner,
                    record.version,
                ],
            )?;
            if rows == 0 {
                return Err(StoreError::Conflict(format!(
                    "{key} changed since version {}",
                    record.version
                )));
            }
        }

        let mut saved = record.clone();
        saved.version += 1;
        Ok(saved)
    }

    // --- Behavior windows ---

    pub fn get_behavior_window_on(&self, conn: &Connection, owner: &str) -> Result<Option<BehaviorWindow>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT window_json FROM behavior_windows WHERE owner = ?1",
                [owner],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    /// Replace the owner's current window. The previous window is not kept.
    pub fn save_behavior_window_on(
        &self,
        conn: &Connection,
        owner: &str,
        window: &BehaviorWindow,
        now: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO behavior_windows (owner, window_json, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![owner, serde_json::to_string(window)?, now],
        )?;
        Ok(())
    }

    // --- Habits ---

    pub fn upsert_habit_on(&self, conn: &Connection, habit: &HabitProfile, now: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO habits (owner, habit_id, name, domain_codes, difficulty_level,
                 sessions_per_week, minutes_per_session, completion_rate_30d, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (owner, habit_id) DO UPDATE SET
                 name = excluded.name,
                 domain_codes = excluded.domain_codes,
                 difficulty_level = excluded.difficulty_level,
                 sessions_per_week = excluded.sessions_per_week,
                 minutes_per_session = excluded.minutes_per_session,
                 completion_rate_30d = excluded.completion_rate_30d,
                 updated_at = excluded.updated_at",
            params![
                habit.owner,
                habit.habit_id,
                habit.name,
                serde_json::to_string(&habit.domain_codes)?,
                habit.difficulty_level,
                habit.sessions_per_week,
                habit.minutes_per_session,
                habit.completion_rate_30d,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn set_habit_difficulty_on(
        &self,
        conn: &Connection,
        owner: &str,
        habit_id: &str,
        difficulty_level: u8,
        now: i64,
    ) -> Result<()> {
        let rows = conn.execute(
            "UPDATE habits SET difficulty_level = ?1, updated_at = ?2
             WHERE owner = ?3 AND habit_id = ?4",
            params![difficulty_level, now, owner, habit_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("habit {habit_id:?} of {owner:?}")));
        }
        Ok(())
    }

    pub fn get_habit_on(&self, conn: &Connection, owner: &str, habit_id: &str) -> Result<Option<HabitProfile>> {
        let sql = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE owner = ?1 AND habit_id = ?2");
        let raw = conn
            .query_row(&sql, params![owner, habit_id], raw_habit_from_row)
            .optional()?;
        raw.map(RawHabit::into_profile).transpose()
    }

    pub fn list_habits_on(&self, conn: &Connection, owner: &str) -> Result<Vec<HabitProfile>> {
        let sql = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE owner = ?1 ORDER BY habit_id");
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map([owner], raw_habit_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawHabit::into_profile).collect()
    }

    // --- Suggestions ---

    pub fn insert_suggestion_on(&self, conn: &Connection, s: &LevelSuggestion) -> Result<()> {
        conn.execute(
            "INSERT INTO level_suggestions (id, owner, habit_id, suggestion_type, current_level,
                 target_level, proposed_changes, reason, detected_at, status, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                s.id.to_string(),
                s.owner,
                s.habit_id,
                s.suggestion_type.as_str(),
                s.current_level,
                s.target_level,
                serde_json::to_string(&s.proposed_changes)?,
                s.reason,
                s.detected_at,
                s.status.as_str(),
                s.resolved_at,
            ],
        )
        .map_err(|e| conflict_on_constraint(e, &format!("pending suggestion for habit {:?}", s.habit_id)))?;
        Ok(())
    }

    pub fn get_suggestion_on(&self, conn: &Connection, id: Uuid) -> Result<Option<LevelSuggestion>> {
        let sql = format!("SELECT {SUGGESTION_COLUMNS} FROM level_suggestions WHERE id = ?1");
        let raw = conn
            .query_row(&sql, [id.to_string()], raw_suggestion_from_row)
            .optional()?;
        raw.map(RawSuggestion::into_suggestion).transpose()
    }

    pub fn list_suggestions_on(
        &self,
        conn: &Connection,
        owner: &str,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<LevelSuggestion>> {
        let sql = format!(
            "SELECT {SUGGESTION_COLUMNS} FROM level_suggestions
             WHERE owner = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY detected_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![owner, status.map(|s| s.as_str())], raw_suggestion_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawSuggestion::into_suggestion).collect()
    }

    pub fn has_pending_suggestion_on(&self, conn: &Connection, owner: &str, habit_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM level_suggestions
                 WHERE owner = ?1 AND habit_id = ?2 AND status = 'pending')",
            params![owner, habit_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Compare-and-set a suggestion from pending to a terminal status.
    pub fn resolve_suggestion_on(
        &self,
        conn: &Connection,
        id: Uuid,
        to: SuggestionStatus,
        now: i64,
    ) -> Result<()> {
        let rows = conn.execute(
            "UPDATE level_suggestions SET status = ?1, resolved_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![to.as_str(), now, id.to_string()],
        )?;
        if rows == 1 {
            return Ok(());
        }
        match self.get_suggestion_on(conn, id)? {
            Some(existing) => Err(StoreError::AlreadyResolved {
                id,
                status: existing.status.to_string(),
            }),
            None => Err(StoreError::NotFound(format!("suggestion {id}"))),
        }
    }
}

fn conflict_on_constraint(e: rusqlite::Error, what: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            StoreError::Conflict(format!("{what} already exists"))
        }
        _ => StoreError::Sqlite(e),
    }
}

fn expertise_from_row(row: &Row<'_>) -> rusqlite::Result<ExpertiseRecord> {
    let level: u8 = row.get(4)?;
    Ok(ExpertiseRecord {
        owner: row.get(0)?,
        domain_code: row.get(1)?,
        domain_name: row.get(2)?,
        experience_points: row.get(3)?,
        expertise_level: level,
        expertise_tier: Tier::from_level(level),
        habit_count: row.get(5)?,
        task_count: row.get(6)?,
        last_activity_at: row.get(7)?,
        level_at_last_activity: row.get(8)?,
        last_decay_applied_at: row.get(9)?,
        version: row.get(10)?,
    })
}

fn overall_from_row(row: &Row<'_>) -> rusqlite::Result<OverallLevelRecord> {
    let level: u8 = row.get(1)?;
    Ok(OverallLevelRecord {
        owner: row.get(0)?,
        overall_level: level,
        overall_tier: Tier::from_level(level),
        total_experience_points: row.get(2)?,
        habit_continuity_power: row.get(3)?,
        resilience_score: row.get(4)?,
        last_calculated_at: row.get(5)?,
        version: row.get(6)?,
    })
}

struct RawHabit {
    owner: String,
    habit_id: String,
    name: String,
    domain_codes: String,
    difficulty_level: Option<u8>,
    sessions_per_week: u32,
    minutes_per_session: u32,
    completion_rate_30d: f64,
}

fn raw_habit_from_row(row: &Row<'_>) -> rusqlite::Result<RawHabit> {
    Ok(RawHabit {
        owner: row.get(0)?,
        habit_id: row.get(1)?,
        name: row.get(2)?,
        domain_codes: row.get(3)?,
        difficulty_level: row.get(4)?,
        sessions_per_week: row.get(5)?,
        minutes_per_session: row.get(6)?,
        completion_rate_30d: row.get(7)?,
    })
}

impl RawHabit {
    fn into_profile(self) -> Result<HabitProfile> {
        Ok(HabitProfile {
            owner: self.owner,
            habit_id: self.habit_id,
            name: self.name,
            domain_codes: serde_json::from_str(&self.domain_codes)?,
            difficulty_level: self.difficulty_level,
            sessions_per_week: self.sessions_per_week,
            minutes_per_session: self.minutes_per_session,
            completion_rate_30d: self.completion_rate_30d,
        })
    }
}

struct RawSuggestion {
    id: String,
    owner: String,
    habit_id: String,
    suggestion_type: String,
    current_level: u8,
    target_level: u8,
    proposed_changes: String,
    reason: String,
    detected_at: i64,
    status: String,
    resolved_at: Option<i64>,
}

fn raw_suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<RawSuggestion> {
    Ok(RawSuggestion {
        id: row.get(0)?,
        owner: row.get(1)?,
        habit_id: row.get(2)?,
        suggestion_type: row.get(3)?,
        current_level: row.get(4)?,
        target_level: row.get(5)?,
        proposed_changes: row.get(6)?,
        reason: row.get(7)?,
        detected_at: row.get(8)?,
        status: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

impl RawSuggestion {
    fn into_suggestion(self) -> Result<LevelSuggestion> {
        let invalid = |what: &str, value: &str| {
            StoreError::InvalidData(format!("suggestion {}: bad {what} {value:?}", self.id))
        };
        Ok(LevelSuggestion {
            id: parse_uuid(&self.id)?,
            suggestion_type: self
                .suggestion_type
                .parse()
                .map_err(|_| invalid("type", &self.suggestion_type))?,
            status: self
                .status
                .parse()
                .map_err(|_| invalid("status", &self.status))?,
            proposed_changes: serde_json::from_str(&self.proposed_changes)?,
            owner: self.owner,
            habit_id: self.habit_id,
            current_level: self.current_level,
            target_level: self.target_level,
            reason: self.reason,
            detected_at: self.detected_at,
            resolved_at: self.resolved_at,
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}
