//! Suggestion lifecycle: detect, list, accept, dismiss.
//!
//! Resolution is a compare-and-set on the status column, taken before any
//! patch is applied, so a second resolver fails with `Conflict` and the
//! patch is applied at most once.

use rusqlite::Connection;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use hl_core::suggestion::{
    PATCH_DIFFICULTY_LEVEL, PATCH_DOMAIN_CODE, PATCH_EXPERTISE_LEVEL, evaluate, primary_domain,
};
use hl_core::{
    ChangeType, DetectionPolicy, DomainCatalog, LevelCurve, LevelSuggestion, MAX_LEVEL,
    NewHistoryEntry, SuggestionStatus,
};

use crate::error::{Result, StoreError};
use crate::history::LevelHistoryLedger;
use crate::ledger::ExpertiseLedger;
use crate::overall::recompute_overall;
use crate::store::Store;

pub struct SuggestionWorkflow<'a> {
    store: &'a Store,
    policy: DetectionPolicy,
    catalog: &'a DomainCatalog,
    expertise_curve: &'a dyn LevelCurve,
    overall_curve: &'a dyn LevelCurve,
}

impl<'a> SuggestionWorkflow<'a> {
    pub fn new(
        store: &'a Store,
        policy: DetectionPolicy,
        catalog: &'a DomainCatalog,
        expertise_curve: &'a dyn LevelCurve,
        overall_curve: &'a dyn LevelCurve,
    ) -> Self {
        Self {
            store,
            policy,
            catalog,
            expertise_curve,
            overall_curve,
        }
    }

    /// Evaluate every registered habit of `owner` and store a pending
    /// suggestion for each divergent one. Habits that already have a pending
    /// suggestion are skipped. Returns only the newly created suggestions.
    pub fn detect(&self, conn: &Connection, owner: &str, now: i64) -> Result<Vec<LevelSuggestion>> {
        self.store.require_owner_on(conn, owner)?;
        let habits = self.store.list_habits_on(conn, owner)?;
        let mut created = Vec::new();

        for habit in &habits {
            if self
                .store
                .has_pending_suggestion_on(conn, owner, &habit.habit_id)?
            {
                continue;
            }
            let expertise_level = self
                .store
                .get_expertise_on(conn, owner, primary_domain(habit))?
                .map(|r| r.expertise_level)
                .unwrap_or(0);

            let Some(draft) = evaluate(habit, expertise_level, &self.policy) else {
                continue;
            };
            let suggestion = LevelSuggestion {
                id: Uuid::new_v4(),
                owner: owner.to_string(),
                habit_id: draft.habit_id,
                suggestion_type: draft.suggestion_type,
                current_level: draft.current_level,
                target_level: draft.target_level,
                proposed_changes: draft.proposed_changes,
                reason: draft.reason,
                detected_at: now,
                status: SuggestionStatus::Pending,
                resolved_at: None,
            };
            self.store.insert_suggestion_on(conn, &suggestion)?;
            tracing::info!(
                owner,
                habit = %suggestion.habit_id,
                kind = %suggestion.suggestion_type,
                from = suggestion.current_level,
                to = suggestion.target_level,
                "suggestion created"
            );
            created.push(suggestion);
        }
        Ok(created)
    }

    pub fn list(
        &self,
        conn: &Connection,
        owner: &str,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<LevelSuggestion>> {
        self.store.require_owner_on(conn, owner)?;
        self.store.list_suggestions_on(conn, owner, status)
    }

    /// Accept a pending suggestion and apply its patch: the habit's
    /// difficulty and the expertise level of the named domain. The overall
    /// record is rebuilt afterwards.
    pub fn accept(&self, conn: &Connection, id: Uuid, now: i64) -> Result<LevelSuggestion> {
        let suggestion = self.load(conn, id)?;
        self.store
            .resolve_suggestion_on(conn, id, SuggestionStatus::Accepted, now)?;

        let patch = Patch::parse(&suggestion.proposed_changes)?;
        let owner = suggestion.owner.as_str();

        if let Some(difficulty) = patch.difficulty_level {
            self.store
                .set_habit_difficulty_on(conn, owner, &suggestion.habit_id, difficulty, now)?;
        }

        if let Some(level) = patch.expertise_level {
            let domain_code = patch.domain_code.as_deref().ok_or_else(|| {
                StoreError::InvalidData(format!("suggestion {id}: expertise change without domain"))
            })?;
            let ledger = ExpertiseLedger::new(self.store, self.expertise_curve);
            let update = ledger.set_level(
                conn,
                owner,
                domain_code,
                &self.catalog.name_for(domain_code),
                level,
                now,
            )?;
            if update.level_changed() {
                LevelHistoryLedger::record(
                    conn,
                    &NewHistoryEntry {
                        owner: owner.to_string(),
                        change_type: ChangeType::Expertise,
                        domain_code: Some(domain_code.to_string()),
                        old_level: update.before.expertise_level as f64,
                        new_level: update.after.expertise_level as f64,
                        change_reason: format!(
                            "suggestion {id} accepted ({}): {}",
                            suggestion.suggestion_type, suggestion.reason
                        ),
                        metrics_snapshot: json!({
                            "suggestion_id": id.to_string(),
                            "habit_id": suggestion.habit_id,
                            "proposed_changes": Value::Object(suggestion.proposed_changes.clone()),
                            "experience_points_before": update.before.experience_points,
                            "experience_points_after": update.after.experience_points,
                        }),
                    },
                    now,
                )?;
            }
        }

        recompute_overall(
            self.store,
            conn,
            owner,
            self.overall_curve,
            "suggestion accepted",
            now,
        )?;
        tracing::info!(%id, owner, habit = %suggestion.habit_id, "suggestion accepted");

        Ok(LevelSuggestion {
            status: SuggestionStatus::Accepted,
            resolved_at: Some(now),
            ..suggestion
        })
    }

    /// Dismiss a pending suggestion. Only its status changes.
    pub fn dismiss(&self, conn: &Connection, id: Uuid, now: i64) -> Result<LevelSuggestion> {
        let suggestion = self.load(conn, id)?;
        self.store
            .resolve_suggestion_on(conn, id, SuggestionStatus::Dismissed, now)?;
        tracing::info!(%id, owner = %suggestion.owner, "suggestion dismissed");
        Ok(LevelSuggestion {
            status: SuggestionStatus::Dismissed,
            resolved_at: Some(now),
            ..suggestion
        })
    }

    fn load(&self, conn: &Connection, id: Uuid) -> Result<LevelSuggestion> {
        self.store
            .get_suggestion_on(conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("suggestion {id}")))
    }
}

/// The recognised keys of a proposed-changes patch. Unknown keys are
/// carried in the stored suggestion but not applied.
#[derive(Debug, Default, PartialEq)]
struct Patch {
    difficulty_level: Option<u8>,
    domain_code: Option<String>,
    expertise_level: Option<u8>,
}

impl Patch {
    fn parse(changes: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            difficulty_level: level_field(changes, PATCH_DIFFICULTY_LEVEL)?,
            domain_code: match changes.get(PATCH_DOMAIN_CODE) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => {
                    return Err(StoreError::InvalidData(format!(
                        "{PATCH_DOMAIN_CODE} must be a string, got {other}"
                    )));
                }
            },
            expertise_level: level_field(changes, PATCH_EXPERTISE_LEVEL)?,
        })
    }
}

fn level_field(changes: &Map<String, Value>, key: &str) -> Result<Option<u8>> {
    match changes.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n.min(MAX_LEVEL as u64) as u8))
            .ok_or_else(|| StoreError::InvalidData(format!("{key} must be a level, got {v}"))),
    }
}
