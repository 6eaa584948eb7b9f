//! Append-only audit of level and score changes.
//!
//! Entries are inserted on the caller's connection, which is always inside
//! the transaction that makes the change they describe. The schema rejects
//! UPDATE and DELETE on the table.

use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use hl_core::{ChangeType, HistoryFilter, LevelHistoryEntry, NewHistoryEntry};

use crate::error::{Result, StoreError};
use crate::store::parse_uuid;

pub struct LevelHistoryLedger;

impl LevelHistoryLedger {
    pub fn record(conn: &Connection, entry: &NewHistoryEntry, now: i64) -> Result<Uuid> {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO level_history (id, owner, change_type, domain_code, old_level,
                 new_level, change_reason, metrics_snapshot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id.to_string(),
                entry.owner,
                entry.change_type.as_str(),
                entry.domain_code,
                entry.old_level,
                entry.new_level,
                entry.change_reason,
                serde_json::to_string(&entry.metrics_snapshot)?,
                now,
            ],
        )?;
        tracing::debug!(
            owner = %entry.owner,
            change_type = %entry.change_type,
            domain = entry.domain_code.as_deref().unwrap_or("-"),
            old = entry.old_level,
            new = entry.new_level,
            "history recorded"
        );
        Ok(id)
    }

    /// Entries for `owner` matching `filter`, newest first. Both ends of the
    /// date range are inclusive.
    pub fn query(
        conn: &Connection,
        owner: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<LevelHistoryEntry>> {
        filter.validate()?;
        let limit = filter
            .limit
            .map(|n| n.min(i64::MAX as usize) as i64)
            .unwrap_or(-1);

        let mut stmt = conn.prepare(
            "SELECT id, owner, change_type, domain_code, old_level, new_level,
                    change_reason, metrics_snapshot, created_at
             FROM level_history
             WHERE owner = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)
               AND (?4 IS NULL OR change_type = ?4)
               AND (?5 IS NULL OR domain_code = ?5)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?6",
        )?;
        let raws = stmt
            .query_map(
                params![
                    owner,
                    filter.from,
                    filter.to,
                    filter.change_type.map(|c| c.as_str()),
                    filter.domain_code,
                    limit,
                ],
                raw_entry_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawEntry::into_entry).collect()
    }

    pub fn count(conn: &Connection, owner: &str) -> Result<usize> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM level_history WHERE owner = ?1",
            [owner],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

struct RawEntry {
    id: String,
    owner: String,
    change_type: String,
    domain_code: Option<String>,
    old_level: f64,
    new_level: f64,
    change_reason: String,
    metrics_snapshot: String,
    created_at: i64,
}

fn raw_entry_from_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        owner: row.get(1)?,
        change_type: row.get(2)?,
        domain_code: row.get(3)?,
        old_level: row.get(4)?,
        new_level: row.get(5)?,
        change_reason: row.get(6)?,
        metrics_snapshot: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl RawEntry {
    fn into_entry(self) -> Result<LevelHistoryEntry> {
        let change_type: ChangeType = self.change_type.parse().map_err(|_| {
            StoreError::InvalidData(format!(
                "history {}: bad change type {:?}",
                self.id, self.change_type
            ))
        })?;
        Ok(LevelHistoryEntry {
            id: parse_uuid(&self.id)?,
            owner: self.owner,
            change_type,
            domain_code: self.domain_code,
            old_level: self.old_level,
            new_level: self.new_level,
            change_reason: self.change_reason,
            metrics_snapshot: serde_json::from_str(&self.metrics_snapshot)?,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;

    fn entry(owner: &str, change_type: ChangeType, domain: Option<&str>) -> NewHistoryEntry {
        NewHistoryEntry {
            owner: owner.into(),
            change_type,
            domain_code: domain.map(String::from),
            old_level: 1.0,
            new_level: 2.0,
            change_reason: "test".into(),
            metrics_snapshot: json!({ "points": 520 }),
        }
    }

    #[test]
    fn test_record_and_query_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let first = LevelHistoryLedger::record(conn, &entry("u1", ChangeType::Expertise, Some("000")), 10).unwrap();
        let second = LevelHistoryLedger::record(conn, &entry("u1", ChangeType::Overall, None), 20).unwrap();
        LevelHistoryLedger::record(conn, &entry("u2", ChangeType::Overall, None), 30).unwrap();

        let all = LevelHistoryLedger::query(conn, "u1", &HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second);
        assert_eq!(all[1].id, first);
        assert_eq!(all[1].metrics_snapshot, json!({ "points": 520 }));
        assert_eq!(LevelHistoryLedger::count(conn, "u1").unwrap(), 2);
    }

    #[test]
    fn test_filters() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        for (t, ct, domain) in [
            (100, ChangeType::Expertise, Some("A")),
            (200, ChangeType::Expertise, Some("B")),
            (300, ChangeType::Continuity, None),
            (400, ChangeType::Expertise, Some("A")),
        ] {
            LevelHistoryLedger::record(conn, &entry("u1", ct, domain), t).unwrap();
        }

        let ranged = HistoryFilter {
            from: Some(200),
            to: Some(300),
            ..Default::default()
        };
        let got = LevelHistoryLedger::query(conn, "u1", &ranged).unwrap();
        assert_eq!(got.iter().map(|e| e.created_at).collect::<Vec<_>>(), vec![300, 200]);

        let by_type = HistoryFilter {
            change_type: Some(ChangeType::Expertise),
            limit: Some(2),
            ..Default::default()
        };
        let got = LevelHistoryLedger::query(conn, "u1", &by_type).unwrap();
        assert_eq!(got.iter().map(|e| e.created_at).collect::<Vec<_>>(), vec![400, 200]);

        let by_domain = HistoryFilter {
            domain_code: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(LevelHistoryLedger::query(conn, "u1", &by_domain).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let store = Store::open_in_memory().unwrap();
        let inverted = HistoryFilter {
            from: Some(500),
            to: Some(100),
            ..Default::default()
        };
        let err = LevelHistoryLedger::query(store.conn(), "u1", &inverted).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
