//! SQLite-based reward storage.
//!
//! Provides persistent storage for:
//! - The per-user progress snapshot, guarded by an optimistic `version`
//! - The append-only gold ledger and level history
//! - Achievement progress, active powerups and inventory
//!
//! The rewards engine never touches the database; callers load a
//! [`RewardSnapshot`], run the engine, and hand the resulting
//! [`RewardOutcome`] to [`Database::commit`], which writes it in one
//! transaction or not at all.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, RewardError};
use crate::progress::UserProgress;
use crate::rewards::{
    ActivePowerup, EffectType, GoldTransaction, LevelHistoryRecord, PowerupChange, RewardOutcome,
    RewardSnapshot, TransactionType, UserAchievement,
};
use crate::shop::InventoryItem;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How long a write waits for another connection's lock before `Locked`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-width UTC timestamps so that text comparison orders them.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn corrupt(table: &str, message: String) -> DatabaseError {
    DatabaseError::CorruptRow {
        table: table.to_string(),
        message,
    }
}

fn parse_timestamp(table: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp '{raw}': {e}")))
}

fn parse_date(table: &str, raw: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    raw.map(|d| {
        NaiveDate::parse_from_str(&d, DATE_FORMAT)
            .map_err(|e| corrupt(table, format!("bad date '{d}': {e}")))
    })
    .transpose()
}

fn parse_uuid(table: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| corrupt(table, format!("bad uuid '{raw}': {e}")))
}

/// SQLite database for reward state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/questlog/questlog.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("questlog.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.set_busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        db.migrate()?;
        Ok(db)
    }

    /// Change how long writes wait for a lock held by another connection.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<(), CoreError> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Stored progress, or fresh progress for a user never seen before.
    pub fn load_progress(&self, user_id: &str) -> Result<UserProgress, CoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT total_xp, level, gold_balance, current_streak, longest_streak,
                        last_activity_date, last_daily_bonus, tasks_completed, version
                 FROM user_progress WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, u64>(7)?,
                        row.get::<_, u64>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((total_xp, level, gold, current, longest, last, bonus, tasks, version)) = row
        else {
            return Ok(UserProgress::new(user_id));
        };
        Ok(UserProgress {
            user_id: user_id.to_string(),
            total_xp,
            level,
            gold_balance: gold,
            current_streak: current,
            longest_streak: longest,
            last_activity_date: parse_date("user_progress", last)?,
            last_daily_bonus: parse_date("user_progress", bonus)?,
            tasks_completed: tasks,
            version,
        })
    }

    /// Everything the engine needs for one user at `now`.
    ///
    /// Powerups that have expired by `now` are left out even if they have
    /// not been purged yet.
    pub fn load_snapshot(&self, user_id: &str, now: DateTime<Utc>) -> Result<RewardSnapshot, CoreError> {
        Ok(RewardSnapshot {
            progress: self.load_progress(user_id)?,
            achievements: self.achievements(user_id)?,
            powerups: self.active_powerups(user_id, now)?,
            inventory: self.inventory(user_id)?,
        })
    }

    /// Persist an engine outcome atomically.
    ///
    /// The write lock is taken up front, so the version check and the writes
    /// see the same state; a concurrent writer waits up to the busy timeout.
    ///
    /// # Errors
    /// - `ConcurrentModification` if the stored progress is no longer at
    ///   `outcome.expected_version`; nothing is written in that case.
    /// - `Locked` if another connection held the write lock past the busy timeout.
    pub fn commit(&self, outcome: &RewardOutcome) -> Result<(), CoreError> {
        let user_id = outcome.user_id();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let stored: Option<u64> = tx
            .query_row(
                "SELECT version FROM user_progress WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let found_version = stored.unwrap_or(0);
        if found_version != outcome.expected_version {
            tracing::warn!(
                user_id,
                expected = outcome.expected_version,
                found = found_version,
                "stale snapshot rejected"
            );
            return Err(RewardError::ConcurrentModification {
                user_id: user_id.to_string(),
                expected_version: outcome.expected_version,
                found_version,
            }
            .into());
        }

        let p = &outcome.progress;
        let last_activity = p.last_activity_date.map(|d| d.format(DATE_FORMAT).to_string());
        let last_bonus = p.last_daily_bonus.map(|d| d.format(DATE_FORMAT).to_string());
        let updated_at = timestamp(&Utc::now());
        if stored.is_some() {
            tx.execute(
                "UPDATE user_progress
                 SET total_xp = ?1, level = ?2, gold_balance = ?3, current_streak = ?4,
                     longest_streak = ?5, last_activity_date = ?6, last_daily_bonus = ?7,
                     tasks_completed = ?8, version = ?9, updated_at = ?10
                 WHERE user_id = ?11 AND version = ?12",
                params![
                    p.total_xp,
                    p.level,
                    p.gold_balance,
                    p.current_streak,
                    p.longest_streak,
                    last_activity,
                    last_bonus,
                    p.tasks_completed,
                    p.version,
                    updated_at,
                    user_id,
                    outcome.expected_version,
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO user_progress
                    (user_id, total_xp, level, gold_balance, current_streak, longest_streak,
                     last_activity_date, last_daily_bonus, tasks_completed, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    user_id,
                    p.total_xp,
                    p.level,
                    p.gold_balance,
                    p.current_streak,
                    p.longest_streak,
                    last_activity,
                    last_bonus,
                    p.tasks_completed,
                    p.version,
                    updated_at,
                ],
            )?;
        }

        for t in &outcome.transactions {
            tx.execute(
                "INSERT INTO gold_transactions
                    (id, user_id, amount, balance_after, transaction_type, description, event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    t.id.to_string(),
                    t.user_id,
                    t.amount,
                    t.balance_after,
                    t.transaction_type.as_str(),
                    t.description,
                    t.event_id.to_string(),
                    timestamp(&t.created_at),
                ],
            )?;
        }

        for r in &outcome.level_history {
            tx.execute(
                "INSERT INTO level_history
                    (user_id, previous_level, new_level, total_xp_at_levelup, event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    r.user_id,
                    r.previous_level,
                    r.new_level,
                    r.total_xp_at_levelup,
                    r.event_id.to_string(),
                    timestamp(&r.created_at),
                ],
            )?;
        }

        // unlocked rows are frozen
        for a in &outcome.achievements {
            tx.execute(
                "INSERT INTO user_achievements (user_id, achievement_id, progress, is_unlocked, unlocked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, achievement_id) DO UPDATE SET
                    progress = excluded.progress,
                    is_unlocked = excluded.is_unlocked,
                    unlocked_at = excluded.unlocked_at
                 WHERE user_achievements.is_unlocked = 0",
                params![
                    a.user_id,
                    a.achievement_id,
                    a.progress,
                    a.is_unlocked,
                    a.unlocked_at.as_ref().map(timestamp),
                ],
            )?;
        }

        for change in &outcome.powerup_changes {
            match change {
                PowerupChange::QuantityChanged { id, quantity } => {
                    tx.execute(
                        "UPDATE active_powerups SET quantity = ?1 WHERE id = ?2 AND user_id = ?3",
                        params![quantity, id, user_id],
                    )?;
                }
                PowerupChange::Exhausted { id } => {
                    tx.execute(
                        "DELETE FROM active_powerups WHERE id = ?1 AND user_id = ?2",
                        params![id, user_id],
                    )?;
                }
            }
        }

        for powerup in &outcome.new_powerups {
            tx.execute(
                "INSERT INTO active_powerups
                    (user_id, item_id, effect_type, effect_value, quantity, activated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    powerup.user_id,
                    powerup.item_id,
                    powerup.effect_type.as_str(),
                    powerup.effect_value,
                    powerup.quantity,
                    timestamp(&powerup.activated_at),
                    timestamp(&powerup.expires_at),
                ],
            )?;
        }

        for change in &outcome.inventory_changes {
            if change.delta > 0 {
                tx.execute(
                    "INSERT INTO inventory (user_id, item_id, quantity) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity",
                    params![change.user_id, change.item_id, change.delta],
                )?;
            } else {
                let taken = tx.execute(
                    "UPDATE inventory SET quantity = quantity + ?1
                     WHERE user_id = ?2 AND item_id = ?3 AND quantity >= ?4",
                    params![change.delta, change.user_id, change.item_id, -change.delta],
                )?;
                if taken == 0 {
                    return Err(RewardError::invalid(
                        "item_id",
                        format!("no '{}' left in inventory", change.item_id),
                    )
                    .into());
                }
            }
        }
        tx.execute(
            "DELETE FROM inventory WHERE user_id = ?1 AND quantity = 0",
            params![user_id],
        )?;

        tx.commit()?;
        tracing::info!(
            user_id,
            event_id = %outcome.event_id,
            version = p.version,
            entries = outcome.transactions.len(),
            "outcome committed"
        );
        Ok(())
    }

    /// The user's ledger in append order.
    pub fn transactions(&self, user_id: &str) -> Result<Vec<GoldTransaction>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, amount, balance_after, transaction_type, description, event_id, created_at
             FROM gold_transactions WHERE user_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let table = "gold_transactions";
        let mut out = Vec::new();
        for row in rows {
            let (id, amount, balance_after, kind, description, event_id, created_at) = row?;
            out.push(GoldTransaction {
                id: parse_uuid(table, &id)?,
                user_id: user_id.to_string(),
                amount,
                balance_after,
                transaction_type: TransactionType::from_str(&kind)
                    .map_err(|e| corrupt(table, e.to_string()))?,
                description,
                event_id: parse_uuid(table, &event_id)?,
                created_at: parse_timestamp(table, &created_at)?,
            });
        }
        Ok(out)
    }

    pub fn level_history(&self, user_id: &str) -> Result<Vec<LevelHistoryRecord>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT previous_level, new_level, total_xp_at_levelup, event_id, created_at
             FROM level_history WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (previous_level, new_level, total_xp_at_levelup, event_id, created_at) = row?;
            out.push(LevelHistoryRecord {
                user_id: user_id.to_string(),
                previous_level,
                new_level,
                total_xp_at_levelup,
                event_id: parse_uuid("level_history", &event_id)?,
                created_at: parse_timestamp("level_history", &created_at)?,
            });
        }
        Ok(out)
    }

    pub fn achievements(&self, user_id: &str) -> Result<Vec<UserAchievement>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT achievement_id, progress, is_unlocked, unlocked_at
             FROM user_achievements WHERE user_id = ?1 ORDER BY achievement_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (achievement_id, progress, is_unlocked, unlocked_at) = row?;
            out.push(UserAchievement {
                user_id: user_id.to_string(),
                achievement_id,
                progress,
                is_unlocked,
                unlocked_at: unlocked_at
                    .map(|t| parse_timestamp("user_achievements", &t))
                    .transpose()?,
            });
        }
        Ok(out)
    }

    /// Powerups still active at `now`, soonest expiry first.
    pub fn active_powerups(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<ActivePowerup>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_id, effect_type, effect_value, quantity, activated_at, expires_at
             FROM active_powerups
             WHERE user_id = ?1 AND expires_at > ?2 AND quantity > 0
             ORDER BY expires_at, id",
        )?;
        let rows = stmt.query_map(params![user_id, timestamp(&now)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let table = "active_powerups";
        let mut out = Vec::new();
        for row in rows {
            let (id, item_id, effect, effect_value, quantity, activated_at, expires_at) = row?;
            out.push(ActivePowerup {
                id,
                user_id: user_id.to_string(),
                item_id,
                effect_type: EffectType::from_str(&effect)
                    .map_err(|e| corrupt(table, e.to_string()))?,
                effect_value,
                quantity,
                activated_at: parse_timestamp(table, &activated_at)?,
                expires_at: parse_timestamp(table, &expires_at)?,
            });
        }
        Ok(out)
    }

    pub fn inventory(&self, user_id: &str) -> Result<Vec<InventoryItem>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, quantity FROM inventory
             WHERE user_id = ?1 AND quantity > 0 ORDER BY item_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(InventoryItem {
                user_id: user_id.to_string(),
                item_id: row.get(0)?,
                quantity: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete powerups that expired at or before `now`. Returns how many
    /// rows were removed.
    ///
    /// Expired rows are already ignored on load; this only reclaims space.
    pub fn purge_expired_powerups(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let removed = self.conn.execute(
            "DELETE FROM active_powerups WHERE expires_at <= ?1",
            params![timestamp(&now)],
        )?;
        if removed > 0 {
            tracing::info!(removed, "expired powerups purged");
        }
        Ok(removed)
    }
}
