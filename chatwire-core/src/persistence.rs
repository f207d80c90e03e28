//! SQLite counter store.
//!
//! Holds the small amount of durable state the bot layer needs: who referred
//! whom, granted bonus counts, and per-user per-day usage counters.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS referrals (
//!     user_id     INTEGER PRIMARY KEY,
//!     referrer_id INTEGER,
//!     joined_at   TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS bonuses (
//!     user_id     INTEGER PRIMARY KEY,
//!     bonus_count INTEGER NOT NULL DEFAULT 0
//! );
//! CREATE TABLE IF NOT EXISTS daily_counters (
//!     user_id INTEGER NOT NULL,
//!     day     TEXT NOT NULL,
//!     count   INTEGER NOT NULL DEFAULT 0,
//!     PRIMARY KEY (user_id, day)
//! );
//! ```
//!
//! All access goes through one mutex-guarded connection, so a store shared
//! behind an `Arc` serialises every read and write in the process.

use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS referrals (
        user_id     INTEGER PRIMARY KEY,
        referrer_id INTEGER,
        joined_at   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bonuses (
        user_id     INTEGER PRIMARY KEY,
        bonus_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS daily_counters (
        user_id INTEGER NOT NULL,
        day     TEXT NOT NULL,
        count   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, day)
    );
";

/// Day key format used by [`CounterStore`] (`YYYY-MM-DD`).
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Today's day key in UTC.
#[must_use]
pub fn today() -> String {
    day_key(Utc::now().date_naive())
}

/// Format a date as a day key.
#[must_use]
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Handle to the SQLite database holding referral and usage counters.
///
/// # Usage
///
/// ```no_run
/// # use chatwire_core::persistence::{self, CounterStore};
/// # use chatwire_core::config::PersistenceConfig;
/// let store = CounterStore::open("chatwire.db", &PersistenceConfig::default())?;
/// store.increment_daily_counter(42, &persistence::today())?;
/// let used = store.daily_counter(42, &persistence::today())?;
/// # Ok::<(), chatwire_core::error::ChatwireError>(())
/// ```
pub struct CounterStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl CounterStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Counter store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Referrals
    // ------------------------------------------------------------------

    /// Record that `user_id` joined through `referrer_id`.
    ///
    /// The first recorded referrer wins; later calls for the same user are
    /// ignored. Returns `true` if a new row was written.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn add_referral(&self, user_id: i64, referrer_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO referrals (user_id, referrer_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, referrer_id, now],
        )?;
        debug!(user_id, referrer_id, inserted, "Referral recorded");
        Ok(inserted > 0)
    }

    /// Who referred `user_id`, if anyone.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn referrer_of(&self, user_id: i64) -> Result<Option<i64>> {
        let referrer = self
            .conn
            .lock()
            .query_row(
                "SELECT referrer_id FROM referrals WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(referrer.flatten())
    }

    /// Number of users referred by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn referral_count(&self, user_id: i64) -> Result<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Bonuses
    // ------------------------------------------------------------------

    /// Set (upsert) the bonus count for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn set_bonus_count(&self, user_id: i64, count: u32) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO bonuses (user_id, bonus_count) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET bonus_count = excluded.bonus_count",
            params![user_id, count],
        )?;
        Ok(())
    }

    /// Bonus count for `user_id`; `0` when none was ever set.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn bonus_count(&self, user_id: i64) -> Result<u32> {
        let count = self
            .conn
            .lock()
            .query_row(
                "SELECT bonus_count FROM bonuses WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Daily counters
    // ------------------------------------------------------------------

    /// Add one to the counter keyed by (`user_id`, `day`), creating it at 1.
    ///
    /// Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn increment_daily_counter(&self, user_id: i64, day: &str) -> Result<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO daily_counters (user_id, day, count) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, day) DO UPDATE SET count = count + 1",
            params![user_id, day],
        )?;
        let count: u32 = conn.query_row(
            "SELECT count FROM daily_counters WHERE user_id = ?1 AND day = ?2",
            params![user_id, day],
            |row| row.get(0),
        )?;
        debug!(user_id, day, count, "Daily counter incremented");
        Ok(count)
    }

    /// Counter value for (`user_id`, `day`); `0` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn daily_counter(&self, user_id: i64, day: &str) -> Result<u32> {
        let count = self
            .conn
            .lock()
            .query_row(
                "SELECT count FROM daily_counters WHERE user_id = ?1 AND day = ?2",
                params![user_id, day],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Delete daily counters older than `days` days before today (UTC).
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatwireError::Database`](crate::ChatwireError::Database)
    /// on SQLite failures.
    pub fn cleanup_old_counters(&self, days: u32) -> Result<usize> {
        self.cleanup_counters_before(Utc::now().date_naive(), days)
    }

    fn cleanup_counters_before(&self, today: NaiveDate, days: u32) -> Result<usize> {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        let cutoff = day_key(cutoff);

        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM daily_counters WHERE day < ?1", params![cutoff])?;

        info!(cutoff = %cutoff, removed, "Old daily counters removed");
        Ok(removed)
    }

    /// Return the path to the database file (or `:memory:` for in-memory DBs).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
