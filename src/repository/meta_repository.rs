use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

pub const LAST_SYNCED_BLOCK: &str = "lastSyncedBlock";

pub struct MetaRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> MetaRepository<'a> {
    const GET_VALUE: &'static str = "SELECT v FROM meta WHERE k = ?1";

    const SET_VALUE: &'static str = "INSERT OR REPLACE INTO meta (k, v) VALUES (?1, ?2)";

    const INSERT_DEFAULT: &'static str = "INSERT OR IGNORE INTO meta (k, v) VALUES (?1, ?2)";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let raw: Option<String> = self
            .conn
            .query_row(Self::GET_VALUE, params![key], |row| row.get(0))
            .optional()?;

        raw.map(|value| {
            serde_json::from_str(&value)
                .with_context(|| format!("Invalid meta value for {key}: {value}"))
        })
        .transpose()
    }

    pub fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.conn
            .execute(Self::SET_VALUE, params![key, serde_json::to_string(&value)?])?;
        Ok(())
    }

    /// Stores `value` only if `key` has never been written. Returns the value
    /// now in effect.
    pub fn init_i64(&self, key: &str, value: i64) -> Result<i64> {
        self.conn.execute(
            Self::INSERT_DEFAULT,
            params![key, serde_json::to_string(&value)?],
        )?;
        self.get_i64(key)?
            .with_context(|| format!("Meta value {key} missing after initialisation"))
    }
}
