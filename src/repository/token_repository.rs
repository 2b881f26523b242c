use super::models::TokenRecord;
use crate::events::tick_hash;
use alloy_primitives::B256;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

pub struct TokenRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenRepository<'a> {
    // deployed_at keeps the first non-null value ever written
    const UPSERT_TOKEN: &'static str = "INSERT INTO tokens (
            tick, tick_hash, max_supply, limit_per_mint,
            minted, deployer, holders_count, deployed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(tick) DO UPDATE SET
            tick_hash = excluded.tick_hash,
            max_supply = excluded.max_supply,
            limit_per_mint = excluded.limit_per_mint,
            minted = excluded.minted,
            deployer = excluded.deployer,
            holders_count = excluded.holders_count,
            deployed_at = COALESCE(tokens.deployed_at, excluded.deployed_at)";

    const SELECT_TOKEN: &'static str = "SELECT tick, max_supply, limit_per_mint, minted, deployer, holders_count, deployed_at FROM tokens";

    const SELECT_TICK_BY_HASH: &'static str = "SELECT tick FROM tokens WHERE tick_hash = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, token: &TokenRecord) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TOKEN,
            params![
                token.tick,
                format!("{:?}", tick_hash(&token.tick)),
                token.max_supply,
                token.limit_per_mint,
                token.minted,
                token.deployer,
                token.holders_count,
                token.deployed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, tick: &str) -> Result<Option<TokenRecord>> {
        let query = format!("{} WHERE tick = ?1", Self::SELECT_TOKEN);
        let token = self
            .conn
            .query_row(&query, params![tick], Self::row_to_token)
            .optional()?;
        Ok(token)
    }

    pub fn all(&self) -> Result<Vec<TokenRecord>> {
        let query = format!(
            "{} ORDER BY deployed_at DESC, tick ASC",
            Self::SELECT_TOKEN
        );
        let mut stmt = self.conn.prepare(&query)?;
        let tokens = stmt
            .query_map([], Self::row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    pub fn find_tick_by_hash(&self, hash: &B256) -> Result<Option<String>> {
        let tick: Option<String> = self
            .conn
            .query_row(
                Self::SELECT_TICK_BY_HASH,
                params![format!("{hash:?}")],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tick)
    }

    pub fn count(&self) -> Result<usize> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_token(row: &Row) -> rusqlite::Result<TokenRecord> {
        Ok(TokenRecord {
            tick: row.get(0)?,
            max_supply: row.get(1)?,
            limit_per_mint: row.get(2)?,
            minted: row.get(3)?,
            deployer: row.get(4)?,
            holders_count: row.get(5)?,
            deployed_at: row.get(6)?,
        })
    }
}
