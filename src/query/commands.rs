use crate::query::formatters::{OutputFormat, format_cursor, format_inscriptions, format_tokens};
use crate::repository::{
    Database, InscriptionFilter, InscriptionRepository, LAST_SYNCED_BLOCK, MetaRepository,
    TokenRepository,
};
use alloy_primitives::Address;
use anyhow::Result;
use std::str::FromStr;

pub fn cmd_tokens(db: &Database, format: &OutputFormat) -> Result<()> {
    let conn = db.lock()?;
    let tokens = TokenRepository::new(&conn).all()?;
    println!("{}", format_tokens(&tokens, format));
    Ok(())
}

pub fn cmd_token(db: &Database, tick: &str, format: &OutputFormat) -> Result<()> {
    let conn = db.lock()?;
    let token = TokenRepository::new(&conn)
        .get(tick)?
        .ok_or_else(|| anyhow::anyhow!("Unknown tick: {}", tick))?;
    println!("{}", format_tokens(&[token], format));
    Ok(())
}

#[derive(Default)]
pub struct InscriptionQuery {
    pub tick: Option<String>,
    pub user: Option<String>,
    pub block: Option<u64>,
    pub block_range: Option<(u64, u64)>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_inscriptions(db: &Database, query: InscriptionQuery, format: &OutputFormat) -> Result<()> {
    let user = query
        .user
        .as_ref()
        .map(|addr| {
            Address::from_str(addr)
                .map(|address| address.to_string())
                .map_err(|_| anyhow::anyhow!("Invalid user address: {}", addr))
        })
        .transpose()?;

    let block_range = if let Some(block_num) = query.block {
        Some((block_num, block_num))
    } else {
        query.block_range
    };

    let filter = InscriptionFilter {
        tick: query.tick,
        user,
        block_range,
    };

    let conn = db.lock()?;
    let inscriptions =
        InscriptionRepository::new(&conn).query(&filter, query.limit, query.offset)?;
    println!("{}", format_inscriptions(&inscriptions, format));
    Ok(())
}

pub fn cmd_cursor(db: &Database, format: &OutputFormat) -> Result<()> {
    let conn = db.lock()?;
    let cursor = MetaRepository::new(&conn)
        .get_i64(LAST_SYNCED_BLOCK)?
        .unwrap_or(-1);
    println!("{}", format_cursor(cursor, format));
    Ok(())
}
