use super::models::{InscriptionRecord, LogPosition};
use anyhow::Result;
use rusqlite::{Row, ToSql, params, params_from_iter};

pub struct InscriptionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

#[derive(Debug, Default, Clone)]
pub struct InscriptionFilter {
    pub tick: Option<String>,
    pub user: Option<String>,
    pub block_range: Option<(u64, u64)>,
}

impl<'a> InscriptionRepository<'a> {
    const INSERT_INSCRIPTION: &'static str = "INSERT OR IGNORE INTO inscribes (
            block_number, user, tick, operation, amount, data,
            inscription_number, time, transaction_hash, log_index
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

    const SELECT_INSCRIPTION: &'static str = "SELECT block_number, user, tick, operation, amount, data, inscription_number, time FROM inscribes";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Appends one inscription. Returns the assigned id, or `None` when the
    /// same chain log was already recorded.
    pub fn insert(
        &self,
        inscription: &InscriptionRecord,
        position: &LogPosition,
    ) -> Result<Option<i64>> {
        let changed = self.conn.execute(
            Self::INSERT_INSCRIPTION,
            params![
                inscription.block_number,
                inscription.user,
                inscription.tick,
                inscription.operation,
                inscription.amount,
                inscription.data,
                inscription.inscription_number,
                inscription.time,
                position.transaction_hash,
                position.log_index,
            ],
        )?;

        Ok((changed > 0).then(|| self.conn.last_insert_rowid()))
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<InscriptionRecord>> {
        self.query(&InscriptionFilter::default(), limit, 0)
    }

    pub fn query(
        &self,
        filter: &InscriptionFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<InscriptionRecord>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(tick) = &filter.tick {
            conditions.push("tick = ?");
            params.push(Box::new(tick.clone()));
        }

        if let Some(user) = &filter.user {
            conditions.push("user = ? COLLATE NOCASE");
            params.push(Box::new(user.clone()));
        }

        if let Some((start, end)) = filter.block_range {
            conditions.push("block_number >= ?");
            params.push(Box::new(start));
            conditions.push("block_number <= ?");
            params.push(Box::new(end));
        }

        let mut query = Self::SELECT_INSCRIPTION.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY block_number DESC, id DESC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let inscriptions = stmt
            .query_map(params_from_iter(params), Self::row_to_inscription)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(inscriptions)
    }

    pub fn count(&self) -> Result<usize> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM inscribes", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_inscription(row: &Row) -> rusqlite::Result<InscriptionRecord> {
        Ok(InscriptionRecord {
            block_number: row.get(0)?,
            user: row.get(1)?,
            tick: row.get(2)?,
            operation: row.get(3)?,
            amount: row.get(4)?,
            data: row.get(5)?,
            inscription_number: row.get(6)?,
            time: row.get(7)?,
        })
    }
}
