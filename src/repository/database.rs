use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to enable WAL journal")?;

        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                k TEXT PRIMARY KEY,
                v TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tokens (
                tick TEXT PRIMARY KEY,
                tick_hash TEXT NOT NULL,
                max_supply TEXT NOT NULL,
                limit_per_mint TEXT NOT NULL,
                minted TEXT NOT NULL,
                deployer TEXT NOT NULL,
                holders_count INTEGER NOT NULL,
                deployed_at INTEGER
            )",
            [],
        )?;

        // transaction_hash/log_index are NULL for logs without a position;
        // SQLite treats NULLs as distinct so those rows are always appended.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS inscribes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                user TEXT NOT NULL,
                tick TEXT NOT NULL,
                operation TEXT NOT NULL,
                amount TEXT NOT NULL,
                data TEXT NOT NULL,
                inscription_number TEXT NOT NULL,
                time INTEGER NOT NULL,
                transaction_hash TEXT,
                log_index INTEGER,
                UNIQUE (transaction_hash, log_index)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tokens_tick_hash
             ON tokens(tick_hash)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_inscribes_block_number
             ON inscribes(block_number)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_inscribes_tick
             ON inscribes(tick)",
            [],
        )?;

        Ok(())
    }
}
