use anyhow::Result;
use clap::{Parser, Subcommand};
use inscription_indexer::config::Config;
use inscription_indexer::query::commands::{
    InscriptionQuery, cmd_cursor, cmd_inscriptions, cmd_token, cmd_tokens,
};
use inscription_indexer::query::formatters::OutputFormat;
use inscription_indexer::repository::Database;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query indexed inscription tokens", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Tokens,
    Token {
        tick: String,
    },
    Inscriptions {
        #[arg(long)]
        tick: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        block: Option<u64>,

        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        block_range: Option<Vec<u64>>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Cursor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url)?;

    match cli.command {
        Commands::Tokens => cmd_tokens(&db, &format)?,
        Commands::Token { tick } => cmd_token(&db, &tick, &format)?,
        Commands::Inscriptions {
            tick,
            user,
            block,
            block_range,
            limit,
            offset,
        } => {
            let block_range = block_range.and_then(|v| match v.as_slice() {
                [start, end] => Some((*start, *end)),
                _ => None,
            });
            let query = InscriptionQuery {
                tick,
                user,
                block,
                block_range,
                limit,
                offset,
            };
            cmd_inscriptions(&db, query, &format)?;
        }
        Commands::Cursor => cmd_cursor(&db, &format)?,
    }

    Ok(())
}
