use crate::repository::{InscriptionRecord, TokenRecord};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_tokens(tokens: &[TokenRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_tokens_table(tokens),
        OutputFormat::Json => {
            serde_json::to_string_pretty(tokens).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_tokens_csv(tokens),
    }
}

fn format_tokens_table(tokens: &[TokenRecord]) -> String {
    if tokens.is_empty() {
        return "No tokens found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Tick",
            "Minted",
            "Max Supply",
            "Limit / Mint",
            "Holders",
            "Deployer",
            "Deployed At",
        ]);

    for token in tokens {
        table.add_row(vec![
            Cell::new(&token.tick),
            Cell::new(format!("{} ({})", token.minted, mint_progress(token))),
            Cell::new(&token.max_supply),
            Cell::new(&token.limit_per_mint),
            Cell::new(token.holders_count),
            Cell::new(shorten(&token.deployer)),
            Cell::new(
                token
                    .deployed_at
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table.to_string()
}

fn format_tokens_csv(tokens: &[TokenRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "tick",
        "max_supply",
        "limit_per_mint",
        "minted",
        "deployer",
        "holders_count",
        "deployed_at",
    ]);

    for token in tokens {
        let _ = wtr.write_record([
            token.tick.as_str(),
            &token.max_supply,
            &token.limit_per_mint,
            &token.minted,
            &token.deployer,
            &token.holders_count.to_string(),
            &token.deployed_at.map(|b| b.to_string()).unwrap_or_default(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_inscriptions(inscriptions: &[InscriptionRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_inscriptions_table(inscriptions),
        OutputFormat::Json => {
            serde_json::to_string_pretty(inscriptions).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_inscriptions_csv(inscriptions),
    }
}

fn format_inscriptions_table(inscriptions: &[InscriptionRecord]) -> String {
    if inscriptions.is_empty() {
        return "No inscriptions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["#", "Block", "Tick", "Op", "Amount", "User", "Time"]);

    for inscription in inscriptions {
        table.add_row(vec![
            Cell::new(&inscription.inscription_number),
            Cell::new(inscription.block_number),
            Cell::new(&inscription.tick),
            Cell::new(&inscription.operation),
            Cell::new(&inscription.amount),
            Cell::new(shorten(&inscription.user)),
            Cell::new(inscription.time),
        ]);
    }

    table.to_string()
}

fn format_inscriptions_csv(inscriptions: &[InscriptionRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "inscription_number",
        "block_number",
        "tick",
        "operation",
        "amount",
        "user",
        "data",
        "time",
    ]);

    for inscription in inscriptions {
        let _ = wtr.write_record([
            inscription.inscription_number.as_str(),
            &inscription.block_number.to_string(),
            &inscription.tick,
            &inscription.operation,
            &inscription.amount,
            &inscription.user,
            &inscription.data,
            &inscription.time.to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_cursor(last_synced_block: i64, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);
            table.add_row(vec![Cell::new("Last Synced Block"), Cell::new(last_synced_block)]);
            table.to_string()
        }
        OutputFormat::Json => json!({ "lastSyncedBlock": last_synced_block }).to_string(),
        OutputFormat::Csv => format!("last_synced_block\n{last_synced_block}\n"),
    }
}

fn mint_progress(token: &TokenRecord) -> String {
    use alloy_primitives::U256;
    use std::str::FromStr;

    let (Ok(minted), Ok(max)) = (
        U256::from_str(&token.minted),
        U256::from_str(&token.max_supply),
    ) else {
        return "?".to_string();
    };
    if max.is_zero() {
        return "-".to_string();
    }
    let basis_points = minted.saturating_mul(U256::from(10_000u64)) / max;
    let basis_points = u64::try_from(basis_points).unwrap_or(u64::MAX);
    format!("{}.{:02}%", basis_points / 100, basis_points % 100)
}

fn shorten(address: &str) -> String {
    if address.len() > 12 {
        format!("{}…{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}
