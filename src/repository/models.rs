use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub tick: String,
    pub max_supply: String,
    pub limit_per_mint: String,
    pub minted: String,
    pub deployer: String,
    pub holders_count: u64,
    pub deployed_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscriptionRecord {
    pub block_number: u64,
    pub user: String,
    pub tick: String,
    pub operation: String,
    pub amount: String,
    pub data: String,
    pub inscription_number: String,
    pub time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPosition {
    pub transaction_hash: Option<String>,
    pub log_index: Option<u64>,
}
