use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, B256, U256, keccak256};
use anyhow::{Context, Result};

sol! {
    event Deploy(string indexed tick, uint256 maxSupply, uint256 limitPerMint, address deployer);
    event Inscribe(
        address indexed user,
        string indexed tick,
        string operation,
        uint256 amount,
        string data,
        uint256 inscriptionNumber
    );

    function deployToken(string tick, uint256 maxSupply, uint256 limitPerMint) external payable;
    function mint(string tick, uint256 amount) external payable;
    function transfer(address to, string tick, uint256 amount) external;

    function getTokenInfo(string tick) external view returns (
        uint256 maxSupply,
        uint256 limitPerMint,
        uint256 minted,
        address deployer,
        uint256 holdersCount
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl LogMeta {
    pub fn from_log(log: &Log) -> Result<Self> {
        let block_number = log
            .block_number
            .context("Log is missing its block number")?;
        Ok(LogMeta {
            block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeployEvent {
    pub meta: LogMeta,
    pub tick_hash: B256,
    pub deployer: Address,
}

#[derive(Debug, Clone)]
pub struct InscribeEvent {
    pub meta: LogMeta,
    pub user: Address,
    pub tick_hash: B256,
    pub operation: String,
    pub amount: U256,
    pub data: String,
    pub inscription_number: U256,
}

pub fn decode_deploy_event(log: &Log) -> Result<DeployEvent> {
    let log_data = log.data();
    let decoded = Deploy::decode_raw_log(log.topics(), &log_data.data)
        .context("Failed to decode Deploy log")?;
    Ok(DeployEvent {
        meta: LogMeta::from_log(log)?,
        tick_hash: decoded.tick,
        deployer: decoded.deployer,
    })
}

pub fn decode_inscribe_event(log: &Log) -> Result<InscribeEvent> {
    let log_data = log.data();
    let decoded = Inscribe::decode_raw_log(log.topics(), &log_data.data)
        .context("Failed to decode Inscribe log")?;
    Ok(InscribeEvent {
        meta: LogMeta::from_log(log)?,
        user: decoded.user,
        tick_hash: decoded.tick,
        operation: decoded.operation,
        amount: decoded.amount,
        data: decoded.data,
        inscription_number: decoded.inscriptionNumber,
    })
}

pub fn tick_hash(tick: &str) -> B256 {
    keccak256(tick.as_bytes())
}

/// Recovers the `tick` argument from the calldata of a contract call that
/// emits Deploy or Inscribe. Returns `None` unless the argument hashes to
/// `expected`, which rules out calls routed through other contracts.
pub fn tick_from_calldata(input: &[u8], expected: B256) -> Option<String> {
    let tick = if let Ok(call) = deployTokenCall::abi_decode(input) {
        call.tick
    } else if let Ok(call) = mintCall::abi_decode(input) {
        call.tick
    } else if let Ok(call) = transferCall::abi_decode(input) {
        call.tick
    } else {
        return None;
    };

    (tick_hash(&tick) == expected).then_some(tick)
}
