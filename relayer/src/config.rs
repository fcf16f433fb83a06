use anyhow::{Context, Error, bail};

pub struct Config {
    pub db_filename: String,
    pub db_max_connections: u32,
    pub l1_rpc_url: String,
    pub rollup_contract_address: String,
    pub relayer_private_keys: Vec<String>,
    pub commit_interval_sec: u64,
    pub recovery_interval_sec: u64,
    pub recovery_page_size: u32,
    pub confirmations: u64,
}

impl Config {
    pub fn new() -> Result<Self, Error> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let db_filename = required("DB_FILENAME")?;
        let l1_rpc_url = required("L1_RPC_URL")?;
        let rollup_contract_address = required("ROLLUP_CONTRACT_ADDRESS")?;

        let relayer_private_keys: Vec<String> = required("RELAYER_PRIVATE_KEYS")?
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();
        if relayer_private_keys.is_empty() {
            bail!("RELAYER_PRIVATE_KEYS must contain at least one key");
        }

        let commit_interval_sec = positive("COMMIT_INTERVAL_SEC", "2")?;
        let recovery_interval_sec = positive("RECOVERY_INTERVAL_SEC", "60")?;
        let recovery_page_size = u32::try_from(positive("RECOVERY_PAGE_SIZE", "10")?)
            .context("RECOVERY_PAGE_SIZE is too large")?;
        let confirmations = positive("CONFIRMATIONS", "1")?;
        let db_max_connections = u32::try_from(positive("DB_MAX_CONNECTIONS", "4")?)
            .context("DB_MAX_CONNECTIONS is too large")?;

        tracing::info!(
            "Config:\nDB_FILENAME: {}\nDB_MAX_CONNECTIONS: {}\nL1_RPC_URL: {}\nROLLUP_CONTRACT_ADDRESS: {}\nRELAYER_PRIVATE_KEYS: {} keys\nCOMMIT_INTERVAL_SEC: {}\nRECOVERY_INTERVAL_SEC: {}\nRECOVERY_PAGE_SIZE: {}\nCONFIRMATIONS: {}",
            db_filename,
            db_max_connections,
            l1_rpc_url,
            rollup_contract_address,
            relayer_private_keys.len(),
            commit_interval_sec,
            recovery_interval_sec,
            recovery_page_size,
            confirmations
        );

        Ok(Config {
            db_filename,
            db_max_connections,
            l1_rpc_url,
            rollup_contract_address,
            relayer_private_keys,
            commit_interval_sec,
            recovery_interval_sec,
            recovery_page_size,
            confirmations,
        })
    }
}

fn required(name: &str) -> Result<String, Error> {
    std::env::var(name).with_context(|| format!("{name} env var not found"))
}

fn positive(name: &str, default: &str) -> Result<u64, Error> {
    let value = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("{name} must be a number"))?;
    if value == 0 {
        bail!("{name} must be a positive number");
    }
    Ok(value)
}
