use anyhow::{Context, Error, bail};

pub struct Config {
    pub db_filename: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub chain_id: u64,
    pub max_attempts: u32,
    pub prover_task_timeout_sec: u64,
    pub timeout_check_interval_sec: u64,
}

impl Config {
    pub fn new() -> Result<Self, Error> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let db_filename = required("DB_FILENAME")?;
        let chain_id = positive("CHAIN_ID", None)?;
        let port = u16::try_from(positive("PORT", Some("8390"))?)
            .context("PORT must be a u16 number")?;
        let max_attempts = u32::try_from(positive("MAX_ATTEMPTS", Some("5"))?)
            .context("MAX_ATTEMPTS is too large")?;
        let prover_task_timeout_sec = positive("PROVER_TASK_TIMEOUT_SEC", Some("1800"))?;
        let timeout_check_interval_sec = positive("TIMEOUT_CHECK_INTERVAL_SEC", Some("60"))?;
        let db_max_connections = u32::try_from(positive("DB_MAX_CONNECTIONS", Some("4"))?)
            .context("DB_MAX_CONNECTIONS is too large")?;

        tracing::info!(
            "Config:\nDB_FILENAME: {}\nDB_MAX_CONNECTIONS: {}\nPORT: {}\nCHAIN_ID: {}\nMAX_ATTEMPTS: {}\nPROVER_TASK_TIMEOUT_SEC: {}\nTIMEOUT_CHECK_INTERVAL_SEC: {}",
            db_filename,
            db_max_connections,
            port,
            chain_id,
            max_attempts,
            prover_task_timeout_sec,
            timeout_check_interval_sec
        );

        Ok(Config {
            db_filename,
            db_max_connections,
            port,
            chain_id,
            max_attempts,
            prover_task_timeout_sec,
            timeout_check_interval_sec,
        })
    }
}

fn required(name: &str) -> Result<String, Error> {
    std::env::var(name).with_context(|| format!("{name} env var not found"))
}

fn positive(name: &str, default: Option<&str>) -> Result<u64, Error> {
    let raw = match (std::env::var(name), default) {
        (Ok(value), _) => value,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => bail!("{name} env var not found"),
    };
    let value = raw
        .parse::<u64>()
        .with_context(|| format!("{name} must be a number"))?;
    if value == 0 {
        bail!("{name} must be a positive number");
    }
    Ok(value)
}
