use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let cache_capacity = env::var("CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1024);
        let cache_ttl_secs = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(300);

        Ok(Self {
            database_url,
            cache_capacity,
            cache_ttl_secs,
        })
    }
}
