use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// CORS origin allow-list; empty means any origin.
    pub allowed_origins: Vec<String>,
    pub room_sweep_interval_secs: u64,
    pub bucket_sweep_interval_secs: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .expect("Invalid PORT"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            room_sweep_interval_secs: env::var("ROOM_SWEEP_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .expect("Invalid ROOM_SWEEP_INTERVAL_SECONDS"),
            bucket_sweep_interval_secs: env::var("BUCKET_SWEEP_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("Invalid BUCKET_SWEEP_INTERVAL_SECONDS"),
        }
    }
}
