/// Pipeline names used in logs, metric labels and the CLI
pub const CRYPTO_PIPELINE: &str = "crypto_prices";
pub const WEATHER_PIPELINE: &str = "daily_weather";

// Provider endpoints
pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3/simple/price";
pub const OPEN_METEO_API: &str = "https://api.open-meteo.com/v1/forecast";

pub const DEFAULT_COINS: &[&str] = &["bitcoin", "ethereum", "solana", "cardano", "dogecoin"];
pub const DEFAULT_VS_CURRENCY: &str = "usd";

// Paris
pub const DEFAULT_LATITUDE: f64 = 48.8566;
pub const DEFAULT_LONGITUDE: f64 = 2.3522;
pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DATABASE_PATH: &str = "data/etl_portfolio.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

/// Daily precipitation (mm) above which a day counts as rainy
pub const RAINY_DAY_THRESHOLD_MM: f64 = 0.5;

/// Upper bound on rows per INSERT statement, keeps bound parameters under SQLite's limit
pub const MAX_ROWS_PER_STATEMENT: usize = 500;
