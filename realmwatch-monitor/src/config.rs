use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

use crate::status::RealmInfo;

/// Shortest poll interval accepted from the environment
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Monitor configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Authentication gateway address
    /// Env: AUTH_ADDRESS (default: "127.0.0.1:3724")
    pub auth_address: String,

    /// World gateway address
    /// Env: WORLD_ADDRESS (default: "127.0.0.1:8085")
    pub world_address: String,

    /// Character database file, opened read-only
    /// Env: DATABASE_PATH (default: "characters.db")
    pub database_path: String,

    /// Table holding characters and their `online` flag
    /// Env: CHARACTER_TABLE (default: "characters")
    pub character_table: String,

    /// Realm name shown with the status
    /// Env: REALM_NAME (default: "WotLK Server")
    pub realm_name: String,

    /// Player capacity shown with the population
    /// Env: MAX_PLAYERS (default: 1000)
    pub max_players: u32,

    /// Uptime text shown with the status, not measured
    /// Env: UPTIME (default: "Unknown")
    pub uptime: String,

    /// Per-probe connect timeout
    /// Env: PROBE_TIMEOUT_MS (default: 2000)
    pub probe_timeout: Duration,

    /// Population query timeout
    /// Env: QUERY_TIMEOUT_MS (default: 3000)
    pub query_timeout: Duration,

    /// How long a composite status is reused
    /// Env: STATUS_TTL_SECS (default: 10)
    pub status_ttl: Duration,

    /// Age after which a fallback player count is reported as stale
    /// Env: POPULATION_TTL_SECS (default: 30)
    pub population_ttl: Duration,

    /// Interval between status checks
    /// Env: POLL_INTERVAL_SECS (default: 30, minimum: 1)
    pub poll_interval: Duration,

    /// Upper bound on one whole status cycle
    /// Env: CYCLE_DEADLINE_MS (default: probe timeout + query timeout + 1s)
    pub cycle_deadline: Duration,

    /// HTTP status server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// HTTP request timeout, also used for the client info fetch
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Base URL of the launcher API serving `/client/info`
    /// Env: CLIENT_INFO_URL (optional, fetch skipped if unset)
    pub client_info_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for local runs mostly
        let defaults = Self::default();
        let probe_timeout = Duration::from_millis(env_or_default("PROBE_TIMEOUT_MS", 2000));
        let query_timeout = Duration::from_millis(env_or_default("QUERY_TIMEOUT_MS", 3000));
        let cycle_deadline = var("CYCLE_DEADLINE_MS")
            .ok()
            .and_then(|val| val.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| default_cycle_deadline(probe_timeout, query_timeout));

        let config = Self {
            auth_address: env_or_default_string("AUTH_ADDRESS", &defaults.auth_address),
            world_address: env_or_default_string("WORLD_ADDRESS", &defaults.world_address),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            character_table: env_or_default_string("CHARACTER_TABLE", &defaults.character_table),
            realm_name: env_or_default_string("REALM_NAME", &defaults.realm_name),
            max_players: env_or_default("MAX_PLAYERS", defaults.max_players),
            uptime: env_or_default_string("UPTIME", &defaults.uptime),
            probe_timeout,
            query_timeout,
            status_ttl: Duration::from_secs(env_or_default("STATUS_TTL_SECS", 10)),
            population_ttl: Duration::from_secs(env_or_default("POPULATION_TTL_SECS", 30)),
            poll_interval: Duration::from_secs(env_or_default("POLL_INTERVAL_SECS", 30)),
            cycle_deadline,
            port: env_or_default("PORT", defaults.port),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            client_info_url: var("CLIENT_INFO_URL").ok().filter(|url| !url.trim().is_empty()),
        };
        config.with_minimum_poll_interval()
    }

    /// Raise a poll interval below one second to one second
    pub fn with_minimum_poll_interval(mut self) -> Self {
        if self.poll_interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                "POLL_INTERVAL_SECS={} is below the minimum, using {}",
                self.poll_interval.as_secs(),
                MIN_POLL_INTERVAL.as_secs()
            );
            self.poll_interval = MIN_POLL_INTERVAL;
        }
        self
    }

    /// Realm details copied into every status snapshot
    pub fn realm(&self) -> RealmInfo {
        RealmInfo {
            realm_name: self.realm_name.clone(),
            max_players: self.max_players,
            uptime: self.uptime.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let realm = RealmInfo::default();
        let probe_timeout = Duration::from_secs(2);
        let query_timeout = Duration::from_secs(3);
        Self {
            auth_address: "127.0.0.1:3724".to_string(),
            world_address: "127.0.0.1:8085".to_string(),
            database_path: "characters.db".to_string(),
            character_table: realmwatch_db::DEFAULT_CHARACTER_TABLE.to_string(),
            realm_name: realm.realm_name,
            max_players: realm.max_players,
            uptime: realm.uptime,
            probe_timeout,
            query_timeout,
            status_ttl: Duration::from_secs(10),
            population_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            cycle_deadline: default_cycle_deadline(probe_timeout, query_timeout),
            port: 3000,
            request_timeout: Duration::from_secs(30),
            client_info_url: None,
        }
    }
}

/// Both sub-timeouts back to back, plus a second of slack
fn default_cycle_deadline(probe_timeout: Duration, query_timeout: Duration) -> Duration {
    probe_timeout + query_timeout + Duration::from_secs(1)
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
