use serde::Deserialize;

use snakesync_core::config::EngineConfig;
use snakesync_core::geometry::BoardSize;

/// Largest accepted board side.
const MAX_BOARD_SIDE: u32 = 1024;

/// Top-level server configuration, loaded from `snakesync.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub game: GameSizeConfig,
    pub engine: EngineConfig,
    pub limits: LimitsConfig,
}

/// Board dimensions shared by every session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSizeConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for GameSizeConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
        }
    }
}

impl GameSizeConfig {
    pub fn board(&self) -> BoardSize {
        BoardSize::new(self.width, self.height)
    }
}

/// Infrastructure limits (connection caps, buffer sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub max_sse_subscribers: usize,
    pub max_stored_writes: usize,
    /// Session records kept before the oldest ended ones are evicted.
    pub max_records: usize,
    pub broadcast_capacity: usize,
    /// Outbound messages queued per player before frames are dropped.
    pub player_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            max_sse_subscribers: 100,
            max_stored_writes: 1000,
            max_records: 10_000,
            broadcast_capacity: 1024,
            player_message_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidListenAddr(String),
    InvalidBoard { width: u32, height: u32 },
    ZeroTickPeriod,
    ZeroSnakeLength,
    SnakeTooLong { length: usize, cells: u64 },
    ZeroLimit(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenAddr(addr) => {
                write!(f, "listen_addr is not a valid socket address: {addr}")
            },
            Self::InvalidBoard { width, height } => write!(
                f,
                "board must be between 1x1 and {MAX_BOARD_SIDE}x{MAX_BOARD_SIDE}, got {width}x{height}"
            ),
            Self::ZeroTickPeriod => write!(f, "engine.tick_period_ms must be > 0"),
            Self::ZeroSnakeLength => write!(f, "engine.initial_length must be > 0"),
            Self::SnakeTooLong { length, cells } => write!(
                f,
                "engine.initial_length {length} does not fit a board of {cells} cells"
            ),
            Self::ZeroLimit(name) => write!(f, "limits.{name} must be > 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    pub fn board(&self) -> BoardSize {
        self.game.board()
    }

    /// Check the configuration before anything is bound or spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }

        let GameSizeConfig { width, height } = self.game;
        if !(1..=MAX_BOARD_SIDE).contains(&width) || !(1..=MAX_BOARD_SIDE).contains(&height) {
            return Err(ConfigError::InvalidBoard { width, height });
        }

        if self.engine.tick_period_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if self.engine.initial_length == 0 {
            return Err(ConfigError::ZeroSnakeLength);
        }
        let cells = self.board().cell_count();
        if self.engine.initial_length as u64 > cells {
            return Err(ConfigError::SnakeTooLong {
                length: self.engine.initial_length,
                cells,
            });
        }

        let limits = [
            ("max_ws_connections", self.limits.max_ws_connections),
            ("max_sse_subscribers", self.limits.max_sse_subscribers),
            ("max_stored_writes", self.limits.max_stored_writes),
            ("max_records", self.limits.max_records),
            ("broadcast_capacity", self.limits.broadcast_capacity),
            ("player_message_buffer", self.limits.player_message_buffer),
        ];
        if let Some((name, _)) = limits.into_iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroLimit(name));
        }

        if self.engine.seed.is_some() {
            tracing::warn!("engine.seed is set: fruit placement is reproducible across sessions");
        }

        Ok(())
    }

    /// Load config from `snakesync.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("snakesync.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from snakesync.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse snakesync.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No snakesync.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("SNAKESYNC_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("SNAKESYNC_GAME_WIDTH")
            && let Ok(n) = val.parse::<u32>()
        {
            config.game.width = n;
        }
        if let Ok(val) = std::env::var("SNAKESYNC_GAME_HEIGHT")
            && let Ok(n) = val.parse::<u32>()
        {
            config.game.height = n;
        }
        if let Ok(val) = std::env::var("SNAKESYNC_TICK_PERIOD_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.engine.tick_period_ms = n;
        }

        config
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            game: GameSizeConfig::default(),
            engine: EngineConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}
