//! Environment-variable based configuration.

use std::env;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    #[allow(dead_code)]
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub canvas: CanvasConfig,
    pub turn: TurnConfig,
    pub log_level: String,
}

/// Room lifecycle and connection liveness knobs.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long a room with zero connections survives before teardown.
    pub idle_grace_ms: u64,
    /// A connection silent for longer than this is treated as an implicit leave.
    pub liveness_timeout_ms: u64,
    /// Interval of the liveness and room-reaper background sweeps.
    pub sweep_interval_ms: u64,
    /// Per-connection outbound queue cap; overflow force-disconnects the peer.
    pub outbox_capacity: usize,
}

/// Whiteboard canvas bounds used for operation validation.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
}

/// TURN server configuration for ICE credential minting.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub url: String,
    pub secret: String,
    pub enable_tls: bool,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub ports: TurnPorts,
    pub credential_ttl: u64,
}

/// TURN port configuration.
#[derive(Debug, Clone)]
pub struct TurnPorts {
    pub udp: u16,
    pub tcp: u16,
    pub tls: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .unwrap_or(8090),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            room: RoomConfig {
                idle_grace_ms: env::var("ROOM_IDLE_GRACE_MS")
                    .unwrap_or_else(|_| "10000".to_string())
                    .parse()
                    .unwrap_or(10_000),
                liveness_timeout_ms: env::var("LIVENESS_TIMEOUT_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .unwrap_or(30_000),
                sweep_interval_ms: env::var("SWEEP_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1_000),
                outbox_capacity: env::var("OUTBOX_CAPACITY")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()
                    .unwrap_or(256),
            },
            canvas: CanvasConfig {
                width: env::var("CANVAS_WIDTH")
                    .unwrap_or_else(|_| "1920".to_string())
                    .parse()
                    .unwrap_or(1920.0),
                height: env::var("CANVAS_HEIGHT")
                    .unwrap_or_else(|_| "1080".to_string())
                    .parse()
                    .unwrap_or(1080.0),
            },
            turn: TurnConfig {
                url: env::var("TURN_SERVER_URL").unwrap_or_default(),
                secret: env::var("TURN_SECRET").unwrap_or_default(),
                enable_tls: env::var("TURN_ENABLE_TLS")
                    .map(|v| v == "true")
                    .unwrap_or(false),
                enable_udp: env::var("TURN_ENABLE_UDP")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                enable_tcp: env::var("TURN_ENABLE_TCP")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                ports: TurnPorts {
                    udp: env::var("TURN_PORT_UDP")
                        .unwrap_or_else(|_| "3478".to_string())
                        .parse()
                        .unwrap_or(3478),
                    tcp: env::var("TURN_PORT_TCP")
                        .unwrap_or_else(|_| "3478".to_string())
                        .parse()
                        .unwrap_or(3478),
                    tls: env::var("TURN_PORT_TLS")
                        .unwrap_or_else(|_| "443".to_string())
                        .parse()
                        .unwrap_or(443),
                },
                credential_ttl: env::var("TURN_CREDENTIAL_TTL")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            room: RoomConfig {
                idle_grace_ms: 10_000,
                liveness_timeout_ms: 30_000,
                sweep_interval_ms: 1_000,
                outbox_capacity: 256,
            },
            canvas: CanvasConfig {
                width: 1920.0,
                height: 1080.0,
            },
            turn: TurnConfig {
                url: String::new(),
                secret: String::new(),
                enable_tls: false,
                enable_udp: true,
                enable_tcp: true,
                ports: TurnPorts {
                    udp: 3478,
                    tcp: 3478,
                    tls: 443,
                },
                credential_ttl: 3600,
            },
            log_level: "info".to_string(),
        }
    }
}
