use serde::Deserialize;
use std::path::Path;

/// Engine configuration, typically loaded once by the embedder at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client (IDE) address to connect to.
    pub host: String,
    pub port: u16,
    /// Bound on the whole connect sequence; expiry is reported as its own
    /// failure cause.
    pub connect_timeout_ms: u64,
    /// IDE key echoed in the `init` packet.
    pub ide_key: Option<String>,
    /// Session cookie echoed in the `init` packet.
    pub session_cookie: Option<String>,
    pub max_children: i64,
    pub max_data: i64,
    pub max_depth: i64,
    /// Start sessions with resolved-breakpoint reporting enabled.
    pub resolved_breakpoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            connect_timeout_ms: 200,
            ide_key: None,
            session_cookie: None,
            max_children: 32,
            max_data: 1024,
            max_depth: 1,
            resolved_breakpoints: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
