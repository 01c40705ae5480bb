//! Configuration loading
//!
//! Both the server and the console client read a `config.properties` style
//! file. A missing file or a bad value is never fatal: the affected setting
//! falls back to its default and a warning is logged.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 7777;

/// Host the client connects to when none is configured
pub const DEFAULT_HOST: &str = "localhost";

/// Where the binary looks for its configuration by default
pub const DEFAULT_CONFIG_PATH: &str = "./config.properties";

/// Default period of the liveness monitor
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Parsed `KEY=VALUE` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    /// Parse properties text. `#` and `!` start comment lines, the first
    /// `=` or `:` separates key from value.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(|c: char| c == '=' || c == ':') {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { entries }
    }

    /// Load from a file. `None` when the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Some(Self::parse(&text)),
            Err(e) => {
                warn!(
                    "Could not read {} ({}), proceeding with defaults",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse a value, warning and returning `None` if it is present but bad
    fn parse_value<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring unparsable {} value '{}'", key, raw);
                None
            }
        }
    }

    /// The configured port, or [`DEFAULT_PORT`] when absent, unparsable or 0
    pub fn port(&self) -> u16 {
        match self.parse_value::<u16>("PORT") {
            Some(0) | None => DEFAULT_PORT,
            Some(port) => port,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_addr: SocketAddr,
    /// Period of the liveness monitor
    pub monitor_interval: Duration,
    /// Drop sessions that stay silent this long. `None` blocks forever.
    pub idle_timeout: Option<Duration>,
    /// Refuse connections beyond this many live sessions. `None` is unlimited.
    pub max_connections: Option<usize>,
    /// Ring the terminal bell on every delivered line
    pub bell: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            idle_timeout: None,
            max_connections: None,
            bell: false,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on `port` on all interfaces
    pub fn with_port(port: u16) -> Self {
        let mut config = Self::default();
        config.bind_addr.set_port(port);
        config
    }

    pub fn from_properties(props: &Properties) -> Self {
        let mut config = Self::with_port(props.port());
        if let Some(ms) = props.parse_value::<u64>("MONITOR_INTERVAL_MS") {
            if ms > 0 {
                config.monitor_interval = Duration::from_millis(ms);
            }
        }
        config.idle_timeout = props
            .parse_value::<u64>("IDLE_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        config.max_connections = props
            .parse_value::<usize>("MAX_CONNECTIONS")
            .filter(|max| *max > 0);
        config.bell = props.parse_value::<bool>("BELL").unwrap_or(false);
        config
    }

    /// Load from a properties file, falling back to defaults if it is missing
    pub fn load(path: impl AsRef<Path>) -> Self {
        match Properties::load(path) {
            Some(props) => Self::from_properties(&props),
            None => Self::default(),
        }
    }
}

/// Console client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Period of the NUL heartbeat used to detect a dead server
    pub heartbeat: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            heartbeat: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn from_properties(props: &Properties) -> Self {
        let host = props
            .get("HOST")
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();
        Self {
            host,
            port: props.port(),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Self {
        match Properties::load(path) {
            Some(props) => Self::from_properties(&props),
            None => Self::default(),
        }
    }

    /// `host:port` as accepted by `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
