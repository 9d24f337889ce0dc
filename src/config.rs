//! Runtime settings shared by the server and its handlers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TOOL: &str = "looper";
/// Idle time after which a browser session is forgotten (8 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;

#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Manifest given on the command line; falls back to `$CARAVEL` per request.
    pub manifest: Option<PathBuf>,
    pub tool: String,
    pub debug: bool,
    pub host: IpAddr,
    pub port: u16,
    pub session_ttl: Duration,
}

impl PanelConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr())
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            tool: DEFAULT_TOOL.to_string(),
            debug: false,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_is_local() {
        assert_eq!(PanelConfig::default().base_url(), "http://127.0.0.1:5000");
    }
}
