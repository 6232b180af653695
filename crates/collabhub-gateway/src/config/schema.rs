use serde::Deserialize;
use collabhub_core::error::{CollabError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CollabError::UnsupportedVersion);
        }

        self.gateway.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the WebSocket upgrade route.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Per-connection outbound queue capacity (frames).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Upper bound on a single socket write before the connection is dropped.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ws_path: default_ws_path(),
            outbound_queue: default_outbound_queue(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !self.ws_path.starts_with('/') {
            return Err(CollabError::BadRequest(
                "gateway.ws_path must start with '/'".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(CollabError::BadRequest(
                "gateway.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(100..=60000).contains(&self.write_timeout_ms) {
            return Err(CollabError::BadRequest(
                "gateway.write_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    /// Replace the port of `listen`, keeping the host.
    pub fn override_port(&mut self, port: &str) -> Result<()> {
        let port: u16 = port
            .parse()
            .map_err(|_| CollabError::BadRequest(format!("invalid port: {port}")))?;
        let host = self
            .listen
            .rsplit_once(':')
            .map(|(h, _)| h)
            .unwrap_or("0.0.0.0");
        self.listen = format!("{host}:{port}");
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".into()
}
fn default_ws_path() -> String {
    "/ws".into()
}
fn default_outbound_queue() -> usize {
    256
}
fn default_write_timeout_ms() -> u64 {
    5000
}
