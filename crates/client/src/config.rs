use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub port: u16,
    pub name: String,
    /// Host a server in-process and connect to it.
    pub local: bool,
    pub auto_load: bool,
    pub auto_ready: bool,
    pub auto_start: bool,
    /// Map JSON to send with `load`. The server's built-in map when unset.
    pub map: Option<PathBuf>,
    pub frame_rate: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: strider::DEFAULT_PORT,
            name: "unnamed".to_string(),
            local: false,
            auto_load: false,
            auto_ready: false,
            auto_start: false,
            map: None,
            frame_rate: 60,
        }
    }
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
