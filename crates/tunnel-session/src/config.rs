//! Bring-up configuration. Not persisted anywhere — per spec, there are no
//! config files or environment variables; `tunnel-cli` is the sole source
//! of these values, read from its own process flags.

/// The default public STUN server used when the caller doesn't override it.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration shared by both the Offerer and the Responder.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// STUN server URL(s) used for ICE candidate gathering.
    pub ice_servers: Vec<String>,
    /// How long to wait for ICE gathering to complete before giving up.
    pub gather_timeout: std::time::Duration,
    /// How long to wait for the connection to reach `Connected` after the
    /// remote description is set.
    pub connect_timeout: std::time::Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            gather_timeout: std::time::Duration::from_secs(15),
            connect_timeout: std::time::Duration::from_secs(30),
        }
    }
}
