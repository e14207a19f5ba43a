//! Parses the repeatable `--forward LOCAL:HOST:PORT` CLI argument.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ForwardRule {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl FromStr for ForwardRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(local_port), Some(remote_host), Some(remote_port)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!(
                "expected LOCAL:HOST:PORT, got {s:?}"
            ));
        };

        let local_port = local_port
            .parse()
            .map_err(|_| format!("invalid local port {local_port:?}"))?;
        let remote_port = remote_port
            .parse()
            .map_err(|_| format!("invalid remote port {remote_port:?}"))?;

        if remote_host.is_empty() {
            return Err("remote host must not be empty".to_string());
        }

        Ok(Self {
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
        })
    }
}

impl fmt::Display for ForwardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
    }
}
