use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Node IP advertised in NodePort connection strings
    pub node_ip: String,

    /// Default ingress host template (`${...}` syntax) when a Challenge
    /// does not supply its own
    pub host_template: String,

    /// External auth endpoint injected into ingress annotations; no auth
    /// annotations are emitted when unset
    pub auth_url: Option<String>,

    /// Polling interval between reconcile passes of a live instance
    pub reconcile_interval: Duration,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        let interval_secs = match env::var("RECONCILE_INTERVAL_SECONDS") {
            Ok(v) => v.parse::<u64>().map_err(|_| {
                Error::ConfigError(format!("RECONCILE_INTERVAL_SECONDS is not a number: {}", v))
            })?,
            Err(_) => 10,
        };

        Ok(Self {
            node_ip: env::var("NODE_IP").unwrap_or_else(|_| "localhost".to_string()),
            host_template: env::var("DEFAULT_HOST_TEMPLATE")
                .unwrap_or_else(|_| "${instance}.${source}.${challenge}.ctf.local".to_string()),
            auth_url: env::var("AUTH_URL").ok(),
            reconcile_interval: Duration::from_secs(interval_secs),
        })
    }
}
