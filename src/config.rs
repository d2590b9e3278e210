use std::time::Duration;
use tracing::warn;

/// Gateway settings, resolved once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub store_host: String,
    pub store_port: u16,
    /// Bound applied separately to connect, write and each read.
    pub store_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            store_host: "localhost".to_string(),
            store_port: 6379,
            store_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable lookup; unset variables keep their
    /// defaults and unparsable numbers are ignored.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(host) = lookup("STORE_HOST") {
            config.store_host = host;
        }
        if let Some(port) = lookup("STORE_PORT") {
            set_parsed(&mut config.store_port, "STORE_PORT", &port);
        }
        if let Some(ms) = lookup("STORE_TIMEOUT_MS") {
            set_parsed(&mut config.store_timeout_ms, "STORE_TIMEOUT_MS", &ms);
        }
        if let Some(bind) = lookup("GATEWAY_BIND") {
            config.bind = bind;
        }
        if let Some(port) = lookup("GATEWAY_PORT") {
            set_parsed(&mut config.port, "GATEWAY_PORT", &port);
        }
        config
    }

    /// Apply command line flags on top of this config.
    pub fn with_args(mut self, args: &[String]) -> Self {
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--port" => {
                    if i + 1 < args.len() {
                        set_parsed(&mut self.port, "--port", &args[i + 1]);
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        self.bind = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--store-host" => {
                    if i + 1 < args.len() {
                        self.store_host = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--store-port" => {
                    if i + 1 < args.len() {
                        set_parsed(&mut self.store_port, "--store-port", &args[i + 1]);
                        i += 1;
                    }
                }
                "--store-timeout-ms" => {
                    if i + 1 < args.len() {
                        set_parsed(&mut self.store_timeout_ms, "--store-timeout-ms", &args[i + 1]);
                        i += 1;
                    }
                }
                other => warn!("Ignoring unknown argument {other}"),
            }
            i += 1;
        }
        self
    }

    pub fn store_addr(&self) -> String {
        format!("{}:{}", self.store_host, self.store_port)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!("Invalid value for {name}: {raw:?}, keeping default"),
    }
}
