use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;
use vmrc_core::{Credentials, FixedConsole};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Static consoles, used when no directory URL is configured.
    #[serde(default)]
    pub consoles: Vec<FixedConsole>,
    #[serde(default)]
    pub tickets: TicketConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Datacenter identifier (e.g. `datacenter-21`) to scope lookups to.
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("datacenter", &self.datacenter)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    /// Seconds an unused ticket stays valid. `0` disables expiry.
    #[serde(default = "default_ticket_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ticket_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl TicketConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ProxyConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn parse_flag(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{name} must be a boolean, got {other:?}"),
    }
}

fn default_ticket_ttl_secs() -> u64 { 120 }
fn default_sweep_interval_secs() -> u64 { 30 }
fn default_flush_interval_ms() -> u64 { 100 }
fn default_connect_timeout_secs() -> u64 { 10 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            directory: DirectoryConfig::default(),
            consoles: Vec::new(),
            tickets: TicketConfig::default(),
            proxy: ProxyConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.directory.username, &self.directory.password)
    }

    /// Loads `VMRC_CONFIG` (if set) and applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::var("VMRC_CONFIG").map(PathBuf::from) {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)?;
                toml::from_str(&contents)?
            }
            Err(_) => ServerConfig::default(),
        };

        config.with_env(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup` and validates the
    /// result.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(url) = lookup("VCENTER") {
            self.directory.url = Some(url);
        }
        if let Some(user) = lookup("VMRC_USER") {
            self.directory.username = user;
        }
        if let Some(pass) = lookup("VMRC_PASS") {
            self.directory.password = pass;
        }
        if let Some(dc) = lookup("VMRC_DATACENTER") {
            self.directory.datacenter = Some(dc);
        }
        if let Some(val) = lookup("VMRC_INSECURE_DIRECTORY") {
            self.directory.accept_invalid_certs = parse_flag("VMRC_INSECURE_DIRECTORY", &val)?;
        }
        if let Some(addr) = lookup("VMRC_BIND_ADDR") {
            self.bind_addr = addr.parse()?;
        }
        if let Some(val) = lookup("VMRC_TICKET_TTL_SECS") {
            self.tickets.ttl_secs = val.parse()?;
        }
        if let Some(val) = lookup("VMRC_FLUSH_INTERVAL_MS") {
            self.proxy.flush_interval_ms = val.parse()?;
        }
        if let Some(val) = lookup("VMRC_CONNECT_TIMEOUT_SECS") {
            self.proxy.connect_timeout_secs = val.parse()?;
        }
        if let Some(cert) = lookup("VMRC_TLS_CERT") {
            self.tls.cert_path = Some(cert);
        }
        if let Some(key) = lookup("VMRC_TLS_KEY") {
            self.tls.key_path = Some(key);
        }

        self.take_url_credentials()?;
        self.validate()?;
        Ok(self)
    }

    /// Moves `user:pass@` from the directory URL into the credential fields
    /// when those are not set explicitly.
    fn take_url_credentials(&mut self) -> anyhow::Result<()> {
        let Some(raw) = self.directory.url.as_deref() else {
            return Ok(());
        };
        let mut url = Url::parse(raw)?;

        if self.directory.username.is_empty() && !url.username().is_empty() {
            self.directory.username = urlencoding::decode(url.username())?.into_owned();
        }
        if self.directory.password.is_empty() {
            if let Some(pass) = url.password() {
                self.directory.password = urlencoding::decode(pass)?.into_owned();
            }
        }

        if !url.username().is_empty() || url.password().is_some() {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            self.directory.url = Some(url.to_string());
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        match &self.directory.url {
            Some(_) => {
                if self.directory.username.is_empty() || self.directory.password.is_empty() {
                    anyhow::bail!(
                        "Directory credentials missing. Set VMRC_USER and VMRC_PASS \
                         or embed them in the VCENTER URL."
                    );
                }
                if self.directory.accept_invalid_certs {
                    tracing::warn!("Directory TLS certificate verification is disabled");
                }
            }
            None if self.consoles.is_empty() => {
                anyhow::bail!(
                    "No console directory configured. Set VCENTER or list [[consoles]] \
                     in the file named by VMRC_CONFIG."
                );
            }
            None => {}
        }

        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            anyhow::bail!("TLS needs both a certificate and a key");
        }
        Ok(())
    }
}
