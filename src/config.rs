//! Server configuration: a JSON file loaded through the `config` crate with
//! `AUTHNS_`-prefixed environment overrides, shared between tasks in a
//! CowCell.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use axum_server::tls_rustls::RustlsConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use concread::cowcell::asynch::CowCell;
use config::{Config, Environment, File as ConfigSource};
use gethostname::gethostname;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AuthNsError;
use crate::tsig::{TsigAlgorithm, TsigKey, TsigKeyring};

/// A TSIG key as configured: the secret is base64.
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone)]
pub struct TsigKeyConfig {
    pub name: String,
    pub algorithm: TsigAlgorithm,
    pub secret: String,
}

#[derive(Debug, Deserialize, Eq, PartialEq, Clone, Serialize)]
/// The main config blob. Write this as a JSON file and load it and it'll
/// make things go.
pub struct ConfigFile {
    /// The server's hostname, used to skip ourselves during NOTIFY fan-out.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// DNS listener address for UDP and TCP, default is 127.0.0.1:15353
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Worker tasks draining the UDP queue; 0 means 8 x logical CPUs.
    #[serde(default)]
    pub worker_count: usize,
    /// Bounded depth of the datagram queue between receivers and workers.
    #[serde(default = "default_udp_queue_depth")]
    pub udp_queue_depth: usize,
    /// Token-bucket burst per client IP.
    #[serde(default = "default_rate_limiter_burst")]
    pub rate_limiter_burst: u32,
    /// Token-bucket sustained rate per client IP, queries per second.
    #[serde(default = "default_rate_limiter_sustain")]
    pub rate_limiter_sustain: u32,
    /// Certificate path for DoT and DoH
    #[serde(default)]
    pub tls_cert_path: PathBuf,
    /// TLS key path for DoT and DoH
    #[serde(default)]
    pub tls_key_path: PathBuf,
    /// Serve DNS over TLS on tls_port
    #[serde(default)]
    pub enable_tls: bool,
    /// DoT port, default 853
    #[serde(default = "default_tls_port")]
    pub tls_port: u16,
    /// Serve DNS over HTTPS on doh_port
    #[serde(default)]
    pub enable_doh: bool,
    /// DoH port, default 443
    #[serde(default = "default_doh_port")]
    pub doh_port: u16,
    /// Seconds an L1 entry promoted from L2 stays around.
    #[serde(default = "default_cache_l1_ttl")]
    pub cache_l1_default_ttl: u64,
    /// Remote cache URL (redis://...); no remote cache when unset.
    #[serde(default)]
    pub remote_cache_addr: Option<String>,
    /// Testing hook: send NOTIFY somewhere other than port 53.
    #[serde(default)]
    pub notify_port_override: Option<u16>,
    /// How long until we drop TCP client connections, defaults to 5 seconds.
    #[serde(default = "default_tcp_client_timeout")]
    pub tcp_client_timeout: u64,
    /// Default is "INFO"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Shared secrets for TSIG-signed requests.
    #[serde(default)]
    pub tsig_keys: Vec<TsigKeyConfig>,
    /// A master file to import at startup.
    #[serde(default)]
    pub zone_file: Option<String>,
    /// Tenant tag stamped on zones created by imports.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

fn default_hostname() -> String {
    gethostname().to_string_lossy().to_string()
}
fn default_listen_addr() -> String {
    "127.0.0.1:15353".to_string()
}
fn default_udp_queue_depth() -> usize {
    10_000
}
fn default_rate_limiter_burst() -> u32 {
    200_000
}
fn default_rate_limiter_sustain() -> u32 {
    100_000
}
fn default_tls_port() -> u16 {
    853
}
fn default_doh_port() -> u16 {
    443
}
fn default_cache_l1_ttl() -> u64 {
    60
}
fn default_tcp_client_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_tenant() -> String {
    "default".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            hostname: default_hostname(),
            listen_addr: default_listen_addr(),
            worker_count: 0,
            udp_queue_depth: default_udp_queue_depth(),
            rate_limiter_burst: default_rate_limiter_burst(),
            rate_limiter_sustain: default_rate_limiter_sustain(),
            tls_cert_path: PathBuf::new(),
            tls_key_path: PathBuf::new(),
            enable_tls: false,
            tls_port: default_tls_port(),
            enable_doh: false,
            doh_port: default_doh_port(),
            cache_l1_default_ttl: default_cache_l1_ttl(),
            remote_cache_addr: None,
            notify_port_override: None,
            tcp_client_timeout: default_tcp_client_timeout(),
            log_level: default_log_level(),
            tsig_keys: vec![],
            zone_file: None,
            tenant_id: default_tenant(),
        }
    }
}

impl ConfigFile {
    /// JSONify the configfile in a pretty way using serde
    pub fn as_json_pretty(&self) -> Result<String, AuthNsError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AuthNsError::InvalidValue(format!("failed to serialize config: {e}")))
    }

    /// Get a bindable SocketAddr for use in the DNS listeners
    pub fn dns_listener_address(&self) -> Result<SocketAddr, AuthNsError> {
        self.listen_addr.parse::<SocketAddr>().map_err(|e| {
            error!("Failed to parse listen address {:?}: {e:?}", self.listen_addr);
            AuthNsError::Startup(format!("bad listen_addr {:?}", self.listen_addr))
        })
    }

    /// The DoT listener: same host as the DNS listener, its own port.
    pub fn tls_listener_address(&self) -> Result<SocketAddr, AuthNsError> {
        let mut addr = self.dns_listener_address()?;
        addr.set_port(self.tls_port);
        Ok(addr)
    }

    /// The DoH listener address.
    pub fn doh_listener_address(&self) -> Result<SocketAddr, AuthNsError> {
        let mut addr = self.dns_listener_address()?;
        addr.set_port(self.doh_port);
        Ok(addr)
    }

    /// Worker pool size with the 8-per-core default applied.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores * 8
    }

    /// The configured TSIG keys as a lookup table keyed by normalized name.
    pub fn tsig_keyring(&self) -> Result<TsigKeyring, AuthNsError> {
        let mut keyring = TsigKeyring::new();
        for entry in &self.tsig_keys {
            let secret = BASE64.decode(&entry.secret).map_err(|e| {
                AuthNsError::InvalidValue(format!("TSIG secret for {}: {e}", entry.name))
            })?;
            let key = TsigKey::new(&entry.name, entry.algorithm, &secret);
            keyring.insert(key.name.clone(), key);
        }
        Ok(keyring)
    }

    /// rustls server config for the DoT listener.
    pub fn build_tls_server_config(&self) -> Result<rustls::ServerConfig, std::io::Error> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(&self.tls_cert_path)?))
            .collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&self.tls_key_path)?))?
            .ok_or_else(|| std::io::Error::other("no private key in tls_key_path"))?;
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(std::io::Error::other)
    }

    /// axum-server TLS config for the DoH listener.
    pub async fn get_doh_tls_config(&self) -> Result<RustlsConfig, std::io::Error> {
        RustlsConfig::from_pem_file(self.tls_cert_path.clone(), self.tls_key_path.clone())
            .await
            .map_err(std::io::Error::other)
    }

    /// Sanity checks that should stop startup, collected so the operator
    /// sees all of them at once.
    pub fn check_config(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = vec![];
        if self.dns_listener_address().is_err() {
            errors.push(format!("listen_addr {:?} does not parse", self.listen_addr));
        }
        if self.enable_tls || self.enable_doh {
            if !self.tls_cert_path.exists() {
                errors.push(format!(
                    "Failed to find TLS cert file: {:?}",
                    self.tls_cert_path
                ));
            }
            if !self.tls_key_path.exists() {
                errors.push(format!(
                    "Failed to find TLS key file: {:?}",
                    self.tls_key_path
                ));
            }
        }
        if self.rate_limiter_sustain == 0 || self.rate_limiter_burst == 0 {
            errors.push("rate limiter burst and sustain must be non-zero".to_string());
        }
        if self.tsig_keyring().is_err() {
            errors.push("a TSIG secret failed to decode".to_string());
        }
        match errors.is_empty() {
            true => Ok(()),
            false => Err(errors),
        }
    }

    /// Loads the configuration from a given file plus `AUTHNS_*` environment
    /// overrides. The default location is `./authns.json`.
    pub fn try_from_path(config_path: Option<&String>) -> Result<Self, std::io::Error> {
        let default_path = "authns.json".to_string();
        let path = config_path.unwrap_or(&default_path);
        let mut builder = Config::builder();
        if std::path::Path::new(path).exists() {
            builder = builder.add_source(ConfigSource::with_name(path.trim_end_matches(".json")));
        } else if config_path.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file {path:?} not found"),
            ));
        }
        builder = builder.add_source(Environment::with_prefix("AUTHNS"));
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(std::io::Error::other)
    }

    /// Uses [Self::try_from_path] and wraps it in a CowCell (moo)
    pub fn try_as_cowcell(config_path: Option<&String>) -> Result<CowCell<ConfigFile>, std::io::Error> {
        Ok(CowCell::new(ConfigFile::try_from_path(config_path)?))
    }
}

impl FromStr for ConfigFile {
    type Err = serde_json::Error;

    /// Parse a JSON blob directly, handy in tests.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(input)
    }
}
