use crate::error::{Error, Result};
use clap::Parser;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "2023-05-15";
pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_MAX_TOKENS: u32 = 800;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Names the local env file to load before parsing arguments.
pub const ENV_FILE_VAR: &str = "EATWISE_ENV_FILE";
const DEFAULT_ENV_FILE: &str = ".env";

/// Eat Wise nutrition backend
///
/// Every option falls back to its environment variable. Values are checked
/// after parsing so that a missing or empty setting is reported by name.
#[derive(Parser, Debug, Default)]
#[command(name = "eatwise")]
#[command(about = "Nutrition assistant backend for an Azure OpenAI deployment")]
pub struct Args {
    /// Azure API key
    #[arg(long, env = "AZURE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Azure API version [default: 2023-05-15]
    #[arg(long, env = "AZURE_API_VERSION")]
    pub api_version: Option<String>,

    /// Azure endpoint base URL
    #[arg(short = 'e', long, env = "AZURE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Azure OpenAI deployment name
    #[arg(short, long, env = "AZURE_OPENAI_DEPLOYMENT")]
    pub deployment: Option<String>,

    /// Port to listen on [default: 4000]
    #[arg(short, long, env = "PORT")]
    pub port: Option<String>,

    /// Address to listen on [default: 0.0.0.0]
    #[arg(long, env = "EATWISE_HOST")]
    pub host: Option<String>,

    /// Completion token limit per request [default: 800]
    #[arg(long, env = "EATWISE_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, 0 to 2 [default: 0.2]
    #[arg(long, env = "EATWISE_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Upstream request timeout in seconds [default: 60]
    #[arg(long, env = "EATWISE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

/// API key holder. Never printed; logs use [`Secret::fingerprint`].
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars of the SHA-256 of the key.
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        hex::encode(hash)[..12].to_string()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(sha256:{})", self.fingerprint())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub endpoint: Url,
    pub deployment: String,
    pub api_version: String,
    pub api_key: Secret,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl TryFrom<Args> for Config {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        let api_key = required("AZURE_API_KEY", args.api_key)?;
        let endpoint = parse_endpoint(&required("AZURE_ENDPOINT", args.endpoint)?)?;
        let deployment = required("AZURE_OPENAI_DEPLOYMENT", args.deployment)?;
        if !deployment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::Config(format!(
                "AZURE_OPENAI_DEPLOYMENT contains invalid characters: {deployment:?}"
            )));
        }
        let api_version = optional("AZURE_API_VERSION", args.api_version)?
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let port = match optional("PORT", args.port)? {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {raw:?}")))?,
            None => DEFAULT_PORT,
        };
        let host = match optional("EATWISE_HOST", args.host)? {
            Some(raw) => raw.parse::<IpAddr>().map_err(|_| {
                Error::Config(format!("EATWISE_HOST is not an IP address: {raw:?}"))
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let max_tokens = args.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(Error::Config("EATWISE_MAX_TOKENS must be positive".into()));
        }
        let temperature = args.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::Config(format!(
                "EATWISE_TEMPERATURE must be between 0 and 2, got {temperature}"
            )));
        }
        let timeout_secs = args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(Error::Config("EATWISE_TIMEOUT_SECS must be positive".into()));
        }

        Ok(Self {
            host,
            port,
            endpoint,
            deployment,
            api_version,
            api_key: Secret::new(api_key),
            max_tokens,
            temperature,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn required(name: &str, value: Option<String>) -> Result<String> {
    optional(name, value)?.ok_or_else(|| Error::Config(format!("{name} is not set")))
}

/// Absent is fine, present-but-blank is not.
fn optional(name: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Err(Error::Config(format!("{name} is empty"))),
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("AZURE_ENDPOINT is not a valid URL ({e}): {raw:?}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(Error::Config(format!(
            "AZURE_ENDPOINT must be an http(s) URL: {raw:?}"
        )));
    }
    Ok(url)
}

/// Load the local env file named by `EATWISE_ENV_FILE` (default `.env`).
pub fn load_env_file() -> Result<Option<PathBuf>> {
    let path = std::env::var_os(ENV_FILE_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
    load_env_file_from(&path)
}

/// Variables already present in the environment are left untouched.
/// Parse errors never echo the offending line, it may hold a secret.
pub fn load_env_file_from(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    dotenvy::from_path(path).map_err(|err| {
        let reason = match err {
            dotenvy::Error::LineParse(_, index) => format!("malformed entry at offset {index}"),
            other => other.to_string(),
        };
        Error::Config(format!("cannot load {}: {}", path.display(), reason))
    })?;
    Ok(Some(path.to_path_buf()))
}

#[cfg(test)]
pub(crate) fn test_config(endpoint: &str) -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        endpoint: Url::parse(endpoint).expect("test endpoint"),
        deployment: "test-deployment".to_string(),
        api_version: DEFAULT_API_VERSION.to_string(),
        api_key: Secret::new("test-secret-key"),
        max_tokens: DEFAULT_MAX_TOKENS,
        temperature: DEFAULT_TEMPERATURE,
        timeout: Duration::from_secs(5),
    }
}
