//! TOML configuration parsing and backend config validation.
//!
//! A configuration file selects one storage engine and carries one section
//! per backend:
//!
//! ```toml
//! engine = "elasticsearch"
//!
//! [elasticsearch]
//! scheme = "http"
//! host = "localhost"
//! port = 9200
//! index = "movies"
//!
//! [mongodb]
//! host = "localhost"
//! database = "movieindex"
//! collection = "movies"
//! ```
//!
//! Raw sections deserialize into `*Section` structs, then validate into the
//! typed [`SearchIndexConfig`] / [`DocumentDbConfig`] the adapters consume.
//! Validation failures are [`StoreError::Config`] so a misconfigured backend
//! is rejected before any record is processed.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{de, Deserialize, Deserializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;

pub const DEFAULT_SEARCH_INDEX_PORT: u16 = 9200;
pub const DEFAULT_DOCUMENT_DB_PORT: u16 = 27017;
pub const DEFAULT_AUTH_SOURCE: &str = "admin";
pub const DEFAULT_DOC_TYPE: &str = "movie";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub engine: Engine,
    #[serde(default)]
    pub elasticsearch: Option<SearchIndexSection>,
    #[serde(default)]
    pub mongodb: Option<DocumentDbSection>,
}

/// The two interchangeable storage engines.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Elasticsearch,
    Mongodb,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Elasticsearch => "elasticsearch",
            Engine::Mongodb => "mongodb",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" => Ok(Engine::Elasticsearch),
            "mongodb" => Ok(Engine::Mongodb),
            other => Err(format!(
                "Unknown engine: '{}'. Must be elasticsearch or mongodb.",
                other
            )),
        }
    }
}

/// Raw `[elasticsearch]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchIndexSection {
    pub scheme: String,
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub index: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    #[serde(default = "default_refresh")]
    pub refresh: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_doc_type() -> String {
    DEFAULT_DOC_TYPE.to_string()
}
fn default_refresh() -> bool {
    true
}

/// Raw `[mongodb]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentDbSection {
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub database: String,
    pub collection: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_auth_source")]
    pub dbauth: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_auth_source() -> String {
    DEFAULT_AUTH_SOURCE.to_string()
}

/// Ports may be written as integers or as numeric strings.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port '{}'", text))),
    }
}

/// Validated search-index connection settings.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// `scheme://host:port/`, parsed once.
    pub base_url: Url,
    pub index: String,
    pub doc_type: String,
    pub refresh: bool,
    pub timeout: Option<Duration>,
}

impl SearchIndexConfig {
    /// Validate a raw section.
    ///
    /// Composes `scheme://host:port` and parses it; an empty or non-HTTP
    /// scheme, an empty host, a host that carries its own path, query,
    /// userinfo or port, or an unparseable result is a
    /// [`StoreError::Config`].
    pub fn from_section(section: &SearchIndexSection) -> crate::error::Result<Self> {
        let port = section.port.unwrap_or(DEFAULT_SEARCH_INDEX_PORT);
        let host = section.host.trim();
        let raw = format!("{}://{}:{}", section.scheme.trim(), host, port);

        if !is_bare_host(host) {
            return Err(StoreError::config(format!(
                "malformed source URL '{}': host '{}' must be a bare host name",
                raw, host
            )));
        }

        let base_url = Url::parse(&raw)
            .map_err(|e| StoreError::config(format!("malformed source URL '{}': {}", raw, e)))?;

        match base_url.scheme() {
            "http" | "https" => {}
            "" => {
                return Err(StoreError::config(format!(
                    "malformed source URL '{}': empty scheme",
                    raw
                )))
            }
            other => {
                return Err(StoreError::config(format!(
                    "malformed source URL '{}': unsupported scheme '{}'",
                    raw, other
                )))
            }
        }
        if base_url.host_str().map_or(true, str::is_empty) {
            return Err(StoreError::config(format!(
                "malformed source URL '{}': empty host",
                raw
            )));
        }
        // The composed URL must still point at exactly host:port.
        if base_url.port_or_known_default() != Some(port)
            || base_url.path() != "/"
            || base_url.query().is_some()
            || base_url.fragment().is_some()
        {
            return Err(StoreError::config(format!(
                "malformed source URL '{}': resolves to '{}'",
                raw, base_url
            )));
        }

        let index = section.index.trim();
        if index.is_empty() {
            return Err(StoreError::config("elasticsearch.index must not be empty"));
        }
        let doc_type = section.doc_type.trim();
        if doc_type.is_empty() {
            return Err(StoreError::config(
                "elasticsearch.doc_type must not be empty",
            ));
        }

        Ok(Self {
            base_url,
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            refresh: section.refresh,
            timeout: section.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// A host name or address with nothing attached: no scheme, path, query,
/// fragment, userinfo or port. IPv6 literals must be bracketed.
fn is_bare_host(host: &str) -> bool {
    if host.contains(['/', '\\', '?', '#', '@']) {
        return false;
    }
    match host.strip_prefix('[') {
        Some(rest) => rest.strip_suffix(']').is_some_and(|inner| !inner.contains(['[', ']'])),
        None => !host.contains([':', '[', ']']),
    }
}

/// Validated document-database connection settings.
#[derive(Debug, Clone)]
pub struct DocumentDbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub collection: String,
    pub credentials: Option<Credentials>,
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
    pub auth_source: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

impl DocumentDbConfig {
    pub fn from_section(section: &DocumentDbSection) -> crate::error::Result<Self> {
        let host = section.host.trim();
        if host.is_empty() {
            return Err(StoreError::config("mongodb.host must not be empty"));
        }
        let database = section.database.trim();
        if database.is_empty() {
            return Err(StoreError::config("mongodb.database must not be empty"));
        }
        let collection = section.collection.trim();
        if collection.is_empty() {
            return Err(StoreError::config("mongodb.collection must not be empty"));
        }

        let user = section
            .user
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let credentials = match user {
            Some(user) => Some(Credentials {
                user: user.to_string(),
                password: section.password.clone(),
                auth_source: section.dbauth.clone(),
            }),
            None if section.password.is_some() => {
                return Err(StoreError::config(
                    "mongodb.password is set but mongodb.user is missing",
                ))
            }
            None => None,
        };

        Ok(Self {
            host: host.to_string(),
            port: section.port.unwrap_or(DEFAULT_DOCUMENT_DB_PORT),
            database: database.to_string(),
            collection: collection.to_string(),
            credentials,
            timeout: section.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Validated settings for the selected engine.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    SearchIndex(SearchIndexConfig),
    DocumentDb(DocumentDbConfig),
}

impl StoreConfig {
    pub fn engine(&self) -> Engine {
        match self {
            StoreConfig::SearchIndex(_) => Engine::Elasticsearch,
            StoreConfig::DocumentDb(_) => Engine::Mongodb,
        }
    }
}

impl Config {
    /// Validate the section belonging to `engine`.
    pub fn store_config(&self, engine: Engine) -> Result<StoreConfig> {
        let config = match engine {
            Engine::Elasticsearch => {
                let section = self
                    .elasticsearch
                    .as_ref()
                    .context("engine 'elasticsearch' selected but [elasticsearch] is missing")?;
                StoreConfig::SearchIndex(SearchIndexConfig::from_section(section)?)
            }
            Engine::Mongodb => {
                let section = self
                    .mongodb
                    .as_ref()
                    .context("engine 'mongodb' selected but [mongodb] is missing")?;
                StoreConfig::DocumentDb(DocumentDbConfig::from_section(section)?)
            }
        };
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Fail early on the selected backend
    config.store_config(config.engine)?;

    Ok(config)
}
