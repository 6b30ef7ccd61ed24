use serde::{Deserialize, Serialize};

/// The list key used for the fallback store if none is configured.
pub const DEFAULT_FALLBACK_KEY: &str = "aggregated-failed";

fn default_timeout() -> u64 {
    10
}

fn default_fallback_key() -> String {
    DEFAULT_FALLBACK_KEY.to_owned()
}

/// Primary time-series output, written through the InfluxDB HTTP API.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct InfluxDbConfig {
    /// Base URL of the InfluxDB server, e.g. `http://localhost:8086`.
    pub url: String,
    /// The database all points are written to.
    pub database: String,
    /// Username for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Optional retention policy passed as `rp` on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_policy: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Configuration for the fallback store, as accepted in the file.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
enum FallbackConfigFromFile {
    /// Only the `redis://` url of the node.
    Url(String),

    /// The url with additional options.
    Full {
        url: String,
        #[serde(default = "default_fallback_key")]
        key: String,
    },
}

/// Secondary output used when the primary write fails.
///
/// Each bucket is serialized to JSON and appended to the list `key` on a Redis server. Accepts
/// either a plain URL or a mapping with `url` and `key`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(from = "FallbackConfigFromFile")]
pub struct FallbackConfig {
    /// The `redis://` URL of the fallback store.
    pub url: String,
    /// The list the buckets are appended to. Defaults to `aggregated-failed`.
    pub key: String,
}

impl From<FallbackConfigFromFile> for FallbackConfig {
    fn from(value: FallbackConfigFromFile) -> Self {
        match value {
            FallbackConfigFromFile::Url(url) => Self {
                url,
                key: default_fallback_key(),
            },
            FallbackConfigFromFile::Full { url, key } => Self { url, key },
        }
    }
}

/// Best effort JSON forwarding of every flushed bucket.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct JsonOutputConfig {
    /// The URL each bucket is sent to with an HTTP `PUT`.
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// All configured outputs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Outputs {
    /// The primary output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub influxdb: Option<InfluxDbConfig>,
    /// The fallback output, attempted once when the primary fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
    /// The JSON forwarding sink, independent of primary and fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonOutputConfig>,
}
