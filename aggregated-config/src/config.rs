use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use aggregated_log::LogConfig;
use aggregated_system::Backpressure;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::outputs::{FallbackConfig, InfluxDbConfig, JsonOutputConfig, Outputs};

/// Default port of the HTTP JSON input.
pub const DEFAULT_HTTP_PORT: u16 = 8003;

/// Default port of the UDP line protocol inputs.
pub const DEFAULT_UDP_PORT: u16 = 8125;

/// Default port of the health endpoint.
pub const DEFAULT_HEALTH_PORT: u16 = 8000;

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating from a specific field.
    Field(&'static str),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// A backend URL could not be parsed or has an unsupported scheme.
    #[error("malformed url")]
    InvalidUrl,
    /// Neither the primary output nor the JSON sink are configured.
    #[error("no outputs defined")]
    NoOutputs,
    /// No input listener is enabled.
    #[error("no inputs defined")]
    NoInputs,
    /// The fallback output is configured without a primary output.
    #[error("fallback output requires a primary influxdb output")]
    FallbackWithoutPrimary,
    /// Two UDP inputs are configured on the same socket address.
    #[error("statsd and dogstatsd inputs cannot share a socket address")]
    AddressConflict,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// A listening socket of an input.
///
/// The port falls back to the default port of the input when omitted.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Whether this input is started.
    pub enabled: bool,
    /// The interface to bind to.
    pub host: IpAddr,
    /// The port to bind to. Defaults to the port of the input.
    pub port: Option<u16>,
}

impl ListenerConfig {
    /// Returns the socket address if this input is enabled.
    pub fn enabled_addr(&self, default_port: u16) -> Option<SocketAddr> {
        let port = self.port.unwrap_or(default_port);
        self.enabled.then(|| SocketAddr::new(self.host, port))
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: None,
        }
    }
}

/// All input listeners.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Inputs {
    /// JSON over HTTP, `POST /metrics`, `/events` and `/metrics_batch`.
    pub http: ListenerConfig,
    /// Plain line protocol over UDP. Tags are ignored.
    pub statsd: ListenerConfig,
    /// Tagged line protocol over UDP, including events.
    pub dogstatsd: ListenerConfig,
}

/// Controls the aggregation engine.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Seconds between two flushes of the aggregated buckets.
    pub flush_interval: u64,
    /// Emit the `aggregated_metric_count` counter for every processed metric.
    pub report_meta_stats: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_interval: 10,
            report_meta_stats: false,
        }
    }
}

/// Controls the channels between listeners and the engine.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of records queued per channel.
    pub capacity: usize,
    /// What listeners do once a channel is full.
    pub backpressure: Backpressure,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            backpressure: Backpressure::Block,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    inputs: Inputs,
    outputs: Outputs,
    aggregator: AggregatorConfig,
    ingest: IngestConfig,
    health: ListenerConfig,
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads and validates the config from the given YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let file = fs::File::open(path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;
        let values: ConfigValues = serde_yaml::from_reader(io::BufReader::new(file))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path))?;

        let config = Config {
            values,
            path: path.to_path_buf(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let values = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?;

        let config = Config {
            values,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ConfigValues {
            inputs,
            outputs,
            aggregator,
            ingest,
            ..
        } = &self.values;

        if outputs.influxdb.is_none() && outputs.json.is_none() {
            return Err(ConfigError::new(ConfigErrorKind::NoOutputs).field("outputs"));
        }

        if outputs.fallback.is_some() && outputs.influxdb.is_none() {
            return Err(ConfigError::new(ConfigErrorKind::FallbackWithoutPrimary)
                .field("outputs.fallback"));
        }

        if let Some(influxdb) = &outputs.influxdb {
            check_url(&influxdb.url, &["http", "https"], "outputs.influxdb.url")?;
            if influxdb.database.is_empty() {
                return Err(
                    ConfigError::new(ConfigErrorKind::InvalidValue)
                        .field("outputs.influxdb.database"),
                );
            }
        }

        if let Some(fallback) = &outputs.fallback {
            check_url(&fallback.url, &["redis", "rediss"], "outputs.fallback.url")?;
            if fallback.key.is_empty() {
                return Err(
                    ConfigError::new(ConfigErrorKind::InvalidValue).field("outputs.fallback.key")
                );
            }
        }

        if let Some(json) = &outputs.json {
            check_url(&json.url, &["http", "https"], "outputs.json.url")?;
        }

        let statsd = inputs.statsd.enabled_addr(DEFAULT_UDP_PORT);
        let dogstatsd = inputs.dogstatsd.enabled_addr(DEFAULT_UDP_PORT);

        let http = inputs.http.enabled_addr(DEFAULT_HTTP_PORT);

        if http.is_none() && statsd.is_none() && dogstatsd.is_none() {
            return Err(ConfigError::new(ConfigErrorKind::NoInputs).field("inputs"));
        }

        if statsd.is_some() && statsd == dogstatsd {
            return Err(ConfigError::new(ConfigErrorKind::AddressConflict).field("inputs"));
        }

        if aggregator.flush_interval == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .field("aggregator.flush_interval"));
        }

        if ingest.capacity == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("ingest.capacity"));
        }

        Ok(())
    }

    /// Returns the path of the loaded configuration file.
    ///
    /// Empty if the config was not loaded from a file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the socket address of the HTTP JSON input, if enabled.
    pub fn http_input_addr(&self) -> Option<SocketAddr> {
        self.values.inputs.http.enabled_addr(DEFAULT_HTTP_PORT)
    }

    /// Returns the socket address of the plain line protocol input, if enabled.
    pub fn statsd_addr(&self) -> Option<SocketAddr> {
        self.values.inputs.statsd.enabled_addr(DEFAULT_UDP_PORT)
    }

    /// Returns the socket address of the tagged line protocol input, if enabled.
    pub fn dogstatsd_addr(&self) -> Option<SocketAddr> {
        self.values.inputs.dogstatsd.enabled_addr(DEFAULT_UDP_PORT)
    }

    /// Returns the primary output.
    pub fn influxdb(&self) -> Option<&InfluxDbConfig> {
        self.values.outputs.influxdb.as_ref()
    }

    /// Returns the fallback output.
    pub fn fallback(&self) -> Option<&FallbackConfig> {
        self.values.outputs.fallback.as_ref()
    }

    /// Returns the JSON forwarding sink.
    pub fn json_output(&self) -> Option<&JsonOutputConfig> {
        self.values.outputs.json.as_ref()
    }

    /// Returns the interval between two flushes.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.values.aggregator.flush_interval)
    }

    /// Returns `true` if the engine reports its own metric count.
    pub fn report_meta_stats(&self) -> bool {
        self.values.aggregator.report_meta_stats
    }

    /// Returns the capacity of each ingestion channel.
    pub fn ingest_capacity(&self) -> usize {
        self.values.ingest.capacity
    }

    /// Returns the full-channel policy of the ingestion channels.
    pub fn backpressure(&self) -> Backpressure {
        self.values.ingest.backpressure
    }

    /// Returns the socket address of the health endpoint, if enabled.
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.values.health.enabled_addr(DEFAULT_HEALTH_PORT)
    }
}

fn check_url(url: &str, schemes: &[&str], field: &'static str) -> Result<(), ConfigError> {
    let parsed =
        Url::parse(url).map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidUrl).field(field))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::new(ConfigErrorKind::InvalidUrl).field(field));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"
inputs:
  http:
    enabled: true
outputs:
  influxdb:
    url: http://localhost:8086
    database: metrics
"#;

    fn kind_of(yaml: &str) -> ConfigErrorKind {
        Config::from_yaml_str(yaml).unwrap_err().kind()
    }

    #[test]
    fn test_minimal_defaults() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(
            config.http_input_addr(),
            Some("0.0.0.0:8003".parse().unwrap())
        );
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.dogstatsd_addr(), None);
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.ingest_capacity(), 10_000);
        assert_eq!(config.backpressure(), Backpressure::Block);
        assert_eq!(config.health_addr(), None);
        assert!(!config.report_meta_stats());
        assert!(config.fallback().is_none());
        assert!(config.json_output().is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
logging:
  level: debug
inputs:
  dogstatsd:
    enabled: true
  statsd:
    enabled: true
    port: 8126
outputs:
  influxdb:
    url: http://influx:8086
    database: metrics
    username: admin
    password: secret
  fallback: redis://127.0.0.1:6379
  json:
    url: http://collector/buckets
aggregator:
  flush_interval: 30
  report_meta_stats: true
ingest:
  capacity: 100
  backpressure: drop
health:
  enabled: true
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(config.dogstatsd_addr(), Some("0.0.0.0:8125".parse().unwrap()));
        assert_eq!(config.statsd_addr(), Some("0.0.0.0:8126".parse().unwrap()));
        assert_eq!(config.http_input_addr(), None);
        assert_eq!(config.influxdb().unwrap().username.as_deref(), Some("admin"));
        assert_eq!(config.fallback().unwrap().key, "aggregated-failed");
        assert_eq!(config.json_output().unwrap().url, "http://collector/buckets");
        assert_eq!(config.flush_interval(), Duration::from_secs(30));
        assert!(config.report_meta_stats());
        assert_eq!(config.ingest_capacity(), 100);
        assert_eq!(config.backpressure(), Backpressure::Drop);
        assert_eq!(config.health_addr(), Some("0.0.0.0:8000".parse().unwrap()));
        assert_eq!(config.logging().level, aggregated_log::Level::Debug);
    }

    #[test]
    fn test_listener_ports() {
        let yaml = r#"
inputs:
  http:
    enabled: true
    host: 127.0.0.1
  dogstatsd:
    enabled: true
    port: 9125
outputs:
  json:
    url: http://collector/buckets
health:
  enabled: true
  port: 9000
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(
            config.http_input_addr(),
            Some("127.0.0.1:8003".parse().unwrap())
        );
        assert_eq!(config.dogstatsd_addr(), Some("0.0.0.0:9125".parse().unwrap()));
        assert_eq!(config.health_addr(), Some("0.0.0.0:9000".parse().unwrap()));
    }

    #[test]
    fn test_udp_ports_differ() {
        let yaml = r#"
inputs:
  statsd:
    enabled: true
  dogstatsd:
    enabled: true
    port: 8126
outputs:
  json:
    url: http://collector/
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.statsd_addr(), Some("0.0.0.0:8125".parse().unwrap()));
    }

    #[test]
    fn test_json_only_output() {
        let yaml = r#"
inputs:
  http:
    enabled: true
outputs:
  json:
    url: http://collector/buckets
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(config.influxdb().is_none());
    }

    #[test]
    fn test_no_outputs() {
        assert_eq!(
            kind_of("inputs:\n  http:\n    enabled: true\n"),
            ConfigErrorKind::NoOutputs
        );
    }

    #[test]
    fn test_no_inputs() {
        let yaml = "outputs:\n  json:\n    url: http://collector/\n";
        assert_eq!(kind_of(yaml), ConfigErrorKind::NoInputs);
    }

    #[test]
    fn test_fallback_without_primary() {
        let yaml = r#"
inputs:
  http:
    enabled: true
outputs:
  json:
    url: http://collector/
  fallback: redis://127.0.0.1/
"#;
        assert_eq!(kind_of(yaml), ConfigErrorKind::FallbackWithoutPrimary);
    }

    #[test]
    fn test_malformed_url() {
        let yaml = MINIMAL.replace("http://localhost:8086", "not a url");
        let error = Config::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidUrl);
        assert_eq!(
            error.to_string(),
            "malformed url (field outputs.influxdb.url)"
        );
    }

    #[test]
    fn test_wrong_fallback_scheme() {
        let yaml = format!("{MINIMAL}  fallback: http://127.0.0.1/\n");
        assert_eq!(kind_of(&yaml), ConfigErrorKind::InvalidUrl);
    }

    #[test]
    fn test_udp_address_conflict() {
        let yaml = r#"
inputs:
  statsd:
    enabled: true
  dogstatsd:
    enabled: true
outputs:
  json:
    url: http://collector/
"#;
        assert_eq!(kind_of(yaml), ConfigErrorKind::AddressConflict);
    }

    #[test]
    fn test_zero_flush_interval() {
        let yaml = format!("{MINIMAL}aggregator:\n  flush_interval: 0\n");
        let error = Config::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(
            error.to_string(),
            "invalid config value (field aggregator.flush_interval)"
        );
    }

    #[test]
    fn test_bad_yaml() {
        assert_eq!(kind_of("inputs: [\n"), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.path(), file.path());
        assert_eq!(config.influxdb().unwrap().database, "metrics");
    }

    #[test]
    fn test_from_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");

        let error = Config::from_path(&path).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.source().is_some());
        assert_eq!(
            error.to_string(),
            format!("could not open config file (file {})", path.display())
        );
    }
}
