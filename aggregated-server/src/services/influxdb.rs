//! InfluxDB line protocol encoding and the primary backend.

use std::fmt::Write;
use std::time::Duration;

use aggregated_config::InfluxDbConfig;
use aggregated_metrics::{Bucket, Scalar};
use futures::future::BoxFuture;
use url::Url;

use crate::services::export::{Backend, ExportError};

/// Appends `value` with a backslash before every character in `special`.
fn escape(output: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            output.push('\\');
        }
        output.push(c);
    }
}

fn escape_measurement(output: &mut String, value: &str) {
    escape(output, value, &[',', ' ']);
}

fn escape_key(output: &mut String, value: &str) {
    escape(output, value, &[',', '=', ' ']);
}

fn write_field_value(output: &mut String, value: &Scalar) -> bool {
    match value {
        Scalar::Float(value) if value.is_finite() => {
            let _ = write!(output, "{value}");
        }
        // Line protocol has no representation for NaN and infinity.
        Scalar::Float(_) => return false,
        Scalar::Bool(value) => {
            let _ = write!(output, "{value}");
        }
        Scalar::String(value) => {
            output.push('"');
            escape(output, value, &['"', '\\']);
            output.push('"');
        }
    }
    true
}

/// Appends one point for the bucket and returns `false` if the bucket has no writable fields.
fn write_point(output: &mut String, bucket: &Bucket) -> bool {
    let start = output.len();

    escape_measurement(output, &bucket.name);
    for (key, value) in &bucket.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        output.push(',');
        escape_key(output, key);
        output.push('=');
        escape_key(output, value);
    }

    let mut separator = ' ';
    for (key, value) in &bucket.fields {
        let field_start = output.len();
        output.push(separator);
        escape_key(output, key);
        output.push('=');
        if write_field_value(output, value) {
            separator = ',';
        } else {
            output.truncate(field_start);
        }
    }

    if separator == ' ' {
        output.truncate(start);
        return false;
    }

    if let Some(nanos) = bucket.timestamp.timestamp_nanos_opt() {
        let _ = write!(output, " {nanos}");
    }
    output.push('\n');
    true
}

/// Encodes buckets in the InfluxDB line protocol.
///
/// Every bucket becomes one point with the bucket name as measurement. Buckets without any
/// representable field are skipped.
pub fn encode_points(buckets: &[Bucket]) -> String {
    let mut output = String::new();
    for bucket in buckets {
        if !write_point(&mut output, bucket) {
            aggregated_log::debug!(bucket = %bucket.name, "skipping bucket without fields");
        }
    }
    output
}

/// Returns a copy of `base` with `segment` appended to its path.
fn endpoint(base: &Url, segment: &str) -> Result<Url, ExportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// The primary time-series backend.
#[derive(Clone, Debug)]
pub struct InfluxDbBackend {
    client: reqwest::Client,
    write_url: Url,
    ping_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxDbBackend {
    /// Creates the HTTP client for the configured server.
    pub fn new(config: &InfluxDbConfig) -> Result<Self, ExportError> {
        let base = Url::parse(&config.url)?;

        let mut write_url = endpoint(&base, "write")?;
        {
            let mut query = write_url.query_pairs_mut();
            query.append_pair("db", &config.database);
            if let Some(rp) = &config.retention_policy {
                query.append_pair("rp", rp);
            }
            query.append_pair("precision", "ns");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            write_url,
            ping_url: endpoint(&base, "ping")?,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Returns the URL that points are written to.
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Returns `true` if the server answers its ping endpoint with a success status.
    pub async fn ping(&self) -> bool {
        match self.client.get(self.ping_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                aggregated_log::debug!(
                    error = &error as &dyn std::error::Error,
                    "influxdb ping failed"
                );
                false
            }
        }
    }

    async fn write_points(&self, buckets: &[Bucket]) -> Result<(), ExportError> {
        let body = encode_points(buckets);
        if body.is_empty() {
            return Ok(());
        }

        let mut request = self.client.post(self.write_url.clone()).body(body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status));
        }

        Ok(())
    }
}

impl Backend for InfluxDbBackend {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    fn write<'a>(&'a self, buckets: &'a [Bucket]) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(self.write_points(buckets))
    }
}
