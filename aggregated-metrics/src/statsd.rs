use std::collections::BTreeMap;
use std::fmt;
use std::iter::FusedIterator;

use chrono::{DateTime, Utc};

use crate::protocol::{DecodeError, Event, Metric, Record};

/// The flavor of the line protocol accepted by a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineDialect {
    /// `name:value|type[|@rate]`. Tag segments are accepted but ignored.
    Statsd,
    /// `name:value|type[|@rate][|#tags]` and `_e{..}` events.
    DogStatsd,
}

impl LineDialect {
    /// Returns the name of the dialect for logging.
    pub fn name(&self) -> &'static str {
        match self {
            LineDialect::Statsd => "statsd",
            LineDialect::DogStatsd => "dogstatsd",
        }
    }

    fn parses_tags(&self) -> bool {
        matches!(self, LineDialect::DogStatsd)
    }
}

impl fmt::Display for LineDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a type token of the line protocol to the wire name of the metric type.
fn parse_type(token: &str) -> Result<&'static str, DecodeError> {
    Ok(match token {
        "c" => "counter",
        "g" => "gauge",
        "s" => "set",
        "h" => "histogram",
        "ms" => "timer",
        _ => return Err(DecodeError::InvalidType(token.to_owned())),
    })
}

fn parse_sample_rate(string: &str) -> Result<f64, DecodeError> {
    match string.parse::<f64>() {
        Ok(rate) if rate.is_finite() && (0.0..=1.0).contains(&rate) => Ok(rate),
        _ => Err(DecodeError::InvalidSampleRate(string.to_owned())),
    }
}

/// Parses a unix timestamp in seconds.
fn parse_unix_timestamp(string: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(string.parse().ok()?, 0)
}

/// Parses tags in the format `tag1:value,tag2`.
///
/// A tag without a value maps to itself.
fn parse_tags(string: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();

    for pair in string.split(',') {
        let (name, value) = pair.split_once(':').unwrap_or((pair, pair));
        if name.is_empty() {
            continue;
        }
        map.insert(name.to_owned(), value.to_owned());
    }

    map
}

fn parse_metric(
    string: &str,
    timestamp: DateTime<Utc>,
    dialect: LineDialect,
) -> Result<Metric, DecodeError> {
    let (name, rest) = string
        .split_once(':')
        .ok_or(DecodeError::MissingDelimiter(':'))?;

    if name.is_empty() {
        return Err(DecodeError::EmptyName);
    }

    // Tags may be attached with or without a preceding pipe.
    let (body, tags) = match rest.split_once('#') {
        Some((body, tags)) => (body.strip_suffix('|').unwrap_or(body), Some(tags)),
        None => (rest, None),
    };

    let mut components = body.split('|');
    let value_str = components.next().unwrap_or_default();
    let ty = components
        .next()
        .ok_or(DecodeError::MissingDelimiter('|'))?;

    let value = value_str
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DecodeError::InvalidValue(value_str.to_owned()))?;

    let mut metric = Metric::new(name, parse_type(ty)?, value, timestamp);

    for component in components {
        match component.chars().next() {
            Some('@') => metric.sampling = parse_sample_rate(&component[1..])?,
            Some('T') => {
                if let Some(timestamp) = parse_unix_timestamp(&component[1..]) {
                    metric.timestamp = timestamp;
                }
            }
            _ => (),
        }
    }

    if let Some(tags) = tags.filter(|_| dialect.parses_tags()) {
        metric.tags = parse_tags(tags);
    }

    Ok(metric)
}

/// Parses an event in the format
/// `_e{<title_len>,<text_len>}:<title>|<text>|d:<ts>|h:<host>|k:<key>|p:<prio>|s:<src>|t:<alert>|#<tags>`.
///
/// Lengths are in bytes. Escaped newlines (`\\n`) in the text are unescaped.
fn parse_event(string: &str, timestamp: DateTime<Utc>) -> Result<Event, DecodeError> {
    let header = string.strip_prefix("_e{").ok_or(DecodeError::InvalidEvent)?;
    let (lengths, rest) = header.split_once("}:").ok_or(DecodeError::InvalidEvent)?;
    let (title_len, text_len) = lengths.split_once(',').ok_or(DecodeError::InvalidEvent)?;
    let title_len: usize = title_len.parse().map_err(|_| DecodeError::InvalidEvent)?;
    let text_len: usize = text_len.parse().map_err(|_| DecodeError::InvalidEvent)?;

    let title = rest.get(..title_len).ok_or(DecodeError::InvalidEvent)?;
    let rest = rest
        .get(title_len..)
        .and_then(|r| r.strip_prefix('|'))
        .ok_or(DecodeError::InvalidEvent)?;
    let text = rest.get(..text_len).ok_or(DecodeError::InvalidEvent)?;
    let rest = rest.get(text_len..).ok_or(DecodeError::InvalidEvent)?;

    if title.is_empty() {
        return Err(DecodeError::EmptyName);
    }

    let mut event = Event {
        name: title.to_owned(),
        text: text.replace("\\n", "\n"),
        timestamp,
        ..Default::default()
    };

    if rest.is_empty() {
        return Ok(event);
    }

    let rest = rest.strip_prefix('|').ok_or(DecodeError::InvalidEvent)?;
    for component in rest.split('|') {
        if let Some(tags) = component.strip_prefix('#') {
            event.tags = parse_tags(tags);
            continue;
        }

        let Some((key, value)) = component.split_once(':') else {
            continue;
        };

        match key {
            "d" => {
                if let Some(timestamp) = parse_unix_timestamp(value) {
                    event.timestamp = timestamp;
                }
            }
            "h" => event.host = value.to_owned(),
            "k" => event.aggregation_key = value.to_owned(),
            "p" => event.priority = value.to_owned(),
            "s" => event.source_type = value.to_owned(),
            "t" => event.alert_type = value.to_owned(),
            _ => (),
        }
    }

    Ok(event)
}

/// Parses a single line of the line protocol.
///
/// The `timestamp` is the receive time, used unless the message carries its own.
pub fn parse_line(
    string: &str,
    timestamp: DateTime<Utc>,
    dialect: LineDialect,
) -> Result<Record, DecodeError> {
    if dialect == LineDialect::DogStatsd && string.starts_with("_e{") {
        return parse_event(string, timestamp).map(Record::Event);
    }

    parse_metric(string, timestamp, dialect).map(Record::Metric)
}

/// Parses a datagram of newline separated submissions.
///
/// Returns a result for each line in `slice`, ignoring empty lines. Both UNIX newlines (`\n`)
/// and Windows newlines (`\r\n`) are supported. It is possible to continue consuming the iterator
/// after `Err` is yielded.
///
/// # Example
///
/// ```
/// use aggregated_metrics::{LineDialect, Record, parse_lines};
///
/// let data = b"api.hits:1|c\napi.latency:25|h|#route:/users\n";
///
/// for result in parse_lines(data, chrono::Utc::now(), LineDialect::DogStatsd) {
///     match result.expect("line should parse") {
///         Record::Metric(metric) => println!("metric {}", metric.name),
///         Record::Event(event) => println!("event {}", event.name),
///     }
/// }
/// ```
pub fn parse_lines(slice: &[u8], timestamp: DateTime<Utc>, dialect: LineDialect) -> ParseLines<'_> {
    ParseLines {
        slice,
        timestamp,
        dialect,
    }
}

/// Iterator over parsed records returned from [`parse_lines`].
#[derive(Clone, Debug)]
pub struct ParseLines<'a> {
    slice: &'a [u8],
    timestamp: DateTime<Utc>,
    dialect: LineDialect,
}

impl Iterator for ParseLines<'_> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.slice.is_empty() {
                return None;
            }

            let mut split = self.slice.splitn(2, |&b| b == b'\n');
            let current = split.next()?;
            self.slice = split.next().unwrap_or_default();

            let string = match std::str::from_utf8(current) {
                Ok(string) => string.strip_suffix('\r').unwrap_or(string),
                Err(_) => return Some(Err(DecodeError::InvalidUtf8)),
            };

            if !string.is_empty() {
                return Some(parse_line(string, self.timestamp, self.dialect));
            }
        }
    }
}

impl FusedIterator for ParseLines<'_> {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn metric(line: &str, dialect: LineDialect) -> Metric {
        match parse_line(line, now(), dialect).unwrap() {
            Record::Metric(metric) => metric,
            Record::Event(event) => panic!("expected metric, got {event:?}"),
        }
    }

    fn event(line: &str) -> Event {
        match parse_line(line, now(), LineDialect::DogStatsd).unwrap() {
            Record::Event(event) => event,
            Record::Metric(metric) => panic!("expected event, got {metric:?}"),
        }
    }

    #[test]
    fn test_parse_counter() {
        let metric = metric("page.views:1|c", LineDialect::Statsd);
        insta::assert_debug_snapshot!(metric, @r#"
        Metric {
            name: "page.views",
            host: "",
            timestamp: 2024-03-01T12:00:00Z,
            ty: "counter",
            sampling: 1.0,
            value: 1.0,
            tags: {},
            secondary_data: {},
        }
        "#);
    }

    #[test]
    fn test_parse_type_tokens() {
        for (token, ty) in [
            ("c", "counter"),
            ("g", "gauge"),
            ("s", "set"),
            ("h", "histogram"),
            ("ms", "timer"),
        ] {
            let metric = metric(&format!("foo:2|{token}"), LineDialect::Statsd);
            assert_eq!(metric.ty, ty);
        }
    }

    #[test]
    fn test_parse_sample_rate() {
        let metric = metric("foo:4|c|@0.25", LineDialect::Statsd);
        assert_eq!(metric.sampling, 0.25);
        assert_eq!(metric.value, 4.0);
    }

    #[test]
    fn test_parse_invalid_sample_rate() {
        for line in ["foo:4|c|@1.5", "foo:4|c|@-1", "foo:4|c|@NaN", "foo:4|c|@x"] {
            assert!(
                matches!(
                    parse_line(line, now(), LineDialect::Statsd),
                    Err(DecodeError::InvalidSampleRate(_))
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn test_parse_non_finite_value() {
        for line in ["hits:nan|c", "hits:inf|c", "hits:-infinity|g", "hits:NaN|h"] {
            assert!(
                matches!(
                    parse_line(line, now(), LineDialect::Statsd),
                    Err(DecodeError::InvalidValue(_))
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn test_parse_negative_value() {
        let metric = metric("balance:-9|c", LineDialect::Statsd);
        assert_eq!(metric.value, -9.0);
    }

    #[test]
    fn test_parse_tags_dogstatsd() {
        let metric = metric(
            "api.latency:25|h|@0.5|#route:/users,canary,region:eu",
            LineDialect::DogStatsd,
        );
        insta::assert_debug_snapshot!(metric.tags, @r#"
        {
            "canary": "canary",
            "region": "eu",
            "route": "/users",
        }
        "#);
        assert_eq!(metric.sampling, 0.5);
    }

    #[test]
    fn test_parse_tags_without_pipe() {
        let metric = metric("foo:1|c#env:prod", LineDialect::DogStatsd);
        assert_eq!(metric.ty, "counter");
        assert_eq!(metric.tags.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_parse_tags_ignored_by_statsd() {
        let metric = metric("foo:1|c|#env:prod", LineDialect::Statsd);
        assert!(metric.tags.is_empty());
        assert_eq!(metric.ty, "counter");
    }

    #[test]
    fn test_parse_timestamp_component() {
        let metric = metric("foo:1|g|T1700000000", LineDialect::DogStatsd);
        assert_eq!(metric.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_missing_delimiters() {
        assert!(matches!(
            parse_line("foo1|c", now(), LineDialect::Statsd),
            Err(DecodeError::MissingDelimiter(':'))
        ));
        assert!(matches!(
            parse_line("foo:1c", now(), LineDialect::Statsd),
            Err(DecodeError::MissingDelimiter('|'))
        ));
    }

    #[test]
    fn test_parse_invalid_fields() {
        assert!(matches!(
            parse_line(":1|c", now(), LineDialect::Statsd),
            Err(DecodeError::EmptyName)
        ));
        assert!(matches!(
            parse_line("foo:bar|c", now(), LineDialect::Statsd),
            Err(DecodeError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_line("foo:1|x", now(), LineDialect::Statsd),
            Err(DecodeError::InvalidType(_))
        ));
    }

    #[test]
    fn test_parse_event() {
        let event = event(
            "_e{6,11}:deploy|version\\n42|d:1700000000|h:web-1|k:release|p:low|s:ci|t:info|#team:core",
        );
        insta::assert_debug_snapshot!(event, @r#"
        Event {
            name: "deploy",
            text: "version\n42",
            host: "web-1",
            aggregation_key: "release",
            priority: "low",
            alert_type: "info",
            source_type: "ci",
            timestamp: 2023-11-14T22:13:20Z,
            tags: {
                "team": "core",
            },
        }
        "#);
    }

    #[test]
    fn test_parse_event_minimal() {
        let event = event("_e{5,4}:title|text");
        assert_eq!(event.name, "title");
        assert_eq!(event.text, "text");
        assert_eq!(event.timestamp, now());
    }

    #[test]
    fn test_parse_event_length_mismatch() {
        for line in ["_e{9,4}:title|text", "_e{5,9}:title|text", "_e{5,2}:title|text"] {
            assert!(
                matches!(
                    parse_line(line, now(), LineDialect::DogStatsd),
                    Err(DecodeError::InvalidEvent)
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn test_parse_all() {
        let data = b"foo:1|c\nbar:2|g\r\n\nbaz:3|h\n";
        let names: Vec<_> = parse_lines(data, now(), LineDialect::Statsd)
            .map(|result| match result.unwrap() {
                Record::Metric(metric) => metric.name,
                Record::Event(event) => event.name,
            })
            .collect();

        assert_eq!(names.join(","), "foo,bar,baz");
    }

    #[test]
    fn test_parse_all_continues_after_error() {
        let data = b"foo:1|c\nbroken\nbar:2|g";
        let results: Vec<_> = parse_lines(data, now(), LineDialect::Statsd).collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DecodeError::MissingDelimiter(':'))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_parse_all_invalid_utf8() {
        let data = b"foo:1|c\n\xff\xfe\nbar:2|g";
        let results: Vec<_> = parse_lines(data, now(), LineDialect::Statsd).collect();

        assert!(matches!(results[1], Err(DecodeError::InvalidUtf8)));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_parse_all_empty() {
        assert_eq!(parse_lines(b"\n\r\n", now(), LineDialect::Statsd).count(), 0);
    }
}
