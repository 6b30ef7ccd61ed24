use aggregated_config::Config;

/// Warns about settings that are valid but likely unintended.
pub fn check_config(config: &Config) {
    if config.influxdb().is_none() && config.json_output().is_some() {
        aggregated_log::warn!("no primary output configured, buckets are only forwarded as json");
    }

    if config.flush_interval().as_secs() > 300 {
        aggregated_log::warn!(
            "flush interval of {}s keeps buckets in memory for a long time",
            config.flush_interval().as_secs()
        );
    }
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    aggregated_log::info!(
        "launching aggregated from config file {}",
        config.path().display()
    );
    aggregated_log::info!("  log level: {}", config.logging().level);
    aggregated_log::info!("  flush interval: {}s", config.flush_interval().as_secs());
    aggregated_log::info!(
        "  ingest: capacity {}, backpressure {}",
        config.ingest_capacity(),
        config.backpressure()
    );

    match config.influxdb() {
        Some(influxdb) => aggregated_log::info!(
            "  primary output: {} (database {})",
            influxdb.url,
            influxdb.database
        ),
        None => aggregated_log::info!("  primary output: -"),
    }
    match config.fallback() {
        Some(fallback) => aggregated_log::info!(
            "  fallback output: {} (key {})",
            fallback.url,
            fallback.key
        ),
        None => aggregated_log::info!("  fallback output: -"),
    }
    match config.json_output() {
        Some(json) => aggregated_log::info!("  json output: {}", json.url),
        None => aggregated_log::info!("  json output: -"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_config_warns_only() {
        let yaml = r#"
inputs:
  http:
    enabled: true
outputs:
  json:
    url: http://collector/buckets
aggregator:
  flush_interval: 600
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        check_config(&config);
        dump_spawn_infos(&config);
    }
}
