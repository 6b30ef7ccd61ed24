use aggregated_config::Config;
use anyhow::Result;

use crate::cliapp::{config_path, make_app};
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let matches = make_app().get_matches();

    // `--config` is required, so clap exits with a usage error before we get here.
    let Some(path) = config_path(&matches) else {
        anyhow::bail!("no configuration file given");
    };

    let config = Config::from_path(path)?;
    aggregated_log::init(config.logging());

    run(config)
}

/// Checks the configuration and runs the server until it stops.
pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config);
    setup::dump_spawn_infos(&config);

    aggregated_server::run(config)?;

    Ok(())
}
