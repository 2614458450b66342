use anyhow::Context;
use std::path::Path;
use templatebot_core::config::WarnLevel;

use super::config::load;

pub fn run(config_path: Option<&Path>, port: u16) -> anyhow::Result<()> {
    let config = load(config_path)?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => tracing::error!("config: {}", w.message),
        }
    }
    if config.has_errors() {
        anyhow::bail!("refusing to start with an invalid configuration (see `templatebot config validate`)");
    }

    let rt = tokio::runtime::Runtime::new().context("starting async runtime")?;
    rt.block_on(templatebot_server::serve(&config, port))
}
