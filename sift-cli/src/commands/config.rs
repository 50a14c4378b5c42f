use anyhow::Context;

use sift_core::config::SiftConfig;

pub fn run(config: &SiftConfig) -> anyhow::Result<()> {
    let text = config
        .to_toml_string()
        .context("Cannot serialize config")?;
    print!("{text}");
    Ok(())
}
