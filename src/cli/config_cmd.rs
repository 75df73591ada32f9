//! Configuration commands.

use crate::cli::icons::dim_arrow;
use crate::config::Config;

/// Print the effective configuration as JSON.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    eprintln!("{} Source: {}", dim_arrow(), source);

    println!("{}", config.to_json());
    Ok(())
}
