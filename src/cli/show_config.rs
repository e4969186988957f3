//! `config` command

use crate::domain::query_cache::validate_cache_config;

pub fn run() -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    if let Err(errors) = validate_cache_config(&config.cache) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
