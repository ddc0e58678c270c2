use anyhow::Result;
use inkcal_core::config::{CalendarSource, InkcalConfig};
use owo_colors::OwoColorize;

pub fn path() -> Result<()> {
    let config_path = InkcalConfig::config_path()?;
    let config = InkcalConfig::load_from(&config_path)?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    println!("  Cache:   {}", config.cache_path().display());

    Ok(())
}

pub fn init() -> Result<()> {
    let config_path = InkcalConfig::config_path()?;

    if config_path.exists() {
        anyhow::bail!("Config already exists at {}", config_path.display());
    }

    InkcalConfig::create_default_config(&config_path)?;
    println!("Created {}", config_path.display());

    Ok(())
}

pub fn add(name: String, path: String, color: Option<String>) -> Result<()> {
    let mut config = InkcalConfig::load()?;

    config.add_calendar(CalendarSource {
        name: name.clone(),
        path,
        color: color.unwrap_or_default(),
    })?;
    config.save()?;

    println!("Added calendar {}", name.bold());
    Ok(())
}
