use anyhow::Result;
use chrono::Utc;
use inkcal_core::cache::EventCache;
use inkcal_core::config::InkcalConfig;
use inkcal_core::event::datetime;
use owo_colors::OwoColorize;

use super::source_id;

pub fn status(config: &InkcalConfig) -> Result<()> {
    let cache = EventCache::new(config.cache_path());
    let now = Utc::now();

    println!("{}", "Cache".bold());
    println!("  Path:     {}", cache.path().display());

    if !cache.path().exists() {
        println!("  {}", "No cache yet".dimmed());
        return Ok(());
    }

    match cache.load_checked(&source_id(&config.calendars)) {
        Ok(cached) => {
            let written = datetime(cached.header.timestamp);
            let age = written
                .map(|t| (now - t).num_minutes().max(0))
                .map(|m| format!("{}h {}m ago", m / 60, m % 60))
                .unwrap_or_else(|| "unknown".to_string());
            let fresh = cache.is_valid(config.cache_max_age()?, now);

            println!("  Events:   {}", cached.events.len());
            println!("  Source:   {}", cached.header.source_url);
            println!("  Written:  {}", age);
            if fresh {
                println!("  Status:   {}", "fresh".green());
            } else {
                println!("  Status:   {} (older than {})", "stale".yellow(), config.cache_max_age);
            }
        }
        Err(e) => println!("  Status:   {} ({})", "unusable".red(), e),
    }

    Ok(())
}

pub fn clear(config: &InkcalConfig) -> Result<()> {
    let cache = EventCache::new(config.cache_path());
    cache.clear()?;
    println!("Cleared {}", cache.path().display());
    Ok(())
}
