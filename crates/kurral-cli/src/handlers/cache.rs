use std::path::Path;

use anyhow::Result;

use kurral_core::cache::{CacheBackend, SqliteCache, DEFAULT_TTL_SECS};

use crate::args::CacheCommands;

pub fn handle(command: CacheCommands, store_root: &Path) -> Result<()> {
    std::fs::create_dir_all(store_root)?;
    let cache = SqliteCache::open(&store_root.join("cache.db"), DEFAULT_TTL_SECS)?;
    match command {
        CacheCommands::Stats => {
            let stats = cache.stats()?;
            println!("Entries: {}", stats.total_entries);
            println!("Valid:   {}", stats.valid_entries);
            println!("Expired: {}", stats.expired_entries);
        }
        CacheCommands::Clear => {
            let before = cache.stats()?.total_entries;
            cache.clear()?;
            println!("Cleared {} entries", before);
        }
    }
    Ok(())
}
