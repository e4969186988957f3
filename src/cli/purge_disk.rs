//! `purge-disk` command

use std::collections::HashSet;

use tracing::info;

use crate::infrastructure::query_cache::{DiskOverflowStore, PayloadCodec};

pub fn run() -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let cache = &config.cache;

    let store = DiskOverflowStore::new(
        &cache.disk_cache_path,
        PayloadCodec::new(cache.compression_level),
    );
    let removed = store.reclaim_orphans(&HashSet::new())?;

    info!(path = %store.dir().display(), removed, "Purged overflow directory");
    println!("{}", removed);

    Ok(())
}
