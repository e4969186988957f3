//! `stats` command

use std::sync::Arc;

use clap::Args;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::query_cache::QueryScope;
use crate::infrastructure::embedding::HashingEmbeddingProvider;
use crate::infrastructure::observability::init_metrics;
use crate::infrastructure::query_cache::QueryResultCache;

const DEMO_NETWORKS: [&str; 2] = ["dc1-fabric", "dc2-fabric"];
const DEMO_SNAPSHOT: &str = "latest";

#[derive(Args, Debug, Clone, Default)]
pub struct StatsArgs {
    /// Run a demo workload of N queries before printing
    #[arg(long, value_name = "N")]
    pub demo: Option<usize>,

    /// Print Prometheus exposition text instead of the JSON snapshot
    #[arg(long)]
    pub prometheus: bool,
}

pub async fn run(args: StatsArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let exporter = if args.prometheus {
        init_metrics(config.cache.metrics_enabled)
    } else {
        None
    };
    let cache = QueryResultCache::new(config.cache)?
        .with_embedding_provider(Arc::new(HashingEmbeddingProvider::new()));

    if let Some(count) = args.demo {
        run_demo(&cache, count).await?;
    }

    match exporter {
        Some(exporter) => print!("{}", exporter.render()),
        None => println!("{}", serde_json::to_string_pretty(&cache.stats()?)?),
    }

    Ok(())
}

fn demo_result(device: usize) -> Value {
    let rows: Vec<Value> = (0..20)
        .map(|i| {
            json!({
                "device": format!("leaf-{}", device),
                "interface": format!("Ethernet{}", i),
                "state": if i % 7 == 0 { "down" } else { "up" },
            })
        })
        .collect();

    json!({ "rows": rows })
}

/// Store `count` results, then look each up exactly and by paraphrase
async fn run_demo(cache: &QueryResultCache, count: usize) -> anyhow::Result<()> {
    for i in 0..count {
        let scope = QueryScope::new(DEMO_NETWORKS[i % DEMO_NETWORKS.len()], DEMO_SNAPSHOT);
        let query = format!("show interfaces on leaf-{}", i);
        cache.put(&query, &scope, demo_result(i)).await?;
    }

    let mut semantic = 0;

    for i in 0..count {
        let scope = QueryScope::new(DEMO_NETWORKS[i % DEMO_NETWORKS.len()], DEMO_SNAPSHOT);
        cache
            .get(&format!("show interfaces on leaf-{}", i), &scope)
            .await?;

        let paraphrase = format!("on leaf-{} show interfaces", i);
        if let Some(found) = cache.get(&paraphrase, &scope).await? {
            if found.is_semantic() {
                semantic += 1;
            }
        }
    }

    info!(count, semantic, "Demo workload finished");

    Ok(())
}
