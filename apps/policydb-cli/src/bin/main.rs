use std::env;
use std::path::PathBuf;

use anyhow::Context;
use policydb_core::config::Config;
use policydb_hybrid::HybridSearchEngine;
use tracing_subscriber::EnvFilter;

const DEFAULT_TOP_K: usize = 6;
const USAGE: &str = "Usage: policydb-search [--config PATH] [--stats-after N] <query> [top_k]";

struct Args {
    config: Option<PathBuf>,
    stats_after: Option<usize>,
    query: String,
    top_k: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut stats_after = None;
    let mut positional = Vec::new();
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(it.next().context(USAGE)?)),
            "--stats-after" => {
                let n = it.next().context(USAGE)?;
                stats_after = Some(n.parse().with_context(|| format!("invalid --stats-after value '{n}'"))?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let query = positional.next().context(USAGE)?;
    let top_k = match positional.next() {
        Some(k) => k.parse().with_context(|| format!("invalid top_k '{k}'"))?,
        None => DEFAULT_TOP_K,
    };
    Ok(Args { config, stats_after, query, top_k })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let engine = HybridSearchEngine::from_config(&config.engine()?).await?;

    if let Some(n) = args.stats_after {
        for _ in 0..n {
            engine.fast_search(&args.query, args.top_k).await?;
        }
        println!("{}", serde_json::to_string_pretty(&engine.get_performance_stats())?);
        return Ok(());
    }

    let results = engine.fast_search(&args.query, args.top_k).await?;
    let out = serde_json::json!({
        "query": args.query,
        "top_k": args.top_k,
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
