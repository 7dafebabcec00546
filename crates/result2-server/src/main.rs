use clap::Parser;
use result2_server::{Result2Server, cli::Args, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let cfg = match args.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    observability::init_tracing(&cfg.logging);
    tracing::info!(
        path = %args.config,
        backend = if cfg.redis.enabled { "redis" } else { "memory" },
        cache_enabled = cfg.cache.enabled,
        "Configuration loaded"
    );

    Result2Server::builder().with_config(cfg).build().await.run().await
}
