use anyhow::Result;
use clap::Parser;
use devaults::app::{self, AppOptions};
use devaults::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Vault & farm state refresh engine with pair-aware pricing")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Account address for user-scoped reads (optional)
    #[arg(long)]
    account: Option<String>,

    /// Refresh interval in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// External price API base URL (overrides config)
    #[arg(long)]
    price_api_url: Option<String>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;

    // CLI args take priority over the config file
    if let Some(interval_ms) = args.interval_ms {
        config.refresh.interval_ms = interval_ms;
    }
    if let Some(price_api_url) = args.price_api_url {
        config.network.price_api_url = Some(price_api_url);
    }

    app::run(
        config,
        AppOptions {
            account: args.account,
            once: args.once,
        },
    )
    .await
}
