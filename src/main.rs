use clap::Parser;
use feed_gateway::{
    FeedGateway, FeedItem, FeedSpec, GatewayConfig, HttpBackendConfig, HttpTranslateBackend,
    StaticFeedAdapter,
};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Feed gateway: cached, translated feed resolution")]
struct Args {
    /// SQLite URL for the cache; falls back to DATABASE_URL, then a local file.
    #[arg(long)]
    database_url: Option<String>,

    /// Language to resolve the demo feeds in.
    #[arg(long, default_value = "en")]
    language: String,

    /// Translation service endpoint; omitted, the built-in mock backend is used.
    #[arg(long)]
    translate_endpoint: Option<String>,

    /// Hard TTL for cached entries, in seconds.
    #[arg(long, default_value_t = 86_400)]
    cache_ttl_secs: u64,

    /// Per-feed fetch timeout, in seconds.
    #[arg(long, default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Drop all cached entries before resolving.
    #[arg(long)]
    clear_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    info!("Starting feed gateway");

    let database_url = args
        .database_url
        .or_else(|| env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://feed_gateway.db".to_string());
    info!("Using cache database: {}", database_url);

    let config = GatewayConfig {
        cache_ttl_secs: args.cache_ttl_secs,
        fetch_timeout_secs: args.fetch_timeout_secs,
        database_url,
        ..GatewayConfig::default()
    };

    let mut builder = FeedGateway::builder().with_config(config);
    if let Some(endpoint) = args.translate_endpoint {
        info!("Translating via {}", endpoint);
        let backend = HttpTranslateBackend::new(HttpBackendConfig {
            endpoint,
            ..HttpBackendConfig::default()
        })?;
        builder = builder.with_backend(Arc::new(backend));
    }

    let gateway = builder
        .register_feed(Arc::new(monde_actu()), FeedSpec::new(300, "fr"))
        .register_feed(Arc::new(tech_hebdo()), FeedSpec::new(3_600, "fr"))
        .redirect("actualites", "monde-actu")
        .build()
        .await;

    if args.clear_cache {
        gateway.clear_cache().await?;
        info!("Cache cleared");
    }

    let feed_ids = gateway.feed_ids();
    let responses = gateway.resolve_many(&feed_ids, &args.language).await;
    for response in &responses {
        if response.is_success() {
            info!(
                "{}: {} items, updated {}",
                response.id,
                response.items.len(),
                response.updated_at
            );
            for item in &response.items {
                info!("  - {}", item.title);
            }
        } else {
            error!(
                "{}: {}",
                response.id,
                response.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    info!("Gateway statistics:");
    let mut stats: Vec<_> = gateway.stats().into_iter().collect();
    stats.sort();
    for (key, value) in stats {
        info!("  {}: {}", key, value);
    }
    let mut cache_stats: Vec<_> = gateway.cache_stats().await.into_iter().collect();
    cache_stats.sort();
    info!("Cache statistics:");
    for (key, value) in cache_stats {
        info!("  {}: {}", key, value);
    }

    Ok(())
}

fn monde_actu() -> StaticFeedAdapter {
    StaticFeedAdapter::new(
        "monde-actu",
        vec![
            FeedItem::new(
                "ma-1",
                "Le sommet sur le climat s'ouvre à Genève",
                "https://monde-actu.example/climat-geneve",
            )
            .with_description("Les délégations de quarante pays se réunissent pour une semaine."),
            FeedItem::new(
                "ma-2",
                "Les marchés européens terminent en hausse",
                "https://monde-actu.example/marches-hausse",
            )
            .with_description("Les valeurs technologiques tirent la séance."),
        ],
    )
}

fn tech_hebdo() -> StaticFeedAdapter {
    StaticFeedAdapter::new(
        "tech-hebdo",
        vec![FeedItem::new(
            "th-1",
            "Une nouvelle génération de batteries solides",
            "https://tech-hebdo.example/batteries-solides",
        )
        .with_description("Des prototypes promettent le double d'autonomie.")],
    )
}
