use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use menu_cache::{
    cache::{CacheManager, ProductFilter},
    config::Config,
    optimizer::{BatchImageOptimizer, OptimizationOptions, OptimizationProgress},
    remote::RestClient,
    services::MenuService,
    storage::open_store,
    utils::{
        Clock, SystemClock,
        human_format::{format_bytes, format_duration, format_percentage},
    },
};

#[derive(Parser)]
#[command(name = "menu-cache")]
#[command(version)]
#[command(about = "Cached restaurant menu data with inline image optimization")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "menu-cache.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the menu from the remote store into the cache
    Sync {
        /// Ignore a valid cache and fetch anyway
        #[arg(long)]
        force: bool,
    },
    /// Print the cached menu
    Show {
        #[arg(long)]
        active_only: bool,
        /// Only products of this category id
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive match on product name or description
        #[arg(long)]
        search: Option<String>,
    },
    /// Shrink oversized inline images
    Optimize {
        /// Skip writing the pre-optimization backup
        #[arg(long)]
        no_backup: bool,
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,
    },
    /// List image backups
    Backups,
    /// Restore images from a backup
    Restore { key: String },
    /// Delete one image backup
    DeleteBackup { key: String },
    /// Delete all but the newest backups
    PruneBackups {
        #[arg(long, default_value_t = 3)]
        keep: usize,
    },
    /// Invalidate the cache for every context sharing the store
    Invalidate,
    /// Clear the cached menu
    Clear,
    /// Cache metadata and counters
    Stats,
    /// Write a default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("menu_cache={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Command::InitConfig = cli.command {
        Config::write_default(&cli.config)?;
        return Ok(());
    }

    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    let store = open_store(&config.storage).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(
        CacheManager::open(Arc::clone(&store), Arc::clone(&clock), config.cache.clone()).await?,
    );
    let remote = Arc::new(RestClient::new(&config.remote)?);
    let optimizer = Arc::new(BatchImageOptimizer::new(
        store,
        clock,
        config.optimizer.clone(),
    ));
    let service = MenuService::new(Arc::clone(&cache), remote, optimizer);

    match cli.command {
        Command::Sync { force } => {
            let document = service.load(force).await?;
            println!(
                "{} categories, {} products, {} gallery images, {} tags",
                document.categories.len(),
                document.products.len(),
                document.gallery_images.len(),
                document.product_tags.len()
            );
            if let Some(outcome) = cache.stats().await.last_outcome {
                println!("persisted: {outcome}");
            }
        }
        Command::Show {
            active_only,
            category,
            search,
        } => {
            service.load(false).await?;
            if let Some(restaurant) = cache.restaurant().await {
                println!("{}", restaurant.name);
            }
            let filter = ProductFilter {
                active_only,
                category_id: category,
                search,
            };
            for category in cache.categories(active_only).await {
                println!("[{}] {}", category.id, category.name);
            }
            for product in cache.products(&filter).await {
                println!(
                    "  {:<24} {:>8.2}  {}{}",
                    product.name,
                    product.price,
                    product.category_id.as_deref().unwrap_or("-"),
                    if product.active { "" } else { " (inactive)" }
                );
            }
        }
        Command::Optimize {
            no_backup,
            max_concurrent,
        } => {
            let options = OptimizationOptions {
                create_backup: no_backup.then_some(false),
                max_concurrent,
                ..Default::default()
            };
            let progress = |p: &OptimizationProgress| {
                info!(
                    "Progress {}/{}: {} optimized, {} skipped, {} errors",
                    p.current, p.total, p.optimized, p.skipped, p.errors
                );
            };
            let report = service.optimize_images(&options, Some(&progress)).await?;
            println!(
                "{} optimized, {} skipped, {} errors, {} saved in {}",
                report.progress.optimized,
                report.progress.skipped,
                report.progress.errors,
                format_bytes(report.progress.savings as u64),
                format_duration(report.duration_ms)
            );
            if let Some(key) = report.backup_key {
                println!("backup: {key}");
            }
        }
        Command::Backups => {
            for backup in service.list_backups().await? {
                println!(
                    "{}  {} images  {}",
                    backup.key,
                    backup.image_count,
                    format_bytes(backup.total_size as u64)
                );
            }
        }
        Command::Restore { key } => match service.restore_images(&key).await? {
            Some(report) => {
                println!("restored {} images", report.restored);
                for location in report.missing {
                    println!("  missing: {location}");
                }
            }
            None => println!("backup {key} not found or unreadable"),
        },
        Command::DeleteBackup { key } => {
            if service.delete_backup(&key).await? {
                println!("deleted {key}");
            } else {
                println!("backup {key} not found");
            }
        }
        Command::PruneBackups { keep } => {
            let deleted = service.prune_backups(keep).await?;
            println!("deleted {deleted} backups");
        }
        Command::Invalidate => service.invalidate().await?,
        Command::Clear => service.logout().await?,
        Command::Stats => {
            let metadata = cache.metadata().await;
            let stats = cache.stats().await;
            println!("version:       {}", metadata.version);
            println!("valid:         {}", metadata.valid);
            println!(
                "age:           {}",
                metadata
                    .age_ms
                    .map(|a| format_duration(a.max(0) as u64))
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "last modified: {}",
                metadata
                    .last_modified
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "hits/misses:   {}/{} ({})",
                stats.hits,
                stats.misses,
                format_percentage(stats.hit_rate)
            );
        }
        Command::InitConfig => {}
    }

    Ok(())
}
