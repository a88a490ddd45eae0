//! Canopy Development Tool
//!
//! Inspect and edit a Canopy page tree from the command line.
//!
//! # Usage
//!
//! ```bash
//! canopy-dev tree
//! canopy-dev add-root "Home"
//! canopy-dev add-child 1 "About us" --slug about
//! canopy-dev move 2 5 last-child
//! canopy-dev publish 2
//! canopy-dev log --page 2
//! canopy-dev aging 30 --live-only
//! canopy-dev locales
//! canopy-dev --metrics delete-locale 3
//! ```
//!
//! # Configuration
//!
//! `--config` (or `CANOPY_CONFIG`, default `canopy.json`, optional) names the
//! config file, then `CANOPY_DB_PATH`, `CANOPY_LANGUAGE_CODE` and
//! `CANOPY_SITE_NAME` apply. The database defaults to `./data/canopy.db`.
//! Actions are recorded as `--user` (or `CANOPY_USER`). Log level comes from
//! `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use canopy_core::config::CanopyConfig;
use canopy_core::db::DatabaseService;
use canopy_core::models::{NewPage, Page, Position};
use canopy_core::services::{aging_pages, AgingFilter, PageService};
use clap::{Parser, Subcommand};

/// Canopy page tree developer tool
#[derive(Parser, Debug)]
#[command(name = "canopy-dev")]
#[command(about = "Inspect and edit a Canopy page tree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (missing file means defaults)
    #[arg(long, env = "CANOPY_CONFIG", default_value = "canopy.json")]
    config: PathBuf,

    /// Actor recorded in the audit log
    #[arg(long, env = "CANOPY_USER", default_value = "canopy-dev")]
    user: String,

    /// Print per-operation query metrics after the command
    #[arg(long)]
    metrics: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every tree with its pages
    Tree,

    /// Create a new tree root in the default locale
    AddRoot {
        title: String,
        /// Slug (derived from the title when omitted)
        #[arg(long)]
        slug: Option<String>,
    },

    /// Create a page as the last child of PARENT_ID
    AddChild {
        parent_id: i64,
        title: String,
        /// Slug (derived from the title when omitted)
        #[arg(long)]
        slug: Option<String>,
    },

    /// Move a page relative to TARGET_ID
    Move {
        page_id: i64,
        target_id: i64,
        /// before, after, first-child, last-child or sorted-child
        #[arg(value_parser = Position::from_str, default_value = "last-child")]
        position: Position,
    },

    /// Publish a page
    Publish { page_id: i64 },

    /// Take a page offline
    Unpublish { page_id: i64 },

    /// Delete a page and its subtree
    Delete { page_id: i64 },

    /// Show the audit log of one page, or the latest entries site-wide
    Log {
        #[arg(long)]
        page: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Published pages, oldest publication first
    Aging {
        /// Only pages last published at least DAYS ago
        days: Option<i64>,
        /// Leave out unpublished pages
        #[arg(long)]
        live_only: bool,
    },

    /// List locales; the default is marked with `*`
    Locales,

    /// Delete a locale, reassigning root pages that use it
    DeleteLocale { locale_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let service = open_service(&cli.config).await?;
    run(&service, cli.command, Some(cli.user.as_str())).await?;

    if cli.metrics {
        println!("\n{}", service.db().metrics().generate_report());
    }
    Ok(())
}

async fn run(service: &PageService, command: Commands, user: Option<&str>) -> Result<()> {
    match command {
        Commands::Tree => print_tree(service).await?,
        Commands::AddRoot { title, slug } => {
            let page = service.add_root(new_page(title, slug), user).await?;
            println!("✅ Created {} id={}", page.url_path, page.id);
        }
        Commands::AddChild {
            parent_id,
            title,
            slug,
        } => {
            let page = service.add_child(parent_id, new_page(title, slug), user).await?;
            println!("✅ Created {} id={}", page.url_path, page.id);
        }
        Commands::Move {
            page_id,
            target_id,
            position,
        } => {
            let page = require_page(service, page_id).await?;
            let target = require_page(service, target_id).await?;
            let outcome = service.move_page(&page, &target, position, user).await?;
            println!(
                "✅ {}: {} -> {}",
                outcome.action, outcome.url_path_before, outcome.url_path_after
            );
        }
        Commands::Publish { page_id } => {
            let page = service.publish_page(page_id, user).await?;
            println!("✅ Published {} id={}", page.url_path, page.id);
        }
        Commands::Unpublish { page_id } => {
            let page = service.unpublish_page(page_id, user).await?;
            println!("✅ Unpublished {} id={}", page.url_path, page.id);
        }
        Commands::Delete { page_id } => {
            service.delete_page(page_id, user).await?;
            println!("✅ Deleted page {} and its subtree", page_id);
        }
        Commands::Log { page, limit } => {
            let entries = match page {
                Some(id) => service.page_history(id).await?,
                None => service.recent_activity(limit).await?,
            };
            for entry in entries {
                println!(
                    "{}  {:<20} page={:<5} {:<12} {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    entry.page_id,
                    entry.actor.as_deref().unwrap_or("-"),
                    entry.label,
                    if entry.deleted { "(deleted)" } else { "" }
                );
                if entry.data.as_object().map_or(false, |data| !data.is_empty()) {
                    println!("    {}", serde_json::to_string(&entry.data)?);
                }
            }
        }
        Commands::Aging { days, live_only } => {
            let filter = AgingFilter {
                last_published_before: days
                    .map(|days| chrono::Utc::now() - chrono::Duration::days(days)),
                live: live_only.then_some(true),
            };
            for row in aging_pages(service.db(), filter).await? {
                println!(
                    "{:<40} {:<12} {:<20} {}",
                    row.page.url_path,
                    row.status,
                    row.page
                        .last_published_at
                        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                    row.last_published_by.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Locales => {
            let locales = service.locales();
            let ctx = locales.context();
            for locale in locales.annotated_locales(&ctx).await? {
                let marker = if locale.is_default_locale(&ctx).await? { "*" } else { " " };
                println!("{} {:<4} {:<8} {}", marker, locale.id, locale.language_code, locale);
            }
        }
        Commands::DeleteLocale { locale_id } => {
            service.locales().delete_locale(locale_id).await?;
            println!("✅ Deleted locale {}", locale_id);
        }
    }
    Ok(())
}

fn new_page(title: String, slug: Option<String>) -> NewPage {
    match slug {
        Some(slug) => NewPage::new(title).with_slug(slug),
        None => NewPage::new(title),
    }
}

async fn open_service(config_path: &Path) -> Result<PageService> {
    let config = CanopyConfig::load(config_path).await?.with_env_overrides();

    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("./data/canopy.db"));
    tracing::debug!("Opening database at {}", db_path.display());

    let db = DatabaseService::new(db_path.clone())
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(PageService::new(Arc::new(db), Arc::new(config)))
}

async fn print_tree(service: &PageService) -> Result<()> {
    let site_name = service.config().site_name.clone();
    for root in service.get_roots().await? {
        print_page(&root, &site_name);
        for page in service.get_descendants(root.id).await? {
            print_page(&page, &site_name);
        }
    }
    Ok(())
}

fn print_page(page: &Page, site_name: &str) {
    let indent = "  ".repeat((page.depth - 1).max(0) as usize);
    println!(
        "{}{} [id={} {} {}]",
        indent,
        page.admin_display_title(site_name),
        page.id,
        page.url_path,
        page.status_string()
    );
}

async fn require_page(service: &PageService, id: i64) -> Result<Page> {
    service
        .get_page(id)
        .await?
        .ok_or_else(|| anyhow!("page {} not found", id))
}
