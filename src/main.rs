use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pictoboard::{
    PictogramId,
    board::{Board, BoardStore, NewItem, Template, BUILTIN_TEMPLATES},
    config::Config,
    export::{ExportFormat, Exporter},
    library::{CATEGORIES, PictureLibrary, category_name},
    pictogram_cache::PictogramCache,
    search::{IndexCatalog, SearchService},
    utils::format_bytes,
};

#[derive(Parser)]
#[command(name = "pictoboard")]
#[command(version)]
#[command(about = "Offline pictogram search and visual schedule boards")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pictoboard.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search pictograms by keyword
    Search {
        text: String,
        #[arg(short, long)]
        locale: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Fetch images for the first N results
        #[arg(long, default_value_t = 0)]
        prefetch: usize,
    },
    /// Manage the local pictogram cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage imported photos
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Edit the saved board
    Board {
        #[command(subcommand)]
        action: BoardAction,
    },
    /// Export the saved board
    Export {
        #[arg(short, long, default_value = "document")]
        format: ExportFormat,
        destination: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Fetch pictograms into the cache
    Fetch { ids: Vec<PictogramId> },
    /// Apply the configured size and age limits
    Evict,
    /// Remove every cached pictogram
    Clear,
    /// Show cache statistics
    Stats,
    /// Re-read the cache directory
    Scan,
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Import a png, jpg or svg file
    Add {
        file: PathBuf,
        /// Defaults to the file name
        #[arg(short, long, default_value = "")]
        label: String,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(short, long, default_value_t = 0)]
        duration: u32,
    },
    /// Remove an imported image
    Remove { id: Uuid },
    /// List imported images, optionally for one category
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List category keys
    Categories,
}

#[derive(Subcommand)]
enum BoardAction {
    /// List items in display order
    Show,
    /// Append an item, or insert it at a 1-based position
    Add {
        label: String,
        #[arg(short, long)]
        pictogram: Option<PictogramId>,
        /// Use a picture library image instead of a pictogram
        #[arg(short, long, conflicts_with = "pictogram")]
        image: Option<Uuid>,
        #[arg(short, long)]
        at: Option<usize>,
        #[arg(long)]
        category: Option<String>,
        /// Start time as HH:MM
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Move the item at one 1-based position to another
    Move { from: usize, to: usize },
    /// Remove the item at a 1-based position
    Remove { position: usize },
    /// Mark the item at a 1-based position done (or not done with --undo)
    Done {
        position: usize,
        #[arg(long)]
        undo: bool,
    },
    /// Replace the board with a built-in template
    Template {
        /// Template name; lists the templates when omitted
        name: Option<String>,
    },
    /// Rename the board
    Title { title: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("pictoboard={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load_from_file(&cli.config)?;
    info!(
        "Pictoboard v{} (config: {})",
        env!("CARGO_PKG_VERSION"),
        cli.config.display()
    );

    match cli.command {
        Command::Search {
            text,
            locale,
            limit,
            prefetch,
        } => search(&config, &text, locale, limit, prefetch).await,
        Command::Cache { action } => cache(&config, action).await,
        Command::Library { action } => library(&config, action).await,
        Command::Board { action } => board(&config, action).await,
        Command::Export {
            format,
            destination,
        } => export(&config, format, destination).await,
    }
}

async fn search(
    config: &Config,
    text: &str,
    locale: Option<String>,
    limit: usize,
    prefetch: usize,
) -> Result<()> {
    let catalog = IndexCatalog::load_in_background(config.dataset.clone()).await;
    for (locale, reason) in catalog.degraded() {
        warn!("Locale '{}' unavailable: {}", locale, reason);
    }

    let cache = PictogramCache::from_config(&config.cache)?;
    cache.initialize().await?;
    let service = SearchService::new(Arc::new(catalog), cache.clone());

    let locale = locale.unwrap_or_else(|| config.dataset.default_locale.clone());
    let Some(response) = service.search_latest(text, &locale, limit).await? else {
        return Ok(());
    };

    if response.results.is_empty() {
        println!("No pictograms match '{}'", response.query);
        return Ok(());
    }
    for result in &response.results {
        println!(
            "{:>7}  {:>4}  {:<24} {}",
            result.pictogram_id,
            result.score,
            result.keyword,
            result.image.status()
        );
    }

    if prefetch > 0 {
        service.prefetch_images(&response, prefetch);
        for result in response.results.iter().take(prefetch) {
            if let Err(e) = result.image.resolve().await {
                warn!("{}", e);
            }
        }
    }
    Ok(())
}

async fn cache(config: &Config, action: CacheAction) -> Result<()> {
    let cache = PictogramCache::from_config(&config.cache)?;
    cache.initialize().await?;

    match action {
        CacheAction::Fetch { ids } => {
            let mut failed = 0;
            for id in ids {
                match cache.fetch(id).await {
                    Ok(path) => println!("{id}: {}", path.display()),
                    Err(e) => {
                        failed += 1;
                        println!("{id}: {e}");
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} pictogram(s) could not be fetched");
            }
        }
        CacheAction::Evict => {
            let stats = cache.evict(&cache.eviction_policy()).await;
            println!(
                "Evicted {} entries ({}), {} entries remain ({})",
                stats.entries_evicted,
                format_bytes(stats.bytes_freed),
                stats.remaining_entries,
                format_bytes(stats.remaining_bytes)
            );
        }
        CacheAction::Clear => {
            let removed = cache.clear().await;
            println!("Removed {removed} cached pictograms");
        }
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("Directory:  {}", cache.directory().display());
            println!("Entries:    {}", stats.total_entries);
            println!("Present:    {}", stats.present);
            println!("Failed:     {}", stats.failed);
            println!(
                "Storage:    {} of {}",
                format_bytes(stats.storage_usage_bytes),
                format_bytes(cache.eviction_policy().max_bytes)
            );
        }
        CacheAction::Scan => {
            let found = cache.scan().await?;
            println!("Found {found} cached pictograms");
        }
    }
    Ok(())
}

async fn board(config: &Config, action: BoardAction) -> Result<()> {
    let store = BoardStore::from_config(&config.board);
    let (mut board, corrupt) = store.load_or_empty("My Board").await;
    if corrupt.is_some() {
        eprintln!("The saved board could not be read; starting from an empty board.");
    }

    match action {
        BoardAction::Show => {
            print_board(&board);
            return Ok(());
        }
        BoardAction::Add {
            label,
            pictogram,
            image,
            at,
            category,
            time,
            duration,
        } => {
            let mut item = NewItem::new(label);
            if let Some(id) = pictogram {
                item = item.with_pictogram(id);
            }
            if let Some(id) = image {
                let library = PictureLibrary::from_config(&config.library).await?;
                let image = library
                    .get(id)
                    .with_context(|| format!("no library image {id}"))?;
                let defaults = library.to_new_item(image);
                item.image_path = defaults.image_path;
                item.category = defaults.category;
                item.duration_minutes = defaults.duration_minutes;
                if item.label.is_empty() {
                    item.label = defaults.label;
                }
            }
            if let Some(category) = category {
                item = item.with_category(category);
            }
            if let Some(time) = time {
                let time = NaiveTime::parse_from_str(&time, "%H:%M")
                    .with_context(|| format!("invalid time '{time}', expected HH:MM"))?;
                item = item.with_time(time);
            }
            if let Some(minutes) = duration {
                item = item.with_duration(minutes);
            }
            match at {
                Some(position) => board.insert(item, position.saturating_sub(1))?,
                None => board.push(item)?,
            };
        }
        BoardAction::Move { from, to } => {
            let id = board.item_at(from.saturating_sub(1))?.id;
            board.move_item(id, to.saturating_sub(1))?;
        }
        BoardAction::Remove { position } => {
            let id = board.item_at(position.saturating_sub(1))?.id;
            let removed = board.remove(id)?;
            println!("Removed '{}'", removed.label);
        }
        BoardAction::Done { position, undo } => {
            let id = board.item_at(position.saturating_sub(1))?.id;
            board.set_done(id, !undo)?;
        }
        BoardAction::Template { name: None } => {
            for template in BUILTIN_TEMPLATES {
                println!("{} ({} items)", template.name, template.items.len());
            }
            return Ok(());
        }
        BoardAction::Template { name: Some(name) } => {
            let template = Template::find(&name)?;
            board = Board::from_template(template, config.board.max_items)?;

            let cache = PictogramCache::from_config(&config.cache)?;
            cache.initialize().await?;
            info!("Fetching pictograms for '{}'", template.name);
            let results = cache.fetch_all(template.pictogram_ids()).await;
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            for (id, result) in &results {
                if let Err(e) = result {
                    warn!("Pictogram {} unavailable: {}", id, e);
                }
            }
            println!(
                "Fetched {} of {} pictograms",
                results.len() - failed,
                results.len()
            );
        }
        BoardAction::Title { title } => board.set_title(title),
    }

    store.save(&board).await?;
    print_board(&board);
    Ok(())
}

async fn library(config: &Config, action: LibraryAction) -> Result<()> {
    let mut library = PictureLibrary::from_config(&config.library).await?;

    match action {
        LibraryAction::Add {
            file,
            label,
            category,
            duration,
        } => {
            let image = library.add_image(&file, &label, &category, duration).await?;
            println!("Imported '{}' as {}", image.label, image.id);
        }
        LibraryAction::Remove { id } => {
            let image = library.remove_image(id).await?;
            println!("Removed '{}'", image.label);
        }
        LibraryAction::List { category } => {
            let images: Vec<_> = match &category {
                Some(category) => library.by_category(category),
                None => library.images().iter().collect(),
            };
            for image in images {
                println!(
                    "{}  {:<16} {:<24} {}",
                    image.id,
                    category_name(&image.category).unwrap_or(image.category.as_str()),
                    image.label,
                    library.image_path(image).display()
                );
            }
        }
        LibraryAction::Categories => {
            for (key, name) in CATEGORIES {
                println!("{key:<10} {name}");
            }
        }
    }
    Ok(())
}

fn print_board(board: &Board) {
    println!("{} ({} items)", board.title(), board.len());
    for (index, item) in board.items().iter().enumerate() {
        let time = item
            .time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        let pictogram = match (&item.pictogram_id, &item.image_path) {
            (Some(id), _) => format!("#{id}"),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{:>3}. [{}] {:<5} {} {}",
            index + 1,
            if item.done { "x" } else { " " },
            time,
            item.label,
            pictogram
        );
    }
}

async fn export(config: &Config, format: ExportFormat, destination: PathBuf) -> Result<()> {
    let store = BoardStore::from_config(&config.board);
    let board = store
        .load()
        .await?
        .unwrap_or_else(|| Board::with_capacity("My Board", config.board.max_items));

    let cache = PictogramCache::from_config(&config.cache)?;
    cache.initialize().await?;
    let exporter = Exporter::new(cache, config.export.clone(), config.branding.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let report = exporter
        .export(&board.snapshot(), format, &destination, &cancel)
        .await?;
    println!(
        "Exported {} items ({} page(s)) to {}",
        report.items,
        report.pages,
        report.path.display()
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
