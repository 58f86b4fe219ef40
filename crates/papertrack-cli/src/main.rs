use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use papertrack_core::config_file::{self, CacheConfig, ConfigFile, DisplayConfig, ServerConfig};
use papertrack_core::{
    Confirm, PaperId, PaperQuery, RemoteClient, RemoveOutcome, StatusKind, SyncController,
    SyncEvent, ToggleOutcome,
};

mod output;

use output::ColorMode;

/// Paper tracker - browse papers and keep read/favorite/tag state in sync with the server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// API root of the paper server (e.g. http://localhost:8889/api)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Path to the local cache database
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Keep the local cache in memory only
    #[arg(long, global = true)]
    no_cache: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List papers, newest first
    List {
        /// Full-text search term
        #[arg(short, long)]
        search: Option<String>,

        /// Only papers in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only papers with this tag id
        #[arg(long)]
        tag: Option<i64>,

        /// Only papers published within this many days
        #[arg(long)]
        days: Option<i64>,

        /// Page size (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Print each paper's summary
        #[arg(long)]
        summary: bool,
    },

    /// Flip a paper's read flag
    ToggleRead { paper: String },

    /// Flip a paper's favorite flag
    ToggleFavorite { paper: String },

    /// Mark a paper read (if it isn't already) and print its URL
    Open { paper: String },

    /// Reload the read and favorite sets from the server
    Sync,

    /// Show the tag tree, or the tags of one paper
    Tags { paper: Option<String> },

    /// Assign or remove a tag
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// List the categories known to the server
    Categories,

    /// Print a paper's full text
    Fulltext { paper: String },

    /// Show the resolved configuration
    Config {
        /// Write the resolved configuration to the platform config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TagAction {
    /// Assign a tag to a paper
    Add { paper: String, tag_id: i64 },

    /// Remove a tag from a paper
    Rm {
        paper: String,
        tag_id: i64,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Settings after applying CLI flags > env vars > config file > defaults.
struct Settings {
    config: papertrack_core::Config,
    /// Color preference from the config file, before terminal detection.
    color_pref: bool,
    color: ColorMode,
}

fn resolve_settings(cli: &Cli) -> Settings {
    let file = config_file::load_config();
    let mut config = papertrack_core::config_from_file(&file);

    if let Some(url) = cli
        .api_url
        .clone()
        .or_else(|| std::env::var("PAPERTRACK_API_URL").ok())
    {
        config.api_base_url = url;
    }
    if let Some(path) = cli
        .cache
        .clone()
        .or_else(|| std::env::var("PAPERTRACK_CACHE").ok().map(PathBuf::from))
    {
        config.cache_path = Some(path);
    }
    if cli.no_cache {
        config.cache_path = None;
    }
    if let Some(secs) = cli.timeout.or_else(|| {
        std::env::var("PAPERTRACK_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
    }) {
        config.timeout_secs = secs;
    }

    let color_pref = file.display.as_ref().and_then(|d| d.color).unwrap_or(true);
    let color = ColorMode(!cli.no_color && color_pref && std::io::stdout().is_terminal());

    Settings {
        config,
        color_pref,
        color,
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Asks on stderr, reads the answer from stdin. Anything but y/yes declines.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = std::io::stderr();
        if write!(stderr, "{} [y/N] ", prompt).is_err() || stderr.flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but the server refused the change.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = resolve_settings(&cli);
    let color = settings.color;

    if let Command::Config { save } = cli.command {
        return show_config(&settings, save);
    }

    let api = Arc::new(RemoteClient::from_config(&settings.config));
    let store = papertrack_core::open_store(settings.config.cache_path.as_deref());
    let controller = SyncController::new(api, store);

    // Notices go to stderr as they happen; stdout carries command output.
    controller.subscribe(move |event| {
        if let SyncEvent::Notice(notice) = event {
            let _ = output::print_notice(&mut std::io::stderr(), notice, color);
        }
    });

    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::List {
            search,
            category,
            tag,
            days,
            limit,
            offset,
            summary,
        } => {
            refresh_preferences(&controller).await;

            let mut query = PaperQuery::new()
                .limit(limit.unwrap_or(settings.config.page_size))
                .offset(offset);
            if let Some(search) = search {
                query = query.search(search);
            }
            if let Some(category) = category {
                query = query.category(category);
            }
            if let Some(tag) = tag {
                query = query.tag(tag);
            }
            if let Some(days) = days {
                query = query.within_days(days);
            }

            let page =
                papertrack_core::fetch_papers(controller.api(), &query, chrono::Utc::now()).await?;
            controller.absorb_page(&page);
            let cards = controller.cards(&page.papers);
            output::render_papers(&mut out, &cards, summary, color)?;
            if let Some(pagination) = page.pagination
                && pagination.has_more
            {
                writeln!(
                    out,
                    "\n({} of {} shown; use --offset {} for more)",
                    cards.len(),
                    pagination.total,
                    pagination.offset + pagination.limit
                )?;
            }
            Ok(true)
        }

        Command::ToggleRead { paper } => {
            toggle(&controller, StatusKind::Read, paper, &mut out, color).await
        }
        Command::ToggleFavorite { paper } => {
            toggle(&controller, StatusKind::Favorite, paper, &mut out, color).await
        }

        Command::Open { paper } => {
            refresh_preferences(&controller).await;
            let paper_id = PaperId::from(paper);
            let ok = match controller.mark_opened(&paper_id).await {
                Some(ToggleOutcome::RolledBack(_)) => false,
                Some(_) | None => true,
            };
            writeln!(out, "{}", paper_id)?;
            Ok(ok)
        }

        Command::Sync => {
            controller.load_preferences().await?;
            for kind in [StatusKind::Read, StatusKind::Favorite] {
                output::render_status_set(&mut out, kind, &controller.status_set(kind), color)?;
            }
            Ok(true)
        }

        Command::Tags { paper: None } => {
            controller.ensure_taxonomy_loaded().await?;
            output::render_taxonomy(&mut out, &controller.taxonomy(), color)?;
            Ok(true)
        }
        Command::Tags { paper: Some(paper) } => {
            let paper_id = PaperId::from(paper);
            let tags = controller.ensure_paper_tags_loaded(&paper_id).await?;
            // Without a taxonomy the list falls back to bare tag names.
            if let Err(e) = controller.ensure_taxonomy_loaded().await {
                tracing::warn!(error = %e, "failed to load tag taxonomy");
            }
            output::render_paper_tags(&mut out, &paper_id, &tags, &controller.taxonomy(), color)?;
            Ok(true)
        }

        Command::Tag {
            action: TagAction::Add { paper, tag_id },
        } => {
            let paper_id = PaperId::from(paper);
            let tag = controller.resolve_tag(tag_id).await?;
            // Load first so the printed list includes existing assignments.
            controller.ensure_paper_tags_loaded(&paper_id).await?;
            if controller.assign_tag(&paper_id, tag.id, &tag.name).await.is_err() {
                return Ok(false);
            }
            output::render_paper_tags(
                &mut out,
                &paper_id,
                &controller.paper_tags(&paper_id),
                &controller.taxonomy(),
                color,
            )?;
            Ok(true)
        }
        Command::Tag {
            action: TagAction::Rm { paper, tag_id, yes },
        } => {
            let paper_id = PaperId::from(paper);
            let tag = controller.resolve_tag(tag_id).await?;
            controller.ensure_paper_tags_loaded(&paper_id).await?;
            let always = |_: &str| true;
            let confirm: &dyn Confirm = if yes { &always } else { &StdinConfirm };
            match controller.remove_tag(&paper_id, tag.id, &tag.name, confirm).await {
                Ok(RemoveOutcome::Removed) => {
                    output::render_paper_tags(
                        &mut out,
                        &paper_id,
                        &controller.paper_tags(&paper_id),
                        &controller.taxonomy(),
                        color,
                    )?;
                    Ok(true)
                }
                Ok(RemoveOutcome::Cancelled) => {
                    writeln!(out, "Cancelled.")?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }

        Command::Categories => {
            let categories = papertrack_core::fetch_categories(controller.api()).await?;
            output::render_categories(&mut out, &categories)?;
            Ok(true)
        }

        Command::Fulltext { paper } => {
            let text = controller
                .api()
                .fetch_fulltext(&PaperId::from(paper))
                .await?;
            writeln!(out, "{}", text)?;
            Ok(true)
        }

        Command::Config { .. } => unreachable!("handled before the controller is built"),
    }
}

async fn toggle(
    controller: &SyncController,
    kind: StatusKind,
    paper: String,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<bool> {
    refresh_preferences(controller).await;
    let paper_id = PaperId::from(paper);
    let outcome = controller.toggle(kind, &paper_id).await;
    let value = controller.is_set(kind, &paper_id);
    output::print_toggle_result(out, kind, &paper_id, value, &outcome, color)?;
    Ok(!matches!(outcome, ToggleOutcome::RolledBack(_)))
}

/// Pull the server's sets before acting on them; fall back to the local cache.
async fn refresh_preferences(controller: &SyncController) {
    if let Err(e) = controller.load_preferences().await {
        tracing::warn!(error = %e, "using cached read/favorite state");
    }
}

fn show_config(settings: &Settings, save: bool) -> anyhow::Result<bool> {
    let config = &settings.config;
    let cache = config
        .cache_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".to_string());

    let mut out = std::io::stdout().lock();
    writeln!(out, "api_base_url = {}", config.api_base_url)?;
    writeln!(out, "timeout_secs = {}", config.timeout_secs)?;
    writeln!(out, "cache_path   = {}", cache)?;
    writeln!(out, "page_size    = {}", config.page_size)?;

    if save {
        let file = ConfigFile {
            server: Some(ServerConfig {
                api_base_url: Some(config.api_base_url.clone()),
                timeout_secs: Some(config.timeout_secs),
            }),
            cache: Some(CacheConfig {
                path: config
                    .cache_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            }),
            display: Some(DisplayConfig {
                page_size: Some(config.page_size),
                color: Some(settings.color_pref),
            }),
        };
        let path = config_file::save_config(&file).map_err(anyhow::Error::msg)?;
        writeln!(out, "Saved to {}", path.display())?;
    }
    Ok(true)
}
