use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::clipboard::{classify, ClipboardSource, MemoryClipboard, SystemClipboard};
use crate::config::Config;
use crate::engine::AppContext;
use crate::history::ClipboardItem;
use crate::markdown::MarkdownConverter;

#[derive(Parser)]
#[command(name = "clipstash")]
#[command(about = "Clipboard history with pinning and Markdown conversion")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Watch the clipboard and save new content until interrupted")]
    Watch,

    #[command(about = "Pin text, or the current clipboard content when none is given")]
    Pin { text: Option<String> },

    #[command(about = "List history items, newest first")]
    List {
        #[arg(short, long)]
        pinned: bool,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Search history items")]
    Search {
        query: String,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Copy a history item back to the clipboard")]
    Copy {
        id: i64,

        #[arg(long, conflicts_with = "plain")]
        markdown: bool,

        #[arg(long)]
        plain: bool,
    },

    #[command(about = "Delete a history item")]
    Delete { id: i64 },

    #[command(about = "Delete all history items")]
    Clear {
        #[arg(long, help = "Only delete pinned items")]
        pinned: bool,
    },

    #[command(about = "Convert HTML from a file or stdin to Markdown")]
    Markdown { file: Option<PathBuf> },

    #[command(about = "Convert HTML from a file or stdin to plain text")]
    Strip { file: Option<PathBuf> },

    #[command(about = "Show how text would be classified")]
    Classify { text: String },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config: Config,
    config_path: Option<PathBuf>,
    context: Option<Arc<AppContext>>,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Config::load_config(config_path.as_deref())?;

        Ok(Self {
            config,
            config_path,
            context: None,
        })
    }

    /// Lazily open the history and clipboard when needed
    fn ensure_context(&mut self) -> Result<Arc<AppContext>> {
        if let Some(context) = &self.context {
            return Ok(Arc::clone(context));
        }

        info!("Opening clipboard history");
        let clipboard: Arc<dyn ClipboardSource> = match SystemClipboard::new() {
            Ok(clipboard) => Arc::new(clipboard),
            Err(e) => {
                warn!("System clipboard unavailable, using in-memory clipboard: {}", e);
                Arc::new(MemoryClipboard::new())
            }
        };

        let context = Arc::new(AppContext::open(self.config.clone(), clipboard)?);
        self.context = Some(Arc::clone(&context));
        Ok(context)
    }

    pub async fn handle_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Watch => self.watch().await,
            Commands::Pin { text } => self.pin(text).await,
            Commands::List {
                pinned,
                limit,
                json,
            } => self.list(pinned, limit, json).await,
            Commands::Search { query, json } => self.search(&query, json).await,
            Commands::Copy {
                id,
                markdown,
                plain,
            } => self.copy(id, markdown, plain).await,
            Commands::Delete { id } => {
                self.ensure_context()?.delete_item(id).await?;
                println!("Deleted item {}", id);
                Ok(())
            }
            Commands::Clear { pinned } => self.clear(pinned).await,
            Commands::Markdown { file } => {
                let input = read_input(file.as_deref())?;
                let converter = MarkdownConverter::html()?;
                println!("{}", converter.convert_or_raw_async(&input).await);
                Ok(())
            }
            Commands::Strip { file } => {
                let input = read_input(file.as_deref())?;
                let converter = MarkdownConverter::html()?;
                println!("{}", converter.strip_to_plain_text_async(&input).await);
                Ok(())
            }
            Commands::Classify { text } => {
                println!("{}", classify(&text));
                Ok(())
            }
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn watch(&mut self) -> Result<()> {
        // Watching implies saving, whatever the file says.
        self.config.auto_monitor_enabled = true;
        let context = self.ensure_context()?;

        let subscription = context.subscribe(|items| {
            match items.first() {
                Some(latest) => info!("{} items, latest: {}", items.len(), latest.preview),
                None => info!("History is empty"),
            }
        });
        context.start();

        println!(
            "Watching clipboard every {:?}, press Ctrl+C to stop",
            self.config.polling_duration()
        );
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;

        subscription.cancel();
        context.shutdown();
        Ok(())
    }

    async fn pin(&mut self, text: Option<String>) -> Result<()> {
        let context = self.ensure_context()?;
        let item = match text {
            Some(text) if !text.trim().is_empty() => context.pin_text(&text).await?,
            Some(_) => bail!("Refusing to pin empty text"),
            None => match context.pin_current_clipboard().await? {
                Some(item) => item,
                None => bail!("Clipboard holds no text to pin"),
            },
        };
        println!("Pinned item {}: {}", item.id, item.preview);
        Ok(())
    }

    async fn list(&mut self, pinned: bool, limit: Option<usize>, json: bool) -> Result<()> {
        let limit = limit.unwrap_or(self.config.max_items);
        let store = Arc::clone(self.ensure_context()?.store());
        let items = if pinned {
            store.fetch_pinned(limit).await?
        } else {
            store.fetch_all(limit).await?
        };
        print_items(&items, json)
    }

    async fn search(&mut self, query: &str, json: bool) -> Result<()> {
        let items = self.ensure_context()?.search(query).await?;
        print_items(&items, json)
    }

    async fn copy(&mut self, id: i64, markdown: bool, plain: bool) -> Result<()> {
        let context = self.ensure_context()?;
        if markdown || plain {
            let item = context
                .store()
                .get(id)
                .await?
                .with_context(|| format!("No clipboard item with id {}", id))?;
            if markdown {
                context.copy_as_markdown(&item)?;
            } else {
                context.copy_as_plain_text(&item)?;
            }
        } else {
            context.copy_by_id(id).await?;
        }
        println!("Copied item {} to clipboard", id);
        Ok(())
    }

    async fn clear(&mut self, pinned: bool) -> Result<()> {
        let context = self.ensure_context()?;
        let removed = if pinned {
            context.clear_pinned().await?
        } else {
            context.clear_all().await?
        };
        println!("Removed {} items", removed);
        Ok(())
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("Current Configuration:");
                print!("{}", self.config.to_toml()?);
            }
            ConfigAction::Init { force } => {
                let path = match &self.config_path {
                    Some(path) => path.clone(),
                    None => Config::default_path()?,
                };
                Config::write_example(&path, force)?;
                println!("Example configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                // Loading in CliHandler::new already validated it
                println!("Configuration is valid");
            }
        }
        Ok(())
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn print_items(items: &[ClipboardItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No clipboard history found");
        return Ok(());
    }

    for item in items {
        println!(
            "{:>5} {} [{}] {:<4} {}",
            item.id,
            if item.is_pinned { "*" } else { " " },
            item.updated_at.format("%Y-%m-%d %H:%M:%S"),
            item.content_type,
            item.preview
        );
    }
    Ok(())
}
