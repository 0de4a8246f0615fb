use crate::batch::BatchFetcher;
use crate::cache::{CacheStore, DurableStore, MemoryStorage, SqliteStorage};
use crate::catalog::{
  CatalogGateway, EntityProfile, FetchOptions, NetworkClient, ReqwestTransport,
};
use crate::config::Config;
use crate::connectivity::{Connectivity, ConnectivityHandle};
use crate::controller::{ListController, ListSnapshot};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Browse the catalog page by page
  List {
    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Show the available categories
  Categories,
  /// Browse the members of one category
  Category {
    name: String,
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Look an entity up by exact name or id
  Search { text: String },
  /// Show the localized profile of an entity
  Show { name: String },
  /// Drop every cached response
  ClearCache,
}

/// Front-end switches that override the config file
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
  pub offline: bool,
  pub no_cache: bool,
  pub json: bool,
}

/// Command-line front end over the list controller and the gateway.
pub struct App {
  gateway: CatalogGateway,
  controller: ListController,
  json: bool,

  /// Keeps the connectivity channel open while the app runs
  _connectivity: ConnectivityHandle,
}

impl App {
  pub fn new(config: Config, options: AppOptions) -> Result<Self> {
    let durable: Arc<dyn DurableStore> = if config.cache.persist && !options.no_cache {
      let storage = match &config.cache.path {
        Some(path) => SqliteStorage::open_at(path)?,
        None => SqliteStorage::open()?,
      };
      Arc::new(storage)
    } else {
      Arc::new(MemoryStorage::new())
    };
    let cache = CacheStore::new(durable, config.cache.policy());

    let (handle, connectivity) = Connectivity::new(!options.offline);
    let transport = ReqwestTransport::new()?;
    let client = NetworkClient::new(Arc::new(transport), connectivity)
      .with_defaults(FetchOptions::from(&config.network));

    let gateway = CatalogGateway::new(client, cache, &config.catalog.base_url)
      .with_locales(config.catalog.locales.clone())
      .with_batch(BatchFetcher::new(config.list.batch_size));
    let controller = ListController::new(gateway.clone(), config.list.clone());

    info!(base_url = %config.catalog.base_url, offline = options.offline, "Catalog ready");

    Ok(Self {
      gateway,
      controller,
      json: options.json,
      _connectivity: handle,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    match command {
      Command::List { pages } => {
        self.controller.start();
        self.settle_or_retry().await;
        self.load_pages(pages).await;
        self.print_snapshot(&self.controller.snapshot())
      }
      Command::Categories => {
        let categories = self
          .gateway
          .category_list()
          .await
          .map_err(|e| eyre!("Failed to load categories: {}", e))?;
        if self.json {
          return print_json(&categories);
        }
        for category in categories {
          println!("{}", category.name);
        }
        Ok(())
      }
      Command::Category { name, pages } => {
        self.controller.select_category(&name);
        self.settle_or_retry().await;
        self.load_pages(pages).await;
        self.print_snapshot(&self.controller.snapshot())
      }
      Command::Search { text } => {
        self.controller.search(&text);
        self.controller.settle().await;
        self.print_snapshot(&self.controller.snapshot())
      }
      Command::Show { name } => {
        let profile = self
          .gateway
          .entity_profile(&name, None)
          .await
          .map_err(|e| eyre!("Failed to load {}: {}", name, e))?;
        if self.json {
          return print_json(&profile);
        }
        print_profile(&profile);
        Ok(())
      }
      Command::ClearCache => {
        self.gateway.cache().clear();
        println!("Cache cleared");
        Ok(())
      }
    }
  }

  /// Wait for the pending load and repeat it once if it failed.
  async fn settle_or_retry(&mut self) {
    self.controller.settle().await;
    if let Some(error) = self.controller.error() {
      info!(error, "Retrying failed load");
      self.controller.retry();
      self.controller.settle().await;
    }
  }

  /// Load pages until `pages` are present or nothing more can be loaded.
  async fn load_pages(&mut self, pages: usize) {
    for _ in 1..pages {
      if self.controller.error().is_some() || !self.controller.load_more() {
        break;
      }
      self.controller.settle().await;
      debug!(
        items = self.controller.list().len(),
        offset = self.controller.offset(),
        mode = ?self.controller.mode(),
        loading = self.controller.is_loading(),
        "Page settled"
      );
    }
  }

  fn print_snapshot(&self, snapshot: &ListSnapshot) -> Result<()> {
    if self.json {
      return print_json(snapshot);
    }

    if snapshot.is_offline {
      println!("(offline)");
    }
    for item in &snapshot.list {
      println!("#{:<5} {:<24} {}", item.id, item.name, item.types.join("/"));
    }
    if let Some(error) = &snapshot.error {
      eprintln!("{}", error);
    }
    Ok(())
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text = serde_json::to_string_pretty(value)
    .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", text);
  Ok(())
}

fn print_profile(profile: &EntityProfile) {
  println!("#{} {} ({})", profile.id, profile.name, profile.original_name);
  if let Some(image) = &profile.image_url {
    println!("image:     {}", image);
  }
  println!("types:     {}", profile.types.join(", "));
  println!("abilities: {}", profile.abilities.join(", "));
  for stat in &profile.stats {
    println!("  {:<20} {:>3}", stat.name, stat.value);
  }
}
