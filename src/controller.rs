//! List screen state machine: browsing pages, filtering by category and
//! debounced exact-name search.
//!
//! Background work runs in spawned tasks that report back over a channel;
//! state only changes in [`ListController::handle_event`] and the intent
//! methods, all of which take `&mut self`.

use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogGateway, EntitySummary, FetchError, NamedResource};
use crate::config::ListConfig;
use crate::event::ControllerEvent;

const LOAD_ERROR: &str = "Failed to load.";
const CATEGORY_ERROR: &str = "Failed to load category.";
const NOT_FOUND: &str = "Not found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
  Browsing,
  CategoryFiltered,
  Searching,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct ListSnapshot {
  pub list: Vec<EntitySummary>,
  pub loading: bool,
  pub error: Option<String>,
  pub is_offline: bool,
  pub mode: Mode,
  pub selected_category: Option<String>,
  pub search_query: String,
  pub categories: Vec<NamedResource>,
}

/// The load `retry()` repeats
#[derive(Debug, Clone, PartialEq, Eq)]
enum RetryAction {
  LoadMore,
  SelectCategory(String),
}

pub struct ListController {
  gateway: CatalogGateway,
  settings: ListConfig,

  list: Vec<EntitySummary>,
  loading: bool,
  error: Option<String>,
  is_offline: bool,
  mode: Mode,
  offset: usize,
  selected_category: Option<String>,
  /// Membership of the selected category, consumed page by page
  queue: Vec<NamedResource>,
  categories: Vec<NamedResource>,
  search_query: String,

  /// Bumped on every mode change; page results from older epochs are dropped
  epoch: u64,
  /// Bumped on every keystroke; only the latest search may touch the list
  search_generation: u64,
  search_token: Option<CancellationToken>,
  last_failed: Option<RetryAction>,

  /// Spawned tasks that have not delivered their final event yet
  in_flight: usize,
  /// Connectivity forwarder, started once by `start()`
  forwarder: Option<JoinHandle<()>>,
  event_tx: mpsc::UnboundedSender<ControllerEvent>,
  event_rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl ListController {
  pub fn new(gateway: CatalogGateway, settings: ListConfig) -> Self {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let is_offline = !gateway.client().connectivity().is_online();

    Self {
      gateway,
      settings,
      list: Vec::new(),
      loading: false,
      error: None,
      is_offline,
      mode: Mode::Browsing,
      offset: 0,
      selected_category: None,
      queue: Vec::new(),
      categories: Vec::new(),
      search_query: String::new(),
      epoch: 0,
      search_generation: 0,
      search_token: None,
      last_failed: None,
      in_flight: 0,
      forwarder: None,
      event_tx,
      event_rx,
    }
  }

  /// Forward connectivity changes, load the category chips and the first page.
  pub fn start(&mut self) {
    if self.forwarder.is_none() {
      let mut status = self.gateway.client().connectivity().subscribe();
      let tx = self.event_tx.clone();
      self.forwarder = Some(tokio::spawn(async move {
        while status.changed().await.is_ok() {
          let online = *status.borrow_and_update();
          if tx.send(ControllerEvent::Connectivity(online)).is_err() {
            break;
          }
        }
      }));
    }

    let gateway = self.gateway.clone();
    self.spawn(async move { ControllerEvent::CategoriesLoaded(gateway.category_list().await) });

    self.load_more();
  }

  /// Fetch the next page for the current mode. Returns whether a load started.
  pub fn load_more(&mut self) -> bool {
    if self.loading || self.mode == Mode::Searching {
      return false;
    }

    let page_size = self.settings.page_size;
    let slice = match self.mode {
      Mode::CategoryFiltered => {
        let slice: Vec<NamedResource> = self
          .queue
          .iter()
          .skip(self.offset)
          .take(page_size)
          .cloned()
          .collect();
        if slice.is_empty() {
          return false;
        }
        Some(slice)
      }
      _ => None,
    };

    self.loading = true;
    self.error = None;

    let gateway = self.gateway.clone();
    let epoch = self.epoch;
    let offset = self.offset;
    debug!(offset, epoch, "Loading page");

    self.spawn(async move {
      let result = async {
        let refs = match slice {
          Some(refs) => refs,
          None => gateway.entity_page(offset, page_size).await?.results,
        };
        Ok::<_, FetchError>(gateway.entity_summaries(&refs).await)
      }
      .await;
      ControllerEvent::PageLoaded { epoch, result }
    });
    true
  }

  /// Filter by `name`, or go back to browsing (from the first page) when it
  /// is already selected.
  pub fn select_category(&mut self, name: &str) {
    if self.selected_category.as_deref() == Some(name) {
      info!(category = name, "Clearing category filter");
      self.enter_mode(Mode::Browsing);
      self.selected_category = None;
      self.queue.clear();
      self.list.clear();
      self.offset = 0;
      self.error = None;
      self.load_more();
      return;
    }

    info!(category = name, "Selecting category");
    self.cancel_search();
    self.search_query.clear();
    self.enter_mode(Mode::CategoryFiltered);
    self.selected_category = Some(name.to_string());
    self.queue.clear();
    self.list.clear();
    self.offset = 0;
    self.load_category(name.to_string());
  }

  /// Debounced exact-name lookup. Every call supersedes the previous one.
  pub fn search(&mut self, text: &str) {
    self.cancel_search();
    self.search_query = text.to_string();

    let query = text.trim().to_lowercase();
    if query.is_empty() {
      self.enter_mode(Mode::Browsing);
      self.selected_category = None;
      self.queue.clear();
      self.list.clear();
      self.offset = 0;
      self.error = None;
      self.load_more();
      return;
    }

    if self.mode != Mode::Searching {
      self.enter_mode(Mode::Searching);
      self.selected_category = None;
      self.queue.clear();
    }
    // A superseded attempt may have set it
    self.loading = false;

    let token = CancellationToken::new();
    self.search_token = Some(token.clone());
    let generation = self.search_generation;
    let debounce = self.settings.search_debounce();
    let gateway = self.gateway.clone();
    let tx = self.event_tx.clone();

    self.in_flight += 1;
    tokio::spawn(async move {
      tokio::select! {
        _ = token.cancelled() => {
          let _ = tx.send(ControllerEvent::SearchSettled { generation, result: None });
          return;
        }
        _ = tokio::time::sleep(debounce) => {}
      }

      let _ = tx.send(ControllerEvent::SearchStarted { generation });
      debug!(query = %query, generation, "Searching");
      let result = gateway
        .entity_detail(&query, Some(&token))
        .await
        .map(|detail| EntitySummary::from(&detail));
      let _ = tx.send(ControllerEvent::SearchSettled {
        generation,
        result: Some(result),
      });
    });
  }

  /// Repeat the load that failed last.
  pub fn retry(&mut self) {
    match self.last_failed.take() {
      Some(RetryAction::SelectCategory(name))
        if self.selected_category.as_deref() != Some(name.as_str()) =>
      {
        debug!(category = %name, "Category no longer selected, nothing to retry");
      }
      Some(action @ RetryAction::SelectCategory(_)) if self.loading => {
        debug!("A load is already running, retry postponed");
        self.last_failed = Some(action);
      }
      Some(RetryAction::SelectCategory(name)) => {
        self.load_category(name);
      }
      Some(RetryAction::LoadMore) | None => {
        self.load_more();
      }
    }
  }

  /// Apply events until no spawned task is outstanding.
  pub async fn settle(&mut self) {
    while self.in_flight > 0 {
      if !self.process_next().await {
        break;
      }
    }
  }

  /// Wait for one event and apply it. Returns false once the channel closed.
  pub async fn process_next(&mut self) -> bool {
    match self.event_rx.recv().await {
      Some(event) => {
        self.handle_event(event);
        true
      }
      None => false,
    }
  }

  pub fn handle_event(&mut self, event: ControllerEvent) {
    if event.is_terminal() {
      self.in_flight = self.in_flight.saturating_sub(1);
    }

    match event {
      ControllerEvent::CategoriesLoaded(Ok(categories)) => {
        self.categories = categories;
      }
      ControllerEvent::CategoriesLoaded(Err(e)) => {
        debug!(error = %e, "Category list unavailable");
      }
      ControllerEvent::PageLoaded { epoch, result } => {
        if epoch != self.epoch {
          debug!(epoch, current = self.epoch, "Dropping stale page");
          return;
        }
        self.loading = false;
        match result {
          Ok(items) => {
            append_unique(&mut self.list, items);
            self.offset += self.settings.page_size;
            self.last_failed = None;
          }
          Err(e) => self.fail(e, RetryAction::LoadMore, LOAD_ERROR),
        }
      }
      ControllerEvent::CategoryLoaded {
        epoch,
        name,
        result,
      } => {
        if epoch != self.epoch {
          debug!(category = %name, "Dropping stale category load");
          return;
        }
        self.loading = false;
        match result {
          Ok((queue, items)) => {
            self.queue = queue;
            self.list.clear();
            append_unique(&mut self.list, items);
            self.offset = self.settings.page_size;
            self.last_failed = None;
          }
          Err(e) => self.fail(e, RetryAction::SelectCategory(name), CATEGORY_ERROR),
        }
      }
      ControllerEvent::SearchStarted { generation } => {
        if generation == self.search_generation {
          self.loading = true;
          self.error = None;
        }
      }
      ControllerEvent::SearchSettled { generation, result } => {
        if generation != self.search_generation {
          debug!(generation, current = self.search_generation, "Dropping superseded search");
          return;
        }
        self.search_token = None;
        self.loading = false;
        match result {
          Some(Ok(summary)) => {
            self.list = vec![summary];
            self.error = None;
          }
          Some(Err(FetchError::Cancelled)) | None => {}
          Some(Err(e)) => {
            debug!(query = %self.search_query, error = %e, "Search failed");
            self.error = Some(NOT_FOUND.to_string());
          }
        }
      }
      ControllerEvent::Connectivity(online) => {
        info!(online, "Connectivity changed");
        self.is_offline = !online;
      }
    }
  }

  pub fn snapshot(&self) -> ListSnapshot {
    ListSnapshot {
      list: self.list.clone(),
      loading: self.loading,
      error: self.error.clone(),
      is_offline: self.is_offline,
      mode: self.mode,
      selected_category: self.selected_category.clone(),
      search_query: self.search_query.clone(),
      categories: self.categories.clone(),
    }
  }

  pub fn list(&self) -> &[EntitySummary] {
    &self.list
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Fetch the membership queue of `name` and the details of its first page.
  fn load_category(&mut self, name: String) {
    self.loading = true;
    self.error = None;

    let gateway = self.gateway.clone();
    let epoch = self.epoch;
    let page_size = self.settings.page_size;

    self.spawn(async move {
      let result = async {
        let queue = gateway.category_members(&name).await?;
        let first = &queue[..queue.len().min(page_size)];
        let items = gateway.entity_summaries(first).await;
        Ok::<_, FetchError>((queue, items))
      }
      .await;
      ControllerEvent::CategoryLoaded {
        epoch,
        name,
        result,
      }
    });
  }

  fn enter_mode(&mut self, mode: Mode) {
    self.mode = mode;
    self.epoch += 1;
    self.loading = false;
  }

  fn cancel_search(&mut self) {
    if let Some(token) = self.search_token.take() {
      token.cancel();
    }
    self.search_generation += 1;
  }

  fn fail(&mut self, error: FetchError, action: RetryAction, message: &str) {
    match error {
      FetchError::Offline | FetchError::Cancelled => {
        debug!(error = %error, "Load skipped");
      }
      _ => {
        warn!(error = %error, "{}", message);
        self.error = Some(message.to_string());
      }
    }
    self.last_failed = Some(action);
  }

  /// Run `task` in the background and deliver its event.
  fn spawn<F>(&mut self, task: F)
  where
    F: Future<Output = ControllerEvent> + Send + 'static,
  {
    self.in_flight += 1;
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let _ = tx.send(task.await);
    });
  }
}

impl Drop for ListController {
  fn drop(&mut self) {
    if let Some(forwarder) = self.forwarder.take() {
      forwarder.abort();
    }
  }
}

/// Append `items` whose id is not in `list` yet, keeping order.
fn append_unique(list: &mut Vec<EntitySummary>, items: Vec<EntitySummary>) {
  let mut seen: HashSet<u64> = list.iter().map(|item| item.id).collect();
  list.extend(items.into_iter().filter(|item| seen.insert(item.id)));
}
