use crate::catalog::{EntitySummary, FetchError, NamedResource};

/// Results of background work, delivered back to the controller.
#[derive(Debug)]
pub enum ControllerEvent {
  /// Category chips for the filter bar
  CategoriesLoaded(Result<Vec<NamedResource>, FetchError>),
  /// A page of summaries for the mode active at `epoch`
  PageLoaded {
    epoch: u64,
    result: Result<Vec<EntitySummary>, FetchError>,
  },
  /// Membership queue and first page of a selected category
  CategoryLoaded {
    epoch: u64,
    name: String,
    result: Result<(Vec<NamedResource>, Vec<EntitySummary>), FetchError>,
  },
  /// The debounce window of a search attempt elapsed and the lookup began
  SearchStarted { generation: u64 },
  /// A search attempt finished; `None` when it was cancelled while debouncing
  SearchSettled {
    generation: u64,
    result: Option<Result<EntitySummary, FetchError>>,
  },
  /// Network status changed
  Connectivity(bool),
}

impl ControllerEvent {
  /// Whether this is the last event a background task sends.
  pub fn is_terminal(&self) -> bool {
    !matches!(
      self,
      ControllerEvent::SearchStarted { .. } | ControllerEvent::Connectivity(_)
    )
  }
}
