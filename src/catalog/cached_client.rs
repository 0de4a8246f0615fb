//! Cache-aware catalog reads.

use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::batch::BatchFetcher;
use crate::cache::CacheStore;

use super::api_types::{ApiCategoryMembers, EntityDetail, NamedPayload, NamedResource, ResourcePage};
use super::cache::CatalogQueryKey;
use super::client::{FetchError, NetworkClient};
use super::types::{display_name, EntityProfile, EntitySummary, StatLine};

/// Upstream pseudo-categories with no real membership.
const HIDDEN_CATEGORIES: &[&str] = &["unknown", "shadow"];

/// Catalog client with read-through caching.
///
/// Every read computes the canonical URL of the request, serves a fresh cache
/// entry when there is one, and otherwise fetches and stores the payload under
/// the same key. Failures pass through untouched.
#[derive(Clone)]
pub struct CatalogGateway {
  client: NetworkClient,
  cache: CacheStore,
  base_url: String,
  locales: Vec<String>,
  batch: BatchFetcher,
}

impl CatalogGateway {
  pub fn new(client: NetworkClient, cache: CacheStore, base_url: &str) -> Self {
    Self {
      client,
      cache,
      base_url: base_url.trim_end_matches('/').to_string(),
      locales: vec!["pt-BR".to_string(), "pt".to_string()],
      batch: BatchFetcher::default(),
    }
  }

  /// Preferred locales for display names, most preferred first.
  pub fn with_locales(mut self, locales: Vec<String>) -> Self {
    self.locales = locales;
    self
  }

  /// Group size for related-resource lookups.
  pub fn with_batch(mut self, batch: BatchFetcher) -> Self {
    self.batch = batch;
    self
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn client(&self) -> &NetworkClient {
    &self.client
  }

  /// Read `query` through the cache; `shape` turns the decoded payload into
  /// what gets cached and returned.
  async fn fetch_cached<R, T, F>(
    &self,
    query: CatalogQueryKey,
    cancel: Option<&CancellationToken>,
    shape: F,
  ) -> Result<T, FetchError>
  where
    R: DeserializeOwned,
    T: Serialize + DeserializeOwned,
    F: FnOnce(R) -> T,
  {
    if cancel.is_some_and(|token| token.is_cancelled()) {
      return Err(FetchError::Cancelled);
    }

    let url = query.url(&self.base_url);
    debug!(url = %url, "Reading {}", query.description());

    let client = &self.client;
    let url_ref = url.as_str();
    let result = self
      .cache
      .read_through(&query.cache_hash(&self.base_url), move || async move {
        let raw: R = client.fetch_json(url_ref, cancel).await?;
        Ok::<T, FetchError>(shape(raw))
      })
      .await?;

    debug!(url = %url, source = ?result.source, "Served {}", query.description());
    Ok(result.data)
  }

  /// All categories except the upstream pseudo-categories.
  pub async fn category_list(&self) -> Result<Vec<NamedResource>, FetchError> {
    self
      .fetch_cached(CatalogQueryKey::Categories, None, |page: ResourcePage| {
        page
          .results
          .into_iter()
          .filter(|c| !HIDDEN_CATEGORIES.contains(&c.name.as_str()))
          .collect::<Vec<_>>()
      })
      .await
  }

  /// The full membership queue of one category.
  pub async fn category_members(&self, name: &str) -> Result<Vec<NamedResource>, FetchError> {
    let query = CatalogQueryKey::CategoryMembers {
      name: name.to_string(),
    };
    self
      .fetch_cached(query, None, |members: ApiCategoryMembers| {
        members
          .pokemon
          .into_iter()
          .map(|slot| slot.pokemon)
          .collect::<Vec<_>>()
      })
      .await
  }

  /// One page of the entity list.
  pub async fn entity_page(&self, offset: usize, limit: usize) -> Result<ResourcePage, FetchError> {
    self
      .fetch_cached(
        CatalogQueryKey::EntityPage { offset, limit },
        None,
        |page: ResourcePage| page,
      )
      .await
  }

  /// Entity by bare identifier or full reference.
  pub async fn entity_detail(
    &self,
    reference: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<EntityDetail, FetchError> {
    self.resource(reference, cancel).await
  }

  /// Summaries for `refs` in input order, fetched in groups. Entries whose
  /// detail lookup fails are skipped.
  pub async fn entity_summaries(&self, refs: &[NamedResource]) -> Vec<EntitySummary> {
    debug!(
      count = refs.len(),
      batch_size = self.batch.batch_size(),
      "Resolving summaries"
    );
    let gateway = self;
    let details = self
      .batch
      .run(refs, move |item| async move {
        match gateway.entity_detail(&item.url, None).await {
          Ok(detail) => Ok::<_, FetchError>(Some(EntitySummary::from(&detail))),
          Err(e) => {
            debug!(reference = %item.url, error = %e, "Skipping entity");
            Ok(None)
          }
        }
      })
      .await;

    details.unwrap_or_default().into_iter().flatten().collect()
  }

  /// Any resource by reference, keyed the same way as entity details.
  pub async fn resource<T>(
    &self,
    reference: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<T, FetchError>
  where
    T: Serialize + DeserializeOwned,
  {
    let query = CatalogQueryKey::Resource {
      reference: reference.to_string(),
    };
    self.fetch_cached(query, cancel, |payload: T| payload).await
  }

  /// Entity detail plus localized names of its species, types, abilities
  /// and stats. Fails if any related lookup fails.
  pub async fn entity_profile(
    &self,
    reference: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<EntityProfile, FetchError> {
    let detail = self.entity_detail(reference, cancel).await?;

    let gateway = self;
    let related: Vec<NamedPayload> = self
      .batch
      .run(detail.related_links(), move |link| async move {
        gateway.resource::<NamedPayload>(&link, cancel).await
      })
      .await?;

    if cancel.is_some_and(|token| token.is_cancelled()) {
      return Err(FetchError::Cancelled);
    }

    // Positions follow `related_links`: species, types, abilities, stats
    let label = |index: usize, canonical: &str| match related.get(index) {
      Some(payload) => display_name(&payload.names, &self.locales, canonical),
      None => canonical.to_string(),
    };
    let types_at = 1;
    let abilities_at = types_at + detail.types.len();
    let stats_at = abilities_at + detail.abilities.len();

    Ok(EntityProfile {
      id: detail.id,
      name: label(0, &detail.name),
      original_name: detail.name.clone(),
      image_url: detail.image_url().map(String::from),
      types: detail
        .types
        .iter()
        .enumerate()
        .map(|(i, t)| label(types_at + i, &t.category.name))
        .collect(),
      abilities: detail
        .abilities
        .iter()
        .enumerate()
        .map(|(i, a)| label(abilities_at + i, &a.ability.name))
        .collect(),
      stats: detail
        .stats
        .iter()
        .enumerate()
        .map(|(i, s)| StatLine {
          name: label(stats_at + i, &s.stat.name),
          value: s.base_stat,
        })
        .collect(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CachePolicy, MemoryStorage};
  use crate::catalog::testing::{FakeTransport, Step};
  use crate::connectivity::Connectivity;
  use serde_json::json;
  use std::sync::Arc;

  const BASE: &str = "https://pokeapi.co/api/v2";

  fn gateway(transport: &Arc<FakeTransport>) -> CatalogGateway {
    let (_handle, connectivity) = Connectivity::new(true);
    let client = NetworkClient::new(transport.clone(), connectivity);
    let cache = CacheStore::new(Arc::new(MemoryStorage::new()), CachePolicy::default());
    CatalogGateway::new(client, cache, BASE)
  }

  fn localized(name: &str, en: &str, pt: &str) -> serde_json::Value {
    json!({
      "name": name,
      "names": [
        {"name": en, "language": {"name": "en", "url": "https://pokeapi.co/api/v2/language/9/"}},
        {"name": pt, "language": {"name": "pt-BR", "url": "https://pokeapi.co/api/v2/language/14/"}}
      ]
    })
  }

  #[tokio::test]
  async fn test_category_list_filters_pseudo_categories_and_caches() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/type", BASE),
      Step::json(json!({
        "count": 4,
        "results": [
          {"name": "fire", "url": format!("{}/type/10/", BASE)},
          {"name": "unknown", "url": format!("{}/type/10001/", BASE)},
          {"name": "water", "url": format!("{}/type/11/", BASE)},
          {"name": "shadow", "url": format!("{}/type/10002/", BASE)}
        ]
      })),
    );
    let gateway = gateway(&transport);

    let names: Vec<String> = gateway
      .category_list()
      .await
      .unwrap()
      .into_iter()
      .map(|c| c.name)
      .collect();
    assert_eq!(names, vec!["fire", "water"]);

    gateway.category_list().await.unwrap();
    assert_eq!(transport.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_payload_is_stored_under_the_query_hash() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/type", BASE),
      Step::json(json!({"results": [{"name": "grass", "url": format!("{}/type/12/", BASE)}]})),
    );
    let gateway = gateway(&transport);

    gateway.category_list().await.unwrap();

    let cached: Option<Vec<NamedResource>> = gateway
      .cache()
      .get(&CatalogQueryKey::Categories.cache_hash(BASE));
    assert_eq!(cached.map(|c| c.len()), Some(1));
  }

  #[tokio::test]
  async fn test_category_members_are_unwrapped() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/type/fire", BASE),
      Step::json(json!({
        "name": "fire",
        "pokemon": [
          {"slot": 1, "pokemon": {"name": "charmander", "url": format!("{}/pokemon/4/", BASE)}},
          {"slot": 1, "pokemon": {"name": "vulpix", "url": format!("{}/pokemon/37/", BASE)}}
        ]
      })),
    );

    let members = gateway(&transport).category_members("fire").await.unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].name, "vulpix");
  }

  #[tokio::test]
  async fn test_detail_by_name_and_reference_hit_the_same_entry() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/pokemon/pikachu/", BASE),
      Step::json(json!({
        "id": 25,
        "name": "pikachu",
        "species": {"name": "pikachu", "url": format!("{}/pokemon-species/25/", BASE)}
      })),
    );
    let gateway = gateway(&transport);

    let first = gateway.entity_detail("Pikachu", None).await.unwrap();
    let second = gateway
      .entity_detail(&format!("{}/pokemon/pikachu", BASE), None)
      .await
      .unwrap();

    assert_eq!(first.id, 25);
    assert_eq!(second.id, 25);
    assert_eq!(transport.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_failures_pass_through_and_are_not_cached() {
    let transport = Arc::new(FakeTransport::new());
    let gateway = gateway(&transport);

    let err = gateway.entity_detail("missingno", None).await.unwrap_err();
    assert_eq!(err, FetchError::HttpError(404));

    gateway.entity_detail("missingno", None).await.unwrap_err();
    assert_eq!(transport.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_entity_page_is_cached_per_offset() {
    let transport = Arc::new(FakeTransport::new());
    for offset in [0, 20] {
      transport.route(
        &format!("{}/pokemon?limit=20&offset={}", BASE, offset),
        Step::json(json!({"count": 1302, "results": []})),
      );
    }
    let gateway = gateway(&transport);

    gateway.entity_page(0, 20).await.unwrap();
    gateway.entity_page(20, 20).await.unwrap();
    let page = gateway.entity_page(0, 20).await.unwrap();

    assert_eq!(page.count, 1302);
    assert_eq!(transport.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_entity_summaries_skip_failed_lookups() {
    let transport = Arc::new(FakeTransport::new());
    for (id, name) in [(1, "bulbasaur"), (4, "charmander")] {
      transport.route(
        &format!("{}/pokemon/{}/", BASE, id),
        Step::json(json!({
          "id": id,
          "name": name,
          "species": {"name": name, "url": format!("{}/pokemon-species/{}/", BASE, id)}
        })),
      );
    }
    let refs: Vec<NamedResource> = [1, 99, 4]
      .iter()
      .map(|id| NamedResource {
        name: id.to_string(),
        url: format!("{}/pokemon/{}/", BASE, id),
      })
      .collect();

    let summaries = gateway(&transport).entity_summaries(&refs).await;

    let ids: Vec<u64> = summaries.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 4]);
  }

  #[tokio::test]
  async fn test_cancelled_token_skips_cache_and_network() {
    let transport = Arc::new(FakeTransport::new());
    let token = CancellationToken::new();
    token.cancel();

    let err = gateway(&transport)
      .entity_detail("pikachu", Some(&token))
      .await
      .unwrap_err();
    assert_eq!(err, FetchError::Cancelled);
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_entity_profile_localizes_related_names() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/pokemon/charmander/", BASE),
      Step::json(json!({
        "id": 4,
        "name": "charmander",
        "sprites": {"front_default": "https://img/4.png", "other": {}},
        "species": {"name": "charmander", "url": format!("{}/pokemon-species/4/", BASE)},
        "types": [{"slot": 1, "type": {"name": "fire", "url": format!("{}/type/10/", BASE)}}],
        "abilities": [
          {"ability": {"name": "blaze", "url": format!("{}/ability/66/", BASE)}, "is_hidden": false},
          {"ability": {"name": "solar-power", "url": format!("{}/ability/94/", BASE)}, "is_hidden": true}
        ],
        "stats": [{"base_stat": 39, "stat": {"name": "hp", "url": format!("{}/stat/1/", BASE)}}]
      })),
    );
    transport.route(
      &format!("{}/pokemon-species/4/", BASE),
      Step::json(localized("charmander", "Charmander", "Charmander-BR")),
    );
    transport.route(&format!("{}/type/10/", BASE), Step::json(localized("fire", "Fire", "Fogo")));
    transport.route(&format!("{}/ability/66/", BASE), Step::json(localized("blaze", "Blaze", "Chama")));
    // No translation available
    transport.route(
      &format!("{}/ability/94/", BASE),
      Step::json(json!({"name": "solar-power", "names": []})),
    );
    transport.route(&format!("{}/stat/1/", BASE), Step::json(localized("hp", "HP", "PS")));

    let profile = gateway(&transport).entity_profile("charmander", None).await.unwrap();

    assert_eq!(
      profile,
      EntityProfile {
        id: 4,
        name: "Charmander-BR".into(),
        original_name: "charmander".into(),
        image_url: Some("https://img/4.png".into()),
        types: vec!["Fogo".into()],
        abilities: vec!["Chama".into(), "solar-power".into()],
        stats: vec![StatLine {
          name: "PS".into(),
          value: 39
        }],
      }
    );
  }

  #[tokio::test]
  async fn test_entity_profile_fails_when_a_related_lookup_fails() {
    let transport = Arc::new(FakeTransport::new());
    transport.route(
      &format!("{}/pokemon/ditto/", BASE),
      Step::json(json!({
        "id": 132,
        "name": "ditto",
        "species": {"name": "ditto", "url": format!("{}/pokemon-species/132/", BASE)}
      })),
    );

    let err = gateway(&transport).entity_profile("ditto", None).await.unwrap_err();
    assert_eq!(err, FetchError::HttpError(404));
  }
}
