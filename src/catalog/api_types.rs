//! Serde types matching the catalog API responses.
//!
//! Only the fields the core reads are typed. Entity payloads keep everything
//! else in a flattened map so a cached entry serializes back to the payload
//! the API returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lightweight `{name, url}` reference used by every list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
  pub name: String,
  pub url: String,
}

// ============================================================================
// List endpoints
// ============================================================================

/// Paginated list response (`/pokemon?limit=&offset=`, `/type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePage {
  #[serde(default)]
  pub count: u64,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub previous: Option<String>,
  #[serde(default)]
  pub results: Vec<NamedResource>,
}

/// `/type/{name}` response; only the membership is read.
#[derive(Debug, Deserialize)]
pub struct ApiCategoryMembers {
  #[serde(default)]
  pub pokemon: Vec<ApiCategorySlot>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCategorySlot {
  pub pokemon: NamedResource,
}

// ============================================================================
// Localized resources (species, type, ability, stat)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRef {
  pub name: String,
}

/// `{name, language: {name}}` record embedded in most resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizedName {
  pub name: String,
  pub language: LanguageRef,
}

/// Any resource that carries a canonical name and its translations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedPayload {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub names: Vec<LocalizedName>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

// ============================================================================
// Entity detail
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiArtwork {
  pub front_default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiOtherSprites {
  #[serde(rename = "official-artwork", default)]
  pub official_artwork: Option<ApiArtwork>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSprites {
  #[serde(default)]
  pub front_default: Option<String>,
  #[serde(default)]
  pub other: Option<ApiOtherSprites>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTypeSlot {
  #[serde(default)]
  pub slot: u32,
  #[serde(rename = "type")]
  pub category: NamedResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiAbilitySlot {
  pub ability: NamedResource,
  #[serde(default)]
  pub is_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStat {
  pub base_stat: u32,
  pub stat: NamedResource,
}

/// Entity payload (`/pokemon/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub sprites: ApiSprites,
  pub species: NamedResource,
  #[serde(default)]
  pub types: Vec<ApiTypeSlot>,
  #[serde(default)]
  pub abilities: Vec<ApiAbilitySlot>,
  #[serde(default)]
  pub stats: Vec<ApiStat>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl EntityDetail {
  /// Official artwork when present, else the default front sprite.
  pub fn image_url(&self) -> Option<&str> {
    self
      .sprites
      .other
      .as_ref()
      .and_then(|o| o.official_artwork.as_ref())
      .and_then(|a| a.front_default.as_deref())
      .or(self.sprites.front_default.as_deref())
  }

  /// Related resources whose names get localized, in a fixed order:
  /// species, then types, abilities and stats.
  pub fn related_links(&self) -> Vec<String> {
    std::iter::once(self.species.url.clone())
      .chain(self.types.iter().map(|t| t.category.url.clone()))
      .chain(self.abilities.iter().map(|a| a.ability.url.clone()))
      .chain(self.stats.iter().map(|s| s.stat.url.clone()))
      .collect()
  }
}
