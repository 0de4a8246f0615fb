use serde::Serialize;

use super::api_types::{EntityDetail, LocalizedName};

/// List item shown by the presentation layer. `id` is unique within a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
  pub id: u64,
  pub name: String,
  pub sprite_url: Option<String>,
  pub types: Vec<String>,
}

impl From<&EntityDetail> for EntitySummary {
  fn from(detail: &EntityDetail) -> Self {
    EntitySummary {
      id: detail.id,
      name: detail.name.clone(),
      sprite_url: detail.image_url().map(String::from),
      types: detail
        .types
        .iter()
        .map(|t| t.category.name.clone())
        .collect(),
    }
  }
}

/// One base stat with its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatLine {
  pub name: String,
  pub value: u32,
}

/// Detail-screen view of an entity with localized labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityProfile {
  pub id: u64,
  /// Localized name, or the canonical one
  pub name: String,
  pub original_name: String,
  pub image_url: Option<String>,
  pub types: Vec<String>,
  pub abilities: Vec<String>,
  pub stats: Vec<StatLine>,
}

/// First record whose language matches one of `preferred`, in preference order.
pub fn localized_name<'a>(names: &'a [LocalizedName], preferred: &[String]) -> Option<&'a str> {
  preferred.iter().find_map(|locale| {
    names
      .iter()
      .find(|n| n.language.name.eq_ignore_ascii_case(locale))
      .map(|n| n.name.as_str())
  })
}

/// Localized name with a fallback to the canonical one.
pub fn display_name(names: &[LocalizedName], preferred: &[String], canonical: &str) -> String {
  localized_name(names, preferred)
    .unwrap_or(canonical)
    .to_string()
}
