//! Canonical request identities for catalog calls.

use sha2::{Digest, Sha256};
use url::Url;

/// Logical catalog requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogQueryKey {
  /// All categories
  Categories,
  /// Entities belonging to one category
  CategoryMembers { name: String },
  /// One page of the entity list
  EntityPage { offset: usize, limit: usize },
  /// A single resource by id, name or full reference
  Resource { reference: String },
}

impl CatalogQueryKey {
  /// The canonical URL for this request against `base_url`.
  pub fn url(&self, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match self {
      Self::Categories => format!("{}/type", base),
      Self::CategoryMembers { name } => format!("{}/type/{}", base, normalize_name(name)),
      Self::EntityPage { offset, limit } => {
        format!("{}/pokemon?limit={}&offset={}", base, limit, offset)
      }
      Self::Resource { reference } => canonical_reference(base, reference),
    }
  }

  /// Stable, fixed-length cache key.
  pub fn cache_hash(&self, base_url: &str) -> String {
    cache_key(&self.url(base_url))
  }

  pub fn description(&self) -> String {
    match self {
      Self::Categories => "all categories".to_string(),
      Self::CategoryMembers { name } => format!("members of {}", name),
      Self::EntityPage { offset, limit } => format!("entities {}..{}", offset, offset + limit),
      Self::Resource { reference } => format!("resource {}", reference),
    }
  }
}

/// SHA256 of the canonical URL.
pub fn cache_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// Turn a bare identifier or a full reference into one canonical URL, so the
/// same entity reached through different callers shares a cache entry.
pub fn canonical_reference(base_url: &str, reference: &str) -> String {
  let reference = reference.trim();

  if reference.starts_with("http://") || reference.starts_with("https://") {
    return match Url::parse(reference) {
      Ok(mut url) => {
        if !url.path().ends_with('/') {
          let path = format!("{}/", url.path());
          url.set_path(&path);
        }
        url.to_string()
      }
      Err(_) => reference.to_string(),
    };
  }

  format!(
    "{}/pokemon/{}/",
    base_url.trim_end_matches('/'),
    normalize_name(reference)
  )
}

/// Trim whitespace and lowercase for case-insensitive lookups.
fn normalize_name(name: &str) -> String {
  name.trim().to_lowercase()
}
