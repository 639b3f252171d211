use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogTag;
use crate::error::TagSyncError;

/// Every synced tag is presented as an excludable genre filter.
pub const TAG_FILTER_TYPE: &str = "genre";

/// Catalog identifier, kept in whatever JSON type the catalog used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TagId::Text(id) => write!(f, "{}", id),
            TagId::Number(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub id: TagId,
    pub can_exclude: bool,
}

impl Tag {
    pub fn genre(name: String, id: TagId) -> Self {
        Self {
            kind: TAG_FILTER_TYPE,
            name,
            id,
            can_exclude: true,
        }
    }
}

/// Which catalog tags land in a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelector {
    /// Tags whose `group` attribute equals this value.
    Attribute(String),
    /// Every fetched tag.
    All,
}

impl GroupSelector {
    pub fn matches(&self, tag: &CatalogTag) -> bool {
        match self {
            GroupSelector::Attribute(group) => tag.attributes.group == *group,
            GroupSelector::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    pub name: String,
    pub selector: GroupSelector,
}

impl TargetGroup {
    /// Selects tags by the singular, lower-cased form of the label, so
    /// "Genres" picks up tags in the "genre" group.
    pub fn grouped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: GroupSelector::Attribute(singular_group(name)),
        }
    }

    pub fn with_attribute(name: &str, attribute: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: GroupSelector::Attribute(attribute.to_string()),
        }
    }

    pub fn flat(name: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: GroupSelector::All,
        }
    }
}

pub fn singular_group(label: &str) -> String {
    let lower = label.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Builds the filter list for one group, sorted case-insensitively by name.
/// Tags with equal names keep their catalog order.
pub fn build_filters(
    tags: &[CatalogTag],
    selector: &GroupSelector,
) -> Result<Vec<Tag>, TagSyncError> {
    let mut filters = tags
        .iter()
        .filter(|tag| selector.matches(tag))
        .map(|tag| {
            let name = tag
                .english_name()
                .ok_or_else(|| TagSyncError::MissingEnglishName(tag.id.to_string()))?;
            Ok(Tag::genre(name.to_string(), tag.id.clone()))
        })
        .collect::<Result<Vec<_>, TagSyncError>>()?;

    filters.sort_by_cached_key(|tag| tag.name.to_lowercase());
    Ok(filters)
}
