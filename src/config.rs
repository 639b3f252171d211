use std::env;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use url::Url;

use crate::catalog::HttpClient;
use crate::error::TagSyncError;
use crate::tags::TargetGroup;

const DEFAULT_CATALOG_URL: &str = "https://api.mangadex.org/manga/tag";
const DEFAULT_TARGETS: &str = "Contents,Formats,Genres,Themes";

pub struct Config {
    pub catalog_url: Url,
    pub filters_path: PathBuf,
    pub targets: Vec<TargetGroup>,
    pub http_client: HttpClient,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Result<Self, TagSyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TagSyncError> {
        let catalog_url = lookup("TAG_SYNC_CATALOG_URL")
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());
        let catalog_url = Url::parse(&catalog_url).map_err(|e| {
            TagSyncError::InvalidConfig(format!("catalog url {:?}: {}", catalog_url, e))
        })?;

        let log_level = lookup("TAG_SYNC_LOG").unwrap_or_else(|| "warn".to_string());
        let log_level = log_level
            .parse::<LevelFilter>()
            .map_err(|_| TagSyncError::InvalidConfig(format!("unknown log level {:?}", log_level)))?;

        Ok(Self {
            catalog_url,
            filters_path: lookup("TAG_SYNC_FILTERS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_filters_path),
            targets: parse_targets(
                &lookup("TAG_SYNC_TARGETS").unwrap_or_else(|| DEFAULT_TARGETS.to_string()),
            )?,
            http_client: lookup("TAG_SYNC_HTTP_CLIENT")
                .unwrap_or_else(|| "curl".to_string())
                .parse::<HttpClient>()?,
            log_level,
        })
    }
}

/// `res/filters.json` next to this crate's manifest.
pub fn default_filters_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("res")
        .join("filters.json")
}

/// Parses `Genres,Themes=theme,Tags=*` into target groups: a bare name is
/// matched by its singular lower-cased form, `=attr` names the group
/// attribute explicitly and `=*` takes every tag.
pub fn parse_targets(value: &str) -> Result<Vec<TargetGroup>, TagSyncError> {
    let mut targets: Vec<TargetGroup> = Vec::new();

    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let target = match entry.split_once('=').map(|(name, attr)| (name.trim(), attr.trim())) {
            None => TargetGroup::grouped(entry),
            Some((name, "*")) => TargetGroup::flat(name),
            Some((_, "")) => {
                return Err(TagSyncError::InvalidConfig(format!(
                    "target {:?} has an empty group attribute",
                    entry
                )));
            }
            Some((name, attribute)) => TargetGroup::with_attribute(name, attribute),
        };

        if target.name.is_empty() {
            return Err(TagSyncError::InvalidConfig(format!(
                "target {:?} has no group name",
                entry
            )));
        }
        if targets.iter().any(|existing| existing.name == target.name) {
            return Err(TagSyncError::InvalidConfig(format!(
                "target group {:?} listed twice",
                target.name
            )));
        }
        targets.push(target);
    }

    Ok(targets)
}
