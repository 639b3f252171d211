use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::Value;

use crate::catalog::CatalogResponse;
use crate::error::TagSyncError;
use crate::tags::{build_filters, Tag, TargetGroup};

/// New contents for the `filters` array of one named group.
#[derive(Debug)]
pub struct GroupUpdate {
    pub name: String,
    pub filters: Vec<Tag>,
}

pub fn compute_updates(
    catalog: &CatalogResponse,
    targets: &[TargetGroup],
) -> Result<Vec<GroupUpdate>, TagSyncError> {
    targets
        .iter()
        .map(|target| {
            Ok(GroupUpdate {
                name: target.name.clone(),
                filters: build_filters(&catalog.data, &target.selector)?,
            })
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Replaces the `filters` array of every group named by an update. Other
/// groups and every other field are left as they are. Returns the names of
/// updates that matched no group.
pub fn merge(document: &mut Value, updates: &[GroupUpdate]) -> Result<Vec<String>> {
    let groups = document.as_array_mut().ok_or(TagSyncError::NotAnArray)?;
    let mut matched = vec![false; updates.len()];

    for group in groups.iter_mut() {
        let Some(object) = group.as_object_mut() else {
            continue;
        };
        let Some(name) = object.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(index) = updates.iter().position(|update| update.name == name) else {
            continue;
        };

        let update = &updates[index];
        info!("replacing {} with {} tags", update.name, update.filters.len());
        object.insert("filters".to_string(), serde_json::to_value(&update.filters)?);
        matched[index] = true;
    }

    Ok(updates
        .iter()
        .zip(matched)
        .filter(|(_, matched)| !matched)
        .map(|(update, _)| update.name.clone())
        .collect())
}

/// Tab-indented JSON with DEL and non-ASCII escaped, plus one trailing newline.
pub fn render(document: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, AsciiFormatter::new(b"\t"));
    document.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

pub fn save(path: &Path, document: &Value) -> Result<()> {
    let rendered = render(document)?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Recomputes the target groups from `catalog` and rewrites the filter file.
/// The file is written once, after everything else has succeeded.
pub fn sync(path: &Path, catalog: &CatalogResponse, targets: &[TargetGroup]) -> Result<()> {
    let updates = compute_updates(catalog, targets)?;
    let mut document = load(path)?;

    for name in merge(&mut document, &updates)? {
        warn!("filter group {} not found in {}", name, path.display());
    }

    save(path, &document)
}

struct AsciiFormatter<'a> {
    pretty: PrettyFormatter<'a>,
}

impl<'a> AsciiFormatter<'a> {
    fn new(indent: &'a [u8]) -> Self {
        Self {
            pretty: PrettyFormatter::with_indent(indent),
        }
    }
}

impl<'a> Formatter for AsciiFormatter<'a> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }

    // fragments never contain quotes, backslashes or C0 control characters;
    // DEL and everything above it is written as \uXXXX
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..index])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_catalog;

    const SORT_GROUP: &str = "[\n\t{\n\t\t\"type\": \"sort\",\n\t\t\"name\": \"Sort\",\n\t\t\"canAscend\": true,\n\t\t\"options\": [\n\t\t\t\"Latest\",\n\t\t\t\"Caf\\u00e9\"\n\t\t],\n\t\t\"default\": {\n\t\t\t\"index\": 0,\n\t\t\t\"ascending\": false\n\t\t}\n\t},\n";

    fn filter_file() -> String {
        format!(
            "{}{}",
            SORT_GROUP,
            "\t{\n\t\t\"type\": \"group\",\n\t\t\"name\": \"Genres\",\n\t\t\"filters\": [\n\t\t\t{\n\t\t\t\t\"type\": \"genre\",\n\t\t\t\t\"name\": \"Stale\",\n\t\t\t\t\"id\": \"0\",\n\t\t\t\t\"canExclude\": true\n\t\t\t}\n\t\t]\n\t},\n\t{\n\t\t\"type\": \"group\",\n\t\t\"name\": \"Themes\",\n\t\t\"filters\": []\n\t}\n]\n"
        )
    }

    fn catalog() -> CatalogResponse {
        parse_catalog(
            br#"{"data": [
                {"id": "c", "attributes": {"name": {"en": "comedy"}, "group": "genre"}},
                {"id": "a", "attributes": {"name": {"en": "Action"}, "group": "genre"}},
                {"id": "g", "attributes": {"name": {"en": "Ghosts"}, "group": "theme"}}
            ]}"#,
        )
        .unwrap()
    }

    fn targets() -> Vec<TargetGroup> {
        vec![TargetGroup::grouped("Genres"), TargetGroup::grouped("Themes")]
    }

    fn write_fixture(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn group<'a>(document: &'a Value, name: &str) -> &'a Value {
        document
            .as_array()
            .unwrap()
            .iter()
            .find(|group| group["name"] == name)
            .unwrap()
    }

    #[test]
    fn test_render_round_trips_canonical_file() {
        let document: Value = serde_json::from_str(&filter_file()).unwrap();
        assert_eq!(String::from_utf8(render(&document).unwrap()).unwrap(), filter_file());
    }

    #[test]
    fn test_render_escapes_non_ascii() {
        let document = serde_json::json!(["Café", "幽霊", "𝄞", "quote\" tab\t"]);
        let rendered = String::from_utf8(render(&document).unwrap()).unwrap();
        assert_eq!(
            rendered,
            "[\n\t\"Caf\\u00e9\",\n\t\"\\u5e7d\\u970a\",\n\t\"\\ud834\\udd1e\",\n\t\"quote\\\" tab\\t\"\n]\n"
        );
    }

    #[test]
    fn test_render_escapes_delete() {
        let document = serde_json::json!(["a\u{7f}b", "~"]);
        let rendered = String::from_utf8(render(&document).unwrap()).unwrap();
        assert_eq!(rendered, "[\n\t\"a\\u007fb\",\n\t\"~\"\n]\n");
    }

    #[test]
    fn test_render_empty_containers() {
        let document = serde_json::json!([{"filters": [], "default": {}}]);
        let rendered = String::from_utf8(render(&document).unwrap()).unwrap();
        assert_eq!(rendered, "[\n\t{\n\t\t\"filters\": [],\n\t\t\"default\": {}\n\t}\n]\n");
    }

    #[test]
    fn test_sync_replaces_target_groups() {
        let (_dir, path) = write_fixture(&filter_file());

        sync(&path, &catalog(), &targets()).unwrap();

        let document = load(&path).unwrap();
        assert_eq!(
            group(&document, "Genres")["filters"],
            serde_json::json!([
                {"type": "genre", "name": "Action", "id": "a", "canExclude": true},
                {"type": "genre", "name": "comedy", "id": "c", "canExclude": true}
            ])
        );
        assert_eq!(
            group(&document, "Themes")["filters"],
            serde_json::json!([
                {"type": "genre", "name": "Ghosts", "id": "g", "canExclude": true}
            ])
        );
        assert_eq!(group(&document, "Genres")["type"], "group");
    }

    #[test]
    fn test_sync_leaves_other_groups_byte_identical() {
        let (_dir, path) = write_fixture(&filter_file());

        sync(&path, &catalog(), &targets()).unwrap();

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(SORT_GROUP));
        assert!(rewritten.ends_with("}\n]\n"));
        assert!(!rewritten.ends_with("\n\n"));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (_dir, path) = write_fixture(&filter_file());

        sync(&path, &catalog(), &targets()).unwrap();
        let first = fs::read(&path).unwrap();
        sync(&path, &catalog(), &targets()).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_sync_missing_group_writes_file_unchanged() {
        let (_dir, path) = write_fixture(&filter_file());

        sync(&path, &catalog(), &[TargetGroup::flat("Tags")]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), filter_file());
    }

    #[test]
    fn test_merge_reports_unmatched_updates() {
        let mut document: Value = serde_json::from_str(&filter_file()).unwrap();
        let updates = vec![
            GroupUpdate { name: "Genres".to_string(), filters: Vec::new() },
            GroupUpdate { name: "Formats".to_string(), filters: Vec::new() },
        ];

        let missing = merge(&mut document, &updates).unwrap();
        assert_eq!(missing, vec!["Formats".to_string()]);
        assert_eq!(group(&document, "Genres")["filters"], serde_json::json!([]));
        assert_eq!(document.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_merge_inserts_filters_when_absent() {
        let mut document = serde_json::json!([{"name": "Genres", "type": "group"}]);
        let updates = vec![GroupUpdate { name: "Genres".to_string(), filters: Vec::new() }];

        assert!(merge(&mut document, &updates).unwrap().is_empty());
        assert_eq!(document[0]["filters"], serde_json::json!([]));
        assert_eq!(document[0]["type"], "group");
    }

    #[test]
    fn test_merge_rejects_non_array_root() {
        let mut document = serde_json::json!({"name": "Genres"});
        let err = merge(&mut document, &[]).unwrap_err();
        assert!(matches!(err.downcast_ref::<TagSyncError>(), Some(TagSyncError::NotAnArray)));
    }

    #[test]
    fn test_sync_malformed_file_is_left_untouched() {
        let (_dir, path) = write_fixture("[{\"name\": \"Genres\",");

        assert!(sync(&path, &catalog(), &targets()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"name\": \"Genres\",");
    }

    #[test]
    fn test_sync_missing_english_name_leaves_file_untouched() {
        let (_dir, path) = write_fixture(&filter_file());
        let catalog = parse_catalog(
            br#"{"data": [{"id": "x", "attributes": {"name": {"fr": "Action"}, "group": "genre"}}]}"#,
        )
        .unwrap();

        assert!(sync(&path, &catalog, &targets()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), filter_file());
    }

    #[test]
    fn test_sync_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");

        assert!(sync(&path, &catalog(), &targets()).is_err());
        assert!(!path.exists());
    }
}
