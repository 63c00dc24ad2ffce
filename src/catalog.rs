//! In-memory file metadata catalog and its JSON persistence format.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServerError;

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";
const UNDEFINED_TYPE: &str = "<NULL>";

/// Metadata for one stored file. Serialized field names are part of the
/// wire and on-disk format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_id: i64,
    pub file_name: String,
    pub file_type: String,
    pub file_size: String,
    pub time_created: String,
    pub time_updated: String,
}

impl FileEntry {
    fn new(file_id: i64, file_name: &str, size: u64) -> Self {
        let stamp = now_stamp();
        Self {
            file_id,
            file_name: file_name.to_string(),
            file_type: type_tag(file_name),
            file_size: format_size(size),
            time_created: stamp.clone(),
            time_updated: stamp,
        }
    }

    pub fn update_size(&mut self, size: u64) {
        self.file_size = format_size(size);
        self.touch();
    }

    pub fn update_name(&mut self, file_name: &str) {
        self.file_name = file_name.to_string();
        self.touch();
    }

    fn touch(&mut self) {
        self.time_updated = now_stamp();
    }

    /// The keyword filter used by list queries. Note the second disjunct
    /// is deliberately asymmetric: the query must contain the id, not the
    /// other way around.
    pub fn matches_query(&self, query: &str) -> bool {
        self.file_name.contains(query) || query.contains(&self.file_id.to_string())
    }
}

/// Uppercase extension tag, e.g. `<TXT>`; `<NULL>` when the name has no
/// dot or nothing follows the last one. A leading dot counts as a
/// separator, so `.gitignore` tags as `<GITIGNORE>`. (`<DIR>` is reserved
/// for directories, which the store never catalogs.)
pub fn type_tag(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(index) if index + 1 < file_name.len() => {
            format!("<{}>", file_name[index + 1..].to_uppercase())
        }
        _ => UNDEFINED_TYPE.to_string(),
    }
}

/// True when both names carry the same type tag.
pub fn same_type(file_name: &str, other_name: &str) -> bool {
    type_tag(file_name) == type_tag(other_name)
}

fn format_size(size: u64) -> String {
    format!("{} kb ({} bytes)", size / 1024, size)
}

fn now_stamp() -> String {
    Local::now().format(DATE_TIME_FORMAT).to_string()
}

/// The id counter plus the id-to-entry map. The counter only ever grows;
/// deleting an entry never frees its id.
#[derive(Debug, Default)]
pub struct Catalog {
    current_id: AtomicI64,
    entries: HashMap<i64, FileEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_id(&self) -> i64 {
        self.current_id.load(Ordering::SeqCst)
    }

    /// Assign the next id and record a new entry under it.
    pub fn insert_new(&mut self, file_name: &str, size: u64) -> i64 {
        let id = self.current_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.insert(id, FileEntry::new(id, file_name, size));
        id
    }

    pub fn by_id(&self, id: i64) -> Option<&FileEntry> {
        self.entries.get(&id)
    }

    pub fn by_id_mut(&mut self, id: i64) -> Option<&mut FileEntry> {
        self.entries.get_mut(&id)
    }

    pub fn by_name(&self, file_name: &str) -> Option<&FileEntry> {
        self.entries.values().find(|entry| entry.file_name == file_name)
    }

    pub fn remove(&mut self, id: i64) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every entry, ascending by id.
    pub fn all(&self) -> Vec<FileEntry> {
        let mut entries: Vec<FileEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.file_id);
        entries
    }

    /// Entries matching the keyword filter, ascending by id.
    pub fn filter(&self, query: &str) -> Vec<FileEntry> {
        let mut entries: Vec<FileEntry> = self
            .entries
            .values()
            .filter(|entry| entry.matches_query(query))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.file_id);
        entries
    }

    /// Render the catalog as the metadata document. The field keys come
    /// from settings so the on-disk names stay configurable.
    pub fn to_json(&self, id_field: &str, data_field: &str) -> Value {
        let mut data = Map::new();
        for entry in self.all() {
            data.insert(
                entry.file_id.to_string(),
                serde_json::to_value(&entry).unwrap_or(Value::Null),
            );
        }
        let mut document = Map::new();
        document.insert(id_field.to_string(), Value::from(self.current_id()));
        document.insert(data_field.to_string(), Value::Object(data));
        Value::Object(document)
    }

    /// Rebuild a catalog from a metadata document.
    pub fn from_json(
        document: &Value,
        id_field: &str,
        data_field: &str,
    ) -> Result<Self, ServerError> {
        let current_id = document
            .get(id_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ServerError::config(format!("metadata file is missing the '{id_field}' field"))
            })?;
        let data = document
            .get(data_field)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ServerError::config(format!("metadata file is missing the '{data_field}' field"))
            })?;

        let mut entries = HashMap::new();
        for (key, value) in data {
            let id: i64 = key.parse().map_err(|_| {
                ServerError::config(format!("'{key}' is not a valid metadata entry id"))
            })?;
            let entry: FileEntry = serde_json::from_value(value.clone()).map_err(|err| {
                ServerError::config(format!("metadata entry #{key} is malformed: {err}"))
            })?;
            entries.insert(id, entry);
        }
        Ok(Self {
            current_id: AtomicI64::new(current_id),
            entries,
        })
    }
}
