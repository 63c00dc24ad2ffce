//! Filesystem-backed file store with an authoritative metadata catalog.
//!
//! The catalog and the managed directory are guarded by one reader/writer
//! lock: every mutation takes the write lock before touching either side,
//! which is what keeps the entry-iff-file invariant intact. Durability is
//! explicit: nothing is persisted until `flush` writes the metadata file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{Catalog, FileEntry};
use crate::config::Settings;
use crate::error::ServerError;
use crate::logging::LogStore;
use crate::response::Status;

const LIST_ALL: &str = "all";
const LOG_SOURCE: &str = "store";

/// A file is addressed either by its catalog id or by its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Id(i64),
    Name(String),
}

/// The managed directory plus its in-memory catalog.
pub struct FileStore {
    dir: PathBuf,
    metadata_path: PathBuf,
    id_field: String,
    data_field: String,
    log: Arc<LogStore>,
    catalog: RwLock<Catalog>,
}

impl FileStore {
    /// Prepare the managed directory and load the persisted catalog. A
    /// missing metadata file starts an empty catalog; a malformed one is a
    /// configuration error.
    pub async fn open(settings: &Settings, log: Arc<LogStore>) -> Result<Self, ServerError> {
        let dir = PathBuf::from(&settings.file_dir);
        match fs::metadata(&dir).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(ServerError::config(
                    "loaded path to the file directory is not valid",
                ));
            }
            Ok(_) => {}
            Err(_) => {
                fs::create_dir_all(&dir).await.map_err(|err| {
                    ServerError::config(format!("failed to create server file directory: {err}"))
                })?;
            }
        }

        let metadata_path = PathBuf::from(&settings.metadata_path);
        if let Some(parent) = metadata_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| {
                    ServerError::config(format!("failed to create metadata directory: {err}"))
                })?;
            }
        }

        let catalog = match fs::read_to_string(&metadata_path).await {
            Ok(text) => {
                let document: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
                    ServerError::config(format!("metadata file is not valid JSON: {err}"))
                })?;
                Catalog::from_json(
                    &document,
                    &settings.metadata_id_field,
                    &settings.metadata_data_field,
                )?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Catalog::new(),
            Err(err) => {
                return Err(ServerError::config(format!(
                    "failed to read metadata file: {err}"
                )));
            }
        };

        Ok(Self {
            dir,
            metadata_path,
            id_field: settings.metadata_id_field.clone(),
            data_field: settings.metadata_data_field.clone(),
            log,
            catalog: RwLock::new(catalog),
        })
    }

    /// Create a new file and catalog entry, returning the assigned id.
    /// A write failure rolls the created file back before reporting.
    pub async fn add(&self, file_name: &str, bytes: &[u8]) -> Result<i64, ServerError> {
        validate_name(file_name)?;
        let mut catalog = self.catalog.write().await;
        let path = self.file_path(file_name);

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ServerError::store(
                    Status::BadRequest,
                    format!("file with name '{file_name}' is already in the directory"),
                ));
            }
            Err(err) => {
                return Err(ServerError::store(
                    Status::InternalServerError,
                    format!("failed to create new file with name '{file_name}': {err}"),
                ));
            }
        };

        if let Err(err) = file.write_all(bytes).await {
            drop(file);
            if let Err(rollback) = fs::remove_file(&path).await {
                self.log.error(
                    LOG_SOURCE,
                    format!(
                        "could not remove the empty file '{file_name}' after a failed write: {rollback}"
                    ),
                );
                self.log.warn(
                    LOG_SOURCE,
                    format!(
                        "'{}' needs to be deleted manually from the file directory as soon as possible",
                        path.display()
                    ),
                );
            }
            return Err(ServerError::store(
                Status::InternalServerError,
                format!("error creating new file on the server: {err}"),
            ));
        }

        Ok(catalog.insert_new(file_name, bytes.len() as u64))
    }

    /// Read a file's bytes by id or name.
    pub async fn get(&self, identifier: &Identifier) -> Result<Vec<u8>, ServerError> {
        let catalog = self.catalog.read().await;
        let file_name = match identifier {
            Identifier::Name(name) => {
                validate_name(name)?;
                name.clone()
            }
            Identifier::Id(_) => {
                let id = resolve_id(&catalog, identifier)?;
                entry(&catalog, id)?.file_name.clone()
            }
        };
        let path = self.file_path(&file_name);
        match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Err(ServerError::store(
                Status::InternalServerError,
                "the file is empty or cannot be read",
            )),
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ServerError::store(
                Status::NotFound,
                "file does not exist on the server",
            )),
            Err(err) => Err(ServerError::store(
                Status::InternalServerError,
                format!("error reading file: {err}"),
            )),
        }
    }

    /// Catalog entry for a single file.
    pub async fn view(&self, identifier: &Identifier) -> Result<FileEntry, ServerError> {
        let catalog = self.catalog.read().await;
        let id = resolve_id(&catalog, identifier)?;
        Ok(entry(&catalog, id)?.clone())
    }

    /// Entries matching a keyword, or everything for the `all` sentinel.
    /// Results are sorted ascending by id.
    pub async fn list(&self, query: &str) -> Vec<FileEntry> {
        let catalog = self.catalog.read().await;
        if query == LIST_ALL {
            catalog.all()
        } else {
            catalog.filter(query)
        }
    }

    /// Replace a file's contents and refresh its size and update time.
    pub async fn override_contents(
        &self,
        identifier: &Identifier,
        bytes: &[u8],
    ) -> Result<(), ServerError> {
        let mut catalog = self.catalog.write().await;
        let id = resolve_id(&catalog, identifier)?;
        let file_name = entry(&catalog, id)?.file_name.clone();
        let path = self.existing_file_path(&file_name).await?;

        fs::write(&path, bytes).await.map_err(|_| {
            ServerError::store(
                Status::InternalServerError,
                "an unexpected error occurred while attempting to override the file",
            )
        })?;
        entry_mut(&mut catalog, id)?.update_size(bytes.len() as u64);
        Ok(())
    }

    /// Rename a file on disk and in the catalog. Fails when a file with
    /// the new name already exists.
    pub async fn rename(&self, identifier: &Identifier, new_name: &str) -> Result<(), ServerError> {
        validate_name(new_name)?;
        let mut catalog = self.catalog.write().await;
        let id = resolve_id(&catalog, identifier)?;
        let current_name = entry(&catalog, id)?.file_name.clone();
        let current_path = self.existing_file_path(&current_name).await?;

        let target_path = self.file_path(new_name);
        if fs::try_exists(&target_path).await.unwrap_or(false) {
            return Err(ServerError::store(
                Status::BadRequest,
                format!("file with name '{new_name}' already exists on the server"),
            ));
        }
        fs::rename(&current_path, &target_path).await.map_err(|err| {
            ServerError::store(
                Status::InternalServerError,
                format!("failed to rename file '{current_name}': {err}"),
            )
        })?;
        entry_mut(&mut catalog, id)?.update_name(new_name);
        Ok(())
    }

    /// Delete the file on disk and drop its catalog entry. The id counter
    /// keeps its value.
    pub async fn delete(&self, identifier: &Identifier) -> Result<(), ServerError> {
        let mut catalog = self.catalog.write().await;
        let id = resolve_id(&catalog, identifier)?;
        let file_name = entry(&catalog, id)?.file_name.clone();
        let path = self.existing_file_path(&file_name).await?;

        fs::remove_file(&path).await.map_err(|err| {
            ServerError::store(
                Status::InternalServerError,
                format!("failed to delete file '{file_name}': {err}"),
            )
        })?;
        catalog.remove(id);
        Ok(())
    }

    /// Persist the id counter and every entry to the metadata file in a
    /// single atomic write (temp file, then rename into place).
    pub async fn flush(&self) -> Result<(), ServerError> {
        let catalog = self.catalog.read().await;
        let document = catalog.to_json(&self.id_field, &self.data_field);
        let text = serde_json::to_string_pretty(&document).map_err(|err| {
            ServerError::store(
                Status::InternalServerError,
                format!("failed to serialize metadata: {err}"),
            )
        })?;

        let parent = self
            .metadata_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let base = self
            .metadata_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("metadata"));
        let temp_path = parent.join(format!(".{base}.tmp.{}", Uuid::new_v4()));

        if let Err(err) = fs::write(&temp_path, text).await {
            return Err(ServerError::store(
                Status::InternalServerError,
                format!("failed to write metadata file: {err}"),
            ));
        }
        if let Err(err) = fs::rename(&temp_path, &self.metadata_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(ServerError::store(
                Status::InternalServerError,
                format!("failed to replace metadata file: {err}"),
            ));
        }
        Ok(())
    }

    /// Highest id ever assigned.
    pub async fn current_id(&self) -> i64 {
        self.catalog.read().await.current_id()
    }

    /// Number of live catalog entries.
    pub async fn entry_count(&self) -> usize {
        self.catalog.read().await.len()
    }

    fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Path of a file that must already exist in the managed directory.
    async fn existing_file_path(&self, file_name: &str) -> Result<PathBuf, ServerError> {
        let path = self.file_path(file_name);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            Err(ServerError::store(
                Status::NotFound,
                format!("file with name '{file_name}' does not exist on the server"),
            ))
        }
    }
}

fn resolve_id(catalog: &Catalog, identifier: &Identifier) -> Result<i64, ServerError> {
    match identifier {
        Identifier::Id(id) => catalog.by_id(*id).map(|entry| entry.file_id).ok_or_else(|| {
            ServerError::store(
                Status::NotFound,
                format!("file with id #{id} does not exist in the file system"),
            )
        }),
        Identifier::Name(name) => catalog.by_name(name).map(|entry| entry.file_id).ok_or_else(|| {
            ServerError::store(
                Status::NotFound,
                format!("file with name '{name}' does not exist in the file system"),
            )
        }),
    }
}

fn entry(catalog: &Catalog, id: i64) -> Result<&FileEntry, ServerError> {
    catalog.by_id(id).ok_or_else(|| {
        ServerError::store(
            Status::NotFound,
            format!("file with id #{id} does not exist in the file system"),
        )
    })
}

fn entry_mut(catalog: &mut Catalog, id: i64) -> Result<&mut FileEntry, ServerError> {
    catalog.by_id_mut(id).ok_or_else(|| {
        ServerError::store(
            Status::NotFound,
            format!("file with id #{id} does not exist in the file system"),
        )
    })
}

/// Entry names stay inside the managed directory: no separators, no
/// traversal components.
fn validate_name(file_name: &str) -> Result<(), ServerError> {
    let invalid = file_name.is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name == "."
        || file_name == "..";
    if invalid {
        return Err(ServerError::store(
            Status::BadRequest,
            format!("'{file_name}' is not a valid file name"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn make_store(temp: &tempfile::TempDir) -> FileStore {
        let settings = Settings {
            http_version: "HTTP/1.1".to_string(),
            server_name: "filedepot".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            file_dir: temp.path().join("files").to_string_lossy().into_owned(),
            metadata_path: temp
                .path()
                .join("files_metadata.json")
                .to_string_lossy()
                .into_owned(),
            templates_path: String::new(),
            metadata_id_field: "currentId".to_string(),
            metadata_data_field: "data".to_string(),
        };
        FileStore::open(&settings, Arc::new(LogStore::new()))
            .await
            .expect("store")
    }

    #[tokio::test]
    async fn add_then_get_round_trips_bytes() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        let id = store.add("a.txt", b"HELLO").await.expect("add");
        assert_eq!(id, 1);
        let bytes = store.get(&Identifier::Id(id)).await.expect("get");
        assert_eq!(bytes, b"HELLO");
        let by_name = store
            .get(&Identifier::Name("a.txt".to_string()))
            .await
            .expect("get by name");
        assert_eq!(by_name, b"HELLO");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_and_catalog_untouched() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"one").await.expect("add");
        let err = store.add("a.txt", b"two").await.expect_err("duplicate");
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(store.entry_count().await, 1);
        assert_eq!(store.current_id().await, 1);
    }

    #[tokio::test]
    async fn view_reports_metadata() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"HELLO").await.expect("add");
        let entry = store.view(&Identifier::Id(1)).await.expect("view");
        assert_eq!(entry.file_name, "a.txt");
        assert_eq!(entry.file_type, "<TXT>");
        assert_eq!(entry.file_size, "0 kb (5 bytes)");
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        let err = store.view(&Identifier::Id(9)).await.expect_err("missing");
        assert_eq!(err.status(), Status::NotFound);
        let err = store
            .get(&Identifier::Name("ghost.txt".to_string()))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn list_supports_all_and_keyword_queries() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("report.txt", b"x").await.expect("add");
        store.add("image.png", b"y").await.expect("add");

        let all = store.list("all").await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_id, 1);

        let filtered = store.list("report").await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].file_name, "report.txt");
    }

    #[tokio::test]
    async fn override_updates_bytes_and_size() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"HELLO").await.expect("add");
        store
            .override_contents(&Identifier::Name("a.txt".to_string()), b"xyz")
            .await
            .expect("override");

        assert_eq!(store.get(&Identifier::Id(1)).await.expect("get"), b"xyz");
        let entry = store.view(&Identifier::Id(1)).await.expect("view");
        assert_eq!(entry.file_size, "0 kb (3 bytes)");
    }

    #[tokio::test]
    async fn rename_moves_file_and_updates_catalog() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"HELLO").await.expect("add");
        store
            .rename(&Identifier::Id(1), "b.txt")
            .await
            .expect("rename");

        let by_name = store
            .get(&Identifier::Name("b.txt".to_string()))
            .await
            .expect("get renamed");
        let by_id = store.get(&Identifier::Id(1)).await.expect("get by id");
        assert_eq!(by_name, by_id);
        let err = store
            .get(&Identifier::Name("a.txt".to_string()))
            .await
            .expect_err("old name gone");
        assert_eq!(err.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn rename_onto_existing_file_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"one").await.expect("add");
        store.add("b.txt", b"two").await.expect("add");

        let err = store
            .rename(&Identifier::Id(1), "b.txt")
            .await
            .expect_err("collision");
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(store.get(&Identifier::Id(1)).await.expect("a"), b"one");
        assert_eq!(store.get(&Identifier::Id(2)).await.expect("b"), b"two");
        assert_eq!(store.current_id().await, 2);
    }

    #[tokio::test]
    async fn delete_keeps_counter_monotone() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        let first = store.add("a.txt", b"HELLO").await.expect("add");
        store.delete(&Identifier::Id(first)).await.expect("delete");
        let err = store.get(&Identifier::Id(first)).await.expect_err("gone");
        assert_eq!(err.status(), Status::NotFound);

        let second = store.add("a.txt", b"HELLO").await.expect("re-add");
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn flush_and_reopen_restores_catalog() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"HELLO").await.expect("add");
        store.add("b.bin", b"xy").await.expect("add");
        store
            .delete(&Identifier::Name("a.txt".to_string()))
            .await
            .expect("delete");
        let before = store.list("all").await;
        store.flush().await.expect("flush");

        let reopened = make_store(&temp).await;
        assert_eq!(reopened.current_id().await, 2);
        assert_eq!(reopened.list("all").await, before);
    }

    #[tokio::test]
    async fn unflushed_mutations_are_lost_on_reopen() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        store.add("a.txt", b"HELLO").await.expect("add");
        store.flush().await.expect("flush");
        store.add("b.txt", b"LATER").await.expect("add");

        // No flush for b.txt: the next start only sees the flushed state,
        // while the orphan file stays on disk.
        let reopened = make_store(&temp).await;
        assert_eq!(reopened.entry_count().await, 1);
        assert_eq!(reopened.current_id().await, 1);
        assert!(temp.path().join("files").join("b.txt").exists());
    }

    #[tokio::test]
    async fn names_with_separators_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = make_store(&temp).await;

        let err = store.add("../escape.txt", b"x").await.expect_err("traversal");
        assert_eq!(err.status(), Status::BadRequest);
        let err = store
            .get(&Identifier::Name("../escape.txt".to_string()))
            .await
            .expect_err("traversal");
        assert_eq!(err.status(), Status::BadRequest);
    }
}
