// src/storage/mod.rs
use crate::model::SelectorGroup;
use crate::utils::error::StorageError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Fixed key under which every selector group is stored, as one JSON array.
pub const SELECTOR_GROUPS_KEY: &str = "selector-groups";

/// Minimal durable key-value store: one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Creates a new FileStore with the specified base directory
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        fs::create_dir_all(&base_path).await.map_err(StorageError::IoError)?;

        Ok(Self { base_dir: base_path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Writes through a temporary file so a crash never leaves a half-written entry.
    pub async fn set(&self, key: &str, value: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(key);
        let tmp = self.base_dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).await.map_err(StorageError::IoError)?;
        fs::rename(&tmp, &path).await.map_err(StorageError::IoError)?;
        tracing::debug!("Saved {} ({} bytes)", path.display(), value.len());
        Ok(path)
    }
}

/// Selector groups, always loaded and saved wholesale.
#[derive(Debug, Clone)]
pub struct SelectorGroupRepository {
    store: FileStore,
}

impl SelectorGroupRepository {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<SelectorGroup>, StorageError> {
        match self.store.get(SELECTOR_GROUPS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::SerializationError(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn write_all(&self, groups: &[SelectorGroup]) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(groups)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.store.set(SELECTOR_GROUPS_KEY, &raw).await?;
        Ok(())
    }

    /// Inserts or replaces (by id) a group.
    pub async fn save(&self, group: &SelectorGroup) -> Result<(), StorageError> {
        let mut groups = self.list().await?;
        match groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group.clone(),
            None => groups.push(group.clone()),
        }
        self.write_all(&groups).await?;
        tracing::info!("Saved selector group '{}' ({} selectors)", group.name, group.selectors.len());
        Ok(())
    }

    /// Looks a group up by id, falling back to an exact name match.
    pub async fn find(&self, id_or_name: &str) -> Result<SelectorGroup, StorageError> {
        let groups = self.list().await?;
        groups
            .iter()
            .find(|g| g.id == id_or_name)
            .or_else(|| groups.iter().find(|g| g.name == id_or_name))
            .cloned()
            .ok_or_else(|| StorageError::GroupNotFound(id_or_name.to_string()))
    }

    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut groups = self.list().await?;
        let before = groups.len();
        groups.retain(|g| g.id != id);
        if groups.len() == before {
            return Err(StorageError::GroupNotFound(id.to_string()));
        }
        self.write_all(&groups).await?;
        tracing::info!("Deleted selector group {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionType, Selector};
    use tokio_test::assert_ok;

    async fn repo() -> (tempfile::TempDir, SelectorGroupRepository) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store")).await.unwrap();
        (dir, SelectorGroupRepository::new(store))
    }

    fn group(name: &str) -> SelectorGroup {
        SelectorGroup::new(name, vec![Selector::new("h1", ExtractionType::Text).unwrap().named("title")])
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let (_dir, repo) = repo().await;
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_upserts_by_id() {
        let (dir, repo) = repo().await;
        let mut products = group("products");
        assert_ok!(repo.save(&products).await);
        assert_ok!(repo.save(&group("articles")).await);

        products.description = Some("shop listing".into());
        products.selectors.push(Selector::new("img", ExtractionType::Image).unwrap());
        assert_ok!(repo.save(&products).await);

        let groups = repo.list().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], products);

        // one wholesale entry under the fixed key
        let raw = std::fs::read_to_string(dir.path().join("store").join("selector-groups.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["selectors"][0]["cssSelector"], "h1");
    }

    #[tokio::test]
    async fn test_lists_groups_with_selectors_missing_field_name() {
        let (dir, repo) = repo().await;
        let raw = r##"[{"id":"g1","name":"heroes","selectors":[
            {"id":"s1","cssSelector":"#hero","extractionType":"image"},
            {"id":"s2","cssSelector":"h1","extractionType":"text","fieldName":"title"}
        ]}]"##;
        std::fs::write(dir.path().join("store").join("selector-groups.json"), raw).unwrap();

        let groups = repo.list().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].selectors[0].field_name, "#hero");
        assert_eq!(groups[0].selectors[1].field_name, "title");
        assert_eq!(repo.find("heroes").await.unwrap().id, "g1");
    }

    #[tokio::test]
    async fn test_find_and_delete() {
        let (_dir, repo) = repo().await;
        let g = group("products");
        repo.save(&g).await.unwrap();

        assert_eq!(repo.find(&g.id).await.unwrap(), g);
        assert_eq!(repo.find("products").await.unwrap(), g);
        assert!(matches!(repo.find("nope").await, Err(StorageError::GroupNotFound(_))));

        repo.delete(&g.id).await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
        assert!(matches!(repo.delete(&g.id).await, Err(StorageError::GroupNotFound(_))));
    }
}
