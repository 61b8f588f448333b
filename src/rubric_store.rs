//! Rubric registry: one TOML file per category, id = file stem.
//!
//! Saving never overwrites history: the previous file is moved into the
//! archive directory as `{id}_{YYYY-MM-DD_HH-MM-SS}.toml` first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Rubric;

const RUBRIC_EXTENSION: &str = "toml";

#[derive(Error, Debug)]
pub enum RubricError {
    #[error("Invalid rubric: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Rubric not found: {0}")]
    NotFound(String),

    #[error("Rubric I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse rubric {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot serialize rubric: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RubricError + '_ {
    move |source| RubricError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse one rubric file; the id is taken from the file stem.
pub fn load_rubric_file(path: &Path) -> Result<Rubric, RubricError> {
    let raw = std::fs::read_to_string(path).map_err(io_error(path))?;
    let mut rubric: Rubric = toml::from_str(&raw).map_err(|source| RubricError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    rubric.category_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(rubric)
}

/// Loaded rubrics keyed by category id. Batches take an `Arc<Rubric>`
/// snapshot, so `reload` between batches never changes a running one.
#[derive(Debug)]
pub struct RubricRegistry {
    dir: PathBuf,
    archive_dir: PathBuf,
    rubrics: BTreeMap<String, Arc<Rubric>>,
}

impl RubricRegistry {
    /// Read every `*.toml` in `dir`. Files that fail to parse or validate are
    /// skipped with a warning.
    pub fn load(dir: &Path, archive_dir: &Path) -> Result<Self, RubricError> {
        let mut registry = Self {
            dir: dir.to_path_buf(),
            archive_dir: archive_dir.to_path_buf(),
            rubrics: BTreeMap::new(),
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn reload(&mut self) -> Result<(), RubricError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let mut rubrics = BTreeMap::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_error(&self.dir))? {
            let path = entry.map_err(io_error(&self.dir))?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(RUBRIC_EXTENSION) {
                continue;
            }
            match load_rubric_file(&path) {
                Ok(rubric) => {
                    if let Err(problems) = rubric.validate() {
                        tracing::warn!(path = %path.display(), ?problems, "Skipping invalid rubric");
                        continue;
                    }
                    rubrics.insert(rubric.category_id.clone(), Arc::new(rubric));
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable rubric"),
            }
        }

        tracing::info!(dir = %self.dir.display(), count = rubrics.len(), "Loaded rubrics");
        self.rubrics = rubrics;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Rubric>, RubricError> {
        self.rubrics
            .get(id)
            .cloned()
            .ok_or_else(|| RubricError::NotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.rubrics.keys().cloned().collect()
    }

    /// `(id, Korean name)` pairs for selection lists.
    pub fn display_names(&self) -> Vec<(String, String)> {
        self.rubrics
            .iter()
            .map(|(id, r)| (id.clone(), r.category_name_ko.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rubrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rubrics.is_empty()
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RUBRIC_EXTENSION}"))
    }

    /// Validate and write `rubric` under its id, archiving the previous version.
    pub fn save(&mut self, rubric: Rubric) -> Result<Arc<Rubric>, RubricError> {
        rubric.validate().map_err(RubricError::Validation)?;
        if rubric.category_id.trim().is_empty() {
            return Err(RubricError::Validation(vec!["category_id must not be empty".into()]));
        }

        let path = self.path_for(&rubric.category_id);
        if path.exists() {
            self.archive(&rubric.category_id, &path)?;
        }

        let body = toml::to_string_pretty(&rubric)?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        std::fs::write(&path, body).map_err(io_error(&path))?;
        tracing::info!(id = %rubric.category_id, path = %path.display(), "Saved rubric");

        let rubric = Arc::new(rubric);
        self.rubrics.insert(rubric.category_id.clone(), rubric.clone());
        Ok(rubric)
    }

    /// Save a new rubric, assigning a fresh id when it has none.
    pub fn create(&mut self, mut rubric: Rubric) -> Result<Arc<Rubric>, RubricError> {
        if rubric.category_id.trim().is_empty() {
            rubric.category_id = Uuid::new_v4().to_string();
        }
        self.save(rubric)
    }

    fn archive(&self, id: &str, current: &Path) -> Result<PathBuf, RubricError> {
        std::fs::create_dir_all(&self.archive_dir).map_err(io_error(&self.archive_dir))?;
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let mut target = self.archive_dir.join(format!("{id}_{stamp}.{RUBRIC_EXTENSION}"));
        let mut n = 2;
        while target.exists() {
            target = self
                .archive_dir
                .join(format!("{id}_{stamp}_{n}.{RUBRIC_EXTENSION}"));
            n += 1;
        }
        // rename fails across filesystems, so copy then remove.
        std::fs::copy(current, &target).map_err(io_error(&target))?;
        std::fs::remove_file(current).map_err(io_error(current))?;
        tracing::info!(id, archived = %target.display(), "Archived previous rubric version");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rubric::fixtures::communication_rubric;

    fn registry() -> (tempfile::TempDir, RubricRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            RubricRegistry::load(&dir.path().join("rubrics"), &dir.path().join("archive")).unwrap();
        (dir, registry)
    }

    #[test]
    fn load_creates_missing_dir() {
        let (dir, registry) = registry();
        assert!(registry.is_empty());
        assert!(dir.path().join("rubrics").is_dir());
    }

    #[test]
    fn save_then_get_round_trips() {
        let (dir, mut registry) = registry();
        registry.save(communication_rubric()).unwrap();
        assert_eq!(registry.ids(), vec!["communication"]);
        assert_eq!(
            registry.display_names(),
            vec![("communication".to_string(), "의사소통".to_string())]
        );

        let mut fresh =
            RubricRegistry::load(&dir.path().join("rubrics"), &dir.path().join("archive")).unwrap();
        fresh.reload().unwrap();
        assert_eq!(*fresh.get("communication").unwrap(), communication_rubric());
    }

    #[test]
    fn save_archives_previous_version() {
        let (dir, mut registry) = registry();
        registry.save(communication_rubric()).unwrap();
        let mut edited = communication_rubric();
        edited.category_name_ko = "의사소통 역량".into();
        registry.save(edited).unwrap();

        let archived: Vec<String> = std::fs::read_dir(dir.path().join("archive"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].starts_with("communication_"));
        assert!(archived[0].ends_with(".toml"));
        assert_eq!(registry.get("communication").unwrap().category_name_ko, "의사소통 역량");
    }

    #[test]
    fn invalid_rubric_not_written() {
        let (dir, mut registry) = registry();
        let mut rubric = communication_rubric();
        rubric.criteria[0].sub_criteria.clear();
        let err = registry.save(rubric).unwrap_err();
        assert!(matches!(err, RubricError::Validation(_)));
        assert!(!dir.path().join("rubrics/communication.toml").exists());
    }

    #[test]
    fn create_assigns_id() {
        let (_dir, mut registry) = registry();
        let mut rubric = communication_rubric();
        rubric.category_id = String::new();
        let saved = registry.create(rubric).unwrap();
        assert!(Uuid::parse_str(&saved.category_id).is_ok());
        assert!(registry.get(&saved.category_id).is_ok());
    }

    #[test]
    fn unknown_id_not_found() {
        let (_dir, registry) = registry();
        assert!(matches!(registry.get("nope"), Err(RubricError::NotFound(_))));
    }

    #[test]
    fn broken_files_skipped_on_reload() {
        let (dir, mut registry) = registry();
        let rubrics = dir.path().join("rubrics");
        std::fs::write(rubrics.join("broken.toml"), "category_name_ko = ").unwrap();
        std::fs::write(
            rubrics.join("empty.toml"),
            "category_name_ko = \"빈\"\ncategory_name_en = \"Empty\"\ncriteria = []\n",
        )
        .unwrap();
        std::fs::write(rubrics.join("notes.txt"), "ignored").unwrap();
        registry.save(communication_rubric()).unwrap();
        registry.reload().unwrap();
        assert_eq!(registry.ids(), vec!["communication"]);
    }

    #[test]
    fn snapshot_survives_reload() {
        let (_dir, mut registry) = registry();
        registry.save(communication_rubric()).unwrap();
        let snapshot = registry.get("communication").unwrap();
        let mut edited = communication_rubric();
        edited.category_name_en = "Speaking".into();
        registry.save(edited).unwrap();
        registry.reload().unwrap();
        assert_eq!(snapshot.category_name_en, "Communication");
        assert_eq!(registry.get("communication").unwrap().category_name_en, "Speaking");
    }
}
