//! The persistent local conversation store.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use shelleyfs_common::{ConversationRecord, CtlKey};
use tracing::{debug, instrument};

use crate::error::StoreError;

const RECORDS_FILE: &str = "conversations.json";
const MAX_ID_ALLOCATION_ATTEMPTS: usize = 64;

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct RecordFile {
    records: HashMap<String, ConversationRecord>,
}

/// Owns every [`ConversationRecord`] and persists them atomically on every
/// mutation (write-to-temp-then-rename).
pub struct LocalStore {
    records_path: PathBuf,
    state: Mutex<HashMap<String, ConversationRecord>>,
}

impl LocalStore {
    /// Opens (creating if absent) the store rooted at `dir`, which must
    /// already exist or be creatable with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created or the
    /// record file cannot be read, and [`StoreError::Corrupt`] if it exists
    /// but does not parse.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;

        let records_path = dir.join(RECORDS_FILE);
        let records = if records_path.exists() {
            let raw = fs::read_to_string(&records_path)?;
            let file: RecordFile = serde_json::from_str(&raw)?;
            file.records
        } else {
            HashMap::new()
        };

        Ok(Self {
            records_path,
            state: Mutex::new(records),
        })
    }

    fn persist(&self, records: &HashMap<String, ConversationRecord>) -> Result<(), StoreError> {
        let file = RecordFile {
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let temp_path = self.records_path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        fs::rename(&temp_path, &self.records_path)?;
        Ok(())
    }

    fn generate_local_id(records: &HashMap<String, ConversationRecord>) -> Result<String, StoreError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ID_ALLOCATION_ATTEMPTS {
            let candidate = format!("{:08x}", rng.r#gen::<u32>());
            if !records.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(StoreError::IdSpaceExhausted)
    }

    /// Allocates a fresh, uncreated conversation record and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdSpaceExhausted`] or an I/O error on persist
    /// failure.
    #[instrument(skip(self))]
    pub fn clone_conversation(&self) -> Result<String, StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let local_id = Self::generate_local_id(&records)?;
        let record = ConversationRecord::new(local_id.clone(), Utc::now());
        records.insert(local_id.clone(), record);
        self.persist(&records)?;
        debug!(local_id, "allocated conversation record");
        Ok(local_id)
    }

    /// Adopts a backend-known conversation. If `shelley_id` is already
    /// tracked, backfills empty slug/metadata fields on the existing record
    /// and returns its `local_id`; otherwise allocates a new record
    /// pre-marked `created = true`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdSpaceExhausted`] or an I/O error on persist
    /// failure.
    #[instrument(skip(self))]
    pub fn adopt(
        &self,
        shelley_id: &str,
        slug: Option<String>,
        api_created_at: Option<String>,
        api_updated_at: Option<String>,
    ) -> Result<String, StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = records
            .values_mut()
            .find(|r| r.shelley_id == shelley_id)
        {
            if existing.slug.is_empty() {
                if let Some(slug) = slug {
                    existing.slug = slug;
                }
            }
            if existing.api_created_at.is_empty() {
                if let Some(created) = api_created_at {
                    existing.api_created_at = created;
                }
            }
            if let Some(updated) = api_updated_at {
                existing.api_updated_at = updated;
            }
            let local_id = existing.local_id.clone();
            self.persist(&records)?;
            return Ok(local_id);
        }

        let local_id = Self::generate_local_id(&records)?;
        let record = ConversationRecord::new_adopted(
            local_id.clone(),
            shelley_id.to_string(),
            slug,
            api_created_at,
            api_updated_at,
            Utc::now(),
        );
        records.insert(local_id.clone(), record);
        self.persist(&records)?;
        debug!(local_id, shelley_id, "adopted conversation record");
        Ok(local_id)
    }

    /// Looks up a record by `local_id`.
    #[must_use]
    pub fn get(&self, local_id: &str) -> Option<ConversationRecord> {
        let records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.get(local_id).cloned()
    }

    /// Looks up a record by `shelley_id`.
    #[must_use]
    pub fn get_by_shelley_id(&self, shelley_id: &str) -> Option<ConversationRecord> {
        let records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records
            .values()
            .find(|r| r.shelley_id == shelley_id)
            .cloned()
    }

    /// Returns every tracked record.
    #[must_use]
    pub fn list(&self) -> Vec<ConversationRecord> {
        let records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.values().cloned().collect()
    }

    /// Merges `updates` into `local_id`'s `ctl` map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::ReadOnly`] once the record's `created` flag is true.
    pub fn set_ctl(&self, local_id: &str, updates: &[(CtlKey, String)]) -> Result<(), StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = records
            .get_mut(local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.to_string()))?;
        if record.created {
            return Err(StoreError::ReadOnly);
        }
        for (key, value) in updates {
            record.ctl.insert(*key, value.clone());
        }
        self.persist(&records)
    }

    /// Marks `local_id` as created. Monotonic: once `created` is true,
    /// subsequent calls only backfill an empty `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    pub fn mark_created(
        &self,
        local_id: &str,
        shelley_id: &str,
        slug: Option<String>,
    ) -> Result<(), StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = records
            .get_mut(local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.to_string()))?;

        if record.created {
            if record.slug.is_empty() {
                if let Some(slug) = slug {
                    record.slug = slug;
                }
            }
            return self.persist(&records);
        }

        record.created = true;
        record.shelley_id = shelley_id.to_string();
        if let Some(slug) = slug {
            record.slug = slug;
        }
        self.persist(&records)
    }

    /// Deletes `local_id` unconditionally from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    pub fn delete(&self, local_id: &str) -> Result<(), StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records
            .remove(local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.to_string()))?;
        self.persist(&records)
    }

    /// Removes uncreated records whose `created_at` is older than
    /// `idle_timeout`, returning how many were swept. Invoked at the start
    /// of every Readdir on the conversation list.
    ///
    /// # Errors
    ///
    /// Propagates a persist failure if any record was removed.
    pub fn sweep(&self, idle_timeout: Duration) -> Result<usize, StoreError> {
        let mut records = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Utc::now();
        let idle = chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<String> = records
            .values()
            .filter(|r| r.is_allocated() && now.signed_duration_since(r.created_at) >= idle)
            .map(|r| r.local_id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        for local_id in &expired {
            records.remove(local_id);
        }
        self.persist(&records)?;
        debug!(count = expired.len(), "swept idle uncreated conversations");
        Ok(expired.len())
    }
}
