// Local persistence for uploaded documents and candidate records

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub const RESUME_CATEGORY: &str = "resume";
pub const JOB_DESCRIPTION_CATEGORY: &str = "job_description";
const RECORDS_KEY: &str = "candidates";

/// Extensions accepted for resumes and job descriptions
pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];

/// A file handed to the store
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("not a file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let content_type = content_type_for(&name).to_string();
        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_document(name: &str) -> bool {
    extension_of(name)
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn content_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// A stored file with its metadata; `data` is base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub content_type: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    fn encode(file: &UploadedFile) -> Self {
        Self {
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
            created_at: Utc::now(),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| Error::Serialization(format!("corrupt file data: {}", e)))
    }
}

/// Details entered on the upload screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    pub contact: String,
    pub job_role: String,
    pub resume_path: String,
    pub job_description_path: String,
}

impl CandidateProfile {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("email", &self.email),
            ("contact", &self.contact),
            ("job_role", &self.job_role),
            ("resume", &self.resume_path),
            ("job_description", &self.job_description_path),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Please fill in all fields and upload required documents (missing: {})",
                missing.join(", ")
            )));
        }

        for (field, path) in [
            ("resume", &self.resume_path),
            ("job_description", &self.job_description_path),
        ] {
            if !is_document(path) {
                return Err(Error::Validation(format!(
                    "{} must be one of .{}",
                    field,
                    DOCUMENT_EXTENSIONS.join(", .")
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub profile: CandidateProfile,
}

/// Local persistence consumed by the upload flow
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Store a file under `category`, returning its path
    async fn save_file(&self, file: &UploadedFile, category: &str) -> Result<String>;

    async fn get_file(&self, path: &str) -> Result<StoredFile>;

    /// Validate and store a candidate profile
    async fn save_record(&self, profile: CandidateProfile) -> Result<CandidateRecord>;

    async fn get_record(&self, id: &str) -> Result<CandidateRecord>;
}

fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn check_category(category: &str) -> Result<()> {
    let valid = !category.is_empty()
        && category != RECORDS_KEY
        && category
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid category: {:?}", category)))
    }
}

fn file_path_for(file: &UploadedFile, category: &str) -> Result<String> {
    check_category(category)?;
    if file.name.is_empty() || file.name.contains('/') {
        return Err(Error::Validation(format!("invalid file name: {:?}", file.name)));
    }
    Ok(format!("{}/{}-{}", category, unique_id(), file.name))
}

fn category_of(path: &str) -> Result<&str> {
    let (category, _) = path
        .split_once('/')
        .ok_or_else(|| Error::NotFound(path.to_string()))?;
    check_category(category)?;
    Ok(category)
}

fn new_record(profile: CandidateProfile) -> Result<CandidateRecord> {
    profile.validate()?;
    Ok(CandidateRecord {
        id: unique_id(),
        created_at: Utc::now(),
        profile,
    })
}

/// Store kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, StoredFile>>,
    records: RwLock<Vec<CandidateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn save_file(&self, file: &UploadedFile, category: &str) -> Result<String> {
        let path = file_path_for(file, category)?;
        self.files
            .write()
            .insert(path.clone(), StoredFile::encode(file));
        Ok(path)
    }

    async fn get_file(&self, path: &str) -> Result<StoredFile> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn save_record(&self, profile: CandidateProfile) -> Result<CandidateRecord> {
        let record = new_record(profile)?;
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn get_record(&self, id: &str) -> Result<CandidateRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

/// Store that keeps one JSON document per category in a directory
pub struct JsonFileStore {
    dir: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn load<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match tokio::fs::read(self.document(key)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(Error::Storage(format!("failed to read {}: {}", key, e))),
        }
    }

    async fn persist<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = self.document(key);
        let staging = self.dir.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {}", key, e)))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::Storage(format!("failed to replace {}: {}", key, e)))?;
        debug!(document = %target.display(), "persisted");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn save_file(&self, file: &UploadedFile, category: &str) -> Result<String> {
        let path = file_path_for(file, category)?;

        let _guard = self.write_lock.lock().await;
        let mut files: BTreeMap<String, StoredFile> = self.load(category).await?;
        files.insert(path.clone(), StoredFile::encode(file));
        self.persist(category, &files).await?;
        Ok(path)
    }

    async fn get_file(&self, path: &str) -> Result<StoredFile> {
        let category = category_of(path)?;
        let files: BTreeMap<String, StoredFile> = self.load(category).await?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn save_record(&self, profile: CandidateProfile) -> Result<CandidateRecord> {
        let record = new_record(profile)?;

        let _guard = self.write_lock.lock().await;
        let mut records: Vec<CandidateRecord> = self.load(RECORDS_KEY).await?;
        records.push(record.clone());
        self.persist(RECORDS_KEY, &records).await?;
        Ok(record)
    }

    async fn get_record(&self, id: &str) -> Result<CandidateRecord> {
        let records: Vec<CandidateRecord> = self.load(RECORDS_KEY).await?;
        records
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
