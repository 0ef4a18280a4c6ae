//! src/services/project_service.rs
//!
//! ProjectService — every project operation in terms of the two stores.
//! The metadata store holds one JSON document per project; the content
//! store holds one blob per file at `{projectId}/{relativePath}`.
//!
//! None of the operations are atomic across the stores. A failure partway
//! through a multi-step operation is reported as [`ProjectError::Store`]
//! naming the failed step and how many content writes or deletes completed
//! before it; nothing is rolled back.

use crate::{
    models::project::{ANONYMOUS_USER, FileEntry, FileWithContent, ProjectRecord},
    stores::{ContentStore, MetadataStore, StoreError, ensure_key_safe},
};
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use futures::{StreamExt, stream};
use serde::Deserialize;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Default per-file upload limit.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * MIB;

/// Default limit on the summed size of one upload.
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 50 * MIB;

/// The store step during which a multi-step operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStep {
    ReadMetadata,
    WriteMetadata,
    DeleteMetadata,
    ListMetadata,
    ReadContent(String),
    WriteContent(String),
    DeleteContent(String),
}

impl fmt::Display for StoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadMetadata => write!(f, "reading project metadata"),
            Self::WriteMetadata => write!(f, "writing project metadata"),
            Self::DeleteMetadata => write!(f, "deleting project metadata"),
            Self::ListMetadata => write!(f, "listing project metadata"),
            Self::ReadContent(key) => write!(f, "reading content `{}`", key),
            Self::WriteContent(key) => write!(f, "writing content `{}`", key),
            Self::DeleteContent(key) => write!(f, "deleting content `{}`", key),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No files uploaded")]
    NoFiles,
    #[error("File {name} is too large. Max size is {} per file", megabytes(.limit))]
    FileTooLarge { name: String, size: u64, limit: u64 },
    #[error(
        "Total upload size ({} MB) exceeds {} limit",
        megabytes_2dp(.total),
        megabytes(.limit)
    )]
    TotalTooLarge { total: u64, limit: u64 },
    #[error("Total upload size exceeds {} limit", megabytes(.limit))]
    BodyTooLarge { limit: u64 },
    #[error("Project ID required")]
    MissingProjectId,
    #[error("Project ID and files required")]
    MissingUpdateFields,
    #[error("invalid user id `{0}`")]
    InvalidUserId(String),
    #[error("invalid file path `{0}`")]
    InvalidPath(String),
    #[error("file path `{path}` is outside project `{project_id}`")]
    ForeignPath { project_id: String, path: String },
    #[error("Project not found")]
    NotFound { project_id: String },
    #[error("stored record `{key}` is not a valid project document: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode project `{project_id}`: {source}")]
    Encode {
        project_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{step} failed after {completed} completed content operation(s): {source}")]
    Store {
        step: StoreStep,
        completed: usize,
        #[source]
        source: StoreError,
    },
}

pub type ProjectResult<T> = Result<T, ProjectError>;

fn megabytes(bytes: &u64) -> String {
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{}MB", megabytes_2dp(bytes))
    }
}

fn megabytes_2dp(bytes: &u64) -> String {
    format!("{:.2}", *bytes as f64 / MIB as f64)
}

/// Size limits applied to uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

impl UploadLimits {
    pub fn check_file(&self, name: &str, size: u64) -> ProjectResult<()> {
        if size > self.max_file_size {
            return Err(ProjectError::FileTooLarge {
                name: name.to_string(),
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Rejection for a request body that outgrew the total limit before its
    /// file parts could be counted.
    pub fn body_too_large(&self) -> ProjectError {
        ProjectError::BodyTooLarge {
            limit: self.max_total_size,
        }
    }

    pub fn check_total(&self, total: u64) -> ProjectResult<()> {
        if total > self.max_total_size {
            return Err(ProjectError::TotalTooLarge {
                total,
                limit: self.max_total_size,
            });
        }
        Ok(())
    }
}

/// One file of an upload, as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    /// Path relative to the uploaded folder root, when the client sent one.
    pub relative_path: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub project_name: Option<String>,
    pub user_id: Option<String>,
    pub files: Vec<UploadedFile>,
}

/// JSON body of an update request. Both fields are required; they are
/// optional here so their absence maps to a validation error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub project_id: Option<String>,
    pub files: Option<Vec<UpdatedFile>>,
}

impl UpdateProjectRequest {
    pub fn into_parts(self) -> ProjectResult<(String, Vec<UpdatedFile>)> {
        match (self.project_id, self.files) {
            (Some(id), Some(files)) if !id.is_empty() => Ok((id, files)),
            _ => Err(ProjectError::MissingUpdateFields),
        }
    }
}

/// Replacement file supplied by an update. `path` is the full content-store key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedFile {
    pub path: String,
    #[serde(default)]
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

/// Millisecond clock that never hands out the same value twice in-process.
#[derive(Debug, Default)]
struct ProjectIdClock {
    last: AtomicI64,
}

impl ProjectIdClock {
    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

/// ProjectService implements the project operations against injected stores:
/// - Upload (validate limits, write blobs, write the metadata document)
/// - Get one project with inlined file content
/// - List all projects or one user's projects, newest first
/// - Update (replace the file list wholesale)
/// - Delete (remove every referenced blob, then the metadata document)
///
/// Store calls are awaited one at a time; a project with N files costs N
/// content round trips per operation.
#[derive(Clone)]
pub struct ProjectService {
    content: Arc<dyn ContentStore>,
    metadata: Arc<dyn MetadataStore>,
    limits: UploadLimits,
    clock: Arc<ProjectIdClock>,
}

impl ProjectService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: UploadLimits,
    ) -> Self {
        Self {
            content,
            metadata,
            limits,
            clock: Arc::new(ProjectIdClock::default()),
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Mint `{userId}-{millis}`, skipping ids that already have a record.
    async fn mint_project_id(&self, user_id: &str) -> ProjectResult<(String, DateTime<Utc>)> {
        loop {
            let millis = self.clock.next();
            let project_id = format!("{}-{}", user_id, millis);
            let existing = self
                .metadata
                .get(&project_id)
                .await
                .map_err(|source| ProjectError::Store {
                    step: StoreStep::ReadMetadata,
                    completed: 0,
                    source,
                })?;
            if existing.is_some() {
                debug!("project id {} already taken, advancing clock", project_id);
                continue;
            }
            let created = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
            return Ok((project_id, created));
        }
    }

    /// Fetch and parse a project document. `Ok(None)` when absent.
    async fn load_record(&self, project_id: &str) -> ProjectResult<Option<ProjectRecord>> {
        let raw = self
            .metadata
            .get(project_id)
            .await
            .map_err(|source| ProjectError::Store {
                step: StoreStep::ReadMetadata,
                completed: 0,
                source,
            })?;

        raw.map(|doc| {
            serde_json::from_str(&doc).map_err(|source| ProjectError::CorruptRecord {
                key: project_id.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn store_record(&self, record: &ProjectRecord, completed: usize) -> ProjectResult<()> {
        let doc = serde_json::to_string(record).map_err(|source| ProjectError::Encode {
            project_id: record.project_id.clone(),
            source,
        })?;
        self.metadata
            .set(&record.project_id, doc)
            .await
            .map_err(|source| ProjectError::Store {
                step: StoreStep::WriteMetadata,
                completed,
                source,
            })
    }

    /// Store every uploaded file and record the new project.
    ///
    /// Limits and paths are validated before anything is written. Blobs
    /// written before a later failure stay in the content store.
    pub async fn upload_project(&self, request: UploadRequest) -> ProjectResult<ProjectRecord> {
        if request.files.is_empty() {
            return Err(ProjectError::NoFiles);
        }

        let mut total_size = 0u64;
        for file in &request.files {
            let size = file.data.len() as u64;
            self.limits.check_file(&file.name, size)?;
            total_size += size;
        }
        self.limits.check_total(total_size)?;

        let user_id = request
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        if user_id.contains('/') || ensure_key_safe(&user_id).is_err() {
            return Err(ProjectError::InvalidUserId(user_id));
        }

        let relative_paths = request
            .files
            .iter()
            .map(|file| {
                let relative = file
                    .relative_path
                    .clone()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| file.name.clone());
                match ensure_key_safe(&relative) {
                    Ok(()) => Ok(relative),
                    Err(_) => Err(ProjectError::InvalidPath(relative)),
                }
            })
            .collect::<ProjectResult<Vec<_>>>()?;

        let folder_name = request
            .files
            .first()
            .and_then(|file| file.relative_path.as_deref())
            .and_then(|path| path.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);

        let (project_id, upload_date) = self.mint_project_id(&user_id).await?;

        let mut entries = Vec::with_capacity(request.files.len());
        for (written, (file, relative_path)) in
            request.files.into_iter().zip(relative_paths).enumerate()
        {
            let key = format!("{}/{}", project_id, relative_path);
            let text = String::from_utf8_lossy(&file.data).into_owned();
            self.content
                .set(&key, Bytes::from(text))
                .await
                .map_err(|source| ProjectError::Store {
                    step: StoreStep::WriteContent(key.clone()),
                    completed: written,
                    source,
                })?;
            debug!("stored {} ({} bytes)", key, file.data.len());

            entries.push(FileEntry {
                name: file.name,
                relative_path,
                path: key,
                size: file.data.len() as u64,
                content_type: file.content_type,
                encoding: None,
            });
        }

        let record = ProjectRecord {
            project_id,
            project_name: request.project_name,
            user_id,
            folder_name,
            file_count: entries.len(),
            files: entries,
            upload_date,
            last_modified: None,
            total_size,
        };
        self.store_record(&record, record.files.len()).await?;

        info!(
            project_id = %record.project_id,
            user_id = %record.user_id,
            files = record.file_count,
            bytes = record.total_size,
            "project uploaded"
        );
        Ok(record)
    }

    /// Fetch a project with every file body inlined. The stored document is
    /// not modified.
    pub async fn get_project(
        &self,
        project_id: &str,
    ) -> ProjectResult<ProjectRecord<FileWithContent>> {
        if project_id.is_empty() {
            return Err(ProjectError::MissingProjectId);
        }

        let record = self
            .load_record(project_id)
            .await?
            .ok_or_else(|| ProjectError::NotFound {
                project_id: project_id.to_string(),
            })?;

        let mut files = Vec::with_capacity(record.files.len());
        for (read, entry) in record.files.iter().enumerate() {
            let blob = self
                .content
                .get(&entry.path)
                .await
                .map_err(|source| ProjectError::Store {
                    step: StoreStep::ReadContent(entry.path.clone()),
                    completed: read,
                    source,
                })?;
            if blob.is_none() {
                warn!("project {} references missing blob {}", project_id, entry.path);
            }
            files.push(FileWithContent {
                entry: entry.clone(),
                content: blob.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            });
        }

        Ok(record.with_files(files))
    }

    /// Every readable project, newest upload first.
    ///
    /// Documents that cannot be fetched or parsed are skipped.
    pub async fn list_projects(&self) -> ProjectResult<Vec<ProjectRecord>> {
        self.collect_projects(None).await
    }

    /// Projects owned by `user_id` (default `anonymous`), newest upload first.
    pub async fn list_user_projects(
        &self,
        user_id: Option<&str>,
    ) -> ProjectResult<Vec<ProjectRecord>> {
        let user_id = user_id.filter(|id| !id.is_empty()).unwrap_or(ANONYMOUS_USER);
        self.collect_projects(Some(user_id)).await
    }

    async fn collect_projects(&self, owner: Option<&str>) -> ProjectResult<Vec<ProjectRecord>> {
        let keys = self
            .metadata
            .list()
            .await
            .map_err(|source| ProjectError::Store {
                step: StoreStep::ListMetadata,
                completed: 0,
                source,
            })?;

        let metadata = &self.metadata;
        let fetched: Vec<_> = stream::iter(keys)
            .then(|key| async move {
                let doc = metadata.get(&key).await;
                (key, doc)
            })
            .collect()
            .await;

        let mut projects = Vec::with_capacity(fetched.len());
        for (key, doc) in fetched {
            let doc = match doc {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(err) => {
                    warn!("skipping project {}: {}", key, err);
                    continue;
                }
            };
            let record: ProjectRecord = match serde_json::from_str(&doc) {
                Ok(record) => record,
                Err(err) => {
                    warn!("skipping unreadable project {}: {}", key, err);
                    continue;
                }
            };
            if owner.is_none_or(|owner| record.user_id == owner) {
                projects.push(record);
            }
        }

        projects.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(projects)
    }

    /// Replace a project's file list wholesale.
    ///
    /// Each supplied body is written verbatim at its `path`. Blobs of files
    /// dropped from the list are left in place, and the cached `fileCount` /
    /// `totalSize` keep their upload-time values.
    pub async fn update_project(
        &self,
        project_id: &str,
        files: Vec<UpdatedFile>,
    ) -> ProjectResult<ProjectRecord> {
        if project_id.is_empty() {
            return Err(ProjectError::MissingUpdateFields);
        }

        let mut record = self
            .load_record(project_id)
            .await?
            .ok_or_else(|| ProjectError::NotFound {
                project_id: project_id.to_string(),
            })?;

        let prefix = format!("{}/", project_id);
        for file in &files {
            ensure_key_safe(&file.path).map_err(|_| ProjectError::InvalidPath(file.path.clone()))?;
            if !file.path.starts_with(&prefix) || file.path.len() == prefix.len() {
                return Err(ProjectError::ForeignPath {
                    project_id: project_id.to_string(),
                    path: file.path.clone(),
                });
            }
        }

        let mut entries = Vec::with_capacity(files.len());
        for (written, file) in files.into_iter().enumerate() {
            let size = file.content.len() as u64;
            self.content
                .set(&file.path, Bytes::from(file.content))
                .await
                .map_err(|source| ProjectError::Store {
                    step: StoreStep::WriteContent(file.path.clone()),
                    completed: written,
                    source,
                })?;
            debug!("rewrote {} ({} bytes)", file.path, size);

            let relative_path = file
                .relative_path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| file.path[prefix.len()..].to_string());
            let name = if file.name.is_empty() {
                relative_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&relative_path)
                    .to_string()
            } else {
                file.name
            };

            entries.push(FileEntry {
                name,
                relative_path,
                path: file.path,
                size,
                content_type: file.content_type.unwrap_or_default(),
                encoding: file.encoding,
            });
        }

        record.files = entries;
        record.last_modified = Some(Utc::now().trunc_subsecs(3));
        self.store_record(&record, record.files.len()).await?;

        info!(
            project_id = %record.project_id,
            files = record.files.len(),
            "project updated"
        );
        Ok(record)
    }

    /// Delete every blob the project references, then its metadata document.
    ///
    /// Blobs are removed one at a time; a failure leaves the remaining blobs
    /// and the metadata document in place.
    pub async fn delete_project(&self, project_id: &str) -> ProjectResult<ProjectRecord> {
        if project_id.is_empty() {
            return Err(ProjectError::MissingProjectId);
        }

        let record = self
            .load_record(project_id)
            .await?
            .ok_or_else(|| ProjectError::NotFound {
                project_id: project_id.to_string(),
            })?;

        for (deleted, entry) in record.files.iter().enumerate() {
            self.content
                .delete(&entry.path)
                .await
                .map_err(|source| ProjectError::Store {
                    step: StoreStep::DeleteContent(entry.path.clone()),
                    completed: deleted,
                    source,
                })?;
        }

        self.metadata
            .delete(project_id)
            .await
            .map_err(|source| ProjectError::Store {
                step: StoreStep::DeleteMetadata,
                completed: record.files.len(),
                source,
            })?;

        info!(
            project_id = %record.project_id,
            files = record.files.len(),
            "project deleted"
        );
        Ok(record)
    }
}
