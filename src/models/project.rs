//! Project metadata documents and their file descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition key used when the caller does not identify themselves.
pub const ANONYMOUS_USER: &str = "anonymous";

/// One project as persisted in the metadata store.
///
/// The record is generic over its file type so the same shape can carry
/// plain [`FileEntry`] values when stored and [`FileWithContent`] values when
/// returned from a fetch, without the content ever reaching the metadata
/// store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", bound(deserialize = "F: Deserialize<'de>"))]
pub struct ProjectRecord<F = FileEntry> {
    /// `{userId}-{creationTimestampMillis}`; never reused.
    pub project_id: String,

    #[serde(default)]
    pub project_name: Option<String>,

    pub user_id: String,

    /// Top-level directory of the first uploaded relative path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,

    #[serde(default)]
    pub files: Vec<F>,

    /// Set once at creation.
    pub upload_date: DateTime<Utc>,

    /// Set by updates only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    /// Cached at upload time.
    #[serde(default)]
    pub file_count: usize,

    /// Cached at upload time, in bytes.
    #[serde(default)]
    pub total_size: u64,
}

impl<F> ProjectRecord<F> {
    /// Swap the file list for one of a different element type, keeping every
    /// other field.
    pub fn with_files<G>(self, files: Vec<G>) -> ProjectRecord<G> {
        ProjectRecord {
            project_id: self.project_id,
            project_name: self.project_name,
            user_id: self.user_id,
            folder_name: self.folder_name,
            files,
            upload_date: self.upload_date,
            last_modified: self.last_modified,
            file_count: self.file_count,
            total_size: self.total_size,
        }
    }
}

/// Descriptor for one file of a project. `path` is the content-store key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,

    /// Path relative to the uploaded folder root; equals `name` for loose files.
    pub relative_path: String,

    /// `{projectId}/{relativePath}`.
    pub path: String,

    #[serde(default)]
    pub size: u64,

    /// Client-declared MIME type, not validated.
    #[serde(rename = "type", default)]
    pub content_type: String,

    /// Legacy client hint (`utf8`, `base64`). Stored and echoed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// A [`FileEntry`] with its body inlined, as returned by a project fetch.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FileWithContent {
    #[serde(flatten)]
    pub entry: FileEntry,

    /// `None` when the referenced blob is missing from the content store.
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProjectRecord {
        ProjectRecord {
            project_id: "alice-1700000000000".into(),
            project_name: Some("demo".into()),
            user_id: "alice".into(),
            folder_name: None,
            files: vec![FileEntry {
                name: "a.txt".into(),
                relative_path: "a.txt".into(),
                path: "alice-1700000000000/a.txt".into(),
                size: 5,
                content_type: "text/plain".into(),
                encoding: None,
            }],
            upload_date: "2023-11-14T22:13:20.000Z".parse().unwrap(),
            last_modified: None,
            file_count: 1,
            total_size: 5,
        }
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["projectId"], "alice-1700000000000");
        assert_eq!(value["projectName"], "demo");
        assert_eq!(value["fileCount"], 1);
        assert_eq!(value["files"][0]["relativePath"], "a.txt");
        assert_eq!(value["files"][0]["type"], "text/plain");
        assert!(value.get("lastModified").is_none());
        assert!(value["files"][0].get("encoding").is_none());
    }

    #[test]
    fn parses_sparse_legacy_documents() {
        let doc = json!({
            "projectId": "bob-1",
            "userId": "bob",
            "projectName": null,
            "uploadDate": "2024-02-01T10:00:00.000Z",
            "files": [{"name": "x.ino", "relativePath": "x.ino", "path": "bob-1/x.ino"}]
        });
        let record: ProjectRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(record.project_name, None);
        assert_eq!(record.files[0].size, 0);
        assert_eq!(record.files[0].content_type, "");
        assert_eq!(record.total_size, 0);
    }

    #[test]
    fn missing_file_list_parses_as_empty() {
        let doc = json!({
            "projectId": "carol-2",
            "userId": "carol",
            "uploadDate": "2024-03-01T08:30:00.000Z"
        });
        let record: ProjectRecord<FileEntry> = serde_json::from_value(doc).unwrap();
        assert!(record.files.is_empty());
        assert_eq!(record.file_count, 0);
    }

    #[test]
    fn inlined_content_is_flattened_next_to_entry_fields() {
        let record = sample();
        let files = record
            .files
            .iter()
            .cloned()
            .map(|entry| FileWithContent {
                entry,
                content: Some("hello".into()),
            })
            .collect();
        let value = serde_json::to_value(record.with_files(files)).unwrap();
        assert_eq!(value["files"][0]["path"], "alice-1700000000000/a.txt");
        assert_eq!(value["files"][0]["content"], "hello");
        assert_eq!(value["projectName"], "demo");
    }
}
