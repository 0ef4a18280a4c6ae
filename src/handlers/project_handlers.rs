//! HTTP handlers for project operations.
//! Each handler parses its input, makes one `ProjectService` call and shapes
//! the JSON response; all storage concerns stay in the service.

use crate::{
    errors::AppError,
    models::project::{FileWithContent, ProjectRecord},
    services::project_service::{
        ProjectError, ProjectService, UpdateProjectRequest, UploadLimits, UploadRequest,
        UploadedFile,
    },
};
use axum::{
    Json,
    extract::{
        Query, State,
        multipart::{Multipart, MultipartError},
        rejection::JsonRejection,
    },
    http::StatusCode,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query accepted by `GET /api/get-project`.
#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

/// Query accepted by `GET /api/get-projects`.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Body of `POST /api/delete-projects`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProjectRequest {
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub project_id: String,
    pub message: String,
    pub file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub success: bool,
    pub project: ProjectRecord<FileWithContent>,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub success: bool,
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// An upload body cut off by the route's length limit is reported like any
/// other oversized batch.
fn multipart_error(err: MultipartError, limits: &UploadLimits) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::from_project(limits.body_too_large(), "Upload failed");
    }
    AppError::new(err.status(), err.body_text())
}

/// POST `/api/upload-project` — multipart form with `files`, `filePaths`,
/// `projectName` and `userId` fields.
///
/// File parts are read chunk by chunk so a file over the per-file limit, or a
/// batch over the total limit, is rejected before it is fully buffered.
/// `filePaths` entries pair with `files` entries by position.
pub async fn upload_project(
    State(service): State<ProjectService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    const SUMMARY: &str = "Upload failed";
    let limits = service.limits();

    let mut request = UploadRequest::default();
    let mut file_paths = Vec::new();
    let mut received = 0u64;
    let field_error = |err: MultipartError| multipart_error(err, &limits);

    while let Some(mut field) = multipart.next_field().await.map_err(field_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "files" | "files[]" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(field_error)? {
                    data.extend_from_slice(&chunk);
                    received += chunk.len() as u64;
                    limits
                        .check_file(&name, data.len() as u64)
                        .and_then(|_| limits.check_total(received))
                        .map_err(|err| AppError::from_project(err, SUMMARY))?;
                }
                request.files.push(UploadedFile {
                    name,
                    relative_path: None,
                    content_type,
                    data: data.freeze(),
                });
            }
            "filePaths" | "filePaths[]" => {
                file_paths.push(field.text().await.map_err(field_error)?);
            }
            "projectName" => {
                request.project_name = Some(field.text().await.map_err(field_error)?);
            }
            "userId" => {
                request.user_id = Some(field.text().await.map_err(field_error)?);
            }
            other => debug!("ignoring multipart field `{}`", other),
        }
    }

    for (file, path) in request.files.iter_mut().zip(file_paths) {
        file.relative_path = Some(path);
    }

    let record = service
        .upload_project(request)
        .await
        .map_err(|err| AppError::from_project(err, SUMMARY))?;

    Ok(Json(UploadResponse {
        success: true,
        project_id: record.project_id,
        message: "Project uploaded successfully".into(),
        file_count: record.file_count,
    }))
}

/// GET `/api/get-project?projectId=` — one project with inline file content.
pub async fn get_project(
    State(service): State<ProjectService>,
    Query(q): Query<ProjectQuery>,
) -> Result<Json<ProjectResponse>, AppError> {
    const SUMMARY: &str = "Failed to retrieve project";
    let project_id = q
        .project_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::from_project(ProjectError::MissingProjectId, SUMMARY))?;

    let project = service
        .get_project(&project_id)
        .await
        .map_err(|err| AppError::from_project(err, SUMMARY))?;

    Ok(Json(ProjectResponse {
        success: true,
        project,
    }))
}

/// GET `/api/get-all-projects` — every project, newest first.
pub async fn get_all_projects(
    State(service): State<ProjectService>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = service
        .list_projects()
        .await
        .map_err(|err| AppError::from_project(err, "Failed to retrieve projects"))?;

    Ok(Json(ProjectListResponse {
        success: true,
        projects,
    }))
}

/// GET `/api/get-projects?userId=` — one user's projects, newest first.
pub async fn get_user_projects(
    State(service): State<ProjectService>,
    Query(q): Query<UserQuery>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = service
        .list_user_projects(q.user_id.as_deref())
        .await
        .map_err(|err| AppError::from_project(err, "Failed to retrieve projects"))?;

    Ok(Json(ProjectListResponse {
        success: true,
        projects,
    }))
}

/// POST `/api/update-project` — `{projectId, files}` replaces the file list.
pub async fn update_project(
    State(service): State<ProjectService>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    const SUMMARY: &str = "Failed to update project";
    let Json(payload) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let (project_id, files) = payload
        .into_parts()
        .map_err(|err| AppError::from_project(err, SUMMARY))?;

    service
        .update_project(&project_id, files)
        .await
        .map_err(|err| AppError::from_project(err, SUMMARY))?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Project updated successfully".into(),
    }))
}

/// POST `/api/delete-projects` — `{projectId}` removes the project and its files.
pub async fn delete_project(
    State(service): State<ProjectService>,
    payload: Result<Json<DeleteProjectRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    const SUMMARY: &str = "Failed to delete project";
    let Json(payload) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let project_id = payload
        .project_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::from_project(ProjectError::MissingProjectId, SUMMARY))?;

    service
        .delete_project(&project_id)
        .await
        .map_err(|err| AppError::from_project(err, SUMMARY))?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Project deleted successfully".into(),
    }))
}

/// Fallback for any verb a project endpoint does not serve.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}
