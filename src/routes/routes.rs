//! Defines routes for all project operations.
//!
//! ## Structure
//! - **Health**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Projects**
//!   - `POST /api/upload-project`    — multipart upload of a new project
//!   - `GET  /api/get-project`       — one project with file content (`?projectId=`)
//!   - `GET  /api/get-all-projects`  — every project, newest first
//!   - `GET  /api/get-projects`      — one user's projects (`?userId=`)
//!   - `POST /api/update-project`    — replace a project's files (JSON)
//!   - `POST /api/delete-projects`   — delete a project and its files (JSON)
//!
//! Any other verb on a project route answers 405 with a JSON error body,
//! including `HEAD` on the `GET` routes.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        project_handlers::{
            delete_project, get_all_projects, get_project, get_user_projects, method_not_allowed,
            update_project, upload_project,
        },
    },
    services::project_service::{ProjectService, UploadLimits},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart boundaries and the non-file form fields.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Build and return the router for all project routes.
///
/// The router carries shared state (`ProjectService`) to all handlers. The
/// upload route's body limit follows the configured total upload size; the
/// upload handler itself enforces both size limits as file parts arrive.
pub fn routes(limits: UploadLimits) -> Router<ProjectService> {
    let upload_body_limit =
        usize::try_from(limits.max_total_size.saturating_add(MULTIPART_OVERHEAD))
            .unwrap_or(usize::MAX);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/upload-project",
            post(upload_project)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route(
            "/api/get-project",
            get(get_project)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/get-all-projects",
            get(get_all_projects)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/get-projects",
            get(get_user_projects)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/update-project",
            post(update_project).fallback(method_not_allowed),
        )
        .route(
            "/api/delete-projects",
            post(delete_project).fallback(method_not_allowed),
        )
}
