//! Publisher API endpoints
//!
//! - GET/POST /api/publishers
//! - GET/PUT/PATCH/DELETE /api/publishers/{id}
//! - POST /api/publishers/{id}/add_editor, /api/publishers/{id}/add_journalist
//! - GET /api/publishers/{id}/staff
//! - DELETE /api/publishers/{id}/staff/{user_id}

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::auth::MessageResponse;
use crate::api::common::{Page, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{Publisher, PublisherInput};
use crate::services::{PublisherPatch, StaffMember};

#[derive(Debug, Deserialize)]
pub struct StaffRequest {
    pub user_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_publishers).post(create_publisher))
        .route(
            "/{id}",
            get(get_publisher)
                .put(replace_publisher)
                .patch(patch_publisher)
                .delete(delete_publisher),
        )
        .route("/{id}/add_editor", post(add_editor))
        .route("/{id}/add_journalist", post(add_journalist))
        .route("/{id}/staff", get(list_staff))
        .route("/{id}/staff/{user_id}", delete(remove_staff))
}

/// GET /api/publishers
async fn list_publishers(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Page<Publisher>>, ApiError> {
    let result = state.publisher_service.list(&query.params()).await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// POST /api/publishers
async fn create_publisher(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(input): ApiJson<PublisherInput>,
) -> Result<(StatusCode, Json<Publisher>), ApiError> {
    let publisher = state.publisher_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(publisher)))
}

/// GET /api/publishers/{id}
async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Publisher>, ApiError> {
    Ok(Json(state.publisher_service.get(id).await?))
}

/// PUT /api/publishers/{id}
async fn replace_publisher(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<PublisherInput>,
) -> Result<Json<Publisher>, ApiError> {
    let publisher = state.publisher_service.update(&user, id, input.into()).await?;
    Ok(Json(publisher))
}

/// PATCH /api/publishers/{id}
async fn patch_publisher(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(patch): ApiJson<PublisherPatch>,
) -> Result<Json<Publisher>, ApiError> {
    let publisher = state.publisher_service.update(&user, id, patch).await?;
    Ok(Json(publisher))
}

/// DELETE /api/publishers/{id}
async fn delete_publisher(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.publisher_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/publishers/{id}/add_editor
async fn add_editor(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<StaffRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let created = state.publisher_service.add_editor(&user, id, req.user_id).await?;
    Ok(staff_message("Editor", created))
}

/// POST /api/publishers/{id}/add_journalist
async fn add_journalist(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<StaffRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let created = state.publisher_service.add_journalist(&user, id, req.user_id).await?;
    Ok(staff_message("Journalist", created))
}

fn staff_message(label: &str, created: bool) -> Json<MessageResponse> {
    if created {
        MessageResponse::new(format!("{} added to publisher.", label))
    } else {
        MessageResponse::new(format!("{} is already on staff.", label))
    }
}

/// GET /api/publishers/{id}/staff
async fn list_staff(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StaffMember>>, ApiError> {
    Ok(Json(state.publisher_service.staff(id).await?))
}

/// DELETE /api/publishers/{id}/staff/{user_id}
async fn remove_staff(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.publisher_service.remove_staff(&user, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{login_as, test_server};
    use crate::models::UserRole;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_publisher_and_staff() {
        let (server, _) = test_server().await;
        let (ed, ed_token, ed_id) = login_as(&server, "ed", UserRole::Editor).await;
        let (ann, ann_token, ann_id) = login_as(&server, "ann", UserRole::Reader).await;
        let (_, _, jo_id) = login_as(&server, "jo", UserRole::Journalist).await;

        let response = server
            .post("/api/publishers")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"name": "Daily"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        let response = server
            .post("/api/publishers")
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"name": "Daily", "description": "News every day"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let id = response.json::<Value>()["id"].as_i64().unwrap();

        let response = server
            .post(&format!("/api/publishers/{}/add_journalist", id))
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"user_id": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let response = server
            .post(&format!("/api/publishers/{}/add_journalist", id))
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"user_id": jo_id}))
            .await;
        assert_eq!(response.json::<Value>()["message"], "Journalist is already on staff.");

        // A reader is not a journalist
        let response = server
            .post(&format!("/api/publishers/{}/add_journalist", id))
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"user_id": ann_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

        server
            .post(&format!("/api/publishers/{}/add_editor", id))
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"user_id": ed_id}))
            .await;

        let staff: Value = server
            .get(&format!("/api/publishers/{}/staff", id))
            .add_header(ann.clone(), ann_token.clone())
            .await
            .json();
        assert_eq!(staff.as_array().unwrap().len(), 2);

        let response = server
            .delete(&format!("/api/publishers/{}/staff/{}", id, jo_id))
            .add_header(ann, ann_token)
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        let response = server
            .delete(&format!("/api/publishers/{}/staff/{}", id, jo_id))
            .add_header(ed.clone(), ed_token.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

        let response = server
            .delete(&format!("/api/publishers/{}", id))
            .add_header(ed, ed_token)
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    }
}
