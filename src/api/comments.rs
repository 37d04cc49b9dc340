//! Comment API endpoints
//!
//! - GET/POST /api/comments (`?article=`)
//! - GET/PUT/PATCH/DELETE /api/comments/{id}

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{list_params, Page};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::Comment;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct NewCommentRequest {
    pub article: i64,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub article: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/{id}",
            get(get_comment)
                .put(update_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
}

/// GET /api/comments
async fn list_comments(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<Page<Comment>>, ApiError> {
    let params = list_params(query.page, query.page_size);
    let result = state
        .comment_service
        .list(Some(&user), query.article, &params)
        .await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// POST /api/comments
async fn create_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<NewCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .comment_service
        .create(&user, req.article, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/comments/{id}
async fn get_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(state.comment_service.get(Some(&user), id).await?))
}

/// PUT/PATCH /api/comments/{id}; content is the only editable field
async fn update_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(state.comment_service.update(&user, id, &req.content).await?))
}

/// DELETE /api/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{login_as, published_article, test_server};
    use crate::models::UserRole;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_comment_lifecycle() {
        let (server, _) = test_server().await;
        let (_, _, jo_id) = login_as(&server, "jo", UserRole::Journalist).await;
        let (ann, ann_token, _) = login_as(&server, "ann", UserRole::Reader).await;
        let (bob, bob_token, _) = login_as(&server, "bob", UserRole::Reader).await;
        let article = published_article(&server, jo_id, "Scoop").await;

        let response = server
            .post("/api/comments")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"article": article, "content": ""}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["content"].is_array());

        let response = server
            .post("/api/comments")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"article": article, "content": "First!"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let id = response.json::<Value>()["id"].as_i64().unwrap();

        let page: Value = server
            .get(&format!("/api/comments?article={}", article))
            .add_header(bob.clone(), bob_token.clone())
            .await
            .json();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["content"], "First!");

        let response = server
            .put(&format!("/api/comments/{}", id))
            .add_header(bob.clone(), bob_token.clone())
            .json(&json!({"content": "Mine now"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        let response = server
            .patch(&format!("/api/comments/{}", id))
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"content": "First, edited"}))
            .await;
        assert_eq!(response.json::<Value>()["content"], "First, edited");

        let response = server
            .delete(&format!("/api/comments/{}", id))
            .add_header(ann.clone(), ann_token.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        let response = server
            .get(&format!("/api/comments/{}", id))
            .add_header(ann, ann_token)
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}
