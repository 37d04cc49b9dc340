//! Article and newsletter API endpoints
//!
//! Both kinds share handlers; the router for each kind carries its
//! [`ContentKind`] as a request extension.
//!
//! - GET/POST /api/{kind}s (`?category=` for articles)
//! - GET/PUT/PATCH/DELETE /api/{kind}s/{id}
//! - POST /api/{kind}s/{id}/approve, /api/{kind}s/{id}/publish
//! - GET /api/{kind}s/my_{kind}s, /api/{kind}s/pending_approval
//! - POST /api/articles/{id}/comments

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::comments::CommentRequest;
use crate::api::common::{list_params, Page, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{Comment, Content, ContentKind, CreateContentInput, UpdateContentInput};

#[derive(Debug, Deserialize)]
pub struct ContentListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<i64>,
}

/// PUT body: title and content are required, the rest is reset when absent
#[derive(Debug, Deserialize)]
pub struct ReplaceContentRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub publisher_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_independent: Option<bool>,
}

impl From<ReplaceContentRequest> for UpdateContentInput {
    fn from(req: ReplaceContentRequest) -> Self {
        Self {
            is_independent: Some(req.is_independent.unwrap_or(req.publisher_id.is_none())),
            title: Some(req.title),
            content: Some(req.content),
            publisher_id: Some(req.publisher_id),
            category_id: Some(req.category_id),
            image: Some(req.image),
        }
    }
}

pub fn router(kind: ContentKind) -> Router<AppState> {
    let mine = format!("/my_{}s", kind.as_str());
    let mut router = Router::new()
        .route("/", get(list_content).post(create_content))
        .route(&mine, get(my_content))
        .route("/pending_approval", get(pending_approval))
        .route(
            "/{id}",
            get(get_content)
                .put(replace_content)
                .patch(patch_content)
                .delete(delete_content),
        )
        .route("/{id}/approve", post(approve_content))
        .route("/{id}/publish", post(publish_content));
    if kind == ContentKind::Article {
        router = router.route("/{id}/comments", post(add_comment));
    }
    router.layer(Extension(kind))
}

/// GET /api/{kind}s
async fn list_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<ContentListQuery>,
) -> Result<Json<Page<Content>>, ApiError> {
    let params = list_params(query.page, query.page_size);
    let category = query.category.filter(|_| kind.has_category());
    let result = state
        .content_service
        .list(Some(&user), kind, category, &params)
        .await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// POST /api/{kind}s
async fn create_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(input): ApiJson<CreateContentInput>,
) -> Result<(StatusCode, Json<Content>), ApiError> {
    let content = state.content_service.create(&user, kind, input).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

/// GET /api/{kind}s/{id}
async fn get_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.get(Some(&user), kind, id).await?))
}

/// PUT /api/{kind}s/{id}
async fn replace_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ReplaceContentRequest>,
) -> Result<Json<Content>, ApiError> {
    let content = state.content_service.update(&user, kind, id, req.into()).await?;
    Ok(Json(content))
}

/// PATCH /api/{kind}s/{id}
async fn patch_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdateContentInput>,
) -> Result<Json<Content>, ApiError> {
    let content = state.content_service.update(&user, kind, id, input).await?;
    Ok(Json(content))
}

/// DELETE /api/{kind}s/{id}
async fn delete_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.content_service.delete(&user, kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/{kind}s/{id}/approve
async fn approve_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.approve(&user, kind, id).await?))
}

/// POST /api/{kind}s/{id}/publish
async fn publish_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.publish(&user, kind, id).await?))
}

/// GET /api/{kind}s/my_{kind}s
async fn my_content(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Page<Content>>, ApiError> {
    let result = state
        .content_service
        .my_content(&user, kind, &query.params())
        .await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// GET /api/{kind}s/pending_approval
async fn pending_approval(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Page<Content>>, ApiError> {
    let result = state
        .content_service
        .pending_approval(&user, kind, &query.params())
        .await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// POST /api/articles/{id}/comments
async fn add_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.comment_service.create(&user, id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
