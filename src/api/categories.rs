//! Category API endpoints
//!
//! - GET/POST /api/categories
//! - GET/PUT/PATCH/DELETE /api/categories/{id}

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};

use crate::api::common::{Page, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{Category, CategoryInput};
use crate::services::CategoryPatch;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{id}",
            get(get_category)
                .put(replace_category)
                .patch(patch_category)
                .delete(delete_category),
        )
}

/// GET /api/categories
async fn list_categories(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    let result = state.category_service.list(&query.params()).await?;
    Ok(Json(Page::from_result(result, &uri)))
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /api/categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get(id).await?))
}

/// PUT /api/categories/{id}
async fn replace_category(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.update(&user, id, input.into()).await?;
    Ok(Json(category))
}

/// PATCH /api/categories/{id}
async fn patch_category(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(patch): ApiJson<CategoryPatch>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.update(&user, id, patch).await?;
    Ok(Json(category))
}

/// DELETE /api/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{login_as, test_server};
    use crate::models::UserRole;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_category_crud() {
        let (server, _) = test_server().await;
        let (ed, ed_token, _) = login_as(&server, "ed", UserRole::Editor).await;
        let (jo, jo_token, _) = login_as(&server, "jo", UserRole::Journalist).await;

        let response = server
            .post("/api/categories")
            .add_header(jo, jo_token)
            .json(&json!({"name": "Sport"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        let response = server
            .post("/api/categories")
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"name": "Sport", "description": "Games"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let id = response.json::<Value>()["id"].as_i64().unwrap();

        let response = server
            .post("/api/categories")
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"name": "Sport"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({"name": ["category with this name already exists."]})
        );

        let response = server
            .patch(&format!("/api/categories/{}", id))
            .add_header(ed.clone(), ed_token.clone())
            .json(&json!({"description": "Matches"}))
            .await;
        assert_eq!(response.json::<Value>()["name"], "Sport");

        let page: Value = server
            .get("/api/categories")
            .add_header(ed.clone(), ed_token.clone())
            .await
            .json();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["description"], "Matches");

        let response = server
            .delete(&format!("/api/categories/{}", id))
            .add_header(ed.clone(), ed_token.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        let response = server
            .get(&format!("/api/categories/{}", id))
            .add_header(ed, ed_token)
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>(), json!({"detail": "Category not found."}));
    }
}
