//! Subscription API endpoints
//!
//! - GET /api/subscriptions
//! - POST /api/subscriptions `{publisher}` or `{journalist}`
//! - POST /api/subscriptions/remove
//! - GET /api/subscriptions/content
//! - GET /api/subscriptions/subscribable

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::auth::MessageResponse;
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::Subscription;
use crate::services::{SubscribedContent, SubscriptionList};

/// Exactly one of the two ids must be given
#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub publisher: Option<i64>,
    #[serde(default)]
    pub journalist: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subscriptions).post(subscribe))
        .route("/remove", post(unsubscribe))
        .route("/content", get(subscribed_content))
        .route("/subscribable", get(subscribable))
}

/// GET /api/subscriptions
async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<SubscriptionList>, ApiError> {
    Ok(Json(state.subscription_service.list_subscriptions(&user).await?))
}

/// POST /api/subscriptions
async fn subscribe(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<SubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let subscription = state
        .subscription_service
        .subscribe(&user, req.publisher, req.journalist)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /api/subscriptions/remove
async fn unsubscribe(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<SubscriptionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .subscription_service
        .unsubscribe(&user, req.publisher, req.journalist)
        .await?;
    Ok(MessageResponse::new("Unsubscribed successfully."))
}

/// GET /api/subscriptions/content
async fn subscribed_content(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<SubscribedContent>, ApiError> {
    Ok(Json(state.subscription_service.content(&user).await?))
}

/// GET /api/subscriptions/subscribable
async fn subscribable(State(state): State<AppState>) -> Result<Json<SubscriptionList>, ApiError> {
    Ok(Json(state.subscription_service.subscribable().await?))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{login_as, published_article, test_server};
    use crate::models::UserRole;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_follow_journalist_and_read_feed() {
        let (server, _) = test_server().await;
        let (_, _, jo_id) = login_as(&server, "jo", UserRole::Journalist).await;
        let (_, _, kim_id) = login_as(&server, "kim", UserRole::Journalist).await;
        let (ann, ann_token, _) = login_as(&server, "ann", UserRole::Reader).await;
        published_article(&server, jo_id, "By Jo").await;
        published_article(&server, kim_id, "By Kim").await;

        let response = server
            .post("/api/subscriptions")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let response = server
            .post("/api/subscriptions")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"publisher": 1, "journalist": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server
            .post("/api/subscriptions")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"journalist": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let response = server
            .post("/api/subscriptions")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"journalist": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({"non_field_errors": ["You are already subscribed to this journalist."]})
        );

        let feed: Value = server
            .get("/api/subscriptions/content")
            .add_header(ann.clone(), ann_token.clone())
            .await
            .json();
        let titles: Vec<&str> = feed["articles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["By Jo"]);

        let list: Value = server
            .get("/api/subscriptions")
            .add_header(ann.clone(), ann_token.clone())
            .await
            .json();
        assert_eq!(list["journalists"][0]["id"], jo_id);

        let everything: Value = server
            .get("/api/subscriptions/subscribable")
            .add_header(ann.clone(), ann_token.clone())
            .await
            .json();
        assert_eq!(everything["journalists"].as_array().unwrap().len(), 2);

        let response = server
            .post("/api/subscriptions/remove")
            .add_header(ann.clone(), ann_token.clone())
            .json(&json!({"journalist": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let response = server
            .post("/api/subscriptions/remove")
            .add_header(ann, ann_token)
            .json(&json!({"journalist": jo_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_journalists_cannot_subscribe() {
        let (server, _) = test_server().await;
        let (jo, jo_token, _) = login_as(&server, "jo", UserRole::Journalist).await;
        let (_, _, kim_id) = login_as(&server, "kim", UserRole::Journalist).await;
        let response = server
            .post("/api/subscriptions")
            .add_header(jo, jo_token)
            .json(&json!({"journalist": kim_id}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }
}
