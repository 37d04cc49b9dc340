//! Front page, categories, publishers, subscriptions and the editors' queue

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Uri},
    response::Response,
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::content::{render_listing, ListQuery};
use super::session::{redirect_with_notice, PageContext};
use super::views::{content_cards, form_errors, FormErrors};
use super::WebError;
use crate::api::AppState;
use crate::models::{
    Capability, CategoryInput, ContentKind, ListParams, PublisherInput, MAX_PAGE_SIZE,
};
use crate::services::ServiceError;

const LATEST_ON_HOME: u32 = 5;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NameForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize)]
struct HomeStats {
    total_articles: i64,
    total_newsletters: i64,
    total_categories: usize,
    total_publishers: usize,
}

/// GET /
pub async fn home(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    let latest_params = ListParams::new(1, LATEST_ON_HOME);
    let count_params = ListParams::new(1, 1);
    let (latest, newsletters, categories, publishers) = futures::try_join!(
        state
            .content_service
            .list(None, ContentKind::Article, None, &latest_params),
        state
            .content_service
            .list(None, ContentKind::Newsletter, None, &count_params),
        state.category_service.all(),
        state.publisher_service.all(),
    )?;

    let stats = HomeStats {
        total_articles: latest.total,
        total_newsletters: newsletters.total,
        total_categories: categories.len(),
        total_publishers: publishers.len(),
    };

    let mut ctx = TeraContext::new();
    ctx.insert("latest_articles", &content_cards(&state, &latest.items).await?);
    ctx.insert("categories", &categories);
    ctx.insert("stats", &stats);
    page.render(&state, "home.html", &ctx)
}

async fn render_categories(
    state: &AppState,
    page: &PageContext,
    form: &NameForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("categories", &state.category_service.all().await?);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "categories.html", &ctx)
}

/// GET /categories
pub async fn categories(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    render_categories(&state, &page, &NameForm::default(), &FormErrors::new()).await
}

/// POST /categories
pub async fn create_category(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<NameForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let input = CategoryInput {
        name: form.name.clone(),
        description: form.description.clone(),
    };
    match state.category_service.create(user, input).await {
        Ok(category) => Ok(redirect_with_notice(
            "/categories",
            &format!("Category \"{}\" created.", category.name),
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            render_categories(&state, &page, &form, &errors).await
        }
    }
}

/// GET /categories/{id}
pub async fn category_articles(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Response, WebError> {
    let category = state.category_service.get(id).await?;
    let params = ListParams::new(query.page.unwrap_or(1), 10);
    let result = state
        .content_service
        .list(page.viewer.as_ref(), ContentKind::Article, Some(id), &params)
        .await?;
    let base = format!("/categories/{}", id);
    render_listing(
        &state,
        &page,
        &category.name,
        ContentKind::Article,
        result,
        Vec::new(),
        &base,
        "",
    )
    .await
}

#[derive(Serialize)]
struct FollowView {
    id: i64,
    name: String,
    description: String,
    followed: bool,
}

async fn render_publishers(
    state: &AppState,
    page: &PageContext,
    form: &NameForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let can_subscribe = page
        .viewer
        .as_ref()
        .is_some_and(|u| u.can(Capability::Subscribe));
    let (followed_publishers, followed_journalists) = match page.viewer.as_ref() {
        Some(user) if can_subscribe => state.subscription_service.followed_ids(user).await?,
        _ => (Vec::new(), Vec::new()),
    };

    let publishers: Vec<FollowView> = state
        .publisher_service
        .all()
        .await?
        .into_iter()
        .map(|p| FollowView {
            followed: followed_publishers.contains(&p.id),
            id: p.id,
            name: p.name,
            description: p.description,
        })
        .collect();
    let journalists: Vec<FollowView> = state
        .user_service
        .by_role(Some("journalist"))
        .await?
        .into_iter()
        .map(|u| FollowView {
            followed: followed_journalists.contains(&u.id),
            id: u.id,
            name: u.display_name(),
            description: String::new(),
        })
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("publishers", &publishers);
    ctx.insert("journalists", &journalists);
    ctx.insert("can_subscribe", &can_subscribe);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "publishers.html", &ctx)
}

/// GET /publishers
pub async fn publishers(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    render_publishers(&state, &page, &NameForm::default(), &FormErrors::new()).await
}

/// POST /publishers
pub async fn create_publisher(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<NameForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let input = PublisherInput {
        name: form.name.clone(),
        description: form.description.clone(),
    };
    match state.publisher_service.create(user, input).await {
        Ok(publisher) => Ok(redirect_with_notice(
            "/publishers",
            &format!("Publisher \"{}\" created.", publisher.name),
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            render_publishers(&state, &page, &form, &errors).await
        }
    }
}

/// The local page the browser came from, minus any old notice
fn back_to(headers: &HeaderMap, fallback: &str) -> String {
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uri>().ok());
    let Some(uri) = referer else {
        return fallback.to_string();
    };
    let query: Vec<&str> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("notice="))
        .collect();
    if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query.join("&"))
    }
}

/// Subscription changes report back as a notice; only permission and
/// server failures become error pages
async fn change_subscription(
    state: &AppState,
    page: &PageContext,
    headers: &HeaderMap,
    publisher: Option<i64>,
    journalist: Option<i64>,
    subscribe: bool,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let to = back_to(headers, "/publishers");
    let result = if subscribe {
        state
            .subscription_service
            .subscribe(user, publisher, journalist)
            .await
            .map(|_| "Subscribed successfully.")
    } else {
        state
            .subscription_service
            .unsubscribe(user, publisher, journalist)
            .await
            .map(|_| "Unsubscribed successfully.")
    };
    match result {
        Ok(message) => Ok(redirect_with_notice(&to, message)),
        Err(ServiceError::Validation { message, .. })
        | Err(ServiceError::Precondition(message))
        | Err(ServiceError::Conflict(message))
        | Err(ServiceError::NotFound(message)) => Ok(redirect_with_notice(&to, &message)),
        Err(e) => Err(e.into()),
    }
}

/// POST /publishers/{id}/subscribe
pub async fn subscribe_publisher(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    change_subscription(&state, &page, &headers, Some(id), None, true).await
}

/// POST /publishers/{id}/unsubscribe
pub async fn unsubscribe_publisher(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    change_subscription(&state, &page, &headers, Some(id), None, false).await
}

/// POST /journalists/{id}/subscribe
pub async fn subscribe_journalist(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    change_subscription(&state, &page, &headers, None, Some(id), true).await
}

/// POST /journalists/{id}/unsubscribe
pub async fn unsubscribe_journalist(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    change_subscription(&state, &page, &headers, None, Some(id), false).await
}

#[derive(Serialize)]
struct PendingSection {
    heading: &'static str,
    kind_path: &'static str,
    items: Vec<super::views::ContentView>,
}

/// GET /pending
pub async fn pending(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    let user = page.editor()?;
    let params = ListParams::new(1, MAX_PAGE_SIZE);
    let mut sections = Vec::new();
    for (kind, heading) in [
        (ContentKind::Article, "Articles"),
        (ContentKind::Newsletter, "Newsletters"),
    ] {
        let waiting = state
            .content_service
            .pending_approval(user, kind, &params)
            .await?;
        sections.push(PendingSection {
            heading,
            kind_path: kind.table(),
            items: content_cards(&state, &waiting.items).await?,
        });
    }

    let mut ctx = TeraContext::new();
    ctx.insert("sections", &sections);
    page.render(&state, "pending.html", &ctx)
}
