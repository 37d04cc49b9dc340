//! Article and newsletter pages
//!
//! One set of handlers serves both kinds; the router hands each its
//! [`ContentKind`] through an extension.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::session::{redirect_with_notice, PageContext};
use super::views::{content_cards, form_errors, parse_id, FormErrors, Names, OptionView};
use super::WebError;
use crate::api::AppState;
use crate::models::{
    Capability, Comment, Content, ContentKind, CreateContentInput, ListParams, PagedResult,
    UpdateContentInput, User, MAX_PAGE_SIZE,
};
use crate::services::ServiceError;

const PAGE_SIZE: u32 = 10;

fn kind_path(kind: ContentKind) -> &'static str {
    kind.table()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Title, body, publisher and (articles only) category and image
#[derive(Debug, Default, Deserialize)]
pub struct ContentForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub publisher_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Present ("on") when the box is ticked
    #[serde(default)]
    pub is_independent: Option<String>,
}

impl ContentForm {
    fn from_content(content: &Content) -> Self {
        Self {
            title: content.title.clone(),
            content: content.body.clone(),
            publisher_id: content.publisher_id.map(|id| id.to_string()),
            category_id: content.category_id.map(|id| id.to_string()),
            image: content.image.clone(),
            is_independent: content.is_independent.then(|| "on".to_string()),
        }
    }

    fn publisher(&self) -> Option<i64> {
        parse_id(self.publisher_id.as_deref())
    }

    fn category(&self) -> Option<i64> {
        parse_id(self.category_id.as_deref())
    }

    /// Unticked with no publisher still counts as independent
    fn independent(&self) -> bool {
        self.is_independent.is_some() || self.publisher().is_none()
    }

    fn image(&self) -> Option<String> {
        self.image.clone().filter(|s| !s.trim().is_empty())
    }

    fn create_input(&self, kind: ContentKind) -> CreateContentInput {
        CreateContentInput {
            title: self.title.clone(),
            content: self.content.clone(),
            publisher_id: self.publisher(),
            category_id: if kind.has_category() { self.category() } else { None },
            image: if kind.has_category() { self.image() } else { None },
            is_independent: Some(self.independent()),
        }
    }

    fn update_input(&self, kind: ContentKind) -> UpdateContentInput {
        UpdateContentInput {
            title: Some(self.title.clone()),
            content: Some(self.content.clone()),
            publisher_id: Some(self.publisher()),
            category_id: kind.has_category().then(|| self.category()),
            image: kind.has_category().then(|| self.image()),
            is_independent: Some(self.independent()),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

/// Page links keep the other query parameters
fn page_link(base: &str, page: Option<u32>, extra: &str) -> Option<String> {
    page.map(|p| format!("{}?page={}{}", base, p, extra))
}

/// Shared by the kind listings and the per-category page
pub(super) async fn render_listing(
    state: &AppState,
    page: &PageContext,
    heading: &str,
    kind: ContentKind,
    result: PagedResult<Content>,
    categories: Vec<OptionView>,
    base: &str,
    extra: &str,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("heading", heading);
    ctx.insert("kind_label", kind.label());
    ctx.insert("kind_path", kind_path(kind));
    ctx.insert(
        "can_create",
        &page.viewer.as_ref().is_some_and(|u| u.can(Capability::AuthorContent)),
    );
    ctx.insert("categories", &categories);
    ctx.insert("items", &content_cards(state, &result.items).await?);
    ctx.insert("page", &result.page);
    ctx.insert("pages", &result.total_pages().max(1));
    ctx.insert("prev_link", &page_link(base, result.prev_page(), extra));
    ctx.insert("next_link", &page_link(base, result.next_page(), extra));
    page.render(state, "content_list.html", &ctx)
}

/// GET /{kind}s
pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<Response, WebError> {
    let params = ListParams::new(query.page.unwrap_or(1), PAGE_SIZE);
    let category = if kind.has_category() {
        parse_id(query.category.as_deref())
    } else {
        None
    };
    let result = state
        .content_service
        .list(page.viewer.as_ref(), kind, category, &params)
        .await?;

    let categories = if kind.has_category() {
        category_options(&state, category).await?
    } else {
        Vec::new()
    };
    let extra = category.map(|id| format!("&category={}", id)).unwrap_or_default();
    let heading = format!("{}s", kind.label());
    let base = format!("/{}", kind_path(kind));
    render_listing(&state, &page, &heading, kind, result, categories, &base, &extra).await
}

async fn category_options(state: &AppState, selected: Option<i64>) -> Result<Vec<OptionView>, WebError> {
    Ok(state
        .category_service
        .all()
        .await?
        .into_iter()
        .map(|c| OptionView {
            selected: Some(c.id) == selected,
            id: c.id,
            name: c.name,
        })
        .collect())
}

async fn publisher_options(state: &AppState, selected: Option<i64>) -> Result<Vec<OptionView>, WebError> {
    Ok(state
        .publisher_service
        .all()
        .await?
        .into_iter()
        .map(|p| OptionView {
            selected: Some(p.id) == selected,
            id: p.id,
            name: p.name,
        })
        .collect())
}

async fn render_form(
    state: &AppState,
    page: &PageContext,
    kind: ContentKind,
    heading: &str,
    action: &str,
    cancel: &str,
    form: &ContentForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("heading", heading);
    ctx.insert("action", action);
    ctx.insert("cancel", cancel);
    ctx.insert(
        "form",
        &serde_json::json!({
            "title": form.title,
            "content": form.content,
            "image": form.image.clone().unwrap_or_default(),
            "is_independent": form.is_independent.is_some(),
        }),
    );
    ctx.insert("errors", errors);
    ctx.insert("publishers", &publisher_options(state, form.publisher()).await?);
    ctx.insert("categories", &category_options(state, form.category()).await?);
    ctx.insert("is_article", &kind.has_category());
    page.render(state, "content_form.html", &ctx)
}

fn author(page: &PageContext, kind: ContentKind) -> Result<&User, WebError> {
    let user = page.member()?;
    if !user.can(Capability::AuthorContent) {
        return Err(WebError::Forbidden(format!(
            "Only journalists and editors can write {}s.",
            kind
        )));
    }
    Ok(user)
}

/// GET /{kind}s/new
pub async fn new_form(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
) -> Result<Response, WebError> {
    author(&page, kind)?;
    let form = ContentForm {
        is_independent: Some("on".into()),
        ..Default::default()
    };
    let heading = format!("New {}", kind);
    let action = format!("/{}/new", kind_path(kind));
    let cancel = format!("/{}", kind_path(kind));
    render_form(&state, &page, kind, &heading, &action, &cancel, &form, &FormErrors::new()).await
}

/// POST /{kind}s/new
pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Form(form): Form<ContentForm>,
) -> Result<Response, WebError> {
    let user = author(&page, kind)?;
    match state.content_service.create(user, kind, form.create_input(kind)).await {
        Ok(content) => Ok(redirect_with_notice(
            &format!("/{}/{}", kind_path(kind), content.id),
            &format!("{} created successfully!", kind.label()),
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            let heading = format!("New {}", kind);
            let action = format!("/{}/new", kind_path(kind));
            let cancel = format!("/{}", kind_path(kind));
            render_form(&state, &page, kind, &heading, &action, &cancel, &form, &errors).await
        }
    }
}

async fn render_detail(
    state: &AppState,
    page: &PageContext,
    kind: ContentKind,
    id: i64,
    comment_error: Option<String>,
) -> Result<Response, WebError> {
    let viewer = page.viewer.as_ref();
    let content = state.content_service.get(viewer, kind, id).await?;

    let comments = if kind.has_category() {
        state
            .comment_service
            .list(viewer, Some(id), &ListParams::new(1, MAX_PAGE_SIZE))
            .await?
            .items
    } else {
        Vec::new()
    };
    let names = Names::load(state, std::slice::from_ref(&content), &comments).await?;

    let follows_author = match viewer {
        Some(user) if user.can(Capability::Subscribe) => {
            let (_, journalists) = state.subscription_service.followed_ids(user).await?;
            journalists.contains(&content.author_id)
        }
        _ => false,
    };

    let mut ctx = TeraContext::new();
    ctx.insert("item", &names.content(&content));
    ctx.insert("kind_path", kind_path(kind));
    ctx.insert("can_edit", &viewer.is_some_and(|u| u.can_modify(content.author_id)));
    ctx.insert(
        "can_approve",
        &viewer.is_some_and(|u| content.check_approve(u).is_ok()),
    );
    ctx.insert(
        "can_publish",
        &viewer.is_some_and(|u| content.check_publish(u).is_ok()),
    );
    ctx.insert(
        "can_follow_author",
        &viewer.is_some_and(|u| u.can(Capability::Subscribe) && u.id != content.author_id),
    );
    ctx.insert("follows_author", &follows_author);
    ctx.insert("is_article", &kind.has_category());
    ctx.insert(
        "comments",
        &comments
            .iter()
            .map(|c| names.comment(c, viewer))
            .collect::<Vec<_>>(),
    );
    ctx.insert("comment_error", &comment_error);
    page.render(state, "content_detail.html", &ctx)
}

/// GET /{kind}s/{id}
pub async fn detail(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    render_detail(&state, &page, kind, id, None).await
}

/// Load an item the member may modify
async fn editable(
    state: &AppState,
    user: &User,
    kind: ContentKind,
    id: i64,
) -> Result<Content, WebError> {
    let content = state.content_service.get(Some(user), kind, id).await?;
    if !user.can_modify(content.author_id) {
        return Err(WebError::Forbidden(format!(
            "You can only change your own {}s.",
            kind
        )));
    }
    Ok(content)
}

/// GET /{kind}s/{id}/edit
pub async fn edit_form(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let content = editable(&state, user, kind, id).await?;
    let heading = format!("Edit {}", kind);
    let action = format!("/{}/{}/edit", kind_path(kind), id);
    let cancel = format!("/{}/{}", kind_path(kind), id);
    let form = ContentForm::from_content(&content);
    render_form(&state, &page, kind, &heading, &action, &cancel, &form, &FormErrors::new()).await
}

/// POST /{kind}s/{id}/edit
pub async fn update(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<ContentForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    match state
        .content_service
        .update(user, kind, id, form.update_input(kind))
        .await
    {
        Ok(_) => Ok(redirect_with_notice(
            &format!("/{}/{}", kind_path(kind), id),
            &format!("{} updated successfully!", kind.label()),
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            let heading = format!("Edit {}", kind);
            let action = format!("/{}/{}/edit", kind_path(kind), id);
            let cancel = format!("/{}/{}", kind_path(kind), id);
            render_form(&state, &page, kind, &heading, &action, &cancel, &form, &errors).await
        }
    }
}

/// GET /{kind}s/{id}/delete
pub async fn confirm_delete(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let content = editable(&state, user, kind, id).await?;
    let mut ctx = TeraContext::new();
    ctx.insert("heading", &format!("Delete {}", kind));
    ctx.insert("subject", &content.title);
    ctx.insert("action", &format!("/{}/{}/delete", kind_path(kind), id));
    ctx.insert("cancel", &format!("/{}/{}", kind_path(kind), id));
    page.render(&state, "confirm_delete.html", &ctx)
}

/// POST /{kind}s/{id}/delete
pub async fn delete(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    state.content_service.delete(user, kind, id).await?;
    Ok(redirect_with_notice(
        &format!("/{}", kind_path(kind)),
        &format!("{} deleted successfully!", kind.label()),
    ))
}

/// Workflow refusals go back to the item as a notice
fn workflow_outcome(
    kind: ContentKind,
    id: i64,
    result: Result<Content, ServiceError>,
    done: &str,
) -> Result<Response, WebError> {
    let to = format!("/{}/{}", kind_path(kind), id);
    match result {
        Ok(_) => Ok(redirect_with_notice(&to, done)),
        Err(ServiceError::Precondition(message)) => Ok(redirect_with_notice(&to, &message)),
        Err(e) => Err(e.into()),
    }
}

/// POST /{kind}s/{id}/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let result = state.content_service.approve(user, kind, id).await;
    workflow_outcome(kind, id, result, &format!("{} approved.", kind.label()))
}

/// POST /{kind}s/{id}/publish
pub async fn publish(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let result = state.content_service.publish(user, kind, id).await;
    workflow_outcome(kind, id, result, &format!("{} published.", kind.label()))
}

/// POST /articles/{id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    match state.comment_service.create(user, id, &form.content).await {
        Ok(_) => Ok(redirect_with_notice(
            &format!("/{}/{}", kind_path(kind), id),
            "Comment added.",
        )),
        Err(ServiceError::Validation { message, .. }) => {
            render_detail(&state, &page, kind, id, Some(message)).await
        }
        Err(e) => Err(e.into()),
    }
}

fn render_comment_form(
    state: &AppState,
    page: &PageContext,
    comment: &Comment,
    form: &CommentForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("comment_id", &comment.id);
    ctx.insert("article_id", &comment.article_id);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "comment_form.html", &ctx)
}

/// GET /comments/{id}/edit
pub async fn edit_comment_form(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let comment = state.comment_service.get(Some(user), id).await?;
    if !user.can_modify(comment.author_id) {
        return Err(WebError::Forbidden(
            "You do not have permission to edit this comment.".into(),
        ));
    }
    let form = CommentForm {
        content: comment.content.clone(),
    };
    render_comment_form(&state, &page, &comment, &form, &FormErrors::new())
}

/// POST /comments/{id}/edit
pub async fn update_comment(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    match state.comment_service.update(user, id, &form.content).await {
        Ok(comment) => Ok(redirect_with_notice(
            &format!("/articles/{}", comment.article_id),
            "Comment updated successfully!",
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            let comment = state.comment_service.get(Some(user), id).await?;
            render_comment_form(&state, &page, &comment, &form, &errors)
        }
    }
}

/// POST /comments/{id}/delete
pub async fn delete_comment(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let comment = state.comment_service.get(Some(user), id).await?;
    state.comment_service.delete(user, id).await?;
    Ok(redirect_with_notice(
        &format!("/articles/{}", comment.article_id),
        "Comment deleted.",
    ))
}
