//! Editors' management pages: publishers and their staff, categories, users

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::pages::NameForm;
use super::session::{redirect_with_notice, PageContext};
use super::views::{form_errors, parse_id, FormErrors, OptionView};
use super::WebError;
use crate::api::AppState;
use crate::models::{ListParams, Publisher, StaffRole, UpdateUserInput, User, UserRole};
use crate::services::{CategoryPatch, PublisherPatch, ServiceError, ServiceResult, StaffMember};

const USERS_PER_PAGE: u32 = 20;
const PUBLISHER_NAME_MAX: usize = 200;
const CATEGORY_NAME_MAX: usize = 100;
const DATE_FORMAT: &str = "%B %-d, %Y";

fn confirm_delete(
    state: &AppState,
    page: &PageContext,
    heading: &str,
    subject: &str,
    action: &str,
    cancel: &str,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("heading", heading);
    ctx.insert("subject", subject);
    ctx.insert("action", action);
    ctx.insert("cancel", cancel);
    page.render(state, "confirm_delete.html", &ctx)
}

fn render_name_form(
    state: &AppState,
    page: &PageContext,
    heading: &str,
    action: &str,
    cancel: &str,
    max_name: usize,
    form: &NameForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("heading", heading);
    ctx.insert("action", action);
    ctx.insert("cancel", cancel);
    ctx.insert("max_name", &max_name);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "name_form.html", &ctx)
}

fn name_patch(form: &NameForm) -> (Option<String>, Option<String>) {
    (Some(form.name.clone()), Some(form.description.clone()))
}

// ---------------------------------------------------------------------------
// Publishers
// ---------------------------------------------------------------------------

/// GET /publishers/{id}/edit
pub async fn edit_publisher_form(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    let form = NameForm {
        name: publisher.name.clone(),
        description: publisher.description.clone(),
    };
    render_name_form(
        &state,
        &page,
        &format!("Edit {}", publisher.name),
        &format!("/publishers/{}/edit", id),
        "/publishers",
        PUBLISHER_NAME_MAX,
        &form,
        &FormErrors::new(),
    )
}

/// POST /publishers/{id}/edit
pub async fn update_publisher(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<NameForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let (name, description) = name_patch(&form);
    match state
        .publisher_service
        .update(user, id, PublisherPatch { name, description })
        .await
    {
        Ok(_) => Ok(redirect_with_notice("/publishers", "Publisher updated successfully!")),
        Err(e) => {
            let errors = form_errors(e)?;
            render_name_form(
                &state,
                &page,
                "Edit publisher",
                &format!("/publishers/{}/edit", id),
                "/publishers",
                PUBLISHER_NAME_MAX,
                &form,
                &errors,
            )
        }
    }
}

/// GET /publishers/{id}/delete
pub async fn confirm_delete_publisher(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    confirm_delete(
        &state,
        &page,
        "Delete publisher",
        &publisher.name,
        &format!("/publishers/{}/delete", id),
        "/publishers",
    )
}

/// POST /publishers/{id}/delete
pub async fn delete_publisher(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    state.publisher_service.delete(user, id).await?;
    Ok(redirect_with_notice("/publishers", "Publisher deleted."))
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StaffForm {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
struct StaffView {
    user_id: i64,
    name: String,
    username: String,
    role: StaffRole,
    joined: String,
}

impl From<StaffMember> for StaffView {
    fn from(member: StaffMember) -> Self {
        Self {
            user_id: member.user_id,
            name: if member.full_name.is_empty() {
                member.username.clone()
            } else {
                member.full_name
            },
            username: member.username,
            role: member.role,
            joined: member.joined_at.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Editors and journalists, labelled with their role
async fn staff_candidates(
    state: &AppState,
    exclude: &[i64],
    selected: Option<i64>,
) -> Result<Vec<OptionView>, WebError> {
    let mut options = Vec::new();
    for role in ["editor", "journalist"] {
        for user in state.user_service.by_role(Some(role)).await? {
            if exclude.contains(&user.id) {
                continue;
            }
            options.push(OptionView {
                id: user.id,
                name: format!("{} ({})", user.display_name(), user.role.label()),
                selected: selected == Some(user.id),
            });
        }
    }
    Ok(options)
}

/// Attach `member_id` with the staff role its account role allows
async fn attach_staff(
    state: &AppState,
    requester: &User,
    publisher_id: i64,
    member_id: i64,
) -> ServiceResult<bool> {
    let member = state.user_service.get(member_id).await?;
    match StaffRole::for_user_role(member.role) {
        Some(StaffRole::Editor) => {
            state
                .publisher_service
                .add_editor(requester, publisher_id, member_id)
                .await
        }
        Some(StaffRole::Journalist) => {
            state
                .publisher_service
                .add_journalist(requester, publisher_id, member_id)
                .await
        }
        None => Err(ServiceError::validation(
            "user_id",
            "Only editors and journalists can join a publisher's staff.",
        )),
    }
}

/// Staff picks that went wrong become a message on the select box
fn staff_errors(err: ServiceError) -> Result<FormErrors, WebError> {
    match err {
        ServiceError::NotFound(message) => {
            let mut errors = FormErrors::new();
            errors.insert("user_id".to_string(), message);
            Ok(errors)
        }
        other => form_errors(other),
    }
}

async fn render_staff(
    state: &AppState,
    page: &PageContext,
    publisher: &Publisher,
    selected: Option<i64>,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let staff = state.publisher_service.staff(publisher.id).await?;
    let taken: Vec<i64> = staff.iter().map(|m| m.user_id).collect();
    let staff: Vec<StaffView> = staff.into_iter().map(StaffView::from).collect();

    let mut ctx = TeraContext::new();
    ctx.insert("publisher", publisher);
    ctx.insert("staff", &staff);
    ctx.insert("candidates", &staff_candidates(state, &taken, selected).await?);
    ctx.insert("errors", errors);
    page.render(state, "staff.html", &ctx)
}

/// GET /publishers/{id}/staff
pub async fn staff(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    render_staff(&state, &page, &publisher, None, &FormErrors::new()).await
}

/// POST /publishers/{id}/staff
pub async fn add_staff(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<StaffForm>,
) -> Result<Response, WebError> {
    let user = page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    let to = format!("/publishers/{}/staff", id);

    let Some(member_id) = parse_id(form.user_id.as_deref()) else {
        let mut errors = FormErrors::new();
        errors.insert("user_id".to_string(), "This field is required.".to_string());
        return render_staff(&state, &page, &publisher, None, &errors).await;
    };
    match attach_staff(&state, user, id, member_id).await {
        Ok(true) => Ok(redirect_with_notice(&to, "Staff member added.")),
        Ok(false) => Ok(redirect_with_notice(&to, "Already on the staff.")),
        Err(e) => {
            let errors = staff_errors(e)?;
            render_staff(&state, &page, &publisher, Some(member_id), &errors).await
        }
    }
}

/// One staff row of a publisher, or 404
async fn staff_member(state: &AppState, publisher_id: i64, user_id: i64) -> Result<StaffMember, WebError> {
    state
        .publisher_service
        .staff(publisher_id)
        .await?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| WebError::NotFound("Staff member not found.".into()))
}

async fn render_staff_form(
    state: &AppState,
    page: &PageContext,
    publisher: &Publisher,
    member: StaffMember,
    selected: i64,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let others: Vec<i64> = state
        .publisher_service
        .staff(publisher.id)
        .await?
        .iter()
        .map(|m| m.user_id)
        .filter(|&id| id != member.user_id)
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("publisher", publisher);
    ctx.insert("candidates", &staff_candidates(state, &others, Some(selected)).await?);
    ctx.insert("member", &StaffView::from(member));
    ctx.insert("errors", errors);
    page.render(state, "staff_form.html", &ctx)
}

/// GET /publishers/{id}/staff/{user_id}/edit
pub async fn edit_staff_form(
    State(state): State<AppState>,
    page: PageContext,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<Response, WebError> {
    page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    let member = staff_member(&state, id, user_id).await?;
    render_staff_form(&state, &page, &publisher, member, user_id, &FormErrors::new()).await
}

/// POST /publishers/{id}/staff/{user_id}/edit
///
/// Hands the position to another account; the new link takes the role the
/// new account holds.
pub async fn update_staff(
    State(state): State<AppState>,
    page: PageContext,
    Path((id, user_id)): Path<(i64, i64)>,
    Form(form): Form<StaffForm>,
) -> Result<Response, WebError> {
    let user = page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    let member = staff_member(&state, id, user_id).await?;
    let to = format!("/publishers/{}/staff", id);

    let Some(replacement) = parse_id(form.user_id.as_deref()) else {
        let mut errors = FormErrors::new();
        errors.insert("user_id".to_string(), "This field is required.".to_string());
        return render_staff_form(&state, &page, &publisher, member, user_id, &errors).await;
    };
    if replacement == user_id {
        return Ok(redirect_with_notice(&to, "Staff updated."));
    }
    if let Err(e) = attach_staff(&state, user, id, replacement).await {
        let errors = staff_errors(e)?;
        return render_staff_form(&state, &page, &publisher, member, replacement, &errors).await;
    }
    state.publisher_service.remove_staff(user, id, user_id).await?;
    Ok(redirect_with_notice(&to, "Staff updated."))
}

/// GET /publishers/{id}/staff/{user_id}/delete
pub async fn confirm_remove_staff(
    State(state): State<AppState>,
    page: PageContext,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<Response, WebError> {
    page.editor()?;
    let publisher = state.publisher_service.get(id).await?;
    let member = StaffView::from(staff_member(&state, id, user_id).await?);
    confirm_delete(
        &state,
        &page,
        &format!("Remove staff from {}", publisher.name),
        &member.name,
        &format!("/publishers/{}/staff/{}/delete", id, user_id),
        &format!("/publishers/{}/staff", id),
    )
}

/// POST /publishers/{id}/staff/{user_id}/delete
pub async fn remove_staff(
    State(state): State<AppState>,
    page: PageContext,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    state.publisher_service.remove_staff(user, id, user_id).await?;
    Ok(redirect_with_notice(
        &format!("/publishers/{}/staff", id),
        "Staff member removed.",
    ))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// GET /categories/{id}/edit
pub async fn edit_category_form(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let category = state.category_service.get(id).await?;
    let form = NameForm {
        name: category.name.clone(),
        description: category.description.clone(),
    };
    render_name_form(
        &state,
        &page,
        &format!("Edit {}", category.name),
        &format!("/categories/{}/edit", id),
        "/categories",
        CATEGORY_NAME_MAX,
        &form,
        &FormErrors::new(),
    )
}

/// POST /categories/{id}/edit
pub async fn update_category(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<NameForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let (name, description) = name_patch(&form);
    match state
        .category_service
        .update(user, id, CategoryPatch { name, description })
        .await
    {
        Ok(_) => Ok(redirect_with_notice("/categories", "Category updated successfully!")),
        Err(e) => {
            let errors = form_errors(e)?;
            render_name_form(
                &state,
                &page,
                "Edit category",
                &format!("/categories/{}/edit", id),
                "/categories",
                CATEGORY_NAME_MAX,
                &form,
                &errors,
            )
        }
    }
}

/// GET /categories/{id}/delete
pub async fn confirm_delete_category(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let category = state.category_service.get(id).await?;
    confirm_delete(
        &state,
        &page,
        "Delete category",
        &category.name,
        &format!("/categories/{}/delete", id),
        "/categories",
    )
}

/// POST /categories/{id}/delete
pub async fn delete_category(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    state.category_service.delete(user, id).await?;
    Ok(redirect_with_notice("/categories", "Category deleted."))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Serialize)]
struct UserView {
    id: i64,
    username: String,
    full_name: String,
    email: String,
    role_label: &'static str,
    joined: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
            role_label: user.role.label(),
            joined: user.created_at.format(DATE_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

impl UserForm {
    fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_str().to_string(),
        }
    }
}

#[derive(Serialize)]
struct RoleOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

/// GET /users
pub async fn users(
    State(state): State<AppState>,
    page: PageContext,
    Query(query): Query<UsersQuery>,
) -> Result<Response, WebError> {
    page.editor()?;
    let params = ListParams::new(query.page.unwrap_or(1), USERS_PER_PAGE);
    let result = state.user_service.list(&params).await?;
    let users: Vec<UserView> = result.items.iter().map(UserView::from).collect();

    let link = |p: Option<u32>| p.map(|p| format!("/users?page={}", p));
    let mut ctx = TeraContext::new();
    ctx.insert("users", &users);
    ctx.insert("page", &result.page);
    ctx.insert("pages", &result.total_pages().max(1));
    ctx.insert("prev_link", &link(result.prev_page()));
    ctx.insert("next_link", &link(result.next_page()));
    page.render(&state, "users.html", &ctx)
}

/// GET /users/{id}
pub async fn user_detail(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let user = state.user_service.get(id).await?;
    let mut ctx = TeraContext::new();
    ctx.insert("user", &UserView::from(&user));
    page.render(&state, "user_detail.html", &ctx)
}

fn render_user_form(
    state: &AppState,
    page: &PageContext,
    id: i64,
    username: &str,
    form: &UserForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let roles: Vec<RoleOption> = UserRole::ALL
        .iter()
        .map(|r| RoleOption {
            value: r.as_str(),
            label: r.label(),
            selected: r.as_str() == form.role,
        })
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("user_id", &id);
    ctx.insert("username", username);
    ctx.insert("form", form);
    ctx.insert("roles", &roles);
    ctx.insert("errors", errors);
    page.render(state, "user_form.html", &ctx)
}

/// GET /users/{id}/edit
pub async fn edit_user_form(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let user = state.user_service.get(id).await?;
    render_user_form(
        &state,
        &page,
        id,
        &user.username,
        &UserForm::from_user(&user),
        &FormErrors::new(),
    )
}

/// POST /users/{id}/edit
pub async fn update_user(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(form): Form<UserForm>,
) -> Result<Response, WebError> {
    let requester = page.editor()?;
    let existing = state.user_service.get(id).await?;

    let role = match form.role.parse::<UserRole>() {
        Ok(role) => role,
        Err(_) => {
            let mut errors = FormErrors::new();
            errors.insert(
                "role".to_string(),
                format!("\"{}\" is not a valid choice.", form.role),
            );
            return render_user_form(&state, &page, id, &existing.username, &form, &errors);
        }
    };
    let input = UpdateUserInput {
        username: Some(form.username.clone()),
        email: Some(form.email.clone()),
        first_name: Some(form.first_name.clone()),
        last_name: Some(form.last_name.clone()),
        role: Some(role),
    };
    match state.user_service.update(requester, id, input).await {
        Ok(user) => Ok(redirect_with_notice(
            &format!("/users/{}", user.id),
            "User updated successfully!",
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            render_user_form(&state, &page, id, &existing.username, &form, &errors)
        }
    }
}

/// GET /users/{id}/delete
pub async fn confirm_delete_user(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    page.editor()?;
    let user = state.user_service.get(id).await?;
    confirm_delete(
        &state,
        &page,
        "Delete user",
        &user.username,
        &format!("/users/{}/delete", id),
        &format!("/users/{}", id),
    )
}

/// POST /users/{id}/delete
pub async fn delete_user(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    state.user_service.delete(user, id).await?;
    Ok(redirect_with_notice("/users", "User deleted successfully!"))
}
