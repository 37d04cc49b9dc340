//! Template engine
//!
//! Page templates are compiled into the binary and rendered with Tera.
//! Every page receives the standard variables from [`PageVars`].

use anyhow::Result;
use chrono::Datelike;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::models::{Capability, User};

/// Template rendering errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template error: {0}")]
    Compile(String),

    #[error("Failed to render '{template}': {message}")]
    Render { template: String, message: String },
}

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("macros.html", include_str!("../../templates/macros.html")),
    ("home.html", include_str!("../../templates/home.html")),
    ("content_list.html", include_str!("../../templates/content_list.html")),
    ("content_detail.html", include_str!("../../templates/content_detail.html")),
    ("content_form.html", include_str!("../../templates/content_form.html")),
    ("confirm_delete.html", include_str!("../../templates/confirm_delete.html")),
    ("categories.html", include_str!("../../templates/categories.html")),
    ("publishers.html", include_str!("../../templates/publishers.html")),
    ("name_form.html", include_str!("../../templates/name_form.html")),
    ("staff.html", include_str!("../../templates/staff.html")),
    ("staff_form.html", include_str!("../../templates/staff_form.html")),
    ("users.html", include_str!("../../templates/users.html")),
    ("user_detail.html", include_str!("../../templates/user_detail.html")),
    ("user_form.html", include_str!("../../templates/user_form.html")),
    ("comment_form.html", include_str!("../../templates/comment_form.html")),
    ("profile.html", include_str!("../../templates/profile.html")),
    ("pending.html", include_str!("../../templates/pending.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("register.html", include_str!("../../templates/register.html")),
    ("password_reset.html", include_str!("../../templates/password_reset.html")),
    (
        "password_reset_confirm.html",
        include_str!("../../templates/password_reset_confirm.html"),
    ),
    ("error.html", include_str!("../../templates/error.html")),
];

/// Renders the site's pages
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|e| TemplateError::Compile(error_chain(&e)))?;
        Ok(Self { tera })
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            TemplateError::Render {
                template: template.to_string(),
                message: error_chain(&e),
            }
            .into()
        })
    }

    /// Render a page with the standard variables added
    pub fn render_page(&self, template: &str, context: &TeraContext, vars: &PageVars) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("site_name", &vars.site_name);
        full_context.insert("request_path", &vars.request_path);
        full_context.insert("year", &vars.year);
        full_context.insert("notice", &vars.notice);
        if let Some(ref user) = vars.current_user {
            full_context.insert("current_user", user);
        }
        self.render(template, &full_context)
    }

    /// The error page, or a bare one if even that fails
    pub fn render_error(&self, status: u16, message: &str, vars: &PageVars) -> String {
        let mut context = TeraContext::new();
        context.insert("status", &status);
        context.insert("message", message);
        match self.render_page("error.html", &context, vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render error page: {:#}", e);
                format!(
                    "<!DOCTYPE html><html><body><h1>{}</h1><p>{}</p></body></html>",
                    status,
                    tera::escape_html(message)
                )
            }
        }
    }
}

fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Variables every page template can use
#[derive(Debug, Clone)]
pub struct PageVars {
    pub site_name: String,
    pub request_path: String,
    pub current_user: Option<CurrentUser>,
    pub notice: Option<String>,
    pub year: i32,
}

impl PageVars {
    pub fn new(site_name: impl Into<String>, request_path: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            request_path: request_path.into(),
            current_user: None,
            notice: None,
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: Option<&User>) -> Self {
        self.current_user = user.map(CurrentUser::from);
        self
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }
}

/// The signed-in user as templates see it
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub role: String,
    pub role_label: String,
    pub is_editor: bool,
    pub can_author: bool,
    pub can_subscribe: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            role_label: user.role.label().to_string(),
            is_editor: user.is_editor(),
            can_author: user.can(Capability::AuthorContent),
            can_subscribe: user.can(Capability::Subscribe),
        }
    }
}
