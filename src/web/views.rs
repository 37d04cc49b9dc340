//! Template-facing views of the domain records

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::WebError;
use crate::api::AppState;
use crate::models::{Comment, Content, ContentState, User};
use crate::services::{ServiceError, NON_FIELD_ERRORS};

const EXCERPT_CHARS: usize = 200;
const DATE_FORMAT: &str = "%B %-d, %Y";

/// Field name -> message, as the form templates read it
pub type FormErrors = BTreeMap<String, String>;

/// One article or newsletter as cards and the detail page show it
#[derive(Debug, Clone, Serialize)]
pub struct ContentView {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub body: String,
    pub author: String,
    pub author_id: i64,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub image: Option<String>,
    pub published_date: Option<String>,
    pub created: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub author: String,
    pub created: String,
    pub content: String,
    pub can_delete: bool,
}

/// `{id, name, selected}` for select boxes
#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

fn status(content: &Content) -> &'static str {
    match content.state() {
        ContentState::Draft => "draft",
        ContentState::Approved => "approved",
        ContentState::Published => "published",
    }
}

/// First paragraph-ish chunk of the body
pub fn excerpt(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    match cut.rfind(' ') {
        Some(space) => format!("{}...", &cut[..space]),
        None => format!("{}...", cut),
    }
}

/// Display names for the users, categories and publishers a page mentions
#[derive(Default)]
pub struct Names {
    users: HashMap<i64, String>,
    categories: HashMap<i64, String>,
    publishers: HashMap<i64, String>,
}

impl Names {
    /// Load names for everything referenced by `items` and `comments`
    pub async fn load(state: &AppState, items: &[Content], comments: &[Comment]) -> Result<Self, WebError> {
        let mut names = Names::default();

        let user_ids = items
            .iter()
            .map(|c| c.author_id)
            .chain(comments.iter().map(|c| c.author_id));
        for id in user_ids {
            if names.users.contains_key(&id) {
                continue;
            }
            let name = match state.user_service.get(id).await {
                Ok(user) => user.display_name(),
                Err(ServiceError::NotFound(_)) => "Unknown".to_string(),
                Err(e) => return Err(e.into()),
            };
            names.users.insert(id, name);
        }

        if items.iter().any(|c| c.category_id.is_some()) {
            for category in state.category_service.all().await? {
                names.categories.insert(category.id, category.name);
            }
        }
        if items.iter().any(|c| c.publisher_id.is_some()) {
            for publisher in state.publisher_service.all().await? {
                names.publishers.insert(publisher.id, publisher.name);
            }
        }
        Ok(names)
    }

    fn user(&self, id: i64) -> String {
        self.users.get(&id).cloned().unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn content(&self, content: &Content) -> ContentView {
        ContentView {
            id: content.id,
            title: content.title.clone(),
            excerpt: excerpt(&content.body),
            body: content.body.clone(),
            author: self.user(content.author_id),
            author_id: content.author_id,
            publisher: content
                .publisher_id
                .and_then(|id| self.publishers.get(&id).cloned()),
            category: content
                .category_id
                .and_then(|id| self.categories.get(&id).cloned()),
            category_id: content.category_id,
            image: content.image.clone(),
            published_date: content
                .published_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            created: content.created_at.format(DATE_FORMAT).to_string(),
            status: status(content),
        }
    }

    pub fn contents(&self, items: &[Content]) -> Vec<ContentView> {
        items.iter().map(|c| self.content(c)).collect()
    }

    pub fn comment(&self, comment: &Comment, viewer: Option<&User>) -> CommentView {
        CommentView {
            id: comment.id,
            author: self.user(comment.author_id),
            created: comment.created_at.format("%B %-d, %Y %H:%M").to_string(),
            content: comment.content.clone(),
            can_delete: viewer.is_some_and(|u| u.can_modify(comment.author_id)),
        }
    }
}

/// Cards for a list of content, names resolved
pub async fn content_cards(state: &AppState, items: &[Content]) -> Result<Vec<ContentView>, WebError> {
    Ok(Names::load(state, items, &[]).await?.contents(items))
}

/// Split a service failure into form errors to re-render, or a failed page
pub fn form_errors(err: ServiceError) -> Result<FormErrors, WebError> {
    let mut errors = FormErrors::new();
    match err {
        ServiceError::Validation { field, message } => {
            errors.insert(field, message);
        }
        ServiceError::Precondition(message) | ServiceError::Conflict(message) => {
            errors.insert(NON_FIELD_ERRORS.to_string(), message);
        }
        other => return Err(other.into()),
    }
    Ok(errors)
}

/// An optional id from a form field; blank means none
pub fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_cuts_on_word_boundary() {
        assert_eq!(excerpt("Short\n\nbody"), "Short body");
        let long = "word ".repeat(100);
        let cut = excerpt(&long);
        assert!(cut.ends_with("word..."));
        assert!(cut.chars().count() <= EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_form_errors() {
        let errors = form_errors(ServiceError::validation("title", "This field may not be blank.")).unwrap();
        assert_eq!(errors["title"], "This field may not be blank.");
        let errors = form_errors(ServiceError::Conflict("Taken.".into())).unwrap();
        assert_eq!(errors[NON_FIELD_ERRORS], "Taken.");
        assert!(matches!(
            form_errors(ServiceError::permission("no")),
            Err(WebError::Forbidden(_))
        ));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(Some("12")), Some(12));
        assert_eq!(parse_id(Some(" ")), None);
        assert_eq!(parse_id(Some("x")), None);
        assert_eq!(parse_id(None), None);
    }
}
