//! Pagination query parameters and the list envelope

use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::models::{ListParams, PagedResult};

/// Default page size for list endpoints
pub fn default_page_size() -> u32 {
    10
}

/// `?page=&page_size=`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        list_params(self.page, self.page_size)
    }
}

pub fn list_params(page: Option<u32>, page_size: Option<u32>) -> ListParams {
    ListParams::new(page.unwrap_or(1), page_size.unwrap_or_else(default_page_size))
}

/// `{count, next, previous, results}`
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap a page of results; links are relative to the request URI
    pub fn from_result(result: PagedResult<T>, uri: &Uri) -> Self {
        let next = result.next_page().map(|p| page_link(uri, p));
        let previous = result.prev_page().map(|p| page_link(uri, p));
        Self {
            count: result.total,
            next,
            previous,
            results: result.items,
        }
    }
}

/// The same path and query with `page` replaced
pub fn page_link(uri: &Uri, page: u32) -> String {
    let mut pairs: Vec<String> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .map(str::to_string)
        .collect();
    pairs.push(format!("page={}", page));
    format!("{}?{}", uri.path(), pairs.join("&"))
}
