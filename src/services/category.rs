//! Category service
//!
//! Flat, uniquely named labels for articles. Deleting a category detaches
//! its articles instead of removing them.

use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

use super::{limit_text, require_text, ServiceError, ServiceResult};
use crate::db::is_unique_violation;
use crate::db::repositories::CategoryRepository;
use crate::models::{Capability, Category, CategoryInput, ListParams, PagedResult, User};

const MAX_NAME_LENGTH: usize = 100;
const DUPLICATE_NAME: &str = "category with this name already exists.";

/// Partial category update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CategoryInput> for CategoryPatch {
    fn from(input: CategoryInput) -> Self {
        Self {
            name: Some(input.name),
            description: Some(input.description),
        }
    }
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, params: &ListParams) -> ServiceResult<PagedResult<Category>> {
        let (items, total) = self.repo.list(params).await.context("Failed to list categories")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn all(&self) -> ServiceResult<Vec<Category>> {
        Ok(self.repo.all().await.context("Failed to list categories")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Category> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| ServiceError::not_found("Category not found."))
    }

    pub async fn create(&self, requester: &User, input: CategoryInput) -> ServiceResult<Category> {
        ensure_manager(requester)?;
        let name = input.name.trim();
        validate_name(name)?;
        self.ensure_unique(name, None).await?;

        match self.repo.create(name, &input.description).await {
            Ok(category) => {
                tracing::info!("Category '{}' created", category.name);
                Ok(category)
            }
            Err(e) if is_unique_violation(&e) => Err(ServiceError::validation("name", DUPLICATE_NAME)),
            Err(e) => Err(e.context("Failed to create category").into()),
        }
    }

    pub async fn update(
        &self,
        requester: &User,
        id: i64,
        patch: CategoryPatch,
    ) -> ServiceResult<Category> {
        ensure_manager(requester)?;
        let mut category = self.get(id).await?;
        if let Some(name) = patch.name {
            let name = name.trim();
            validate_name(name)?;
            self.ensure_unique(name, Some(id)).await?;
            category.name = name.to_string();
        }
        if let Some(description) = patch.description {
            category.description = description;
        }

        match self.repo.update(&category).await {
            Ok(category) => Ok(category),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::validation("name", DUPLICATE_NAME)),
            Err(e) => Err(e.context("Failed to update category").into()),
        }
    }

    /// Delete a category; its articles stay, uncategorized
    pub async fn delete(&self, requester: &User, id: i64) -> ServiceResult<()> {
        ensure_manager(requester)?;
        if !self.repo.delete(id).await.context("Failed to delete category")? {
            return Err(ServiceError::not_found("Category not found."));
        }
        tracing::info!("Category {} deleted by {}", id, requester.username);
        Ok(())
    }

    async fn ensure_unique(&self, name: &str, except: Option<i64>) -> ServiceResult<()> {
        let existing = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check category name")?;
        match existing {
            Some(c) if Some(c.id) != except => Err(ServiceError::validation("name", DUPLICATE_NAME)),
            _ => Ok(()),
        }
    }
}

fn ensure_manager(requester: &User) -> ServiceResult<()> {
    if requester.can(Capability::ManageCategories) {
        Ok(())
    } else {
        Err(ServiceError::permission("Only editors can manage categories."))
    }
}

fn validate_name(name: &str) -> ServiceResult<()> {
    require_text("name", name)?;
    limit_text("name", name, MAX_NAME_LENGTH)
}
