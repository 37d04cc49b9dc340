//! Publisher service
//!
//! Anyone may browse publishers; creating, editing and deleting them and
//! managing their staff is for editors.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{limit_text, require_text, ServiceError, ServiceResult};
use crate::db::repositories::{PublisherRepository, UserRepository};
use crate::models::{
    Capability, ListParams, PagedResult, Publisher, PublisherInput, StaffRole, User,
};

const MAX_NAME_LENGTH: usize = 200;

/// Partial publisher update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<PublisherInput> for PublisherPatch {
    fn from(input: PublisherInput) -> Self {
        Self {
            name: Some(input.name),
            description: Some(input.description),
        }
    }
}

/// One row of a publisher's staff listing
#[derive(Debug, Clone, Serialize)]
pub struct StaffMember {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: StaffRole,
    pub joined_at: DateTime<Utc>,
}

pub struct PublisherService {
    publisher_repo: Arc<dyn PublisherRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl PublisherService {
    pub fn new(
        publisher_repo: Arc<dyn PublisherRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            publisher_repo,
            user_repo,
        }
    }

    pub async fn list(&self, params: &ListParams) -> ServiceResult<PagedResult<Publisher>> {
        let (items, total) = self
            .publisher_repo
            .list(params)
            .await
            .context("Failed to list publishers")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Every publisher, by name
    pub async fn all(&self) -> ServiceResult<Vec<Publisher>> {
        Ok(self.publisher_repo.all().await.context("Failed to list publishers")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Publisher> {
        self.publisher_repo
            .get_by_id(id)
            .await
            .context("Failed to get publisher")?
            .ok_or_else(|| ServiceError::not_found("Publisher not found."))
    }

    pub async fn create(&self, requester: &User, input: PublisherInput) -> ServiceResult<Publisher> {
        ensure_manager(requester)?;
        let name = input.name.trim();
        validate_name(name)?;
        let publisher = self
            .publisher_repo
            .create(name, &input.description)
            .await
            .context("Failed to create publisher")?;
        tracing::info!("Publisher '{}' created by {}", publisher.name, requester.username);
        Ok(publisher)
    }

    pub async fn update(
        &self,
        requester: &User,
        id: i64,
        patch: PublisherPatch,
    ) -> ServiceResult<Publisher> {
        ensure_manager(requester)?;
        let mut publisher = self.get(id).await?;
        if let Some(name) = patch.name {
            let name = name.trim();
            validate_name(name)?;
            publisher.name = name.to_string();
        }
        if let Some(description) = patch.description {
            publisher.description = description;
        }
        Ok(self
            .publisher_repo
            .update(&publisher)
            .await
            .context("Failed to update publisher")?)
    }

    /// Remove a publisher along with its content, staff links and followers
    pub async fn delete(&self, requester: &User, id: i64) -> ServiceResult<()> {
        ensure_manager(requester)?;
        if !self
            .publisher_repo
            .delete(id)
            .await
            .context("Failed to delete publisher")?
        {
            return Err(ServiceError::not_found("Publisher not found."));
        }
        tracing::info!("Publisher {} deleted by {}", id, requester.username);
        Ok(())
    }

    pub async fn add_editor(&self, requester: &User, publisher_id: i64, user_id: i64) -> ServiceResult<bool> {
        self.add_staff(requester, publisher_id, user_id, StaffRole::Editor).await
    }

    pub async fn add_journalist(
        &self,
        requester: &User,
        publisher_id: i64,
        user_id: i64,
    ) -> ServiceResult<bool> {
        self.add_staff(requester, publisher_id, user_id, StaffRole::Journalist).await
    }

    /// Attach a user as staff. The account must hold the matching role.
    /// Returns whether a new link was made; an existing one is kept as is.
    async fn add_staff(
        &self,
        requester: &User,
        publisher_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> ServiceResult<bool> {
        if !requester.can(Capability::ManageStaff) {
            return Err(ServiceError::permission("Only editors can manage publisher staff."));
        }
        let publisher = self.get(publisher_id).await?;

        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .filter(|u| u.role == role.required_user_role());
        let Some(user) = user else {
            let label = match role {
                StaffRole::Editor => "Editor not found.",
                StaffRole::Journalist => "Journalist not found.",
            };
            return Err(ServiceError::not_found(label));
        };

        let (_, created) = self
            .publisher_repo
            .add_staff(publisher.id, user.id, role)
            .await
            .context("Failed to add staff")?;
        if created {
            tracing::info!("{} joined '{}' as {}", user.username, publisher.name, role);
        }
        Ok(created)
    }

    pub async fn staff(&self, publisher_id: i64) -> ServiceResult<Vec<StaffMember>> {
        let publisher = self.get(publisher_id).await?;
        let rows = self
            .publisher_repo
            .list_staff(publisher.id)
            .await
            .context("Failed to list staff")?;
        Ok(rows
            .into_iter()
            .map(|(link, user)| StaffMember {
                user_id: user.id,
                full_name: user.full_name(),
                username: user.username,
                role: link.role,
                joined_at: link.joined_at,
            })
            .collect())
    }

    pub async fn remove_staff(&self, requester: &User, publisher_id: i64, user_id: i64) -> ServiceResult<()> {
        if !requester.can(Capability::ManageStaff) {
            return Err(ServiceError::permission("Only editors can manage publisher staff."));
        }
        if !self
            .publisher_repo
            .remove_staff(publisher_id, user_id)
            .await
            .context("Failed to remove staff")?
        {
            return Err(ServiceError::not_found("Staff member not found."));
        }
        Ok(())
    }
}

fn ensure_manager(requester: &User) -> ServiceResult<()> {
    if requester.can(Capability::ManagePublishers) {
        Ok(())
    } else {
        Err(ServiceError::permission("Only editors can manage publishers."))
    }
}

fn validate_name(name: &str) -> ServiceResult<()> {
    require_text("name", name)?;
    limit_text("name", name, MAX_NAME_LENGTH)
}
