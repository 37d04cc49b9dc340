//! Subscription service
//!
//! Readers follow publishers or journalists and get a feed of their
//! published work.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

use super::{ServiceError, ServiceResult, NON_FIELD_ERRORS};
use crate::db::is_unique_violation;
use crate::db::repositories::{
    ContentRepository, PublisherRepository, SubscriptionRepository, UserRepository,
};
use crate::models::{
    Capability, Content, ContentKind, Publisher, Subscription, SubscriptionTarget, User, UserRole,
};

#[derive(Debug, Clone, Serialize)]
pub struct PublisherSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl From<Publisher> for PublisherSummary {
    fn from(p: Publisher) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalistSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl From<User> for JournalistSummary {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name(),
            username: u.username,
            email: u.email,
        }
    }
}

/// Publishers and journalists, either followed or followable
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionList {
    pub publishers: Vec<PublisherSummary>,
    pub journalists: Vec<JournalistSummary>,
}

/// The feed built from a reader's subscriptions
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscribedContent {
    pub articles: Vec<Content>,
    pub newsletters: Vec<Content>,
}

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    user_repo: Arc<dyn UserRepository>,
    content_repo: Arc<dyn ContentRepository>,
}

impl SubscriptionService {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        user_repo: Arc<dyn UserRepository>,
        content_repo: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            repo,
            publisher_repo,
            user_repo,
            content_repo,
        }
    }

    /// Follow exactly one of a publisher or a journalist
    pub async fn subscribe(
        &self,
        requester: &User,
        publisher_id: Option<i64>,
        journalist_id: Option<i64>,
    ) -> ServiceResult<Subscription> {
        ensure_reader(requester)?;
        let target = SubscriptionTarget::from_ids(publisher_id, journalist_id)?;
        self.check_target(target).await?;

        let already = self
            .repo
            .find(requester.id, target)
            .await
            .context("Failed to check subscription")?;
        if already.is_some() {
            return Err(duplicate(target));
        }

        match self.repo.create(requester.id, target).await {
            Ok(sub) => {
                tracing::info!("User {} subscribed to {:?}", requester.id, target);
                Ok(sub)
            }
            Err(e) if is_unique_violation(&e) => Err(duplicate(target)),
            Err(e) => Err(e.context("Failed to create subscription").into()),
        }
    }

    pub async fn unsubscribe(
        &self,
        requester: &User,
        publisher_id: Option<i64>,
        journalist_id: Option<i64>,
    ) -> ServiceResult<()> {
        let target = SubscriptionTarget::from_ids(publisher_id, journalist_id)?;
        let removed = self
            .repo
            .delete(requester.id, target)
            .await
            .context("Failed to delete subscription")?;
        if !removed {
            return Err(ServiceError::not_found("Subscription not found."));
        }
        tracing::info!("User {} unsubscribed from {:?}", requester.id, target);
        Ok(())
    }

    /// Who the requester follows
    pub async fn list_subscriptions(&self, requester: &User) -> ServiceResult<SubscriptionList> {
        let publishers = self
            .repo
            .followed_publishers(requester.id)
            .await
            .context("Failed to list followed publishers")?;
        let journalists = self
            .repo
            .followed_journalists(requester.id)
            .await
            .context("Failed to list followed journalists")?;
        Ok(SubscriptionList {
            publishers: publishers.into_iter().map(Into::into).collect(),
            journalists: journalists.into_iter().map(Into::into).collect(),
        })
    }

    /// Everything that can be followed
    pub async fn subscribable(&self) -> ServiceResult<SubscriptionList> {
        let publishers = self.publisher_repo.all().await.context("Failed to list publishers")?;
        let journalists = self
            .user_repo
            .all_with_role(UserRole::Journalist)
            .await
            .context("Failed to list journalists")?;
        Ok(SubscriptionList {
            publishers: publishers.into_iter().map(Into::into).collect(),
            journalists: journalists.into_iter().map(Into::into).collect(),
        })
    }

    /// Published work by followed journalists and from followed publishers
    pub async fn content(&self, requester: &User) -> ServiceResult<SubscribedContent> {
        let articles = self
            .content_repo
            .list_for_subscriber(ContentKind::Article, requester.id)
            .await
            .context("Failed to collect subscribed articles")?;
        let newsletters = self
            .content_repo
            .list_for_subscriber(ContentKind::Newsletter, requester.id)
            .await
            .context("Failed to collect subscribed newsletters")?;
        Ok(SubscribedContent {
            articles,
            newsletters,
        })
    }

    /// Ids of everything the requester follows, for marking pages
    pub async fn followed_ids(&self, requester: &User) -> ServiceResult<(Vec<i64>, Vec<i64>)> {
        let subs = self
            .repo
            .list_for_subscriber(requester.id)
            .await
            .context("Failed to list subscriptions")?;
        let publishers = subs.iter().filter_map(|s| s.publisher_id).collect();
        let journalists = subs.iter().filter_map(|s| s.journalist_id).collect();
        Ok((publishers, journalists))
    }

    async fn check_target(&self, target: SubscriptionTarget) -> ServiceResult<()> {
        match target {
            SubscriptionTarget::Publisher(id) => {
                self.publisher_repo
                    .get_by_id(id)
                    .await
                    .context("Failed to get publisher")?
                    .ok_or_else(|| ServiceError::not_found("Publisher not found."))?;
            }
            SubscriptionTarget::Journalist(id) => {
                self.user_repo
                    .get_by_id(id)
                    .await
                    .context("Failed to get journalist")?
                    .filter(|u| u.role == UserRole::Journalist)
                    .ok_or_else(|| ServiceError::not_found("Journalist not found."))?;
            }
        }
        Ok(())
    }
}

fn ensure_reader(requester: &User) -> ServiceResult<()> {
    if requester.can(Capability::Subscribe) {
        Ok(())
    } else {
        Err(ServiceError::permission("Only readers can subscribe."))
    }
}

fn duplicate(target: SubscriptionTarget) -> ServiceError {
    let what = match target {
        SubscriptionTarget::Publisher(_) => "publisher",
        SubscriptionTarget::Journalist(_) => "journalist",
    };
    ServiceError::validation(
        NON_FIELD_ERRORS,
        format!("You are already subscribed to this {}.", what),
    )
}
