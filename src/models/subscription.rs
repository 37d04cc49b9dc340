//! Reader subscriptions
//!
//! A subscription follows exactly one target: a publisher or a journalist.
//! The enum makes "both" and "neither" unrepresentable; the table mirrors it
//! with two nullable columns and a CHECK constraint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single entity a subscription follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTarget {
    Publisher(i64),
    Journalist(i64),
}

/// Why a pair of optional ids is not a valid target
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("Publisher or Journalist ID is required.")]
    Missing,
    #[error("Specify either a publisher or a journalist, not both.")]
    Both,
}

impl SubscriptionTarget {
    /// Build a target from the two optional ids of a request or row
    pub fn from_ids(publisher: Option<i64>, journalist: Option<i64>) -> Result<Self, TargetError> {
        match (publisher, journalist) {
            (Some(id), None) => Ok(SubscriptionTarget::Publisher(id)),
            (None, Some(id)) => Ok(SubscriptionTarget::Journalist(id)),
            (Some(_), Some(_)) => Err(TargetError::Both),
            (None, None) => Err(TargetError::Missing),
        }
    }

    /// `(publisher_id, journalist_id)` column values
    pub fn columns(&self) -> (Option<i64>, Option<i64>) {
        match *self {
            SubscriptionTarget::Publisher(id) => (Some(id), None),
            SubscriptionTarget::Journalist(id) => (None, Some(id)),
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            SubscriptionTarget::Publisher(id) | SubscriptionTarget::Journalist(id) => id,
        }
    }
}

/// A stored follow relationship
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub subscriber_id: i64,
    pub publisher_id: Option<i64>,
    pub journalist_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn target(&self) -> Result<SubscriptionTarget, TargetError> {
        SubscriptionTarget::from_ids(self.publisher_id, self.journalist_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_ids() {
        assert_eq!(SubscriptionTarget::from_ids(Some(1), None), Ok(SubscriptionTarget::Publisher(1)));
        assert_eq!(SubscriptionTarget::from_ids(None, Some(2)), Ok(SubscriptionTarget::Journalist(2)));
        assert_eq!(SubscriptionTarget::from_ids(Some(1), Some(2)), Err(TargetError::Both));
        assert_eq!(SubscriptionTarget::from_ids(None, None), Err(TargetError::Missing));
    }

    proptest! {
        #[test]
        fn columns_are_exclusive(publisher in prop::option::of(1i64..1000), journalist in prop::option::of(1i64..1000)) {
            match SubscriptionTarget::from_ids(publisher, journalist) {
                Ok(target) => {
                    let (p, j) = target.columns();
                    prop_assert!(p.is_some() != j.is_some());
                    prop_assert_eq!(SubscriptionTarget::from_ids(p, j), Ok(target));
                }
                Err(_) => prop_assert!(publisher.is_some() == journalist.is_some()),
            }
        }
    }
}
