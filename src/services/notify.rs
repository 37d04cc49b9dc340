//! Outgoing mail
//!
//! [`NotificationService`] tells subscribers about newly published content
//! and sends password reset links. Delivery goes through a [`Mailer`]: SMTP
//! via lettre when email is enabled, the log otherwise. Mail failures are
//! logged and never surface to the caller.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::{EmailConfig, SiteConfig};
use crate::db::repositories::SubscriptionRepository;
use crate::models::{Content, User};

/// One message to one or more recipients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Pick the mailer the configuration asks for
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// SMTP delivery. Recipients go in Bcc so subscribers never see each other.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.from.clone())
            .subject(email.subject);
        for recipient in &email.recipients {
            match recipient.parse::<Mailbox>() {
                Ok(mailbox) => builder = builder.bcc(mailbox),
                Err(e) => tracing::warn!("Skipping invalid address {}: {}", recipient, e),
            }
        }

        let message = builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes mail to the log; used when SMTP is disabled
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(
            recipients = email.recipients.len(),
            subject = %email.subject,
            "Email (not sent, SMTP disabled):\n{}",
            email.body
        );
        Ok(())
    }
}

pub struct NotificationService {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    mailer: Arc<dyn Mailer>,
    site: SiteConfig,
}

impl NotificationService {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        mailer: Arc<dyn Mailer>,
        site: SiteConfig,
    ) -> Self {
        Self {
            subscription_repo,
            mailer,
            site,
        }
    }

    /// Emails of everyone following the author or the publisher of `content`
    pub async fn recipients_for(&self, content: &Content) -> Result<Vec<String>> {
        self.subscription_repo
            .subscriber_emails(content.author_id, content.publisher_id)
            .await
    }

    /// Tell subscribers about a freshly published item.
    ///
    /// Returns how many addresses were mailed; zero on any failure.
    pub async fn notify_published(&self, content: &Content, author: &User) -> usize {
        let recipients = match self.recipients_for(content).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!("Failed to collect subscribers for {} {}: {:#}", content.kind, content.id, e);
                return 0;
            }
        };
        if recipients.is_empty() {
            return 0;
        }

        let count = recipients.len();
        let email = OutgoingEmail {
            recipients,
            subject: format!("New {} Published: {}", content.kind.label(), content.title),
            body: format!(
                "A new {} has been published by {}.\n\nTitle: {}\n\nRead it now on {}!\n{}/{}s/{}\n",
                content.kind,
                author.display_name(),
                content.title,
                self.site.name,
                self.site.base_url.trim_end_matches('/'),
                content.kind,
                content.id,
            ),
        };

        match self.mailer.send(email).await {
            Ok(()) => {
                tracing::info!("Notified {} subscribers of {} {}", count, content.kind, content.id);
                count
            }
            Err(e) => {
                tracing::warn!("Failed to notify subscribers of {} {}: {:#}", content.kind, content.id, e);
                0
            }
        }
    }

    /// Mail a password reset link. Returns whether the mailer accepted it.
    pub async fn send_password_reset(&self, user: &User, token: &str) -> bool {
        let link = format!(
            "{}/reset-password/{}/{}/",
            self.site.base_url.trim_end_matches('/'),
            user.id,
            token
        );
        let email = OutgoingEmail {
            recipients: vec![user.email.clone()],
            subject: "Password Reset Requested".to_string(),
            body: format!(
                "Hi {},\n\nYou requested a password reset. Click the link below to reset your password:\n{}\n\nIf you did not request this, please ignore this email.\n",
                user.display_name(),
                link
            ),
        };

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send password reset to user {}: {:#}", user.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every message instead of delivering it
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    /// Notification service over `pool` whose mail lands in the returned mailer
    pub fn recording_notifier(
        pool: &crate::db::DynDatabasePool,
    ) -> (Arc<NotificationService>, Arc<RecordingMailer>) {
        let mailer = Arc::new(RecordingMailer::default());
        let service = NotificationService::new(
            crate::db::repositories::SqlxSubscriptionRepository::boxed(pool.clone()),
            mailer.clone(),
            SiteConfig::default(),
        );
        (Arc::new(service), mailer)
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> Result<()> {
            if self.fail {
                return Err(anyhow!("smtp unreachable"));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;
    use crate::db::repositories::test_support::{insert_publisher, insert_user, setup_pool};
    use crate::db::repositories::{ContentRepository, SqlxContentRepository, SqlxSubscriptionRepository, SqlxUserRepository, UserRepository};
    use crate::models::{ContentKind, SubscriptionTarget, UserRole};
    use chrono::Utc;

    async fn published_article(
        pool: &crate::db::DynDatabasePool,
        author_id: i64,
        publisher_id: Option<i64>,
    ) -> Content {
        let now = Utc::now();
        let draft = Content {
            id: 0,
            kind: ContentKind::Article,
            title: "Budget passes".into(),
            body: "Details".into(),
            author_id,
            publisher_id,
            category_id: None,
            image: None,
            is_independent: publisher_id.is_none(),
            is_approved: false,
            approved_by: None,
            approval_date: None,
            is_published: false,
            published_date: None,
            created_at: now,
            updated_at: now,
        };
        let repo = SqlxContentRepository::new(pool.clone());
        let mut content = repo.create(&draft).await.unwrap();
        content.is_approved = true;
        content.is_published = true;
        content
    }

    #[tokio::test]
    async fn test_notify_published_mails_followers_once() {
        let pool = setup_pool().await;
        let ann = insert_user(&pool, "ann", UserRole::Reader).await;
        let bob = insert_user(&pool, "bob", UserRole::Reader).await;
        let _cat = insert_user(&pool, "cat", UserRole::Reader).await;
        let jo = insert_user(&pool, "jo", UserRole::Journalist).await;
        let daily = insert_publisher(&pool, "Daily").await;

        let subs = SqlxSubscriptionRepository::boxed(pool.clone());
        subs.create(ann, SubscriptionTarget::Journalist(jo)).await.unwrap();
        subs.create(ann, SubscriptionTarget::Publisher(daily)).await.unwrap();
        subs.create(bob, SubscriptionTarget::Publisher(daily)).await.unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let service = NotificationService::new(subs, mailer.clone(), SiteConfig::default());
        let author = SqlxUserRepository::new(pool.clone()).get_by_id(jo).await.unwrap().unwrap();
        let article = published_article(&pool, jo, Some(daily)).await;

        assert_eq!(service.notify_published(&article, &author).await, 2);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "New Article Published: Budget passes");
        assert_eq!(sent[0].recipients, ["ann@example.com", "bob@example.com"]);
    }

    #[tokio::test]
    async fn test_notify_without_followers_sends_nothing() {
        let pool = setup_pool().await;
        let jo = insert_user(&pool, "jo", UserRole::Journalist).await;
        let mailer = Arc::new(RecordingMailer::default());
        let service = NotificationService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            mailer.clone(),
            SiteConfig::default(),
        );
        let author = SqlxUserRepository::new(pool.clone()).get_by_id(jo).await.unwrap().unwrap();
        let article = published_article(&pool, jo, None).await;

        assert_eq!(service.notify_published(&article, &author).await, 0);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mail_failure_is_swallowed() {
        let pool = setup_pool().await;
        let ann = insert_user(&pool, "ann", UserRole::Reader).await;
        let jo = insert_user(&pool, "jo", UserRole::Journalist).await;
        let subs = SqlxSubscriptionRepository::boxed(pool.clone());
        subs.create(ann, SubscriptionTarget::Journalist(jo)).await.unwrap();

        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let service = NotificationService::new(subs, mailer, SiteConfig::default());
        let author = SqlxUserRepository::new(pool.clone()).get_by_id(jo).await.unwrap().unwrap();
        let article = published_article(&pool, jo, None).await;

        assert_eq!(service.notify_published(&article, &author).await, 0);
        assert!(!service.send_password_reset(&author, "tok").await);
    }

    #[tokio::test]
    async fn test_password_reset_link() {
        let pool = setup_pool().await;
        let jo = insert_user(&pool, "jo", UserRole::Journalist).await;
        let mailer = Arc::new(RecordingMailer::default());
        let service = NotificationService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            mailer.clone(),
            SiteConfig::default(),
        );
        let user = SqlxUserRepository::new(pool.clone()).get_by_id(jo).await.unwrap().unwrap();

        assert!(service.send_password_reset(&user, "abc").await);
        let sent = mailer.sent();
        assert_eq!(sent[0].recipients, ["jo@example.com"]);
        assert!(sent[0]
            .body
            .contains(&format!("http://localhost:8000/reset-password/{}/abc/", jo)));
    }

    #[test]
    fn test_mailer_from_config() {
        assert!(mailer_from_config(&EmailConfig::default()).is_ok());
        let broken = EmailConfig {
            enabled: true,
            ..EmailConfig::default()
        };
        assert!(mailer_from_config(&broken).is_err());
    }
}
