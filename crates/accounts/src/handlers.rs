//! Notification handlers for the account slice.
//!
//! Each handler does one side effect and is idempotent: the delivery
//! pipeline is at-least-once, so indexing the same user or sending to the
//! same address twice must be safe. Outbound boundaries (search, mail) are
//! traits so tests run against in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use signalbox_core::UserId;
use signalbox_dispatch::{DispatchContext, DispatchError, DispatchResult, NotificationHandler};

use crate::notifications::{UserDeactivated, UserRegistered};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Write-side of the user search index.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Upsert by user id, so redelivery overwrites rather than duplicates.
    async fn index(&self, user_id: UserId, display_name: &str, email: &str)
    -> Result<(), IndexError>;

    /// Removing an absent user succeeds.
    async fn remove(&self, user_id: UserId) -> Result<(), IndexError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound mail boundary.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Indexes newly registered users for search.
pub struct IndexRegisteredUser<S> {
    indexer: S,
}

impl<S: SearchIndexer> IndexRegisteredUser<S> {
    pub fn new(indexer: S) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl<S: SearchIndexer> NotificationHandler<UserRegistered> for IndexRegisteredUser<S> {
    fn name(&self) -> &'static str {
        "IndexRegisteredUser"
    }

    async fn handle(
        &self,
        notification: &UserRegistered,
        _ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        self.indexer
            .index(
                notification.user_id,
                &notification.display_name,
                &notification.email,
            )
            .await
            .map_err(|err| failed(self.name(), err))?;
        info!(user_id = %notification.user_id, "indexed registered user");
        Ok(())
    }
}

/// Sends the localized welcome mail to newly registered users.
pub struct SendWelcomeMail<M> {
    mailer: M,
}

impl<M: MailSender> SendWelcomeMail<M> {
    pub fn new(mailer: M) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl<M: MailSender> NotificationHandler<UserRegistered> for SendWelcomeMail<M> {
    fn name(&self) -> &'static str {
        "SendWelcomeMail"
    }

    async fn handle(
        &self,
        notification: &UserRegistered,
        _ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        let message = welcome_mail(
            &notification.email,
            &notification.display_name,
            &notification.language,
        );
        self.mailer
            .send(message)
            .await
            .map_err(|err| failed(self.name(), err))?;
        info!(user_id = %notification.user_id, "sent welcome mail");
        Ok(())
    }
}

/// Removes deactivated users from the search index.
pub struct RemoveDeactivatedUser<S> {
    indexer: S,
}

impl<S: SearchIndexer> RemoveDeactivatedUser<S> {
    pub fn new(indexer: S) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl<S: SearchIndexer> NotificationHandler<UserDeactivated> for RemoveDeactivatedUser<S> {
    fn name(&self) -> &'static str {
        "RemoveDeactivatedUser"
    }

    async fn handle(
        &self,
        notification: &UserDeactivated,
        _ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        self.indexer
            .remove(notification.user_id)
            .await
            .map_err(|err| failed(self.name(), err))?;
        info!(user_id = %notification.user_id, "removed deactivated user from index");
        Ok(())
    }
}

fn failed(handler: &'static str, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::Handler {
        handler,
        message: err.to_string(),
    }
}

fn welcome_mail(to: &str, display_name: &str, language: &str) -> MailMessage {
    // Primary subtag only; "de-AT" gets the German template.
    let primary = language.split('-').next().unwrap_or(language);
    let (subject, body) = match primary {
        "de" => (
            "Willkommen!".to_string(),
            format!("Hallo {display_name}, willkommen an Bord."),
        ),
        "fr" => (
            "Bienvenue !".to_string(),
            format!("Bonjour {display_name}, bienvenue à bord."),
        ),
        _ => (
            "Welcome!".to_string(),
            format!("Hi {display_name}, welcome aboard."),
        ),
    };
    MailMessage {
        to: to.to_string(),
        subject,
        body,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct FakeIndexer {
        indexed: Arc<Mutex<Vec<(UserId, String)>>>,
        removed: Arc<Mutex<Vec<UserId>>>,
        fail: bool,
    }

    #[async_trait]
    impl SearchIndexer for FakeIndexer {
        async fn index(
            &self,
            user_id: UserId,
            display_name: &str,
            _email: &str,
        ) -> Result<(), IndexError> {
            if self.fail {
                return Err(IndexError::Backend("index unavailable".to_string()));
            }
            self.indexed
                .lock()
                .unwrap()
                .push((user_id, display_name.to_string()));
            Ok(())
        }

        async fn remove(&self, user_id: UserId) -> Result<(), IndexError> {
            self.removed.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct FakeMailer {
        sent: Arc<Mutex<Vec<MailMessage>>>,
    }

    #[async_trait]
    impl MailSender for FakeMailer {
        async fn send(&self, message: MailMessage) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn registered(language: &str) -> UserRegistered {
        UserRegistered {
            user_id: UserId::new(),
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            language: language.to_string(),
        }
    }

    #[tokio::test]
    async fn indexes_registered_user() {
        let indexer = FakeIndexer::default();
        let handler = IndexRegisteredUser::new(indexer.clone());
        let notification = registered("en");

        handler
            .handle(&notification, &DispatchContext::anonymous())
            .await
            .unwrap();

        let indexed = indexer.indexed.lock().unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].0, notification.user_id);
    }

    #[tokio::test]
    async fn index_failure_surfaces_as_handler_error() {
        let handler = IndexRegisteredUser::new(FakeIndexer {
            fail: true,
            ..FakeIndexer::default()
        });

        let err = handler
            .handle(&registered("en"), &DispatchContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Handler {
                handler: "IndexRegisteredUser",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn welcome_mail_is_localized_by_primary_subtag() {
        let mailer = FakeMailer::default();
        let handler = SendWelcomeMail::new(mailer.clone());

        for (language, subject) in [("de-AT", "Willkommen!"), ("fr", "Bienvenue !"), ("sv", "Welcome!")] {
            handler
                .handle(&registered(language), &DispatchContext::anonymous())
                .await
                .unwrap();
            assert_eq!(mailer.sent.lock().unwrap().last().unwrap().subject, subject);
        }
    }

    #[tokio::test]
    async fn removes_deactivated_user_from_index() {
        let indexer = FakeIndexer::default();
        let handler = RemoveDeactivatedUser::new(indexer.clone());
        let notification = UserDeactivated {
            user_id: UserId::new(),
            email: "ada@example.com".to_string(),
        };

        handler
            .handle(&notification, &DispatchContext::anonymous())
            .await
            .unwrap();
        assert_eq!(*indexer.removed.lock().unwrap(), vec![notification.user_id]);
    }
}
