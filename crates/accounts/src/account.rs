//! The `UserAccount` aggregate.

use signalbox_core::{DomainError, DomainResult, UserId};
use signalbox_events::{DomainNotification, NotificationBuffer, RaisesNotifications};

use crate::notifications::{UserDeactivated, UserEmailChanged, UserRegistered};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Deactivated,
}

/// A user account that stages notifications from its business operations.
///
/// Raised notifications accumulate in the explicit buffer until the
/// persistence layer drains them into the outbox alongside the state change.
/// Operations that fail stage nothing.
#[derive(Debug, Clone)]
pub struct UserAccount {
    id: UserId,
    email: String,
    display_name: String,
    language: String,
    status: AccountStatus,
    notifications: NotificationBuffer,
}

impl UserAccount {
    /// Register a new account, staging `UserRegistered`.
    pub fn register(
        email: impl Into<String>,
        display_name: impl Into<String>,
        language: impl Into<String>,
    ) -> DomainResult<Self> {
        let email = email.into();
        let display_name = display_name.into();
        let language = language.into();

        validate_email(&email)?;
        if display_name.trim().is_empty() {
            return Err(DomainError::validation("display name must not be empty"));
        }
        if language.trim().is_empty() {
            return Err(DomainError::validation("language must not be empty"));
        }

        let mut account = Self {
            id: UserId::new(),
            email,
            display_name,
            language,
            status: AccountStatus::Active,
            notifications: NotificationBuffer::new(),
        };
        account.stage(&UserRegistered {
            user_id: account.id,
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            language: account.language.clone(),
        })?;
        Ok(account)
    }

    /// Change the contact email, staging `UserEmailChanged`.
    ///
    /// Setting the current email again is a no-op and stages nothing.
    pub fn change_email(&mut self, new_email: impl Into<String>) -> DomainResult<()> {
        if self.status == AccountStatus::Deactivated {
            return Err(DomainError::invariant(
                "cannot change email of a deactivated account",
            ));
        }
        let new_email = new_email.into();
        validate_email(&new_email)?;
        if new_email == self.email {
            return Ok(());
        }

        let old_email = std::mem::replace(&mut self.email, new_email);
        self.stage(&UserEmailChanged {
            user_id: self.id,
            old_email,
            new_email: self.email.clone(),
        })
    }

    /// Deactivate the account, staging `UserDeactivated`.
    pub fn deactivate(&mut self) -> DomainResult<()> {
        if self.status == AccountStatus::Deactivated {
            return Err(DomainError::invariant("account is already deactivated"));
        }
        self.status = AccountStatus::Deactivated;
        self.stage(&UserDeactivated {
            user_id: self.id,
            email: self.email.clone(),
        })
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    fn stage<N: DomainNotification>(&mut self, notification: &N) -> DomainResult<()> {
        self.notifications
            .record(notification)
            .map_err(|err| DomainError::serialization(err.to_string()))
    }
}

impl RaisesNotifications for UserAccount {
    fn notifications_mut(&mut self) -> &mut NotificationBuffer {
        &mut self.notifications
    }
}

fn validate_email(email: &str) -> DomainResult<()> {
    // Deliberately shallow: real validation happens when mail bounces.
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if well_formed {
        Ok(())
    } else {
        Err(DomainError::validation(format!("malformed email '{email}'")))
    }
}
