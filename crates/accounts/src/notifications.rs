//! Account notifications and their registry wiring.

use serde::{Deserialize, Serialize};

use signalbox_core::UserId;
use signalbox_events::{DomainNotification, NotificationRegistry};

/// A new account was registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    /// BCP 47 language tag, used to localize the welcome mail.
    pub language: String,
}

impl DomainNotification for UserRegistered {
    const EVENT_TYPE: &'static str = "accounts.user_registered.v1";
}

/// An account changed its contact email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEmailChanged {
    pub user_id: UserId,
    pub old_email: String,
    pub new_email: String,
}

impl DomainNotification for UserEmailChanged {
    const EVENT_TYPE: &'static str = "accounts.user_email_changed.v1";
}

/// An account was deactivated and must leave derived read models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeactivated {
    pub user_id: UserId,
    pub email: String,
}

impl DomainNotification for UserDeactivated {
    const EVENT_TYPE: &'static str = "accounts.user_deactivated.v1";
}

/// Register every account notification with the decode registry.
///
/// Call this from process startup wiring; a variant missing here cannot be
/// redispatched after storage.
pub fn register_account_notifications(registry: &mut NotificationRegistry) {
    registry.register::<UserRegistered>();
    registry.register::<UserEmailChanged>();
    registry.register::<UserDeactivated>();
}
