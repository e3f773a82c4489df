//! `signalbox-accounts` — the user-account domain slice.
//!
//! The reference producer/consumer pair for the notification pipeline: the
//! `UserAccount` aggregate stages notifications from its business operations,
//! and the handlers here consume them once delivered (search indexing,
//! welcome mail).

pub mod account;
pub mod handlers;
pub mod notifications;

pub use account::{AccountStatus, UserAccount};
pub use handlers::{
    IndexError, IndexRegisteredUser, MailError, MailMessage, MailSender, RemoveDeactivatedUser,
    SearchIndexer, SendWelcomeMail,
};
pub use notifications::{
    UserDeactivated, UserEmailChanged, UserRegistered, register_account_notifications,
};
