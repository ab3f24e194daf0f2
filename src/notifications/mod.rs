//! Outbound email for account verification and password reset.

mod email;

pub use email::Mailer;
