//! Outbound notifications. Email is the only channel; OTP and password-reset
//! codes go through it.

mod email;

pub use email::EmailService;
