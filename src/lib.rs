//! Intake Bot: a Telegram questionnaire that collects a service request and
//! forwards it to an operator.

pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod store;
