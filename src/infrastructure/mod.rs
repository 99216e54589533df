//! Infrastructure implementations of the domain contracts

pub mod auth;
pub mod dispatch;
pub mod logging;
pub mod providers;
pub mod rate_limit;
