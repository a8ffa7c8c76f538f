//! # sitekit-common
//!
//! **Purpose**: Shared async utilities for the SiteKit orchestrator
//!
//! - [`Debouncer`]: coalesce bursty triggers into a leading call plus at most
//!   one trailing call per window
//! - [`Serializer`]: force at-most-one-in-flight execution of an operation
//! - [`retry_bounded`]: fixed-delay bounded retry for transient IO
//! - [`logging`]: tracing initialization for the binary

pub mod debounce;
pub mod logging;
pub mod retry;
pub mod serialize;

pub use debounce::Debouncer;
pub use retry::retry_bounded;
pub use serialize::Serializer;
