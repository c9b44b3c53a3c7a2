//! # Oracle Supervisor
//!
//! Scheduling and lifecycle plumbing shared by the oracle services.
//!
//! - [`Ticker`]: fixed or variable cadence tick source
//! - [`Supervisor`]: starts services in order and stops them together

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod supervisor;
pub mod ticker;

pub use supervisor::Supervisor;
pub use ticker::{TickReceiver, Ticker};
