#![forbid(unsafe_code)]

pub mod answer;
pub mod common;
pub mod ledger;
pub mod question;
pub mod round;
pub mod session;
pub mod standing;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate, WallClockMs};
