#![forbid(unsafe_code)]

pub mod ledger_store;
pub mod repo;
