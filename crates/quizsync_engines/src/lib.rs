#![forbid(unsafe_code)]

pub mod phase;
pub mod placeholder;
pub mod round_clock;
pub mod score_fn;
pub mod standing;
