//! Analysis modules.
//!
//! Pure, synchronous stages that run once every adapter has answered.

pub mod aggregator;
pub mod validator;

pub use aggregator::*;
pub use validator::*;
