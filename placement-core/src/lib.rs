//! Operator execution core for the placement scheduler.
//!
//! An [`Operator`](operator::Operator) is an ordered plan of steps that moves
//! a region's replicas or leadership. Schedulers build operators, the
//! dispatcher starts them, and every region heartbeat drives
//! [`Operator::check`](operator::Operator::check) until the operator reaches
//! a terminal status. All of it is synchronous and safe to call from many
//! threads at once.
#![allow(missing_docs)]

pub mod clock;
pub mod error;
pub mod metrics;
pub mod operator;
pub mod prelude;

pub use error::{OperatorError, Result};
