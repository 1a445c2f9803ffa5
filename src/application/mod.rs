//! Application layer: dispatch logic, policies, and repository contracts.

pub mod backoff;
pub mod channels;
pub mod error;
pub mod policy;
pub mod processor;
pub mod repos;
pub mod runner;
pub mod scheduler;
pub mod sync;
pub mod webhook;
