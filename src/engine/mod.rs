//! Core engine — detection cycles, scheduling, and state composition.

pub mod composer;
pub mod reconcile;
pub mod scheduler;
