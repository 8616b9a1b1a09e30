//! The script run session.
//!
//! This module owns the run/cancel protocol between the control side and the
//! isolated execution context: single-flight enforcement, context lifecycle
//! (lazily loaded, reused across runs, torn down on cancel), output and
//! progress relay, and the compile-preview debouncer. UI/CLI layers call
//! into this module to keep responsibilities separated.

mod context;
mod controller;
pub(crate) mod debounce;

pub(crate) use controller::{run_controller, UiCommand};
