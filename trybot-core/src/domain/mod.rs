//! Core domain types
//!
//! This module contains the core domain structures used across Trybot crates.
//! These types are shared between the HTTP clients (which produce them) and
//! the dispatcher (which consumes them).

pub mod archive;
pub mod builder;
pub mod change;
pub mod result;
