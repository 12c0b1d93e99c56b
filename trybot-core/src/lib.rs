//! Trybot Core
//!
//! Core types and abstractions for the Trybot continuous-testing dispatcher.
//!
//! This crate contains:
//! - Domain types: Changes under review, builder configurations, archives
//!   and test results
//! - DTOs: Wire representations for the review system and the worker
//!   coordinator

pub mod domain;
pub mod dto;
