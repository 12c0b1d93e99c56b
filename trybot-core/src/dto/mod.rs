//! Data Transfer Objects for external services
//!
//! This module contains the JSON shapes exchanged with the review system
//! (Gerrit) and the worker coordinator. DTOs stay close to the wire format;
//! conversion into domain types happens in `From` impls.

pub mod gerrit;
pub mod worker;
