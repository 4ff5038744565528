//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate canonicalization state and the term store into use-case APIs.
//! - Keep transport layers decoupled from locking and storage details.

pub mod canon_service;
pub mod suggestion_service;
