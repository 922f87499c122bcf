//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into import, statistics and validation
//!   use cases.
//! - Stay storage-agnostic: services are generic over repository traits.

pub mod import_service;
pub mod stats_service;
pub mod validation_service;
