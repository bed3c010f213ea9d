//! Flint Core - Foundational types for the Flint engine
//!
//! This crate provides the core types that all other Flint crates depend on:
//! - `glam` re-exports - the shared math vocabulary (Mat4, Quat, Vec3)
//! - Error types and Result alias

mod error;

pub use error::{FlintError, Result};
pub use glam::{Mat4, Quat, Vec3};
