//! Error types for the Lumina engine
//!
//! This module defines the error types used throughout the engine,
//! including backend failures, resource registry lookups, pass lifecycle
//! violations and render graph configuration errors.
//!
//! Every variant except the backend/initialization ones signals a
//! programming defect (wrong type requested, stale handle, cyclic pass
//! configuration, illegal state transition). Callers are expected to
//! propagate them up to process exit rather than retry.

use std::fmt;

/// Result type for Lumina engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lumina engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (bad descriptor, duplicate name, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, subsystems)
    InitializationFailed(String),

    /// Illegal state transition (begin on a recording command buffer,
    /// submit before record, render before initialize, ...)
    InvalidState(String),

    /// A registry slot holds a resource of a different type than requested
    TypeMismatch {
        /// Display name of the stored resource
        name: String,
        /// Requested Rust type
        expected: &'static str,
    },

    /// Raw registry index past the end of the flat store
    OutOfRange {
        /// Requested index
        index: u32,
        /// Current store length
        len: u32,
    },

    /// No resource group registered under this base name
    ResourceNotFound(String),

    /// A pass requested a resource it did not declare
    AccessDenied {
        /// Requesting pass name
        pass: String,
        /// Requested resource base name
        resource: String,
    },

    /// Handle is invalidated, stale (generation mismatch) or from another graph
    StaleHandle(String),

    /// Pass dependency graph contains a cycle; lists the passes left unscheduled
    CyclicDependency(Vec<String>),

    /// No pass registered under this identity
    PassNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::TypeMismatch { name, expected } => {
                write!(f, "Type mismatch: resource '{}' is not a {}", name, expected)
            }
            Error::OutOfRange { index, len } => {
                write!(f, "Index out of range: {} (registry holds {} slots)", index, len)
            }
            Error::ResourceNotFound(name) => write!(f, "Resource not found: '{}'", name),
            Error::AccessDenied { pass, resource } => write!(
                f,
                "Access denied: pass '{}' did not declare '{}' in its read set",
                pass, resource
            ),
            Error::StaleHandle(msg) => write!(f, "Stale handle: {}", msg),
            Error::CyclicDependency(passes) => {
                write!(f, "Cyclic pass dependency between: {}", passes.join(", "))
            }
            Error::PassNotFound(id) => write!(f, "Pass not found: {}", id),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
