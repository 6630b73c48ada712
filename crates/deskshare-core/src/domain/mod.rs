//! Domain entities for deskshare.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the workspace.  Domain code defines the data types
//! that make the system what it is (here: *which* machine is shared and *how*)
//! and never imports process, network, or file-system APIs.  Outer layers (the
//! token codec, the broker, the CLI) depend on it; it depends on none of them.

/// Endpoint descriptor: target host, access mode, optional credential.
///
/// See [`endpoint::EndpointDescriptor`] for the main type.
pub mod endpoint;
