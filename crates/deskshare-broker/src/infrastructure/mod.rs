//! Infrastructure layer for the broker.
//!
//! OS-facing adapters: relay child processes, config and key files, and local
//! address detection.
//!
//! **Dependency rule**: this layer may depend on `domain` and `deskshare_core`,
//! but only the [`relay`] traits are used by the `application` layer.

pub mod local_ip;
pub mod relay;
pub mod storage;
