//! # deskshare-core
//!
//! Shared library for deskshare containing the endpoint descriptor model, the
//! versioned share-token codec, and the credential generator.
//!
//! This crate is used by the broker crate and by anything that needs to mint
//! or read share tokens.  It has zero dependencies on OS processes, sockets,
//! or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! deskshare lets a host expose its remote-desktop framebuffer to a browser
//! through a relay process.  Instead of handing out the host address and the
//! access level in the clear, the host hands out a compact **token**.  Whoever
//! redeems the token gets a relay started for them and a URL to open.
//!
//! - **`domain`** – What is being shared: the [`EndpointDescriptor`] (target
//!   host, [`AccessMode`], optional credential) and its validation rules.
//!
//! - **`token`** – How a descriptor becomes an opaque string and back.  Every
//!   token starts with a version tag (`"<version>:<payload>"`) so several
//!   encoding schemes can coexist without ambiguity.
//!
//! - **`credential`** – Short random passwords for ad-hoc share sessions.
//!
//! # Example
//!
//! ```rust
//! use deskshare_core::{AccessMode, EndpointDescriptor, Scheme, TokenCodec};
//!
//! let codec = TokenCodec::new();
//! let descriptor = EndpointDescriptor::new("192.168.1.17", AccessMode::FullControl).unwrap();
//! let token = codec.encode(&descriptor, Scheme::SealedEphemeral).unwrap();
//! assert_eq!(codec.decode(&token).unwrap(), descriptor);
//! ```

pub mod credential;
pub mod domain;
pub mod token;

// Re-export the most-used types at the crate root so callers can write
// `deskshare_core::TokenCodec` instead of `deskshare_core::token::codec::TokenCodec`.
pub use credential::{generate_credential, CredentialError, DEFAULT_CREDENTIAL_LENGTH};
pub use domain::endpoint::{AccessMode, DescriptorError, EndpointDescriptor, FIELD_SEPARATOR};
pub use token::codec::{Scheme, TokenCodec, TokenError};
pub use token::envelope::{Token, TokenVersion};
pub use token::keys::{KeyId, KeyProvider, Keyring, SecretKey};
