//! Share tokens: versioned, opaque encodings of an [`EndpointDescriptor`].
//!
//! Wire format:
//! ```text
//! 1:<shifted host,mode,credential>     substitution (legacy, obfuscation only)
//! 2:<sealed>:<key>                     ChaCha20-Poly1305, key travels with the token
//! 3:<key id>:<sealed>                  ChaCha20-Poly1305, key held by the process
//! ```
//!
//! Every token begins with its numeric version tag.  A decoder that does not
//! recognise the tag rejects the token instead of guessing at its layout.
//!
//! [`EndpointDescriptor`]: crate::EndpointDescriptor

pub mod codec;
pub mod envelope;
pub mod keys;
pub mod sealed;
pub mod substitution;

pub use codec::{Scheme, TokenCodec, TokenError};
pub use envelope::{Token, TokenVersion, VERSION_SEPARATOR};
pub use keys::{KeyId, KeyProvider, Keyring, KeyringError, SecretKey};
pub use substitution::SubstitutionCipher;
