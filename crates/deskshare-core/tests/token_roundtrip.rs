//! Integration tests for the deskshare-core token codec.
//!
//! These tests go through the public API only: descriptors are encoded with
//! every scheme, decoded back, and then deliberately damaged to check that the
//! codec reports the right error kind.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use deskshare_core::{
    generate_credential, AccessMode, DescriptorError, EndpointDescriptor, Keyring, Scheme,
    TokenCodec, TokenError,
};

const ALL_SCHEMES: [Scheme; 3] = [
    Scheme::Substitution,
    Scheme::SealedEphemeral,
    Scheme::SealedKeyring,
];

fn codec_with_keyring() -> TokenCodec {
    TokenCodec::new().with_key_provider(Arc::new(Keyring::generate()))
}

/// Flips the lowest bit of byte `index` in a base64 payload part.
fn flip_byte(part: &str, index: usize) -> String {
    let mut bytes = URL_SAFE_NO_PAD.decode(part).expect("part must be base64");
    bytes[index] ^= 0x01;
    URL_SAFE_NO_PAD.encode(bytes)
}

// ── Round trips ───────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_every_scheme_and_mode() {
    let codec = codec_with_keyring();
    for scheme in ALL_SCHEMES {
        for mode in [AccessMode::ViewOnly, AccessMode::FullControl] {
            let original = EndpointDescriptor::new("192.168.1.17", mode)
                .unwrap()
                .with_credential("aB3dE9xQ")
                .unwrap();

            let token = codec.encode(&original, scheme).expect("encode must succeed");
            let decoded = codec.decode(&token).expect("decode must succeed");

            assert_eq!(decoded, original, "scheme {scheme}, mode {mode}");
        }
    }
}

#[test]
fn test_roundtrip_without_credential() {
    let codec = codec_with_keyring();
    let original = EndpointDescriptor::new("desk-07.example.lan", AccessMode::ViewOnly).unwrap();
    for scheme in ALL_SCHEMES {
        let decoded = codec.decode(&codec.encode(&original, scheme).unwrap()).unwrap();
        assert_eq!(decoded.credential(), None, "scheme {scheme}");
        assert_eq!(decoded, original);
    }
}

#[test]
fn test_roundtrip_with_generated_credential() {
    let codec = codec_with_keyring();
    let credential = generate_credential(8).unwrap();
    let original = EndpointDescriptor::new("10.1.2.3", AccessMode::FullControl)
        .unwrap()
        .with_credential(credential.clone())
        .unwrap();

    let decoded = codec
        .decode(&codec.encode(&original, Scheme::SealedKeyring).unwrap())
        .unwrap();

    assert_eq!(decoded.credential(), Some(credential.as_str()));
}

#[test]
fn test_host_containing_credential_text_survives_decoding() {
    // Arrange: the credential is a substring of the host name
    let codec = codec_with_keyring();
    let original = EndpointDescriptor::new("host-abc123.lan", AccessMode::FullControl)
        .unwrap()
        .with_credential("abc123")
        .unwrap();

    for scheme in ALL_SCHEMES {
        // Act
        let decoded = codec.decode(&codec.encode(&original, scheme).unwrap()).unwrap();

        // Assert
        assert_eq!(decoded.target_host(), "host-abc123.lan", "scheme {scheme}");
        assert_eq!(decoded.credential(), Some("abc123"));
    }
}

#[test]
fn test_substitution_token_matches_legacy_output() {
    let codec = TokenCodec::new();
    let d = EndpointDescriptor::new("192.168.1.17", AccessMode::FullControl).unwrap();
    assert_eq!(
        codec.encode(&d, Scheme::Substitution).unwrap(),
        "1:425.491.4.40,4,"
    );
    assert_eq!(codec.decode("1:425.491.4.40,4,").unwrap(), d);
}

#[test]
fn test_decode_tolerates_surrounding_whitespace() {
    let codec = TokenCodec::new();
    let d = EndpointDescriptor::new("10.0.0.5", AccessMode::ViewOnly).unwrap();
    let token = codec.encode(&d, Scheme::SealedEphemeral).unwrap();
    assert_eq!(codec.decode(&format!("  {token}\n")).unwrap(), d);
}

// ── Tamper detection ──────────────────────────────────────────────────────────

#[test]
fn test_sealed_ephemeral_detects_any_modified_byte() {
    // Arrange
    let codec = TokenCodec::new();
    let d = EndpointDescriptor::new("192.168.1.17", AccessMode::ViewOnly).unwrap();
    let token = codec.encode(&d, Scheme::SealedEphemeral).unwrap();
    let parts: Vec<&str> = token.splitn(3, ':').collect();
    let (sealed, key) = (parts[1], parts[2]);
    let sealed_len = URL_SAFE_NO_PAD.decode(sealed).unwrap().len();
    let key_len = URL_SAFE_NO_PAD.decode(key).unwrap().len();

    // Act + Assert: every byte of the nonce, ciphertext, and tag
    for i in 0..sealed_len {
        let damaged = format!("2:{}:{key}", flip_byte(sealed, i));
        assert_eq!(codec.decode(&damaged), Err(TokenError::TokenTampered), "sealed byte {i}");
    }

    // Act + Assert: every byte of the embedded key
    for i in 0..key_len {
        let damaged = format!("2:{sealed}:{}", flip_byte(key, i));
        assert_eq!(codec.decode(&damaged), Err(TokenError::TokenTampered), "key byte {i}");
    }
}

#[test]
fn test_sealed_keyring_detects_any_modified_byte() {
    let codec = codec_with_keyring();
    let d = EndpointDescriptor::new("desk.lan", AccessMode::FullControl)
        .unwrap()
        .with_credential("s3cret")
        .unwrap();
    let token = codec.encode(&d, Scheme::SealedKeyring).unwrap();
    let sealed = token.strip_prefix("3:1:").expect("first key has id 1");
    let sealed_len = URL_SAFE_NO_PAD.decode(sealed).unwrap().len();

    for i in 0..sealed_len {
        let damaged = format!("3:1:{}", flip_byte(sealed, i));
        assert_eq!(codec.decode(&damaged), Err(TokenError::TokenTampered), "byte {i}");
    }
}

#[test]
fn test_sealed_tokens_reject_any_replaced_character() {
    // Arrange
    let codec = codec_with_keyring();
    let d = EndpointDescriptor::new("192.168.1.17", AccessMode::FullControl)
        .unwrap()
        .with_credential("hunter2")
        .unwrap();

    for scheme in [Scheme::SealedEphemeral, Scheme::SealedKeyring] {
        let token = codec.encode(&d, scheme).unwrap();

        for (i, original) in token.char_indices() {
            for replacement in ['A', '_', '*'] {
                if replacement == original {
                    continue;
                }
                let mut damaged = token.clone();
                damaged.replace_range(i..i + 1, &replacement.to_string());

                // Act
                let result = codec.decode(&damaged);

                // Assert: every edit of the text is rejected, never decoded differently
                assert!(
                    result.is_err(),
                    "{scheme}: {original:?} -> {replacement:?} at {i} decoded to {result:?}"
                );
            }
        }
    }
}

#[test]
fn test_sealed_token_cannot_be_relabelled_as_other_version() {
    // Arrange: a keyring holding the ephemeral key under id 1
    let ephemeral = TokenCodec::new();
    let d = EndpointDescriptor::new("10.0.0.5", AccessMode::ViewOnly).unwrap();
    let token = ephemeral.encode(&d, Scheme::SealedEphemeral).unwrap();
    let parts: Vec<&str> = token.splitn(3, ':').collect();
    let key = deskshare_core::SecretKey::from_base64(parts[2]).unwrap();
    let ring = Keyring::from_keys(vec![(1, key)]).unwrap();
    let codec = TokenCodec::new().with_key_provider(Arc::new(ring));

    // Act
    let result = codec.decode(&format!("3:1:{}", parts[1]));

    // Assert
    assert_eq!(result, Err(TokenError::TokenTampered));
}

// ── Version handling ──────────────────────────────────────────────────────────

#[test]
fn test_decode_rejects_unrecognized_versions() {
    let codec = codec_with_keyring();
    for token in ["4:abc", "0:abc", "v2:abc", "abc", "", "gAAAAABl:key"] {
        assert!(
            matches!(codec.decode(token), Err(TokenError::MalformedToken(_))),
            "{token:?} must be malformed"
        );
    }
}

#[test]
fn test_decode_rejects_wrong_part_counts() {
    let codec = codec_with_keyring();
    for token in ["2:onlyonepart", "2:a:b:c", "3:1", "3:1:a:b"] {
        assert!(
            matches!(codec.decode(token), Err(TokenError::MalformedToken(_))),
            "{token:?} must be malformed"
        );
    }
}

#[test]
fn test_decode_garbage_sealed_payload_is_malformed() {
    let codec = TokenCodec::new();
    let key = deskshare_core::SecretKey::generate().to_base64();
    assert!(matches!(
        codec.decode(&format!("2:***:{key}")),
        Err(TokenError::MalformedToken(_))
    ));
}

#[test]
fn test_decode_invalid_host_is_invalid_descriptor() {
    let codec = TokenCodec::new();
    // "bad host" shifted by 3
    let token = format!("1:{}", "edg krvw,4,");
    assert!(matches!(
        codec.decode(&token),
        Err(TokenError::InvalidDescriptor(DescriptorError::InvalidHost(_)))
    ));
}

// ── Keys ──────────────────────────────────────────────────────────────────────

#[test]
fn test_keyring_scheme_requires_key_provider() {
    let d = EndpointDescriptor::new("10.0.0.5", AccessMode::ViewOnly).unwrap();
    assert_eq!(
        TokenCodec::new().encode(&d, Scheme::SealedKeyring),
        Err(TokenError::KeyUnavailable(3))
    );
    // Decoding a keyring token without a provider fails the same way.
    let token = codec_with_keyring().encode(&d, Scheme::SealedKeyring).unwrap();
    assert_eq!(TokenCodec::new().decode(&token), Err(TokenError::KeyUnavailable(3)));
}

#[test]
fn test_tokens_survive_key_rotation_until_key_is_retired() {
    // Arrange
    let ring = Keyring::generate();
    let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl).unwrap();
    let old_token = TokenCodec::new()
        .with_key_provider(Arc::new(ring.clone()))
        .encode(&d, Scheme::SealedKeyring)
        .unwrap();

    // Act
    let rotated = ring.rotated().unwrap();
    let retired = rotated.retain_latest(1);

    // Assert
    let rotated_codec = TokenCodec::new().with_key_provider(Arc::new(rotated));
    assert_eq!(rotated_codec.decode(&old_token).unwrap(), d);
    assert!(rotated_codec
        .encode(&d, Scheme::SealedKeyring)
        .unwrap()
        .starts_with("3:2:"));

    let retired_codec = TokenCodec::new().with_key_provider(Arc::new(retired));
    assert!(matches!(
        retired_codec.decode(&old_token),
        Err(TokenError::MalformedToken(_))
    ));
}

#[test]
fn test_custom_substitution_shift_must_match_on_both_sides() {
    let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl).unwrap();
    let token = TokenCodec::new()
        .with_substitution_shift(7)
        .encode(&d, Scheme::Substitution)
        .unwrap();

    assert_eq!(
        TokenCodec::new().with_substitution_shift(7).decode(&token).unwrap(),
        d
    );
    assert_ne!(TokenCodec::new().decode(&token).ok(), Some(d));
}
