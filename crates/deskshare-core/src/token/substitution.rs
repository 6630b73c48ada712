//! Legacy substitution transform (token version 1).
//!
//! Each ASCII letter is shifted by a fixed offset modulo 26 (case preserved),
//! each ASCII digit modulo 10, and every other character passes through
//! unchanged.  The transform is keyless and deterministic.
//!
//! # Security
//!
//! This is **obfuscation, not encryption**.  Anyone who knows (or guesses) the
//! offset recovers the descriptor, and nothing detects modification.  It exists
//! so tokens stay compatible with earlier deployments that used it; prefer the
//! sealed versions for anything new.

/// Shift used by earlier deployments.
pub const DEFAULT_SHIFT: i32 = 3;

/// A position-independent letter/digit rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstitutionCipher {
    shift: i32,
}

impl Default for SubstitutionCipher {
    fn default() -> Self {
        Self::new(DEFAULT_SHIFT)
    }
}

impl SubstitutionCipher {
    pub fn new(shift: i32) -> Self {
        Self { shift }
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    /// Shifts every letter and digit forward by the configured offset.
    ///
    /// ```rust
    /// use deskshare_core::token::SubstitutionCipher;
    ///
    /// let cipher = SubstitutionCipher::new(3);
    /// assert_eq!(cipher.apply("az-09"), "dc-32");
    /// ```
    pub fn apply(&self, text: &str) -> String {
        text.chars().map(|c| shift_char(c, self.shift)).collect()
    }

    /// Undoes [`SubstitutionCipher::apply`] by shifting backwards.
    pub fn reverse(&self, text: &str) -> String {
        text.chars().map(|c| shift_char(c, -self.shift)).collect()
    }
}

fn shift_char(c: char, shift: i32) -> char {
    let rotate = |base: u8, size: i32| {
        let offset = (c as u8 - base) as i32;
        (base + (offset + shift).rem_euclid(size) as u8) as char
    };
    match c {
        'a'..='z' => rotate(b'a', 26),
        'A'..='Z' => rotate(b'A', 26),
        '0'..='9' => rotate(b'0', 10),
        _ => c,
    }
}
