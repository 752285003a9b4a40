//! Alphabet keys and host alphabet types.

use crate::diag::{Diagnostics, InputLoc};
use std::{fmt, num::IntErrorKind};

/// A single alphabet symbol.
pub type Key = i64;

/// The host language type the scanner reads its input as.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum HostType {
    #[default]
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
}

impl HostType {
    pub const ALL: [HostType; 9] = [
        Self::Char,
        Self::SignedChar,
        Self::UnsignedChar,
        Self::Short,
        Self::UnsignedShort,
        Self::Int,
        Self::UnsignedInt,
        Self::Long,
        Self::UnsignedLong,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::SignedChar => "signed char",
            Self::UnsignedChar => "unsigned char",
            Self::Short => "short",
            Self::UnsignedShort => "unsigned short",
            Self::Int => "int",
            Self::UnsignedInt => "unsigned int",
            Self::Long => "long",
            Self::UnsignedLong => "unsigned long",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|host| host.name() == name)
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Char | Self::SignedChar | Self::Short | Self::Int | Self::Long
        )
    }

    /// Size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            Self::Char | Self::SignedChar | Self::UnsignedChar => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt => 4,
            Self::Long | Self::UnsignedLong => 8,
        }
    }

    pub const fn min(self) -> Key {
        match self {
            Self::Char | Self::SignedChar => i8::MIN as Key,
            Self::Short => i16::MIN as Key,
            Self::Int => i32::MIN as Key,
            Self::Long => i64::MIN,
            Self::UnsignedChar | Self::UnsignedShort | Self::UnsignedInt | Self::UnsignedLong => 0,
        }
    }

    /// The largest key. `unsigned long` is capped at the largest signed
    /// 64-bit value since keys are stored signed.
    pub const fn max(self) -> Key {
        match self {
            Self::Char | Self::SignedChar => i8::MAX as Key,
            Self::UnsignedChar => u8::MAX as Key,
            Self::Short => i16::MAX as Key,
            Self::UnsignedShort => u16::MAX as Key,
            Self::Int => i32::MAX as Key,
            Self::UnsignedInt => u32::MAX as Key,
            Self::Long | Self::UnsignedLong => i64::MAX,
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounds and signedness of the alphabet in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyAlphabet {
    host: HostType,
    min_key: Key,
    max_key: Key,
}

impl Default for KeyAlphabet {
    fn default() -> Self {
        Self::new(HostType::Char)
    }
}

impl KeyAlphabet {
    pub const fn new(host: HostType) -> Self {
        Self {
            host,
            min_key: host.min(),
            max_key: host.max(),
        }
    }

    /// An alphabet restricted to `min_key ..= max_key` of the host type.
    pub fn with_range(host: HostType, min_key: Key, max_key: Key) -> Self {
        assert!(min_key <= max_key, "empty alphabet range");
        Self {
            host,
            min_key: min_key.max(host.min()),
            max_key: max_key.min(host.max()),
        }
    }

    pub const fn host(&self) -> HostType {
        self.host
    }

    pub const fn min_key(&self) -> Key {
        self.min_key
    }

    pub const fn max_key(&self) -> Key {
        self.max_key
    }

    pub const fn is_signed(&self) -> bool {
        self.host.is_signed()
    }

    /// Number of keys in `low ..= high`.
    pub fn span(&self, low: Key, high: Key) -> u128 {
        (high as i128 - low as i128 + 1) as u128
    }

    pub fn alph_size(&self) -> u128 {
        self.span(self.min_key, self.max_key)
    }

    /// The key after `key`, saturating at the top of the alphabet.
    pub fn inc(&self, key: Key) -> Key {
        if key >= self.max_key {
            self.max_key
        } else {
            key + 1
        }
    }

    /// The key before `key`, saturating at the bottom of the alphabet.
    pub fn dec(&self, key: Key) -> Key {
        if key <= self.min_key {
            self.min_key
        } else {
            key - 1
        }
    }

    /// Convert an input byte the way the host type would read it.
    pub fn key_from_byte(&self, b: u8) -> Key {
        if self.is_signed() && self.host.size() == 1 {
            b as i8 as Key
        } else {
            b as Key
        }
    }

    /// The keys of a string literal, one per byte.
    pub fn string_keys(&self, s: &str) -> Vec<Key> {
        s.bytes().map(|b| self.key_from_byte(b)).collect()
    }

    /// Parse a hexadecimal key literal, with or without the `0x` prefix.
    ///
    /// Literals with the top bit of the host type set are sign extended in
    /// signed alphabets.
    pub fn parse_key_hex(&self, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let bits = self.host.size() * 8;
        let value = match u64::from_str_radix(digits, 16) {
            Ok(value) if bits == 64 || value >> bits == 0 => value,
            Ok(..) => return self.overflow(text, loc, diag),
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow => return self.overflow(text, loc, diag),
                _ => {
                    diag.error(loc, format!("literal {} is not a valid number", text));
                    return self.min_key;
                }
            },
        };

        let key = if self.is_signed() {
            if bits < 64 && (value >> (bits - 1)) & 1 == 1 {
                (value | (u64::MAX << bits)) as i64
            } else {
                value as i64
            }
        } else if value > i64::MAX as u64 {
            return self.overflow(text, loc, diag);
        } else {
            value as i64
        };
        self.check_bounds(key, text, loc, diag)
    }

    /// Parse a decimal key literal.
    pub fn parse_key_dec(&self, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        match text.parse::<i128>() {
            Ok(value) if value < self.min_key as i128 => self.underflow(text, loc, diag),
            Ok(value) if value > self.max_key as i128 => self.overflow(text, loc, diag),
            Ok(value) => value as Key,
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow => self.overflow(text, loc, diag),
                IntErrorKind::NegOverflow => self.underflow(text, loc, diag),
                _ => {
                    diag.error(loc, format!("literal {} is not a valid number", text));
                    self.min_key
                }
            },
        }
    }

    /// Parse a numeric literal, hexadecimal when prefixed by `0x`.
    pub fn parse_key_num(&self, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        if text.starts_with("0x") || text.starts_with("0X") {
            self.parse_key_hex(text, loc, diag)
        } else {
            self.parse_key_dec(text, loc, diag)
        }
    }

    /// The key of a character literal.
    pub fn parse_key_char(&self, c: char, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        match u8::try_from(c) {
            Ok(b) => self.check_bounds(self.key_from_byte(b), &c.to_string(), loc, diag),
            Err(..) => self.check_bounds(c as Key, &c.to_string(), loc, diag),
        }
    }

    fn check_bounds(&self, key: Key, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        if key < self.min_key {
            self.underflow(text, loc, diag)
        } else if key > self.max_key {
            self.overflow(text, loc, diag)
        } else {
            key
        }
    }

    fn overflow(&self, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        diag.error(
            loc,
            format!("literal {} overflows the alphabet type", text),
        );
        self.max_key
    }

    fn underflow(&self, text: &str, loc: &InputLoc, diag: &mut Diagnostics) -> Key {
        diag.error(
            loc,
            format!("literal {} underflows the alphabet type", text),
        );
        self.min_key
    }
}
