//! Four-character codes.
//!
//! The audio server identifies classes, property selectors, scopes, IO
//! operations, status codes and format ids with 32-bit big-endian
//! four-character codes such as `'lnam'` or `'!obj'`.

/// Four-character code (FourCC).
///
/// Stored as the raw 4 bytes in big-endian (reading) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    /// Create a new FourCharCode from a 4-byte array.
    ///
    /// # Panics
    /// Debug builds will panic if any byte is not ASCII.
    pub const fn new(bytes: &[u8; 4]) -> Self {
        debug_assert!(bytes[0].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[1].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[2].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[3].is_ascii(), "FourCC bytes must be ASCII");
        Self(*bytes)
    }

    /// Build from the host's 32-bit representation.
    pub const fn from_u32(code: u32) -> Self {
        Self(code.to_be_bytes())
    }

    /// Get the FourCC as a 32-bit value (big-endian).
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True when all four bytes are printable ASCII (space through `~`).
    pub const fn is_printable(&self) -> bool {
        let b = &self.0;
        is_printable_byte(b[0])
            && is_printable_byte(b[1])
            && is_printable_byte(b[2])
            && is_printable_byte(b[3])
    }
}

const fn is_printable_byte(b: u8) -> bool {
    b >= 0x20 && b <= 0x7e
}

impl std::fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&code_to_string(self.as_u32()))
    }
}

impl From<u32> for FourCharCode {
    fn from(code: u32) -> Self {
        Self::from_u32(code)
    }
}

/// Render a host code for diagnostics.
///
/// Printable codes are quoted (`'lnam'`), everything else is printed as
/// a decimal number.
pub fn code_to_string(code: u32) -> String {
    let fcc = FourCharCode::from_u32(code);
    if fcc.is_printable() {
        let b = fcc.as_bytes();
        format!(
            "'{}{}{}{}'",
            b[0] as char, b[1] as char, b[2] as char, b[3] as char
        )
    } else {
        code.to_string()
    }
}

/// Build a `u32` host code from a 4-byte literal at compile time.
///
/// # Example
///
/// ```
/// use halite_utils::fourcc;
///
/// const NAME: u32 = fourcc!(b"lnam");
/// assert_eq!(NAME, 0x6C6E616D);
/// ```
#[macro_export]
macro_rules! fourcc {
    ($s:literal) => {{
        const BYTES: &[u8] = $s;
        const _: () = assert!(BYTES.len() == 4, "FourCC must be exactly 4 bytes");
        u32::from_be_bytes([BYTES[0], BYTES[1], BYTES[2], BYTES[3]])
    }};
}
