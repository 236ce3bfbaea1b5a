//! Incremental UTF-8 decoding of PTY output.
//!
//! A PTY read can end in the middle of a multi-byte character. The decoder
//! keeps the incomplete tail until the next chunk arrives, so every emitted
//! string is whole text. Invalid sequences are replaced with U+FFFD.

/// Longest possible incomplete UTF-8 tail
const MAX_PENDING: usize = 3;

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_PENDING),
        }
    }

    /// Decode `chunk`, holding back a trailing partial character.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let input = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = &input[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Truncated at the end: wait for more bytes
                            self.pending.extend_from_slice(&rest[valid..]);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Emit whatever is held back, as replacement characters if incomplete.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"$ ls\r\n"), "$ ls\r\n");
        assert!(!dec.has_pending());
    }

    #[test]
    fn test_split_multibyte_is_reassembled() {
        // "é" = C3 A9, "€" = E2 82 AC
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"caf\xC3"), "caf");
        assert!(dec.has_pending());
        assert_eq!(dec.decode(b"\xA9 \xE2"), "é ");
        assert_eq!(dec.decode(b"\x82"), "");
        assert_eq!(dec.decode(b"\xAC!"), "€!");
        assert!(!dec.has_pending());
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"a\xFFb"), "a\u{FFFD}b");
        // A lead byte followed by a non-continuation byte
        assert_eq!(dec.decode(b"\xC3("), "\u{FFFD}(");
    }

    #[test]
    fn test_flush_incomplete_tail() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"x\xE2\x82"), "x");
        assert_eq!(dec.flush(), "\u{FFFD}");
        assert_eq!(dec.flush(), "");
    }
}
