//! `encoding` namespace: pure base64 helpers over UTF-8 text.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use super::{Outcome, Text};

pub fn base64_encode(text: &str) -> String {
    BASE64_STANDARD.encode(text.as_bytes())
}

/// Decode standard base64 into UTF-8 text; either failure is a `success: false` result.
pub fn base64_decode(encoded: &str) -> Outcome<Text> {
    let bytes = match BASE64_STANDARD.decode(encoded.trim()) {
        Ok(b) => b,
        Err(e) => return Outcome::fail(format!("invalid base64 input: {}", e)),
    };
    match String::from_utf8(bytes) {
        Ok(text) => Outcome::ok(Text { text }),
        Err(_) => Outcome::fail("decoded data is not valid UTF-8"),
    }
}
