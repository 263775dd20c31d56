//! Byte-to-text escape policies for the emitters.
//!
//! Keys and values coming out of an RDB are arbitrary byte strings; every
//! emitter picks one of these policies to turn them into text.

use rustc_serialize::base64::{ToBase64, STANDARD};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Escape {
    /// Latin-1 pass-through, every byte maps to the code point of the
    /// same value.
    Raw,
    /// Printable ASCII kept as-is, everything else rendered as `\xHH`.
    Print,
    /// Valid UTF-8 passes through, invalid bytes rendered as `\xHH`.
    Utf8,
    /// Standard base64 of the whole byte string.
    Base64,
}

impl Escape {
    pub fn from_name(name: &str) -> Option<Escape> {
        match name {
            "raw" => Some(Escape::Raw),
            "print" => Some(Escape::Print),
            "utf8" => Some(Escape::Utf8),
            "base64" => Some(Escape::Base64),
            _ => None,
        }
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

fn push_hex(out: &mut String, byte: u8) {
    out.push_str(&format!("\\x{:02X}", byte));
}

fn escape_print(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        if is_printable(byte) {
            out.push(byte as char);
        } else {
            push_hex(&mut out, byte);
        }
    }
    out
}

fn escape_utf8(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    let mut rest = data;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap());
                let bad_len = err.error_len().unwrap_or(after.len());
                for &byte in &after[..bad_len] {
                    push_hex(&mut out, byte);
                }
                rest = &after[bad_len..];
            }
        }
    }
}

/// Escape `data` with the given policy.
pub fn escape_bytes(data: &[u8], escape: Escape) -> String {
    match escape {
        Escape::Raw => data.iter().map(|&b| b as char).collect(),
        Escape::Print => escape_print(data),
        Escape::Utf8 => escape_utf8(data),
        Escape::Base64 => data.to_base64(STANDARD),
    }
}

/// Like `escape_bytes`, but keys made entirely of printable ASCII bypass
/// the policy and pass through verbatim.
pub fn escape_key(data: &[u8], escape: Escape) -> String {
    if data.iter().all(|&b| is_printable(b)) {
        escape_bytes(data, Escape::Raw)
    } else {
        escape_bytes(data, escape)
    }
}
