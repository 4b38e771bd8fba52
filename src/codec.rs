//! Best-effort display codec for scalar values.
//!
//! Two independent paths:
//!
//! - **Write path** (`decode`): a named, reversible transform (base64,
//!   hex) chosen explicitly by the caller. Never auto-detected, so
//!   binary-safe values cannot be corrupted by a guessed decode.
//! - **Display path** (`format_for_display`): ordered best-effort
//!   decoders (compression reversal) followed by ordered formatters
//!   (pretty-printing); the first that recognizes the input wins, with
//!   HTML-safe escaping of the raw text as the fallback.
//!
//! The display path is heuristic and lossy. It is never authoritative
//! for round-tripping. Only the raw dump/restore export path preserves
//! a value exactly, and it bypasses this codec entirely.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;

/// Best-effort display decoder: `Some` when the input is recognized.
pub type DisplayDecoder = Arc<dyn Fn(&[u8]) -> Option<String> + Send + Sync>;

/// Best-effort display formatter: `Some` when the text is recognized.
/// A formatter owns the HTML-escaping of its output.
pub type DisplayFormatter = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Named reversible write-path transform.
pub type WriteDecoder = Arc<dyn Fn(&str) -> Result<Vec<u8>> + Send + Sync>;

/// Codec output for one scalar value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EncodedValue {
    /// Display text, HTML-safe unless a formatter produced it (in which
    /// case the formatter escaped it itself).
    pub text: String,
    /// Name of the display decoder that recognized the input, doubling
    /// as the re-encode hint for the edit form. `None` when the raw
    /// text was used as-is.
    pub decoder: Option<String>,
    /// Whether a formatter pretty-printed the text.
    pub formatted: bool,
}

/// Ordered chains of named decode/format/encode functions, injected at
/// engine construction.
#[derive(Clone)]
pub struct ValueCodec {
    decoders: Vec<(String, DisplayDecoder)>,
    formatters: Vec<(String, DisplayFormatter)>,
    encoders: Vec<(String, WriteDecoder)>,
}

impl Default for ValueCodec {
    /// Built-in chains: gzip and zlib display decoders, a JSON
    /// pretty-print formatter, and base64/hex write encoders.
    fn default() -> Self {
        ValueCodec::empty()
            .with_decoder("gzip", |raw| gzip_decode(raw))
            .with_decoder("zlib", |raw| zlib_decode(raw))
            .with_formatter("json", |text| json_format(text))
            .with_encoder("base64", |text| {
                BASE64
                    .decode(text.trim())
                    .map_err(|e| Error::Other(format!("base64 decode failed: {}", e)))
            })
            .with_encoder("hex", |text| {
                hex::decode(text.trim())
                    .map_err(|e| Error::Other(format!("hex decode failed: {}", e)))
            })
    }
}

impl ValueCodec {
    /// Codec with no chains at all; display falls back to escaping and
    /// every encoder name passes through.
    pub fn empty() -> Self {
        ValueCodec {
            decoders: Vec::new(),
            formatters: Vec::new(),
            encoders: Vec::new(),
        }
    }

    /// Append a named display decoder. Order of registration is the
    /// priority order.
    pub fn with_decoder<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[u8]) -> Option<String> + Send + Sync + 'static,
    {
        self.decoders.push((name.to_string(), Arc::new(f)));
        self
    }

    /// Append a named display formatter.
    pub fn with_formatter<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.formatters.push((name.to_string(), Arc::new(f)));
        self
    }

    /// Register a named write-path transform.
    pub fn with_encoder<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.encoders.push((name.to_string(), Arc::new(f)));
        self
    }

    /// Registered encoder names, for the edit-form selector.
    pub fn encoder_names(&self) -> Vec<&str> {
        self.encoders.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Reverse a named transform on form input before writing.
    ///
    /// `"none"` and unregistered names pass the text through unchanged;
    /// a registered encoder that rejects its input is an error surfaced
    /// inline.
    pub fn decode(&self, text: &str, encoder: &str) -> Result<Vec<u8>> {
        if encoder == "none" {
            return Ok(text.as_bytes().to_vec());
        }

        match self.encoders.iter().find(|(name, _)| name == encoder) {
            Some((_, decode)) => decode(text),
            None => Ok(text.as_bytes().to_vec()),
        }
    }

    /// Produce display text for one scalar value.
    ///
    /// Decoders run against the raw bytes in priority order; the first
    /// match replaces the text and is recorded as the re-encode hint.
    /// Formatters then run against the (possibly decoded) text; the
    /// first match wins and is responsible for escaping. When no
    /// formatter matches, the text is HTML-escaped.
    pub fn format_for_display(&self, raw: &[u8]) -> EncodedValue {
        let mut text = String::from_utf8_lossy(raw).into_owned();
        let mut decoder = None;

        for (name, probe) in &self.decoders {
            if let Some(decoded) = probe(raw) {
                debug!("display decoder \"{}\" matched ({} bytes)", name, raw.len());
                text = decoded;
                decoder = Some(name.clone());
                break;
            }
        }

        let mut formatted = false;
        for (name, probe) in &self.formatters {
            if let Some(pretty) = probe(&text) {
                debug!("display formatter \"{}\" matched", name);
                text = pretty;
                formatted = true;
                break;
            }
        }

        if !formatted {
            text = html_escape(&text);
        }

        EncodedValue {
            text,
            decoder,
            formatted,
        }
    }
}

/// Escape text for safe embedding in markup.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }

    out
}

fn gzip_decode(raw: &[u8]) -> Option<String> {
    if raw.len() < 2 || raw[0] != 0x1f || raw[1] != 0x8b {
        return None;
    }

    let mut text = String::new();
    GzDecoder::new(raw).read_to_string(&mut text).ok()?;
    Some(text)
}

fn zlib_decode(raw: &[u8]) -> Option<String> {
    // RFC 1950 header: 0x78 followed by a valid flag byte.
    if raw.len() < 2 || raw[0] != 0x78 {
        return None;
    }
    if !matches!(raw[1], 0x01 | 0x5e | 0x9c | 0xda) {
        return None;
    }

    let mut text = String::new();
    ZlibDecoder::new(raw).read_to_string(&mut text).ok()?;
    Some(text)
}

fn json_format(text: &str) -> Option<String> {
    // Only structured documents; bare scalars stay untouched.
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let pretty = serde_json::to_string_pretty(&value).ok()?;
    Some(html_escape(&pretty))
}
