//! Composite cache keys and their canonical flattened form.
//!
//! A cache entry is addressed by `(provider, dynamic?, group?)`. The triple
//! flattens to a single canonical string used by both storage layers:
//!
//! ```text
//! provider + "$d$" + dynamic + "$g$" + group
//! ```
//!
//! with empty segments for absent parts. Eviction scopes are prefixes of
//! this form: `pk$d$` covers a whole provider, `pk$d$dk$g$` covers one
//! dynamic key, and the full string addresses a single group.
//!
//! The `$` character is reserved. Segments containing it are rejected with
//! [`LarderError::KeySeparatorCollision`] unless escaping is enabled, in
//! which case `$` and `%` are percent-escaped before flattening (bijective,
//! so distinct triples can never collide).
//!
//! # File names
//!
//! On disk the canonical key is escaped once more into a filesystem-safe
//! name: every byte outside `[A-Za-z0-9_\-$]` becomes `%XX`. Because `.` is
//! escaped, record files can never collide with the schema-version sidecar
//! or with in-flight temporary files.

use crate::error::LarderError;

/// Separator between the provider segment and the dynamic-key segment.
pub const DYNAMIC_SEPARATOR: &str = "$d$";

/// Separator between the dynamic-key segment and the group segment.
pub const GROUP_SEPARATOR: &str = "$g$";

/// The reserved character both separators are built from.
const RESERVED: char = '$';

/// Addressing triple for a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    /// Provider key (always present).
    pub provider: String,
    /// Optional dynamic key.
    pub dynamic: Option<String>,
    /// Optional dynamic-key group.
    pub group: Option<String>,
}

impl CompositeKey {
    /// Create a key addressing a provider with no dynamic parts.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            dynamic: None,
            group: None,
        }
    }

    /// Set the dynamic key.
    pub fn with_dynamic(mut self, dynamic: impl Into<String>) -> Self {
        self.dynamic = Some(dynamic.into());
        self
    }

    /// Set the group key.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Flatten to the canonical string form.
    ///
    /// # Errors
    ///
    /// Returns [`LarderError::KeySeparatorCollision`] if any segment
    /// contains the reserved separator character and `escape` is false.
    pub fn canonical(&self, escape: bool) -> Result<String, LarderError> {
        let provider = encode_segment(&self.provider, escape)?;
        let dynamic = encode_segment(self.dynamic.as_deref().unwrap_or(""), escape)?;
        let group = encode_segment(self.group.as_deref().unwrap_or(""), escape)?;
        Ok(format!(
            "{provider}{DYNAMIC_SEPARATOR}{dynamic}{GROUP_SEPARATOR}{group}"
        ))
    }

    /// Canonical prefix covering every entry of a provider.
    pub fn provider_prefix(provider: &str, escape: bool) -> Result<String, LarderError> {
        let provider = encode_segment(provider, escape)?;
        Ok(format!("{provider}{DYNAMIC_SEPARATOR}"))
    }

    /// Canonical prefix covering every group under `(provider, dynamic)`.
    pub fn dynamic_prefix(provider: &str, dynamic: &str, escape: bool) -> Result<String, LarderError> {
        let provider = encode_segment(provider, escape)?;
        let dynamic = encode_segment(dynamic, escape)?;
        Ok(format!(
            "{provider}{DYNAMIC_SEPARATOR}{dynamic}{GROUP_SEPARATOR}"
        ))
    }
}

/// Encode one user-supplied segment for the canonical form.
///
/// With escaping disabled, any `$` is rejected outright: separator fragments
/// in adjacent segments can recombine into a full separator across the
/// segment boundary, so only a whole-character ban keeps flattening
/// collision-free. With escaping enabled, `%` and `$` are percent-escaped,
/// which is bijective and removes the restriction.
fn encode_segment(segment: &str, escape: bool) -> Result<String, LarderError> {
    if !escape {
        if segment.contains(RESERVED) {
            return Err(LarderError::KeySeparatorCollision {
                key: segment.to_string(),
            });
        }
        return Ok(segment.to_string());
    }

    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '$' => out.push_str("%24"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

/// Escape a canonical key into a filesystem-safe file name.
///
/// Every byte outside `[A-Za-z0-9_\-$]` becomes `%XX` (uppercase hex).
/// The mapping is bijective; [`file_name_to_key`] inverts it.
pub fn key_to_file_name(canonical: &str) -> String {
    let mut out = String::with_capacity(canonical.len());
    for byte in canonical.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte == b'$' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Recover a canonical key from a file name produced by
/// [`key_to_file_name`]. Returns `None` for names that are not valid
/// escapings (foreign files in the cache directory are skipped, not
/// misread).
pub fn file_name_to_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hi = (hex[0] as char).to_digit(16)?;
                let lo = (hex[1] as char).to_digit(16)?;
                out.push((hi * 16 + lo) as u8);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'$' => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}
