// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `fmuResourceLocation` URI decoding.

use std::path::PathBuf;

/// Convert a `file:` URI to a local path.
///
/// Accepts `file:///abs/path`, `file://localhost/abs/path`, `file:/abs/path`
/// and, on Windows, drive letters (`file:///C:/fmu/resources`). Percent escapes
/// are decoded. Returns `None` for other schemes and remote hosts.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = strip_prefix_ignore_case(uri.trim(), "file:")?;
    let path = if let Some(authority_and_path) = rest.strip_prefix("//") {
        let slash = authority_and_path.find('/')?;
        let (host, path) = authority_and_path.split_at(slash);
        if !host.is_empty() && !host.eq_ignore_ascii_case("localhost") {
            return None;
        }
        path
    } else {
        rest
    };
    let decoded = percent_decode(path)?;
    Some(PathBuf::from(native_path(&decoded)))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn percent_decode(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = text.get(index + 1..index + 3)?;
            // from_str_radix alone would accept a sign ("%+1").
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(windows)]
fn native_path(path: &str) -> String {
    // "/C:/dir" -> "C:/dir"
    let trimmed = match path.as_bytes() {
        [b'/', drive, b':', ..] if drive.is_ascii_alphabetic() => &path[1..],
        _ => path,
    };
    trimmed.replace('/', "\\")
}

#[cfg(not(windows))]
fn native_path(path: &str) -> String {
    path.to_string()
}
