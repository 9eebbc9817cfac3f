// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain-assigned ids are stored as lowercase, even-length hex strings
//! (`0x01`, `0xa1`, `0x0100`), the form the Lens API also returns.

/// Formats big-endian bytes as a minimal even-length hex id. Zero is `0x00`.
pub fn hex_id_from_be_bytes(bytes: &[u8]) -> String {
    let first = bytes.iter().position(|b| *b != 0);
    let significant = match first {
        Some(i) => &bytes[i..],
        None => return "0x00".to_string(),
    };
    let mut out = String::with_capacity(2 + significant.len() * 2);
    out.push_str("0x");
    for b in significant {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn hex_id(value: u64) -> String {
    hex_id_from_be_bytes(&value.to_be_bytes())
}

/// Parses `0x`-prefixed (or bare) hex into a u64.
pub fn parse_hex_id(id: &str) -> Option<u64> {
    let digits = id.strip_prefix("0x").unwrap_or(id);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Publication ids are `{profileId}-{localPubId}`.
pub fn publication_id(profile_id: &str, pub_id: &str) -> String {
    format!("{}-{}", profile_id, pub_id)
}

/// Splits a publication id into its profile and local parts.
pub fn split_publication_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('-')
}
