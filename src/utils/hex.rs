use anyhow::{bail, Context, Result};

/// Convert a hexadecimal string to bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    if hex_str.len() % 2 != 0 {
        bail!("Hex string must have even length");
    }

    hex::decode(hex_str).context("Invalid hex character")
}

/// Convert bytes to a lowercase hexadecimal string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a percent-encoded query value into raw bytes.
///
/// Announce requests carry `info_hash` and `peer_id` as percent-encoded raw
/// bytes (not hex), so the decoded output is binary, not UTF-8.
pub fn url_decode(encoded: &str) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hi = bytes
                    .next()
                    .context("Incomplete percent-encoding: missing first hex digit")?;
                let lo = bytes
                    .next()
                    .context("Incomplete percent-encoding: missing second hex digit")?;

                let hi = (hi as char)
                    .to_digit(16)
                    .context("Invalid hex digit in percent-encoding")?;
                let lo = (lo as char)
                    .to_digit(16)
                    .context("Invalid hex digit in percent-encoding")?;

                decoded.push(((hi << 4) | lo) as u8);
            }
            // '+' decodes to a space in query strings
            b'+' => decoded.push(b' '),
            _ => decoded.push(b),
        }
    }

    Ok(decoded)
}
