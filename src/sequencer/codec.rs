/// Pattern token codec.
///
/// Cells are packed into 32-bit groups, first cell in the most significant bit,
/// and each group is written as 8 lowercase hex digits. A final partial group is
/// padded with trailing zero bits, so decoding followed by truncation to the
/// known cell count gives back the original cells.
use crate::error::{Result, SequencerError};

pub const GROUP_BITS: usize = 32;
pub const GROUP_HEX: usize = GROUP_BITS / 4;

/// Number of hex characters a token for `cell_count` cells must have.
pub fn token_len(cell_count: usize) -> usize {
    cell_count.div_ceil(GROUP_BITS) * GROUP_HEX
}

pub fn encode(cells: &[bool]) -> String {
    let mut token = String::with_capacity(token_len(cells.len()));
    for group in cells.chunks(GROUP_BITS) {
        let mut value: u32 = 0;
        for (i, &cell) in group.iter().enumerate() {
            if cell {
                value |= 1 << (GROUP_BITS - 1 - i);
            }
        }
        token.push_str(&format!("{:08x}", value));
    }
    token
}

/// Decode a token back into exactly `cell_count` cells.
///
/// Fails with `MalformedToken` on non-hex input or a length that does not match
/// `cell_count`, and on set padding bits, which `encode` never produces.
pub fn decode(token: &str, cell_count: usize) -> Result<Vec<bool>> {
    let expected = token_len(cell_count);
    if token.len() != expected {
        return Err(SequencerError::malformed(
            token,
            format!("expected {} hex characters, found {}", expected, token.len()),
        ));
    }
    if let Some(bad) = token.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(SequencerError::malformed(
            token,
            format!("non-hex character {:?}", bad),
        ));
    }

    let mut cells = Vec::with_capacity(expected * 4);
    // All characters are ASCII hex digits, so byte slicing stays on char boundaries.
    for start in (0..token.len()).step_by(GROUP_HEX) {
        let chunk = &token[start..start + GROUP_HEX];
        let value = u32::from_str_radix(chunk, 16)
            .map_err(|e| SequencerError::malformed(token, e.to_string()))?;
        cells.extend((0..GROUP_BITS).map(|i| value & (1 << (GROUP_BITS - 1 - i)) != 0));
    }
    if cells[cell_count..].iter().any(|&bit| bit) {
        return Err(SequencerError::malformed(token, "non-zero padding bits"));
    }
    cells.truncate(cell_count);
    Ok(cells)
}

/// Parse a `0`/`1` bit string such as the configured default pattern.
pub fn parse_bits(bits: &str) -> Option<Vec<bool>> {
    bits.chars()
        .map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect()
}

pub fn format_bits(cells: &[bool]) -> String {
    cells.iter().map(|&c| if c { '1' } else { '0' }).collect()
}
