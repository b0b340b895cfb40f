//! A1-style cell reference helpers.
//!
//! All coordinates in this crate are 1-based (spreadsheet convention):
//! `(1, 1)` is `A1`.

/// Render a 1-based column index as column letters (`1` -> `A`, `28` -> `AB`).
pub fn column_letters(col: u32) -> String {
    debug_assert!(col >= 1);
    let mut col = col;
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Render a 1-based (row, col) pair as an A1 reference.
pub fn cell_name(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Parse an A1 reference into a 1-based (row, col) pair.
pub fn parse_cell_name(name: &str) -> Option<(u32, u32)> {
    let split = name.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = name.split_at(split);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        col = col.checked_mul(26)?.checked_add(ch as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 || col == 0 {
        return None;
    }
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        for (col, expected) in [(1, "A"), (26, "Z"), (27, "AA"), (28, "AB"), (703, "AAA")] {
            assert_eq!(column_letters(col), expected);
            assert_eq!(parse_cell_name(&format!("{expected}1")), Some((1, col)));
        }
    }

    #[test]
    fn cell_name_is_a1() {
        assert_eq!(cell_name(2, 4), "D2");
        assert_eq!(parse_cell_name("D2"), Some((2, 4)));
        assert_eq!(parse_cell_name("d2"), Some((2, 4)));
    }

    #[test]
    fn parse_rejects_malformed_references() {
        assert_eq!(parse_cell_name(""), None);
        assert_eq!(parse_cell_name("12"), None);
        assert_eq!(parse_cell_name("AB"), None);
        assert_eq!(parse_cell_name("A0"), None);
    }
}
