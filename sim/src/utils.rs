use ansi_term::Colour::{Green, Red};
use anyhow::Context;

/// Parse a numeric literal: decimal, `0x` hexadecimal or `0b` binary.
pub fn parse_literal(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = s.strip_prefix("0b") {
        return u64::from_str_radix(bin, 2).ok();
    }
    s.parse().ok()
}

/// Parse the initial content of data memory: byte literals separated by
/// commas or whitespace. Lines starting with `;` are comments.
pub fn parse_data(src: &str) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    for (lineno, line) in src.lines().enumerate() {
        let line = line.split(';').next().unwrap_or_default();
        for tok in line.split(|c: char| c == ',' || c.is_whitespace()) {
            if tok.is_empty() {
                continue;
            }
            let value = parse_literal(tok)
                .and_then(|v| u8::try_from(v).ok())
                .with_context(|| format!("line {}: `{}` is not a byte", lineno + 1, tok))?;
            data.push(value);
        }
    }
    Ok(data)
}

const ROW: usize = 8;

/// Print the rows that differ between two memory images.
pub fn mem_diff(left: &[u8], right: &[u8]) {
    let len = left.len().max(right.len());
    let get = |mem: &[u8], i: usize| mem.get(i).copied().unwrap_or_default();
    for row in (0..len).step_by(ROW) {
        let end = (row + ROW).min(len);
        if (row..end).all(|i| get(left, i) == get(right, i)) {
            continue;
        }
        print!("{:#04x}: ", row);
        for i in row..end {
            print!("{:02x} ", get(left, i));
        }
        print!("->");
        for i in row..end {
            let (l, r) = (get(left, i), get(right, i));
            let text = format!(" {:02x}", r);
            if l == r {
                print!("{}", text);
            } else {
                print!("{}", Red.bold().paint(text));
            }
        }
        println!()
    }
}

/// Print a memory image up to its last non-zero row.
pub fn mem_print(mem: &[u8]) {
    let last = mem.iter().rposition(|&b| b != 0).unwrap_or(0);
    for row in (0..=last).step_by(ROW) {
        print!("{}", Green.paint(format!("{:#04x}:", row)));
        for byte in mem.iter().skip(row).take(ROW) {
            print!(" {:02x}", byte);
        }
        println!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("42"), Some(42));
        assert_eq!(parse_literal("0x2a"), Some(42));
        assert_eq!(parse_literal("0b101010"), Some(42));
        assert_eq!(parse_literal("x"), None);
    }

    #[test]
    fn test_parse_data() -> anyhow::Result<()> {
        let data = parse_data("1, 2, 3 4 ; matrix A\n0x10,\n\n; comment\n0b11")?;
        assert_eq!(data, vec![1, 2, 3, 4, 16, 3]);
        assert!(parse_data("256").is_err());
        assert!(parse_data("1, two").is_err());
        Ok(())
    }
}
