/// Renders bytes the way they appear in the Firmata documentation: `0xF0, 0x79, 0xF7`.
pub fn format_as_hex(slice: &[u8]) -> String {
    slice
        .iter()
        .map(|byte| format!("0x{:02X}", byte))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_as_hex() {
        assert_eq!(format_as_hex(&[0xF0, 0x79, 0xF7]), "0xF0, 0x79, 0xF7");
        assert_eq!(format_as_hex(&[0x01]), "0x01");
        assert_eq!(format_as_hex(&[]), "");
    }
}
