use ethereum_consensus::primitives::U256;

/// Parse a base-10 `U256` out of a decimal string, the wire format the
/// builder-API uses for `value` and the `min-bid` configuration flag (spec §3
/// "value (arbitrary-precision integer)", §6 "min-bid (decimal big integer)").
/// Built from `U256::from(u64)` plus `Mul`/`Add` rather than a `FromStr` impl,
/// since only those operators are exercised elsewhere in this workspace.
pub fn parse_u256_decimal(s: &str) -> Option<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ten = U256::from(10u64);
    let mut acc = U256::from(0u64);
    for byte in s.bytes() {
        let digit = U256::from(u64::from(byte - b'0'));
        acc = acc * ten + digit;
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_decimal() {
        assert_eq!(parse_u256_decimal("12345"), Some(U256::from(12345u64)));
    }

    #[test]
    fn rejects_empty_and_non_digits() {
        assert_eq!(parse_u256_decimal(""), None);
        assert_eq!(parse_u256_decimal("12a"), None);
        assert_eq!(parse_u256_decimal("-5"), None);
    }
}
