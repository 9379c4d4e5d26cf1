//! Account address normalization.
//!
//! Every address the sentinel stores or compares goes through
//! [`normalize_address`] first: trimmed, lower-cased, `0x`-prefixed.

/// Normalize a free-form address string.
///
/// ```
/// use chain_sentinel::core::address::normalize_address;
/// assert_eq!(normalize_address("DEAD"), "0xdead");
/// assert_eq!(normalize_address(" 0xAbC "), "0xabc");
/// ```
pub fn normalize_address(address: &str) -> String {
    let lowered = address.trim().to_lowercase();
    if lowered.starts_with("0x") {
        lowered
    } else {
        format!("0x{}", lowered)
    }
}

/// Normalize an optional address, mapping blank input (or a bare `0x`) to `None`.
pub fn normalize_optional(address: Option<&str>) -> Option<String> {
    address.map(normalize_address).filter(|a| a.len() > 2)
}
