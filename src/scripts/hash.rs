//! Content fingerprint

/// Non-cryptographic 32-bit content hash, rendered as lowercase hex
///
/// Folds UTF-16 code units with `h = h * 31 + c` in wrapping `i32`
/// arithmetic and prints the absolute value. `i32::MIN` renders as
/// `80000000`.
pub fn script_hash(content: &str) -> String {
    let hash = content
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("{:x}", i64::from(hash).abs())
}
