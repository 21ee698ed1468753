//! Kubernetes resource quantity parsing
//!
//! Converts quantity strings into comparable integers: CPU into millicores,
//! memory into bytes. Only the forms used for container requests are
//! accepted ("100m", "1", "0.5" for CPU; "128Mi", "1Gi", "1G", "1000000"
//! for memory).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::Error;

/// Memory suffixes with their multipliers. Two-letter binary suffixes are
/// listed first so "Mi" is not mistaken for "M".
const MEMORY_SUFFIXES: [(&str, u64); 12] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a CPU quantity into millicores
pub fn cpu_millis(qty: &str) -> Result<u64, Error> {
    let qty = qty.trim();
    let millis = if let Some(stripped) = qty.strip_suffix('m') {
        // Millicores must be whole numbers
        stripped.parse::<u64>().ok()
    } else {
        qty.parse::<f64>()
            .ok()
            .filter(|cores| cores.is_finite() && *cores >= 0.0)
            .map(|cores| (cores * 1000.0).round() as u64)
    };

    millis.ok_or_else(|| {
        Error::validation(
            "cpu",
            format!(
                "invalid quantity '{}' (expected e.g., '100m', '1', '0.5')",
                qty
            ),
        )
    })
}

/// Parse a memory quantity into bytes
pub fn memory_bytes(qty: &str) -> Result<u64, Error> {
    let qty = qty.trim();
    let invalid = || {
        Error::validation(
            "memory",
            format!("invalid quantity '{}' (expected e.g., '128Mi', '1Gi')", qty),
        )
    };

    let (number, multiplier) = MEMORY_SUFFIXES
        .iter()
        .find(|(suffix, _)| qty.ends_with(suffix))
        .map(|(suffix, mult)| (&qty[..qty.len() - suffix.len()], *mult))
        .unwrap_or((qty, 1));

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }

    let fractional = number
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(invalid)?;
    let bytes = (fractional * multiplier as f64).ceil();
    if bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Parse a CPU [`Quantity`] into millicores
pub fn quantity_cpu_millis(qty: &Quantity) -> Result<u64, Error> {
    cpu_millis(&qty.0)
}

/// Parse a memory [`Quantity`] into bytes
pub fn quantity_memory_bytes(qty: &Quantity) -> Result<u64, Error> {
    memory_bytes(&qty.0)
}
