//! Kubernetes resource quantity parsing
//!
//! The metrics API reports usage as quantity strings such as `250m`,
//! `123456789n` or `128Mi`. These are converted to plain floats: cores for
//! CPU and bytes for memory.

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity string into its numeric value.
///
/// Supports decimal SI suffixes (`n`, `u`, `m`, `k`, `M`, `G`, `T`, `P`, `E`),
/// binary suffixes (`Ki` .. `Ei`) and plain or exponent notation.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| raw.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .unwrap_or((raw, 1.0));

    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

/// CPU quantity in cores
pub fn parse_cpu(raw: &str) -> Option<f64> {
    parse_quantity(raw)
}

/// Memory quantity in bytes
pub fn parse_memory(raw: &str) -> Option<f64> {
    parse_quantity(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_parse_cpu_quantities() {
        assert!(approx(parse_cpu("250m").unwrap(), 0.25));
        assert!(approx(parse_cpu("2").unwrap(), 2.0));
        assert!(approx(parse_cpu("1.5").unwrap(), 1.5));
        assert!(approx(parse_cpu("123456789n").unwrap(), 0.123456789));
        assert!(approx(parse_cpu("500u").unwrap(), 0.0005));
    }

    #[test]
    fn test_parse_memory_quantities() {
        assert_eq!(parse_memory("128Mi").unwrap(), 134_217_728.0);
        assert_eq!(parse_memory("1Ki").unwrap(), 1024.0);
        assert_eq!(parse_memory("1G").unwrap(), 1e9);
        assert_eq!(parse_memory("4096").unwrap(), 4096.0);
        assert_eq!(parse_memory("2k").unwrap(), 2000.0);
    }

    #[test]
    fn test_parse_exponent_and_exa() {
        assert_eq!(parse_quantity("1e3").unwrap(), 1000.0);
        assert_eq!(parse_quantity("2E").unwrap(), 2e18);
        assert_eq!(parse_quantity("1Ei").unwrap(), 1_152_921_504_606_846_976.0);
    }

    #[test]
    fn test_parse_invalid_quantities() {
        assert!(parse_quantity("").is_none());
        assert!(parse_quantity("abc").is_none());
        assert!(parse_quantity("12Xi").is_none());
        assert!(parse_quantity("m").is_none());
        assert!(parse_quantity("NaN").is_none());
    }
}
