//! Scan configuration.
//!
//! Options are plain JSON so they can be stored next to a case or passed in
//! from a driver. Addresses accept decimal numbers, decimal strings, or hex
//! strings (`"0x1ad000"`).

use crate::memory::error::{ScanError, ScanResult};
use crate::memory::mapping::AddressSpace;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default LRU capacity of the page walker.
pub const DEFAULT_CACHE_SIZE: usize = 4096;

/// Default sub-range width for parallel scans (16MB).
pub const DEFAULT_CHUNK_SIZE: u64 = 0x100_0000;

/// Deserialize an optional u64 that accepts decimal numbers, hex strings ("0x1ad000"),
/// or plain decimal strings ("1234").
fn deserialize_optional_u64_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match val {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected unsigned 64-bit integer")),
        Some(serde_json::Value::String(s)) => parse_u64(&s).map(Some).map_err(de::Error::custom),
        _ => Err(de::Error::custom("expected number or hex string")),
    }
}

fn deserialize_u64_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_optional_u64_hex(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected number or hex string"))
}

/// Parse a decimal or `0x`-prefixed hex address.
pub fn parse_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// Construction-time scan options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanOptions {
    /// Paging root (CR3) of the target address space.
    #[serde(default, deserialize_with = "deserialize_optional_u64_hex")]
    pub dtb: Option<u64>,
    /// Nested (EPT) root when the target is a guest.
    #[serde(default, deserialize_with = "deserialize_optional_u64_hex")]
    pub eptp: Option<u64>,
    /// Rescan the preceding page on single-page requests that sit one page
    /// past a 64KB boundary.
    #[serde(default)]
    pub header_rescan: bool,
    /// Page walker LRU capacity.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Sub-range width for parallel scans.
    #[serde(default = "default_chunk_size", deserialize_with = "deserialize_u64_hex")]
    pub chunk_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            dtb: None,
            eptp: None,
            header_rescan: false,
            cache_size: DEFAULT_CACHE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ScanOptions {
    /// Parse options from a JSON document.
    pub fn from_json_str(json: &str) -> ScanResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ScanResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The address space these options describe, if any.
    pub fn address_space(&self) -> ScanResult<Option<AddressSpace>> {
        match (self.dtb, self.eptp) {
            (Some(dtb), None) => Ok(Some(AddressSpace::new(dtb))),
            (Some(dtb), Some(eptp)) => Ok(Some(AddressSpace::nested(eptp, dtb))),
            (None, Some(_)) => Err(ScanError::InvalidParameter(
                "eptp requires a dtb for the guest address space".to_string(),
            )),
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ScanOptions::from_json_str("{}").unwrap();
        assert_eq!(opts, ScanOptions::default());
        assert!(!opts.header_rescan);
        assert_eq!(opts.address_space().unwrap(), None);
    }

    #[test]
    fn test_hex_and_decimal_addresses() {
        let opts = ScanOptions::from_json_str(
            r#"{"dtb": "0x1ad000", "eptp": 4096, "header_rescan": true, "chunk_size": "0x200000"}"#,
        )
        .unwrap();
        assert_eq!(opts.dtb, Some(0x1ad000));
        assert_eq!(opts.eptp, Some(4096));
        assert_eq!(opts.chunk_size, 0x20_0000);
        assert!(opts.header_rescan);
        assert_eq!(
            opts.address_space().unwrap(),
            Some(AddressSpace::nested(4096, 0x1ad000))
        );
    }

    #[test]
    fn test_eptp_without_dtb_rejected() {
        let opts = ScanOptions::from_json_str(r#"{"eptp": "0x5000"}"#).unwrap();
        assert!(matches!(
            opts.address_space(),
            Err(ScanError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            ScanOptions::from_json_str(r#"{"dtb": "0xZZ"}"#),
            Err(ScanError::Config(_))
        ));
        assert!(ScanOptions::from_json_str(r#"{"dtb": -1}"#).is_err());
        assert!(ScanOptions::from_json_str(r#"{"unknown": 1}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"dtb": "1234"}"#).unwrap();
        f.flush().unwrap();
        let opts = ScanOptions::from_file(f.path()).unwrap();
        assert_eq!(opts.dtb, Some(1234));
    }
}
