//! Error types for memory and scan operations.

use thiserror::Error;

/// Errors that can occur while translating, reading or scanning memory.
#[derive(Error, Debug)]
pub enum ScanError {
    /// An address is not valid in the layer.
    #[error("Invalid address {invalid_address:#x} in layer '{layer_name}': {message}")]
    InvalidAddress {
        layer_name: String,
        invalid_address: u64,
        message: String,
    },

    /// A paged address is not valid (with page table entry information).
    #[error("Paged invalid address {invalid_address:#x} in layer '{layer_name}' (entry={entry:#x}, invalid_bits={invalid_bits}): {message}")]
    PagedInvalidAddress {
        layer_name: String,
        invalid_address: u64,
        invalid_bits: u32,
        entry: u64,
        message: String,
    },

    /// Scan range is empty or reversed.
    #[error("Invalid scan range [{start:#x}, {stop:#x}): start must be below stop")]
    InvalidRange { start: u64, stop: u64 },

    /// Address beyond the supported virtual address width.
    #[error("Address {address:#x} exceeds the {bits}-bit virtual address space")]
    AddressOutOfRange { address: u64, bits: u32 },

    /// A translation-driven scan was requested without an address space.
    #[error("No address space configured; a paging root is required to translate addresses")]
    NoAddressSpace,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The layer has been destroyed and cannot be used.
    #[error("Layer '{0}' has been destroyed")]
    LayerDestroyed(String),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ScanError {
    /// Create an InvalidAddress error.
    pub fn invalid_address(layer_name: impl Into<String>, addr: u64, msg: impl Into<String>) -> Self {
        ScanError::InvalidAddress {
            layer_name: layer_name.into(),
            invalid_address: addr,
            message: msg.into(),
        }
    }

    /// Create a PagedInvalidAddress error.
    pub fn paged_invalid_address(
        layer_name: impl Into<String>,
        addr: u64,
        invalid_bits: u32,
        entry: u64,
        msg: impl Into<String>,
    ) -> Self {
        ScanError::PagedInvalidAddress {
            layer_name: layer_name.into(),
            invalid_address: addr,
            invalid_bits,
            entry,
            message: msg.into(),
        }
    }

    /// Create a LayerDestroyed error.
    pub fn layer_destroyed(name: impl Into<String>) -> Self {
        ScanError::LayerDestroyed(name.into())
    }
}

/// Result type for memory and scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_address_error() {
        let err = ScanError::invalid_address("test_layer", 0x1000, "test message");
        assert!(err.to_string().contains("test_layer"));
        assert!(err.to_string().contains("0x1000"));
    }

    #[test]
    fn test_paged_invalid_address_error() {
        let err = ScanError::paged_invalid_address("test_layer", 0x1000, 12, 0xDEAD, "page fault");
        assert!(err.to_string().contains("test_layer"));
        assert!(err.to_string().contains("0x1000"));
        assert!(err.to_string().contains("invalid_bits=12"));
    }

    #[test]
    fn test_range_errors_format() {
        let err = ScanError::InvalidRange { start: 0x2000, stop: 0x1000 };
        assert!(err.to_string().contains("[0x2000, 0x1000)"));
        let err = ScanError::AddressOutOfRange { address: 1 << 50, bits: 48 };
        assert!(err.to_string().contains("48-bit"));
    }
}
