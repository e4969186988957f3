//! Gzip payload codec
//!
//! Payloads are serialized to JSON bytes and gzip-compressed. The codec is
//! stateless apart from its compression level.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::domain::DomainError;

/// Gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses and decompresses result payloads
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    level: u32,
}

impl PayloadCodec {
    /// Create a codec; the level is clamped to 1-9
    pub fn new(level: u32) -> Self {
        Self {
            level: level.clamp(1, 9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Serialized size of a payload in bytes
    pub fn serialized_size(payload: &Value) -> Result<u64, DomainError> {
        serde_json::to_vec(payload)
            .map(|bytes| bytes.len() as u64)
            .map_err(|e| DomainError::compression(format!("Failed to serialize payload: {}", e)))
    }

    /// Serialize and compress a payload
    ///
    /// Returns the compressed bytes and the uncompressed (serialized) size.
    pub fn compress(&self, payload: &Value) -> Result<(Vec<u8>, u64), DomainError> {
        let serialized = serde_json::to_vec(payload)
            .map_err(|e| DomainError::compression(format!("Failed to serialize payload: {}", e)))?;

        let compressed = self.compress_bytes(&serialized)?;

        Ok((compressed, serialized.len() as u64))
    }

    /// Compress raw bytes
    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>, DomainError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));

        encoder
            .write_all(data)
            .map_err(|e| DomainError::compression(format!("Failed to write gzip stream: {}", e)))?;

        encoder
            .finish()
            .map_err(|e| DomainError::compression(format!("Failed to finish gzip stream: {}", e)))
    }

    /// Decompress and deserialize a payload
    pub fn decompress(&self, data: &[u8]) -> Result<Value, DomainError> {
        let bytes = self.decompress_bytes(data)?;

        serde_json::from_slice(&bytes)
            .map_err(|e| DomainError::decompression(format!("Invalid payload JSON: {}", e)))
    }

    /// Decompress raw bytes
    pub fn decompress_bytes(&self, data: &[u8]) -> Result<Vec<u8>, DomainError> {
        if !is_gzip(data) {
            return Err(DomainError::decompression("Missing gzip header"));
        }

        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();

        decoder
            .read_to_end(&mut out)
            .map_err(|e| DomainError::decompression(format!("Failed to read gzip stream: {}", e)))?;

        Ok(out)
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(6)
    }
}

/// Check for the gzip magic header
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn synthetic_result(rows: usize) -> Value {
        let rows: Vec<Value> = (0..rows)
            .map(|i| {
                json!({
                    "node": format!("leaf-{}", i),
                    "interface": format!("Ethernet{}", i % 48),
                    "state": if i % 3 == 0 { "down" } else { "up" },
                    "mtu": 9214,
                })
            })
            .collect();

        json!({ "columns": ["node", "interface", "state", "mtu"], "rows": rows })
    }

    #[test]
    fn test_compress_decompress() {
        let codec = PayloadCodec::new(6);
        let payload = synthetic_result(100);

        let (compressed, uncompressed_size) = codec.compress(&payload).unwrap();
        let restored = codec.decompress(&compressed).unwrap();

        assert_eq!(restored, payload);
        assert_eq!(restored["rows"].as_array().unwrap().len(), 100);
        assert_eq!(
            uncompressed_size,
            PayloadCodec::serialized_size(&payload).unwrap()
        );
        assert!((compressed.len() as u64) < uncompressed_size);
        assert!(is_gzip(&compressed));
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(PayloadCodec::new(0).level(), 1);
        assert_eq!(PayloadCodec::new(22).level(), 9);
        assert_eq!(PayloadCodec::default().level(), 6);
    }

    #[test]
    fn test_decompress_rejects_plain_bytes() {
        let codec = PayloadCodec::default();
        let result = codec.decompress(br#"{"rows": []}"#);

        assert!(matches!(result, Err(DomainError::Decompression { .. })));
    }

    #[test]
    fn test_decompress_rejects_truncated_stream() {
        let codec = PayloadCodec::default();
        let (compressed, _) = codec.compress(&synthetic_result(20)).unwrap();

        let result = codec.decompress(&compressed[..compressed.len() / 2]);

        assert!(result.unwrap_err().is_read_failure());
    }
}
