//! Descriptor blob encoding.
//!
//! Layout: little-endian `u32` element count, then that many little-endian
//! `f32` values. Decoding reproduces the exact bit patterns that were encoded.

use facegate_core::{Descriptor, StorageError};

const COUNT_BYTES: usize = 4;
const VALUE_BYTES: usize = 4;

pub fn encode(descriptor: &Descriptor) -> Vec<u8> {
    let values = descriptor.values();
    let mut buf = Vec::with_capacity(COUNT_BYTES + values.len() * VALUE_BYTES);
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

pub fn decode(blob: &[u8]) -> Result<Descriptor, StorageError> {
    if blob.len() < COUNT_BYTES {
        return Err(StorageError::Corrupt(format!(
            "descriptor blob too short: {} bytes",
            blob.len()
        )));
    }
    let (count, body) = blob.split_at(COUNT_BYTES);
    let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;

    if Some(body.len()) != count.checked_mul(VALUE_BYTES) {
        return Err(StorageError::Corrupt(format!(
            "descriptor blob declares {count} values but carries {} bytes",
            body.len()
        )));
    }

    let values = body
        .chunks_exact(VALUE_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(Descriptor::from_values(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let values = vec![0.0, 1.0, -0.0, 0.125, f32::MIN_POSITIVE, 0.1 + 0.2, 1e-30, 0.70710677];
        let descriptor = Descriptor::from_values(values.clone());
        let decoded = decode(&encode(&descriptor)).unwrap();

        assert_eq!(decoded.len(), values.len());
        for (a, b) in decoded.values().iter().zip(values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_empty_descriptor() {
        let blob = encode(&Descriptor::from_values(Vec::new()));
        assert_eq!(blob, vec![0, 0, 0, 0]);
        assert!(decode(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_layout_is_length_prefixed() {
        let blob = encode(&Descriptor::from_values(vec![1.0, 2.0]));
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[..4], &2u32.to_le_bytes());
        assert_eq!(&blob[4..8], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_truncated_blob_is_corrupt() {
        let mut blob = encode(&Descriptor::from_values(vec![1.0, 2.0]));
        blob.pop();
        assert!(matches!(decode(&blob), Err(StorageError::Corrupt(_))));
        assert!(matches!(decode(&[1, 0]), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut blob = encode(&Descriptor::from_values(vec![1.0]));
        blob.push(0);
        assert!(matches!(decode(&blob), Err(StorageError::Corrupt(_))));
    }
}
