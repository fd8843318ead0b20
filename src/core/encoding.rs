//! Canonical byte encoding
//!
//! Little-endian integers and compact-size prefixed byte strings. Every
//! consensus digest (transaction ids, block hashes, name tree leaves) is
//! computed over this encoding.

/// Append a single byte
pub fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

/// Append a u32 in little-endian order
pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a u64 in little-endian order
pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a compact-size length (1, 3 or 5 bytes)
pub fn write_varint(buf: &mut Vec<u8>, value: usize) {
    if value < 0xfd {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else {
        buf.push(0xfe);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    }
}

/// Append a length-prefixed byte string
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len());
    buf.extend_from_slice(bytes);
}

/// Read a little-endian u32 from an exactly four byte item
pub fn read_u32(bytes: &[u8]) -> Option<u32> {
    let array: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_widths() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0xfc);
        assert_eq!(buf, vec![0xfc]);

        buf.clear();
        write_varint(&mut buf, 0x1234);
        assert_eq!(buf, vec![0xfd, 0x34, 0x12]);

        buf.clear();
        write_varint(&mut buf, 0x0001_0000);
        assert_eq!(buf, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_read_u32_requires_four_bytes() {
        assert_eq!(read_u32(&[1, 0, 0, 0]), Some(1));
        assert_eq!(read_u32(&[1, 0, 0]), None);
    }
}
