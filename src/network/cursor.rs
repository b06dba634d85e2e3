//! Forward-only reader over a server buffer
//!
//! All numeric fields are little-endian. Strings are a u16 byte length
//! followed by raw bytes, each byte mapped to the char with the same code
//! point, which is what the server's encoder assumes.

use glam::{Mat3, Mat4};

use crate::network::error::{truncated, NetworkResult};
use crate::network::protocol::{Protocol, SECTION_END_MARKER_BYTES};

/// Reader with a mutable offset over an immutable byte buffer
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    pub fn has_remaining(&self) -> bool {
        self.offset < self.buf.len()
    }

    fn take(&mut self, n: usize) -> NetworkResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(truncated(self.offset, n, self.remaining()));
        }
        let buf = self.buf;
        let start = self.offset;
        self.offset += n;
        Ok(&buf[start..start + n])
    }

    fn take_array<const N: usize>(&mut self) -> NetworkResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> NetworkResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> NetworkResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> NetworkResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> NetworkResult<i16> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> NetworkResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> NetworkResult<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Borrow the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> NetworkResult<&'a [u8]> {
        self.take(n)
    }

    /// u16 length, then one char per byte
    pub fn read_length_prefixed_string(&mut self) -> NetworkResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    /// Top bit as a flag, low 31 bits as an id
    pub fn read_bool1_int31(&mut self) -> NetworkResult<(bool, u32)> {
        let packed = self.read_u32()?;
        Ok((packed >> 31 == 1, (packed << 1) >> 1))
    }

    /// Top 8 bits and low 24 bits
    pub fn read_int8_int24(&mut self) -> NetworkResult<(u8, u32)> {
        let packed = self.read_u32()?;
        Ok(((packed >> 24) as u8, (packed << 8) >> 8))
    }

    /// Top 16 bits and low 16 bits
    pub fn read_int16_int16(&mut self) -> NetworkResult<(u16, u16)> {
        let packed = self.read_u32()?;
        Ok(((packed >> 16) as u16, (packed & 0xFFFF) as u16))
    }

    /// Four bytes normalized to `[0, 1]`
    pub fn read_color4_u8(&mut self) -> NetworkResult<[f32; 4]> {
        let bytes = self.take_array::<4>()?;
        Ok(bytes.map(|b| b as f32 / 255.0))
    }

    pub fn read_f32_array<const N: usize>(&mut self) -> NetworkResult<[f32; N]> {
        let mut out = [0f32; N];
        for value in out.iter_mut() {
            *value = self.read_f32()?;
        }
        Ok(out)
    }

    /// 16 floats, column-major
    pub fn read_mat4(&mut self) -> NetworkResult<Mat4> {
        Ok(Mat4::from_cols_array(&self.read_f32_array::<16>()?))
    }

    /// 9 floats, column-major
    pub fn read_mat3(&mut self) -> NetworkResult<Mat3> {
        Ok(Mat3::from_cols_array(&self.read_f32_array::<9>()?))
    }

    /// Peek for the section end marker without moving
    pub fn at_section_end(&self) -> bool {
        Protocol::is_section_end(&self.buf[self.offset.min(self.buf.len())..])
    }

    /// Consume the marker word if it is next. Returns whether it was found.
    pub fn consume_section_end(&mut self) -> NetworkResult<bool> {
        if !self.at_section_end() {
            return Ok(false);
        }
        // The marker doubles as the trailing float the server appends
        let _ = self.read_bytes(SECTION_END_MARKER_BYTES.len())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;

    #[test]
    fn test_reads_little_endian() {
        let mut bytes = Vec::new();
        bytes.push(7u8);
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        bytes.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        bytes.extend_from_slice(&(-3i16).to_le_bytes());
        bytes.extend_from_slice(&(-70000i32).to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());

        let mut cursor = BinaryCursor::new(&bytes);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(cursor.read_i16().unwrap(), -3);
        assert_eq!(cursor.read_i32().unwrap(), -70000);
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_short_reads_are_truncated() {
        let bytes = [1u8, 2, 3];
        let mut cursor = BinaryCursor::new(&bytes);
        match cursor.read_u32() {
            Err(ViewerError::TruncatedBuffer {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected TruncatedBuffer, got {:?}", other),
        }
        // A failed read does not move the cursor
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.read_u16().unwrap(), 0x0201);
        assert!(cursor.read_u16().is_err());
        assert!(cursor.read_f32().is_err());
        assert!(cursor.read_bytes(2).is_err());
        assert_eq!(cursor.read_u8().unwrap(), 3);
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_length_prefixed_string_maps_bytes_to_chars() {
        let mut bytes = vec![4, 0];
        bytes.extend_from_slice(&[b'a', 0xE9, b'/', 0xFF]);
        let mut cursor = BinaryCursor::new(&bytes);
        let s = cursor.read_length_prefixed_string().unwrap();
        assert_eq!(s, "a\u{e9}/\u{ff}");
        assert_eq!(s.chars().count(), 4);
    }

    #[test]
    fn test_string_longer_than_buffer() {
        let bytes = [10u8, 0, b'a'];
        let mut cursor = BinaryCursor::new(&bytes);
        assert!(matches!(
            cursor.read_length_prefixed_string(),
            Err(ViewerError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_bool1_int31_round_trip() {
        for flag in [false, true] {
            for value in [0u32, 1, 12345, 0x4000_0000, 0x7FFF_FFFF] {
                let packed = ((flag as u32) << 31) | value;
                let bytes = packed.to_le_bytes();
                let mut cursor = BinaryCursor::new(&bytes);
                assert_eq!(cursor.read_bool1_int31().unwrap(), (flag, value));
            }
        }
    }

    #[test]
    fn test_int8_int24_and_int16_int16() {
        let packed: u32 = (0xAB << 24) | 0x00_1234;
        let split: u32 = (3 << 16) | 70;
        let mut bytes = packed.to_le_bytes().to_vec();
        bytes.extend_from_slice(&split.to_le_bytes());
        let mut cursor = BinaryCursor::new(&bytes);
        assert_eq!(cursor.read_int8_int24().unwrap(), (0xAB, 0x1234));
        assert_eq!(cursor.read_int16_int16().unwrap(), (3, 70));
    }

    #[test]
    fn test_color4_u8() {
        let bytes = [255u8, 128, 0, 255];
        let mut cursor = BinaryCursor::new(&bytes);
        let color = cursor.read_color4_u8().unwrap();
        let expected = [1.0, 0.502, 0.0, 1.0];
        for (got, want) in color.iter().zip(expected.iter()) {
            assert!((got - want).abs() <= 1.0 / 255.0, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_matrices_are_column_major() {
        let mut bytes = Vec::new();
        for i in 0..16 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        for i in 0..9 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        let mut cursor = BinaryCursor::new(&bytes);
        let view = cursor.read_mat4().unwrap();
        assert_eq!(view.w_axis.x, 12.0);
        let normal = cursor.read_mat3().unwrap();
        assert_eq!(normal.z_axis.z, 8.0);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_section_end_detection() {
        let bytes = [0x01, 0xB1, 0x6B, 0x00, 0xB5, 0x09];
        let mut cursor = BinaryCursor::new(&bytes);
        assert!(!cursor.consume_section_end().unwrap());
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert!(cursor.at_section_end());
        assert!(cursor.consume_section_end().unwrap());
        assert_eq!(cursor.offset(), 5);

        let short = [0xB1, 0x6B];
        let cursor = BinaryCursor::new(&short);
        assert!(!cursor.at_section_end());
    }
}
