//! Base-128 varints and zigzag mapping.

use crate::error::{Result, SerializerError};
use std::io::{self, Read, Write};

/// A u64 takes at most 10 bytes.
const MAX_VARINT_LEN: usize = 10;

pub fn write_varint(out: &mut dyn Write, mut v: u64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut i = 0;
    while v >= 0x80 {
        buf[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    buf[i] = v as u8;
    out.write_all(&buf[..=i])?;
    Ok(i + 1)
}

/// Returns None on a clean end of stream before the first byte.
pub fn try_read_varint(input: &mut dyn Read) -> Result<Option<u64>> {
    let mut result = 0u64;
    let mut shift = 0u32;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        if input.read(&mut byte)? == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(SerializerError::unexpected_eof("varint"));
        }
        let b = byte[0];
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(SerializerError::protocol("varint overflows 64 bits"));
        }
        result |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(Some(result));
        }
        shift += 7;
    }
    Err(SerializerError::protocol("varint longer than 10 bytes"))
}

pub fn read_varint(input: &mut dyn Read) -> Result<u64> {
    try_read_varint(input)?.ok_or_else(|| SerializerError::unexpected_eof("varint"))
}

#[inline]
pub fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[inline]
pub fn write_zigzag(out: &mut dyn Write, v: i64) -> io::Result<usize> {
    write_varint(out, zigzag(v))
}

#[inline]
pub fn read_zigzag(input: &mut dyn Read) -> Result<i64> {
    Ok(unzigzag(read_varint(input)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(v: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, v).expect("write");
        buf
    }

    #[test]
    fn test_varint_bytes() {
        assert_eq!(encode(0), vec![0]);
        assert_eq!(encode(1), vec![1]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u64::MAX).len(), 10);
    }

    #[test]
    fn test_zigzag_boundaries() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag(i64::MIN), u64::MAX);
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            let buf = {
                let mut buf = Vec::new();
                write_zigzag(&mut buf, v).expect("write");
                buf
            };
            let mut slice = &buf[..];
            assert_eq!(read_zigzag(&mut slice).expect("read"), v);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_truncated_and_empty() {
        let mut empty: &[u8] = &[];
        assert!(try_read_varint(&mut empty).expect("eof").is_none());
        let mut truncated: &[u8] = &[0x80, 0x80];
        assert!(read_varint(&mut truncated).is_err());
        let mut overlong: &[u8] = &[0xff; 11];
        assert!(read_varint(&mut overlong).is_err());
    }
}
