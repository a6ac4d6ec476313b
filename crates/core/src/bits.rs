//! Bit-granular access to byte buffers.
//!
//! Offsets count bits from the most significant bit of the first byte, so a
//! window `[offset, offset + count)` reads the same way the bytes are printed.

use crate::error::{Error, Origin, Result};

/// Widest window a single [`get_bits`] / [`put_bits`] call can address.
pub const MAX_WINDOW_BITS: usize = 64;

/// Mask of the `count` least significant bits.
pub fn mask(count: usize) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// Number of bits needed to represent `value` (0 for 0).
pub fn bit_width(value: u64) -> usize {
    (u64::BITS - value.leading_zeros()) as usize
}

fn check_window(len_bytes: usize, offset: usize, count: usize) -> Result<()> {
    let available = len_bytes * 8;
    let fits = offset
        .checked_add(count)
        .is_some_and(|end| end <= available);
    if count == 0 || count > MAX_WINDOW_BITS || !fits {
        return Err(Error::OutOfRange {
            offset,
            count,
            available,
        });
    }
    Ok(())
}

/// Reads `count` bits starting at bit `offset` as an unsigned integer.
pub fn get_bits(data: &[u8], offset: usize, count: usize) -> Result<u64> {
    check_window(data.len(), offset, count)?;
    let start = offset / 8;
    let skew = offset % 8;
    let width = (skew + count).div_ceil(8);
    let folded = data[start..start + width]
        .iter()
        .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
    let shift = width * 8 - (skew + count);
    Ok(((folded >> shift) as u64) & mask(count))
}

/// Writes `value` into the window `[offset, offset + count)`, leaving the
/// surrounding bits untouched.
pub fn put_bits(data: &mut [u8], offset: usize, count: usize, value: u64) -> Result<()> {
    check_window(data.len(), offset, count)?;
    if bit_width(value) > count {
        return Err(Error::ValueOverflow {
            field: format!("bit window at {offset}"),
            origin: Origin::UNKNOWN,
            bits: count,
            detail: format!("0x{value:X}"),
        });
    }
    let start = offset / 8;
    let skew = offset % 8;
    let width = (skew + count).div_ceil(8);
    let shift = width * 8 - (skew + count);
    let window = &mut data[start..start + width];

    let current = window
        .iter()
        .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
    let field_mask = u128::from(mask(count)) << shift;
    let updated = (current & !field_mask) | (u128::from(value) << shift);
    for (i, byte) in window.iter_mut().enumerate() {
        *byte = (updated >> ((width - 1 - i) * 8)) as u8;
    }
    Ok(())
}

/// Copies an arbitrary bit window into a right-aligned big-endian byte string.
///
/// The result is `ceil(count / 8)` bytes long with the window in its least
/// significant bits.
pub fn copy_bits(data: &[u8], offset: usize, count: usize) -> Result<Vec<u8>> {
    let end = offset.checked_add(count).unwrap_or(usize::MAX);
    if end > data.len() * 8 {
        return Err(Error::OutOfRange {
            offset,
            count,
            available: data.len() * 8,
        });
    }
    let mut writer = BitWriter::new();
    writer.push_zeros(count.div_ceil(8) * 8 - count);
    writer.push_slice(data, offset, count)?;
    Ok(writer.into_bytes())
}

/// Append-only bit accumulator used when emitting fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    fn grow(&mut self, count: usize) {
        let needed = (self.bit_len + count).div_ceil(8);
        if needed > self.bytes.len() {
            self.bytes.resize(needed, 0);
        }
    }

    /// Appends `count` zero bits.
    pub fn push_zeros(&mut self, count: usize) {
        self.grow(count);
        self.bit_len += count;
    }

    /// Appends `value` as a `count`-bit big-endian integer.
    ///
    /// Windows wider than 64 bits are zero-extended on the left.
    pub fn push_int(&mut self, count: usize, value: u64) -> Result<()> {
        if bit_width(value) > count {
            return Err(Error::ValueOverflow {
                field: format!("bit window at {}", self.bit_len),
                origin: Origin::UNKNOWN,
                bits: count,
                detail: format!("0x{value:X}"),
            });
        }
        if count == 0 {
            return Ok(());
        }
        let low = count.min(MAX_WINDOW_BITS);
        self.push_zeros(count - low);
        self.grow(low);
        put_bits(&mut self.bytes, self.bit_len, low, value)?;
        self.bit_len += low;
        Ok(())
    }

    /// Appends the bit window `[offset, offset + count)` of `data`.
    pub fn push_slice(&mut self, data: &[u8], offset: usize, count: usize) -> Result<()> {
        if offset % 8 == 0 && count % 8 == 0 && self.bit_len % 8 == 0 {
            let start = offset / 8;
            let end = start + count / 8;
            let chunk = data.get(start..end).ok_or(Error::OutOfRange {
                offset,
                count,
                available: data.len() * 8,
            })?;
            self.bytes.truncate(self.bit_len / 8);
            self.bytes.extend_from_slice(chunk);
            self.bit_len += count;
            return Ok(());
        }
        let mut done = 0;
        while done < count {
            let step = (count - done).min(8);
            let bits = get_bits(data, offset + done, step)?;
            self.push_int(step, bits)?;
            done += step;
        }
        Ok(())
    }

    /// Appends whole bytes.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.push_slice(data, 0, data.len() * 8)
    }

    /// Bytes written so far, the last one zero-filled on the right.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_bits_straddles_bytes() {
        assert_eq!(get_bits(&[0xAB, 0xCD], 4, 8).unwrap(), 0xBC);
    }

    #[test]
    fn get_bits_full_and_partial() {
        let data = [0x12, 0x34, 0x56];
        assert_eq!(get_bits(&data, 0, 24).unwrap(), 0x123456);
        assert_eq!(get_bits(&data, 0, 1).unwrap(), 0);
        assert_eq!(get_bits(&data, 3, 1).unwrap(), 1);
        assert_eq!(get_bits(&data, 20, 4).unwrap(), 0x6);
    }

    #[test]
    fn zero_width_windows_are_out_of_range() {
        let data = [0x12, 0x34, 0x56];
        assert!(matches!(
            get_bits(&data, 24, 0),
            Err(Error::OutOfRange { count: 0, .. })
        ));
        assert!(matches!(
            get_bits(&data, 0, 0),
            Err(Error::OutOfRange { count: 0, .. })
        ));
        let mut data = [0xFF];
        assert!(matches!(
            put_bits(&mut data, 0, 0, 0),
            Err(Error::OutOfRange { count: 0, .. })
        ));
        assert_eq!(data, [0xFF]);

        let mut w = BitWriter::new();
        w.push_int(0, 0).unwrap();
        assert!(w.push_int(0, 1).is_err());
        w.push_slice(&[0xAB], 8, 0).unwrap();
        w.push_bytes(&[]).unwrap();
        assert_eq!(w.bit_len(), 0);
        assert_eq!(copy_bits(&[0xAB], 8, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn get_bits_wide_unaligned_window() {
        let data = [0xFF; 10];
        assert_eq!(get_bits(&data, 7, 64).unwrap(), u64::MAX);
    }

    #[test]
    fn get_bits_out_of_range() {
        let err = get_bits(&[0x00], 4, 8).unwrap_err();
        assert_eq!(
            err,
            Error::OutOfRange {
                offset: 4,
                count: 8,
                available: 8
            }
        );
        assert!(get_bits(&[0u8; 16], 0, 65).is_err());
    }

    #[test]
    fn put_bits_preserves_neighbours() {
        let mut data = [0xFF, 0xFF];
        put_bits(&mut data, 4, 8, 0x00).unwrap();
        assert_eq!(data, [0xF0, 0x0F]);

        let mut data = [0x00, 0x00];
        put_bits(&mut data, 4, 8, 0xBC).unwrap();
        assert_eq!(data, [0x0B, 0xC0]);
        assert_eq!(get_bits(&data, 4, 8).unwrap(), 0xBC);
    }

    #[test]
    fn put_bits_rejects_wide_value() {
        let mut data = [0x00];
        assert!(matches!(
            put_bits(&mut data, 0, 4, 0x10),
            Err(Error::ValueOverflow { bits: 4, .. })
        ));
        assert!(matches!(
            put_bits(&mut data, 6, 4, 0x1),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn writer_packs_bits_msb_first() {
        let mut w = BitWriter::new();
        w.push_int(1, 1).unwrap();
        w.push_int(4, 0).unwrap();
        w.push_int(1, 0).unwrap();
        w.push_int(1, 1).unwrap();
        w.push_int(1, 1).unwrap();
        assert_eq!(w.bit_len(), 8);
        assert_eq!(w.into_bytes(), vec![0x83]);
    }

    #[test]
    fn writer_mixes_nibbles_and_bytes() {
        let mut w = BitWriter::new();
        w.push_int(4, 0xF).unwrap();
        w.push_int(4, 0x2).unwrap();
        w.push_bytes(&[0xDE, 0xAD]).unwrap();
        assert_eq!(w.into_bytes(), vec![0xF2, 0xDE, 0xAD]);

        let mut w = BitWriter::new();
        w.push_int(4, 0xA).unwrap();
        w.push_bytes(&[0xBC]).unwrap();
        assert_eq!(w.bit_len(), 12);
        assert_eq!(w.into_bytes(), vec![0xAB, 0xC0]);
    }

    #[test]
    fn writer_zero_extends_wide_int() {
        let mut w = BitWriter::new();
        w.push_int(104, 0x07).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[12], 0x07);
        assert!(bytes[..12].iter().all(|&b| b == 0));
    }

    #[test]
    fn copy_bits_right_aligns() {
        assert_eq!(copy_bits(&[0xAB, 0xCD], 4, 8).unwrap(), vec![0xBC]);
        assert_eq!(copy_bits(&[0xAB, 0xCD], 4, 4).unwrap(), vec![0x0B]);
        assert_eq!(copy_bits(&[0xAB, 0xCD], 0, 12).unwrap(), vec![0x0A, 0xBC]);
        assert!(copy_bits(&[0xAB], 4, 8).is_err());
    }

    #[test]
    fn widths() {
        assert_eq!(bit_width(0), 0);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(0x10), 5);
        assert_eq!(mask(0), 0);
        assert_eq!(mask(4), 0xF);
        assert_eq!(mask(64), u64::MAX);
    }
}
