// ===============================
// src/reader.rs
// ===============================
//
// Little-endian field reader for fixed-layout account data.
// - read_field : decode one field at an absolute offset
// - ByteReader : running cursor, every read starts where the previous ended
//
// All failures are "malformed record" flavours; callers skip the record.
//

use thiserror::Error;

pub const PUBKEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed record: need {need} bytes at offset {offset}, buffer has {len}")]
    Truncated { offset: usize, need: usize, len: usize },
    #[error("malformed record: option discriminator {value} at offset {offset}")]
    BadDiscriminator { offset: usize, value: u8 },
    #[error("malformed record: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("malformed record: invalid {field} address {value}")]
    BadAddress { field: &'static str, value: String },
}

impl DecodeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::BadDiscriminator { .. } => "discriminator",
            DecodeError::BadLength { .. } => "length",
            DecodeError::BadAddress { .. } => "address",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    PublicKey,
    U8,
    U16,
    U64,
    I64,
    OptionI64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    PublicKey(String),
    U8(u8),
    U16(u16),
    U64(u64),
    I64(i64),
    OptionI64(Option<i64>),
}

/// Decode one field at `offset`. Returns the value and the offset right after it.
pub fn read_field(buf: &[u8], offset: usize, kind: FieldKind) -> Result<(FieldValue, usize), DecodeError> {
    let mut rd = ByteReader::at(buf, offset);
    let value = match kind {
        FieldKind::PublicKey => FieldValue::PublicKey(rd.pubkey()?),
        FieldKind::U8 => FieldValue::U8(rd.u8()?),
        FieldKind::U16 => FieldValue::U16(rd.u16()?),
        FieldKind::U64 => FieldValue::U64(rd.u64()?),
        FieldKind::I64 => FieldValue::I64(rd.i64()?),
        FieldKind::OptionI64 => FieldValue::OptionI64(rd.option_i64()?),
    };
    Ok((value, rd.position()))
}

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    pub fn at(buf: &'a [u8], pos: usize) -> Self { Self { buf, pos } }

    pub fn position(&self) -> usize { self.pos }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len()).ok_or(DecodeError::Truncated {
            offset: self.pos,
            need: n,
            len: self.buf.len(),
        })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn pubkey_bytes(&mut self) -> Result<[u8; PUBKEY_LEN], DecodeError> {
        self.take_array::<PUBKEY_LEN>()
    }

    /// 32-byte key as base58.
    pub fn pubkey(&mut self) -> Result<String, DecodeError> {
        Ok(bs58::encode(self.pubkey_bytes()?).into_string())
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array::<2>()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take_array::<8>()?;
        let low = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64;
        let high = u32::from_le_bytes([b[4], b[5], b[6], b[7]]) as u64;
        Ok(low + (high << 32))
    }

    /// Unix timestamp, seconds.
    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take_array::<8>()?))
    }

    /// Borsh `Option<i64>`: 1 byte when absent, 9 bytes when present.
    pub fn option_i64(&mut self) -> Result<Option<i64>, DecodeError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.i64()?)),
            value => Err(DecodeError::BadDiscriminator { offset, value }),
        }
    }
}
