//! Binary-protocol value encoding and decoding.
//!
//! Binary rows and statement parameters share one value format: fixed-width
//! little-endian numbers, length-encoded strings, and length-prefixed
//! temporal payloads (0, 4, 7 or 11 bytes for date/datetime; 0, 8 or 12
//! bytes for time).

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::command::ColumnMeta;
use crate::protocol::primitive::*;
use crate::value::{Date, Datetime, FieldValue, FieldView, Time};
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// DATE/DATETIME/TIMESTAMP - 4-byte payload (date only)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct Datetime4 {
    year: U16LE,
    month: u8,
    day: u8,
}

/// DATE/DATETIME/TIMESTAMP - 7-byte payload (no microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct Datetime7 {
    year: U16LE,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

/// DATE/DATETIME/TIMESTAMP - 11-byte payload (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct Datetime11 {
    year: U16LE,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: U32LE,
}

/// TIME - 8-byte payload (no microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct Time8 {
    is_negative: u8,
    days: U32LE,
    hour: u8,
    minute: u8,
    second: u8,
}

/// TIME - 12-byte payload (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct Time12 {
    is_negative: u8,
    days: U32LE,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: U32LE,
}

fn take_ref<T: FromBytes + KnownLayout + Immutable>(data: &[u8], len: usize) -> Result<(&T, &[u8])> {
    if data.len() < len {
        return Err(Error::IncompleteMessage);
    }
    let value = T::ref_from_bytes(&data[..len]).map_err(|_| Error::IncompleteMessage)?;
    Ok((value, &data[len..]))
}

// date/datetime payloads share the 1-byte length prefix dispatch
fn read_binary_datetime(data: &[u8]) -> Result<(Datetime, &[u8])> {
    let (len, rest) = read_int_1(data)?;
    match len {
        0 => Ok((
            Datetime {
                year: 0,
                month: 0,
                day: 0,
                hour: 0,
                minute: 0,
                second: 0,
                microsecond: 0,
            },
            rest,
        )),
        4 => {
            let (v, rest) = take_ref::<Datetime4>(rest, 4)?;
            Ok((
                Datetime {
                    year: v.year.get(),
                    month: v.month,
                    day: v.day,
                    hour: 0,
                    minute: 0,
                    second: 0,
                    microsecond: 0,
                },
                rest,
            ))
        }
        7 => {
            let (v, rest) = take_ref::<Datetime7>(rest, 7)?;
            Ok((
                Datetime {
                    year: v.year.get(),
                    month: v.month,
                    day: v.day,
                    hour: v.hour,
                    minute: v.minute,
                    second: v.second,
                    microsecond: 0,
                },
                rest,
            ))
        }
        11 => {
            let (v, rest) = take_ref::<Datetime11>(rest, 11)?;
            Ok((
                Datetime {
                    year: v.year.get(),
                    month: v.month,
                    day: v.day,
                    hour: v.hour,
                    minute: v.minute,
                    second: v.second,
                    microsecond: v.microsecond.get(),
                },
                rest,
            ))
        }
        _ => Err(Error::ProtocolValue(format!(
            "binary datetime with length {}",
            len
        ))),
    }
}

fn read_binary_time(data: &[u8]) -> Result<(Time, &[u8])> {
    let (len, rest) = read_int_1(data)?;
    match len {
        0 => Ok((Time::new(false, 0, 0, 0, 0), rest)),
        8 => {
            let (v, rest) = take_ref::<Time8>(rest, 8)?;
            let hours = v.days.get() * 24 + v.hour as u32;
            if hours > 838 {
                return Err(Error::ProtocolValue(format!("TIME of {} hours", hours)));
            }
            Ok((
                Time::new(v.is_negative != 0, hours as u16, v.minute, v.second, 0),
                rest,
            ))
        }
        12 => {
            let (v, rest) = take_ref::<Time12>(rest, 12)?;
            let hours = v.days.get() * 24 + v.hour as u32;
            if hours > 838 {
                return Err(Error::ProtocolValue(format!("TIME of {} hours", hours)));
            }
            Ok((
                Time::new(
                    v.is_negative != 0,
                    hours as u16,
                    v.minute,
                    v.second,
                    v.microsecond.get(),
                ),
                rest,
            ))
        }
        _ => Err(Error::ProtocolValue(format!(
            "binary time with length {}",
            len
        ))),
    }
}

/// Decode one binary-protocol value; returns the value and the remaining
/// bytes of the row.
pub fn decode_binary_value<'a>(
    meta: &ColumnMeta,
    data: &'a [u8],
) -> Result<(FieldView<'a>, &'a [u8])> {
    let unsigned = meta.is_unsigned();

    match meta.column_type() {
        ColumnType::MYSQL_TYPE_NULL => Ok((FieldView::Null, data)),

        ColumnType::MYSQL_TYPE_TINY => {
            let (v, rest) = read_int_1(data)?;
            let value = if unsigned {
                FieldView::Uint(v as u64)
            } else {
                FieldView::Int(v as i8 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_SHORT => {
            let (v, rest) = read_int_2(data)?;
            let value = if unsigned {
                FieldView::Uint(v as u64)
            } else {
                FieldView::Int(v as i16 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_YEAR => {
            let (v, rest) = read_int_2(data)?;
            Ok((FieldView::Uint(v as u64), rest))
        }

        ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => {
            let (v, rest) = read_int_4(data)?;
            let value = if unsigned {
                FieldView::Uint(v as u64)
            } else {
                FieldView::Int(v as i32 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_LONGLONG => {
            let (v, rest) = read_int_8(data)?;
            let value = if unsigned {
                FieldView::Uint(v)
            } else {
                FieldView::Int(v as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_FLOAT => {
            let (v, rest) = read_int_4(data)?;
            Ok((FieldView::Float(f32::from_bits(v)), rest))
        }

        ColumnType::MYSQL_TYPE_DOUBLE => {
            let (v, rest) = read_int_8(data)?;
            Ok((FieldView::Double(f64::from_bits(v)), rest))
        }

        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            let (v, rest) = read_binary_datetime(data)?;
            Ok((
                FieldView::Date(Date {
                    year: v.year,
                    month: v.month,
                    day: v.day,
                }),
                rest,
            ))
        }

        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            let (v, rest) = read_binary_datetime(data)?;
            Ok((FieldView::Datetime(v), rest))
        }

        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            let (v, rest) = read_binary_time(data)?;
            Ok((FieldView::Time(v), rest))
        }

        ColumnType::MYSQL_TYPE_BIT => {
            let (bytes, rest) = read_string_lenenc(data)?;
            if bytes.is_empty() || bytes.len() > 8 {
                return Err(Error::ProtocolValue(format!(
                    "BIT value of {} bytes",
                    bytes.len()
                )));
            }
            let mut acc = 0u64;
            for &b in bytes {
                acc = (acc << 8) | b as u64;
            }
            Ok((FieldView::Uint(acc), rest))
        }

        ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_SET
        | ColumnType::MYSQL_TYPE_JSON
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_GEOMETRY => {
            let (bytes, rest) = read_string_lenenc(data)?;
            Ok((FieldView::Bytes(bytes), rest))
        }
    }
}

/// Write the 2-byte parameter type code for a value: the column type byte,
/// then 0x80 for unsigned or 0x00.
pub fn encode_binary_type(out: &mut Vec<u8>, value: &FieldValue) {
    let (ty, sign) = match value {
        FieldValue::Null => (ColumnType::MYSQL_TYPE_NULL, 0x00),
        FieldValue::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, 0x00),
        FieldValue::Uint(_) => (ColumnType::MYSQL_TYPE_LONGLONG, 0x80),
        FieldValue::Bytes(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, 0x00),
        FieldValue::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, 0x00),
        FieldValue::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, 0x00),
        FieldValue::Date(_) => (ColumnType::MYSQL_TYPE_DATE, 0x00),
        FieldValue::Datetime(_) => (ColumnType::MYSQL_TYPE_DATETIME, 0x00),
        FieldValue::Time(_) => (ColumnType::MYSQL_TYPE_TIME, 0x00),
    };
    out.push(ty as u8);
    out.push(sign);
}

/// Binary-encode one parameter value. NULL writes nothing; it is carried by
/// the NULL bitmap instead.
pub fn encode_binary_value(out: &mut Vec<u8>, value: &FieldValue) {
    match value {
        FieldValue::Null => {}
        FieldValue::Int(v) => write_int_8(out, *v as u64),
        FieldValue::Uint(v) => write_int_8(out, *v),
        FieldValue::Bytes(v) => write_bytes_lenenc(out, v),
        FieldValue::Float(v) => write_int_4(out, v.to_bits()),
        FieldValue::Double(v) => write_int_8(out, v.to_bits()),
        FieldValue::Date(v) => {
            if v.year == 0 && v.month == 0 && v.day == 0 {
                write_int_1(out, 0);
            } else {
                write_int_1(out, 4);
                let wire = Datetime4 {
                    year: U16LE::new(v.year),
                    month: v.month,
                    day: v.day,
                };
                out.extend_from_slice(wire.as_bytes());
            }
        }
        FieldValue::Datetime(v) => {
            let zero = v.year == 0
                && v.month == 0
                && v.day == 0
                && v.hour == 0
                && v.minute == 0
                && v.second == 0
                && v.microsecond == 0;
            if zero {
                write_int_1(out, 0);
            } else {
                write_int_1(out, 11);
                let wire = Datetime11 {
                    year: U16LE::new(v.year),
                    month: v.month,
                    day: v.day,
                    hour: v.hour,
                    minute: v.minute,
                    second: v.second,
                    microsecond: U32LE::new(v.microsecond),
                };
                out.extend_from_slice(wire.as_bytes());
            }
        }
        FieldValue::Time(v) => {
            if v.is_zero() {
                write_int_1(out, 0);
            } else {
                write_int_1(out, 12);
                let wire = Time12 {
                    is_negative: v.negative as u8,
                    days: U32LE::new(v.hours as u32 / 24),
                    hour: (v.hours % 24) as u8,
                    minute: v.minutes,
                    second: v.seconds,
                    microsecond: U32LE::new(v.microseconds),
                };
                out.extend_from_slice(wire.as_bytes());
            }
        }
    }
}

/// NULL bitmap over a binary row or a parameter list.
///
/// Resultset rows offset the bitmap by 2 bits; parameter lists start at
/// bit 0.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
    offset: usize,
}

impl<'a> NullBitmap<'a> {
    pub fn for_resultset(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 2 }
    }

    pub fn for_parameters(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 0 }
    }

    /// Bitmap length in bytes for `num_columns` columns at this offset.
    pub fn len_for(num_columns: usize, offset: usize) -> usize {
        (num_columns + offset + 7) / 8
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let bit_pos = idx + self.offset;
        let byte_pos = bit_pos >> 3;
        let bit_offset = bit_pos & 7;

        if byte_pos >= self.bitmap.len() {
            return false;
        }

        (self.bitmap[byte_pos] & (1 << bit_offset)) != 0
    }
}

/// Append the parameter NULL bitmap for `params` (offset 0).
pub fn write_param_null_bitmap(out: &mut Vec<u8>, params: &[FieldValue]) {
    let start = out.len();
    out.resize(start + NullBitmap::len_for(params.len(), 0), 0);
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            out[start + i / 8] |= 1 << (i % 8);
        }
    }
}
