//! Text-protocol value decoding.
//!
//! Every text-row cell arrives as a byte string; the column metadata decides
//! how it is interpreted. Malformed input fails with a value error.

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::command::ColumnMeta;
use crate::value::{Date, Datetime, FieldView, Time};

/// Decode one text-protocol cell according to its column metadata.
pub fn decode_text_value<'a>(bytes: &'a [u8], meta: &ColumnMeta) -> Result<FieldView<'a>> {
    match meta.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG => {
            if meta.is_unsigned() {
                Ok(FieldView::Uint(parse_int::<u64>(bytes)?))
            } else {
                Ok(FieldView::Int(parse_int::<i64>(bytes)?))
            }
        }

        ColumnType::MYSQL_TYPE_YEAR => Ok(FieldView::Uint(parse_int::<u64>(bytes)?)),

        // BIT arrives as its raw bytes, big-endian
        ColumnType::MYSQL_TYPE_BIT => {
            if bytes.is_empty() || bytes.len() > 8 {
                return Err(value_error("BIT", bytes));
            }
            let mut acc = 0u64;
            for &b in bytes {
                acc = (acc << 8) | b as u64;
            }
            Ok(FieldView::Uint(acc))
        }

        ColumnType::MYSQL_TYPE_FLOAT => {
            let s = as_str(bytes)?;
            let v: f32 = s.parse().map_err(|_| value_error("FLOAT", bytes))?;
            if v.is_infinite() {
                return Err(value_error("FLOAT", bytes));
            }
            Ok(FieldView::Float(v))
        }

        ColumnType::MYSQL_TYPE_DOUBLE => {
            let s = as_str(bytes)?;
            let v: f64 = s.parse().map_err(|_| value_error("DOUBLE", bytes))?;
            if v.is_infinite() {
                return Err(value_error("DOUBLE", bytes));
            }
            Ok(FieldView::Double(v))
        }

        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            Ok(FieldView::Date(parse_date(bytes)?))
        }

        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => Ok(FieldView::Datetime(parse_datetime(bytes)?)),

        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            Ok(FieldView::Time(parse_time(bytes)?))
        }

        ColumnType::MYSQL_TYPE_NULL => Ok(FieldView::Null),

        // string-class types pass through untouched
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
        | ColumnType::MYSQL_TYPE_GEOMETRY => Ok(FieldView::Bytes(bytes)),
    }
}

fn value_error(what: &str, bytes: &[u8]) -> Error {
    Error::ProtocolValue(format!(
        "invalid text {} value: {:?}",
        what,
        String::from_utf8_lossy(bytes)
    ))
}

fn as_str(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| value_error("UTF-8", bytes))
}

// Leading zeros are accepted (zerofill columns pad with them).
fn parse_int<T: core::str::FromStr>(bytes: &[u8]) -> Result<T> {
    as_str(bytes)?
        .parse()
        .map_err(|_| value_error("integer", bytes))
}

// All bytes must be ASCII digits; used for fixed-width temporal fields.
fn parse_digits(bytes: &[u8]) -> Result<u32> {
    if bytes.is_empty() || bytes.len() > 9 {
        return Err(value_error("digit group", bytes));
    }
    let mut acc = 0u32;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return Err(value_error("digit group", bytes));
        }
        acc = acc * 10 + (b - b'0') as u32;
    }
    Ok(acc)
}

// `YYYY-MM-DD`, years 0000-9999; the all-zero date is legal
fn parse_date(bytes: &[u8]) -> Result<Date> {
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(value_error("DATE", bytes));
    }
    let year = parse_digits(&bytes[..4])?;
    let month = parse_digits(&bytes[5..7])?;
    let day = parse_digits(&bytes[8..10])?;
    if month > 12 || day > 31 {
        return Err(value_error("DATE", bytes));
    }
    Ok(Date {
        year: year as u16,
        month: month as u8,
        day: day as u8,
    })
}

// `HH:MM:SS` starting at a fixed offset
fn parse_hms(bytes: &[u8]) -> Result<(u8, u8, u8)> {
    if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
        return Err(value_error("time of day", bytes));
    }
    let hour = parse_digits(&bytes[..2])?;
    let minute = parse_digits(&bytes[3..5])?;
    let second = parse_digits(&bytes[6..8])?;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(value_error("time of day", bytes));
    }
    Ok((hour as u8, minute as u8, second as u8))
}

// 1-6 fractional digits, right-padded to microseconds
fn parse_fraction(bytes: &[u8]) -> Result<u32> {
    if bytes.is_empty() || bytes.len() > 6 {
        return Err(value_error("fractional seconds", bytes));
    }
    let digits = parse_digits(bytes)?;
    Ok(digits * 10u32.pow(6 - bytes.len() as u32))
}

// `YYYY-MM-DD HH:MM:SS[.ffffff]`; the fraction appears only for columns
// declared with decimals > 0
fn parse_datetime(bytes: &[u8]) -> Result<Datetime> {
    if bytes.len() < 19 || bytes[10] != b' ' {
        return Err(value_error("DATETIME", bytes));
    }
    let date = parse_date(&bytes[..10])?;
    let (hour, minute, second) = parse_hms(&bytes[11..19])?;
    let microsecond = if bytes.len() > 19 {
        if bytes[19] != b'.' {
            return Err(value_error("DATETIME", bytes));
        }
        parse_fraction(&bytes[20..])?
    } else {
        0
    };
    Ok(Datetime {
        year: date.year,
        month: date.month,
        day: date.day,
        hour,
        minute,
        second,
        microsecond,
    })
}

// `[-]H+:MM:SS[.ffffff]`, hours up to 838
fn parse_time(bytes: &[u8]) -> Result<Time> {
    let (negative, rest) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    };

    let colon = rest
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| value_error("TIME", bytes))?;
    if colon == 0 || colon > 3 {
        return Err(value_error("TIME", bytes));
    }
    let hours = parse_digits(&rest[..colon])?;

    let rest = &rest[colon + 1..];
    if rest.len() < 5 || rest[2] != b':' {
        return Err(value_error("TIME", bytes));
    }
    let minutes = parse_digits(&rest[..2])?;
    let seconds = parse_digits(&rest[3..5])?;

    let microseconds = if rest.len() > 5 {
        if rest[5] != b'.' {
            return Err(value_error("TIME", bytes));
        }
        parse_fraction(&rest[6..])?
    } else {
        0
    };

    if hours > 838 || minutes > 59 || seconds > 59 {
        return Err(value_error("TIME", bytes));
    }

    Ok(Time::new(
        negative,
        hours as u16,
        minutes as u8,
        seconds as u8,
        microseconds,
    ))
}
