use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Fixed-size tail of a column definition packet (12 bytes)
///
/// Follows the six length-encoded string fields and the lenenc `0x0c`
/// length indicator:
/// - collation: 2 bytes (little-endian)
/// - column length: 4 bytes (little-endian)
/// - column type: 1 byte
/// - flags: 2 bytes (little-endian)
/// - decimals: 1 byte
/// - filler: 2 bytes
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct ColumnDefinitionTail {
    collation: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    filler: U16LE,
}

/// Column metadata from a column definition packet, fully owned.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    schema: String,
    table: String,
    org_table: String,
    name: String,
    org_name: String,
    collation: u16,
    column_length: u32,
    column_type: ColumnType,
    flags: ColumnFlags,
    decimals: u8,
}

impl ColumnMeta {
    /// Parse a column definition packet body.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (_catalog, data) = read_string_lenenc(payload)?;
        let (schema, data) = read_string_lenenc(data)?;
        let (table, data) = read_string_lenenc(data)?;
        let (org_table, data) = read_string_lenenc(data)?;
        let (name, data) = read_string_lenenc(data)?;
        let (org_name, data) = read_string_lenenc(data)?;

        // length of the fixed fields, always 0x0c
        let (fixed_len, data) = read_int_lenenc(data)?;
        if fixed_len != 0x0c {
            return Err(Error::ProtocolValue(format!(
                "column definition fixed-length field is {} instead of 12",
                fixed_len
            )));
        }
        let (tail_bytes, rest) = read_string_fix(data, 12)?;
        if !rest.is_empty() {
            return Err(Error::ExtraBytes);
        }
        let tail =
            ColumnDefinitionTail::ref_from_bytes(tail_bytes).map_err(|_| Error::IncompleteMessage)?;

        let column_type = ColumnType::from_u8(tail.column_type).ok_or_else(|| {
            Error::ProtocolValue(format!("unknown column type 0x{:02x}", tail.column_type))
        })?;

        Ok(Self {
            schema: String::from_utf8_lossy(schema).into_owned(),
            table: String::from_utf8_lossy(table).into_owned(),
            org_table: String::from_utf8_lossy(org_table).into_owned(),
            name: String::from_utf8_lossy(name).into_owned(),
            org_name: String::from_utf8_lossy(org_name).into_owned(),
            collation: tail.collation.get(),
            column_length: tail.column_length.get(),
            column_type,
            flags: ColumnFlags::from_bits_truncate(tail.flags.get()),
            decimals: tail.decimals,
        })
    }

    /// Column name as sent to the client (the alias, if any)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name before aliasing
    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    /// Database name
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name as sent to the client (the alias, if any)
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table name before aliasing
    pub fn org_table(&self) -> &str {
        &self.org_table
    }

    pub fn collation(&self) -> u16 {
        self.collation
    }

    pub fn column_length(&self) -> u32 {
        self.column_length
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Whether integer values of this column decode as unsigned
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }

    /// Distinguishes BLOB from TEXT (and BINARY from CHAR)
    pub fn is_binary(&self) -> bool {
        self.flags.contains(ColumnFlags::BINARY_FLAG)
    }

    #[cfg(test)]
    pub(crate) fn for_test(column_type: ColumnType, flags: ColumnFlags, decimals: u8) -> Self {
        Self {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: String::new(),
            org_name: String::new(),
            collation: 45,
            column_length: 0,
            column_type,
            flags,
            decimals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Vec<u8> {
        let mut packet = Vec::new();
        for field in [&b"def"[..], b"test", b"users", b"users", b"id", b"id"] {
            write_bytes_lenenc(&mut packet, field);
        }
        packet.push(0x0c);
        packet.extend_from_slice(&[
            0x3f, 0x00, // collation = 63 (binary)
            0x0b, 0x00, 0x00, 0x00, // column_length = 11
            0x03, // column_type = LONG
            0x03, 0x42, // flags = NOT_NULL | PRI_KEY | AUTO_INCREMENT | PART_KEY
            0x00, // decimals
            0x00, 0x00, // filler
        ]);
        packet
    }

    #[test]
    fn test_parse_column_definition() {
        let meta = ColumnMeta::parse(&sample_packet()).unwrap();
        assert_eq!(meta.schema(), "test");
        assert_eq!(meta.table(), "users");
        assert_eq!(meta.org_table(), "users");
        assert_eq!(meta.name(), "id");
        assert_eq!(meta.org_name(), "id");
        assert_eq!(meta.collation(), 63);
        assert_eq!(meta.column_length(), 11);
        assert_eq!(meta.column_type(), ColumnType::MYSQL_TYPE_LONG);
        assert!(meta.flags().contains(ColumnFlags::NOT_NULL_FLAG));
        assert!(meta.flags().contains(ColumnFlags::PRI_KEY_FLAG));
        assert!(meta.flags().contains(ColumnFlags::AUTO_INCREMENT_FLAG));
        assert!(meta.flags().contains(ColumnFlags::PART_KEY_FLAG));
        assert!(!meta.is_unsigned());
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        let mut packet = sample_packet();
        packet.push(0xAA);
        assert!(matches!(
            ColumnMeta::parse(&packet),
            Err(Error::ExtraBytes)
        ));
    }

    #[test]
    fn test_parse_rejects_truncated_tail() {
        let packet = sample_packet();
        assert!(matches!(
            ColumnMeta::parse(&packet[..packet.len() - 4]),
            Err(Error::IncompleteMessage)
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let mut packet = sample_packet();
        let type_offset = packet.len() - 6;
        packet[type_offset] = 0x50; // in the unassigned gap
        assert!(matches!(
            ColumnMeta::parse(&packet),
            Err(Error::ProtocolValue(_))
        ));
    }
}
