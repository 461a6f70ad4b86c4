use crate::constant::CommandByte;
use crate::protocol::primitive::*;

/// Write COM_QUERY command
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_query() {
        let mut out = Vec::new();
        write_query(&mut out, "SELECT 1");
        assert_eq!(out[0], 0x03);
        assert_eq!(&out[1..], b"SELECT 1");
    }
}
