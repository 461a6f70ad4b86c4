use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::binary::{encode_binary_type, encode_binary_value, write_param_null_bitmap};
use crate::protocol::packet::ErrPayloadBytes;
use crate::protocol::primitive::*;
use crate::protocol::response::read_eof_packet;
use crate::value::FieldValue;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Prepared statement OK response (zero-copy)
///
/// Layout after the 0x00 status byte:
/// - statement_id: 4 bytes (little-endian)
/// - num_columns: 2 bytes (little-endian)
/// - num_params: 2 bytes (little-endian)
/// - reserved: 1 byte
/// - warning_count: 2 bytes (little-endian)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Write COM_STMT_PREPARE command
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Read COM_STMT_PREPARE response header (zero-copy)
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    if status != 0x00 {
        return Err(Error::ProtocolValue(format!(
            "prepare response with status 0x{:02x}",
            status
        )));
    }

    // PrepareOk is 11 bytes (4 + 2 + 2 + 1 + 2)
    if data.len() < 11 {
        return Err(Error::IncompleteMessage);
    }

    PrepareOk::ref_from_bytes(&data[..11]).map_err(|_| Error::IncompleteMessage)
}

/// Write COM_STMT_EXECUTE command.
///
/// The caller has already verified that `params` matches the statement's
/// declared parameter count.
pub fn write_execute(out: &mut Vec<u8>, statement_id: u32, params: &[FieldValue]) {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);

    // flags (CURSOR_TYPE_NO_CURSOR)
    write_int_1(out, 0x00);

    // iteration count, always 1
    write_int_4(out, 1);

    if !params.is_empty() {
        write_param_null_bitmap(out, params);

        // new-params-bound flag; types follow on every execute
        write_int_1(out, 0x01);
        for param in params {
            encode_binary_type(out, param);
        }
        for param in params {
            encode_binary_value(out, param);
        }
    }
}

/// Write COM_STMT_CLOSE command. The server sends no response.
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Events produced while consuming a COM_STMT_PREPARE response.
#[derive(Debug)]
pub enum PrepareEvent<'a> {
    /// The leading prepare-OK packet.
    Ok(PrepareOk),
    /// One parameter definition packet.
    ParamColumn(&'a [u8]),
    /// One result column definition packet.
    ResultColumn(&'a [u8]),
    /// An EOF packet closing a definition block (absent under DEPRECATE_EOF).
    Eof,
}

#[derive(Debug, Clone, Copy)]
enum PrepareState {
    Start,
    ReadingParams { remaining: u16, num_columns: u16 },
    ParamsEof { num_columns: u16 },
    ReadingColumns { remaining: u16 },
    ColumnsEof,
    Finished,
}

/// Sans-io state machine over the packets of a prepare response.
#[derive(Debug)]
pub struct Prepare {
    deprecate_eof: bool,
    state: PrepareState,
}

impl Prepare {
    pub fn new(deprecate_eof: bool) -> Self {
        Self {
            deprecate_eof,
            state: PrepareState::Start,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PrepareState::Finished)
    }

    fn after_params(&self, num_columns: u16) -> PrepareState {
        if num_columns > 0 {
            PrepareState::ReadingColumns {
                remaining: num_columns,
            }
        } else {
            PrepareState::Finished
        }
    }

    pub fn drive<'a>(&mut self, payload: &'a [u8]) -> Result<PrepareEvent<'a>> {
        match self.state {
            PrepareState::Start => {
                if payload.first() == Some(&0xFF) {
                    return Err(ErrPayloadBytes(payload).into());
                }
                let ok = *read_prepare_ok(payload)?;
                self.state = if ok.num_params() > 0 {
                    PrepareState::ReadingParams {
                        remaining: ok.num_params(),
                        num_columns: ok.num_columns(),
                    }
                } else {
                    self.after_params(ok.num_columns())
                };
                Ok(PrepareEvent::Ok(ok))
            }

            PrepareState::ReadingParams {
                remaining,
                num_columns,
            } => {
                let remaining = remaining - 1;
                self.state = if remaining > 0 {
                    PrepareState::ReadingParams {
                        remaining,
                        num_columns,
                    }
                } else if self.deprecate_eof {
                    self.after_params(num_columns)
                } else {
                    PrepareState::ParamsEof { num_columns }
                };
                Ok(PrepareEvent::ParamColumn(payload))
            }

            PrepareState::ParamsEof { num_columns } => {
                read_eof_packet(payload)?;
                self.state = self.after_params(num_columns);
                Ok(PrepareEvent::Eof)
            }

            PrepareState::ReadingColumns { remaining } => {
                let remaining = remaining - 1;
                self.state = if remaining > 0 {
                    PrepareState::ReadingColumns { remaining }
                } else if self.deprecate_eof {
                    PrepareState::Finished
                } else {
                    PrepareState::ColumnsEof
                };
                Ok(PrepareEvent::ResultColumn(payload))
            }

            PrepareState::ColumnsEof => {
                read_eof_packet(payload)?;
                self.state = PrepareState::Finished;
                Ok(PrepareEvent::Eof)
            }

            PrepareState::Finished => Err(Error::ProtocolValue(
                "packet after the end of the prepare response".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare_ok_payload(statement_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&statement_id.to_le_bytes());
        payload.extend_from_slice(&num_columns.to_le_bytes());
        payload.extend_from_slice(&num_params.to_le_bytes());
        payload.push(0x00);
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload
    }

    #[test]
    fn test_read_prepare_ok() {
        let payload = prepare_ok_payload(7, 2, 3);
        let ok = read_prepare_ok(&payload).unwrap();
        assert_eq!(ok.statement_id(), 7);
        assert_eq!(ok.num_columns(), 2);
        assert_eq!(ok.num_params(), 3);
        assert_eq!(ok.warning_count(), 0);

        assert!(read_prepare_ok(&payload[..8]).is_err());
        assert!(read_prepare_ok(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_write_execute_without_params() {
        let mut out = Vec::new();
        write_execute(&mut out, 0x01020304, &[]);
        assert_eq!(
            out,
            [0x17, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_write_execute_with_params() {
        let mut out = Vec::new();
        let params = vec![FieldValue::Null, FieldValue::Int(5)];
        write_execute(&mut out, 1, &params);

        let mut expected = vec![0x17, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        expected.push(0b01); // null bitmap: param 0 is NULL
        expected.push(0x01); // new-params-bound flag
        expected.extend_from_slice(&[0x06, 0x00]); // NULL type
        expected.extend_from_slice(&[0x08, 0x00]); // LONGLONG type
        expected.extend_from_slice(&5u64.to_le_bytes());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_write_close_statement() {
        let mut out = Vec::new();
        write_close_statement(&mut out, 9);
        assert_eq!(out, [0x19, 0x09, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_prepare_flow_with_params_and_columns() {
        let mut sm = Prepare::new(true);
        let prepare_ok = prepare_ok_payload(1, 1, 2);
        let event = sm.drive(&prepare_ok).unwrap();
        assert!(matches!(event, PrepareEvent::Ok(ok) if ok.num_params() == 2));

        assert!(matches!(
            sm.drive(b"param 0").unwrap(),
            PrepareEvent::ParamColumn(_)
        ));
        assert!(matches!(
            sm.drive(b"param 1").unwrap(),
            PrepareEvent::ParamColumn(_)
        ));
        assert!(matches!(
            sm.drive(b"result col").unwrap(),
            PrepareEvent::ResultColumn(_)
        ));
        assert!(sm.is_finished());
    }

    #[test]
    fn test_prepare_flow_without_metadata() {
        let mut sm = Prepare::new(true);
        sm.drive(&prepare_ok_payload(1, 0, 0)).unwrap();
        assert!(sm.is_finished());
    }

    #[test]
    fn test_prepare_flow_with_eof_packets() {
        let eof = [0xFE, 0x00, 0x00, 0x02, 0x00];
        let mut sm = Prepare::new(false);
        sm.drive(&prepare_ok_payload(1, 1, 1)).unwrap();
        sm.drive(b"param 0").unwrap();
        assert!(matches!(sm.drive(&eof).unwrap(), PrepareEvent::Eof));
        sm.drive(b"result col").unwrap();
        assert!(!sm.is_finished());
        assert!(matches!(sm.drive(&eof).unwrap(), PrepareEvent::Eof));
        assert!(sm.is_finished());
    }

    #[test]
    fn test_prepare_error_response() {
        let mut sm = Prepare::new(true);
        let mut err_packet = vec![0xFF, 0x64, 0x04, b'#'];
        err_packet.extend_from_slice(b"42000");
        err_packet.extend_from_slice(b"syntax error");
        assert!(matches!(
            sm.drive(&err_packet).unwrap_err(),
            Error::Server(e) if e.error_code == 1124
        ));
    }
}
