use crate::error::{Error, Result};
use crate::protocol::packet::{ErrPayloadBytes, OkPayloadBytes};
use crate::protocol::primitive::*;
use crate::protocol::response::read_eof_packet;

/// How the rows of a resultset are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEncoding {
    /// `COM_QUERY` responses: one length-encoded string per column
    Text,
    /// `COM_STMT_EXECUTE` responses: NULL bitmap plus binary values
    Binary,
}

/// Events produced while consuming the head of a query/execute response.
#[derive(Debug)]
pub enum ResponseEvent<'a> {
    /// The command completed without a resultset; the OK carries the counts.
    NoResultSet(OkPayloadBytes<'a>),
    /// First packet of a resultset: the column count.
    ColumnCount(usize),
    /// One column definition packet.
    Column(&'a [u8]),
    /// The EOF packet closing the column block (absent under DEPRECATE_EOF).
    ColumnsEnd,
}

#[derive(Debug, Clone, Copy)]
enum ResponseState {
    Start,
    ReadingColumns { remaining: usize },
    ColumnsEof,
    /// Metadata consumed; row packets now stream through the resultset.
    RowsReady,
    /// Completed without a resultset.
    Finished,
}

/// Sans-io state machine over the metadata packets of a query or execute
/// response: the immediate OK/ERR verdict, or the column count and the
/// column definitions (plus the closing EOF when DEPRECATE_EOF is off).
///
/// The caller reads one packet at a time and feeds its body to [`drive`];
/// every call consumes exactly one packet and yields one event. Once
/// [`is_reading_rows`] reports true the machine is done: the row packets
/// that follow belong to the resultset cursor, not to this machine.
///
/// [`drive`]: ResultSetResponse::drive
/// [`is_reading_rows`]: ResultSetResponse::is_reading_rows
#[derive(Debug)]
pub struct ResultSetResponse {
    deprecate_eof: bool,
    state: ResponseState,
}

impl ResultSetResponse {
    pub fn new(deprecate_eof: bool) -> Self {
        Self {
            deprecate_eof,
            state: ResponseState::Start,
        }
    }

    /// The metadata is fully consumed and rows stream next.
    pub fn is_reading_rows(&self) -> bool {
        matches!(self.state, ResponseState::RowsReady)
    }

    /// The response carried no resultset.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ResponseState::Finished)
    }

    pub fn drive<'a>(&mut self, payload: &'a [u8]) -> Result<ResponseEvent<'a>> {
        match self.state {
            ResponseState::Start => match payload.first() {
                None => Err(Error::IncompleteMessage),
                Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                Some(0x00) | Some(0xFE) => {
                    // an OK here means the command produced no resultset
                    let ok = OkPayloadBytes::try_from_payload(payload)
                        .ok_or(Error::IncompleteMessage)?;
                    self.state = ResponseState::Finished;
                    Ok(ResponseEvent::NoResultSet(ok))
                }
                Some(0xFB) => Err(Error::ProtocolValue(
                    "LOCAL INFILE requests are not supported".to_string(),
                )),
                Some(_) => {
                    let (column_count, rest) = read_int_lenenc(payload)?;
                    if !rest.is_empty() {
                        return Err(Error::ExtraBytes);
                    }
                    if column_count == 0 || column_count > u16::MAX as u64 {
                        return Err(Error::ProtocolValue(format!(
                            "resultset with {} columns",
                            column_count
                        )));
                    }
                    self.state = ResponseState::ReadingColumns {
                        remaining: column_count as usize,
                    };
                    Ok(ResponseEvent::ColumnCount(column_count as usize))
                }
            },

            ResponseState::ReadingColumns { remaining } => {
                let remaining = remaining - 1;
                self.state = if remaining > 0 {
                    ResponseState::ReadingColumns { remaining }
                } else if self.deprecate_eof {
                    ResponseState::RowsReady
                } else {
                    ResponseState::ColumnsEof
                };
                Ok(ResponseEvent::Column(payload))
            }

            ResponseState::ColumnsEof => {
                read_eof_packet(payload)?;
                self.state = ResponseState::RowsReady;
                Ok(ResponseEvent::ColumnsEnd)
            }

            ResponseState::RowsReady | ResponseState::Finished => Err(Error::ProtocolValue(
                "packet after the end of the response metadata".to_string(),
            )),
        }
    }
}
