//! Resultset bookkeeping shared by the blocking and async frontends.
//!
//! The frontends own the transport; everything else about a resultset —
//! column metadata, the buffer backing the current row batch, decoding, and
//! the terminal OK — lives here.

use crate::error::{Error, Result};
use crate::protocol::binary::{decode_binary_value, NullBitmap};
use crate::protocol::command::resultset::RowEncoding;
use crate::protocol::command::ColumnMeta;
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayload, OkPayload};
use crate::protocol::text::decode_text_value;
use crate::row::{Rows, RowsView};
use crate::value::FieldView;

#[derive(Debug)]
enum ResultSetState {
    /// Rows are still streaming in.
    ReadingRows,
    /// Drained normally; the terminal OK/EOF data is retained.
    Complete(OkPayload),
    /// The server aborted the resultset with an ERR packet.
    Failed(ErrPayload),
}

#[derive(Debug)]
pub(crate) struct ResultSetCore {
    columns: Vec<ColumnMeta>,
    encoding: RowEncoding,
    state: ResultSetState,
    /// Length-prefixed row packets backing the current batch of views.
    buffer: Vec<u8>,
    fields: Vec<FieldView<'static>>,
}

impl ResultSetCore {
    pub fn new(columns: Vec<ColumnMeta>, encoding: RowEncoding) -> Self {
        Self {
            columns,
            encoding,
            state: ResultSetState::ReadingRows,
            buffer: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// A resultset that was complete on arrival (OK response, no rows).
    pub fn already_complete(ok: OkPayload) -> Self {
        Self {
            columns: Vec::new(),
            encoding: RowEncoding::Text,
            state: ResultSetState::Complete(ok),
            buffer: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn is_reading_rows(&self) -> bool {
        matches!(self.state, ResultSetState::ReadingRows)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ResultSetState::Complete(_))
    }

    pub fn set_complete(&mut self, ok: OkPayload) {
        self.state = ResultSetState::Complete(ok);
    }

    pub fn set_failed(&mut self, err: ErrPayload) {
        self.state = ResultSetState::Failed(err);
    }

    /// The error to replay if the resultset failed earlier.
    pub fn failure(&self) -> Option<Error> {
        match &self.state {
            ResultSetState::Failed(err) => Some(Error::Server(err.clone())),
            _ => None,
        }
    }

    fn ok(&self) -> Option<&OkPayload> {
        match &self.state {
            ResultSetState::Complete(ok) => Some(ok),
            _ => None,
        }
    }

    pub fn affected_rows(&self) -> Option<u64> {
        self.ok().map(|ok| ok.affected_rows)
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.ok().map(|ok| ok.last_insert_id)
    }

    pub fn warning_count(&self) -> Option<u16> {
        self.ok().map(|ok| ok.warnings)
    }

    pub fn info(&self) -> Option<&str> {
        self.ok().map(|ok| ok.info.as_str())
    }

    /// Drop the previous batch; its views are already unreachable because
    /// the caller holds `&mut` over the whole resultset.
    pub fn begin_batch(&mut self) {
        self.fields.clear();
        self.buffer.clear();
    }

    /// Stash one row packet. Decoding happens after the batch is complete so
    /// buffer growth never moves bytes under a live view.
    pub fn push_row_packet(&mut self, payload: &[u8]) {
        self.buffer
            .extend_from_slice(&(payload.len() as u32).to_ne_bytes());
        self.buffer.extend_from_slice(payload);
    }

    /// Decode every stashed packet into field views.
    pub fn decode_batch(&mut self) -> Result<()> {
        self.fields.clear();
        let fields = decode_packets(&self.buffer, &self.columns, self.encoding)?;
        // Safety: the views borrow `self.buffer`, which this struct owns and
        // does not touch until `begin_batch` clears views and buffer together.
        self.fields = unsafe {
            std::mem::transmute::<Vec<FieldView<'_>>, Vec<FieldView<'static>>>(fields)
        };
        Ok(())
    }

    /// The current batch as a view backed by this resultset's buffer.
    pub fn batch(&self) -> RowsView<'_> {
        RowsView::new(&self.fields, self.columns.len())
    }

    /// Move the current batch out as owning rows.
    pub fn take_batch(&mut self) -> Rows {
        let buffer = std::mem::take(&mut self.buffer);
        let fields = std::mem::take(&mut self.fields);
        Rows::new(buffer, fields, self.columns.len())
    }
}

/// What a packet read in the row phase turned out to be.
#[derive(Debug)]
pub(crate) enum RowPacket {
    Row,
    Finished(OkPayload),
    Failed(ErrPayload),
}

pub(crate) fn classify_row_packet(payload: &[u8], deprecate_eof: bool) -> Result<RowPacket> {
    use crate::protocol::packet::{is_resultset_terminator, ErrPayloadBytes, OkPayloadBytes};
    use crate::protocol::response::read_eof_packet;

    if let Some(err_bytes) = ErrPayloadBytes::try_from_payload(payload) {
        return Ok(RowPacket::Failed(ErrPayload::try_from(err_bytes)?));
    }
    if is_resultset_terminator(payload, deprecate_eof) {
        // with DEPRECATE_EOF the terminator is a full OK packet; without it,
        // an EOF packet carrying only warnings and status
        let ok = if deprecate_eof {
            let ok_bytes =
                OkPayloadBytes::try_from_payload(payload).ok_or(Error::IncompleteMessage)?;
            OkPayload::try_from(ok_bytes)?
        } else {
            let eof = read_eof_packet(payload)?;
            OkPayload {
                affected_rows: 0,
                last_insert_id: 0,
                status_flags: eof.status_flags(),
                warnings: eof.warnings(),
                info: String::new(),
            }
        };
        return Ok(RowPacket::Finished(ok));
    }
    if payload.is_empty() {
        return Err(Error::IncompleteMessage);
    }
    Ok(RowPacket::Row)
}

fn decode_packets<'a>(
    buffer: &'a [u8],
    columns: &[ColumnMeta],
    encoding: RowEncoding,
) -> Result<Vec<FieldView<'a>>> {
    let mut fields = Vec::new();
    let mut rest = buffer;
    while !rest.is_empty() {
        let len = u32::from_ne_bytes(rest[..4].try_into().expect("length prefix")) as usize;
        let payload = &rest[4..4 + len];
        match encoding {
            RowEncoding::Text => decode_text_row(payload, columns, &mut fields)?,
            RowEncoding::Binary => decode_binary_row(payload, columns, &mut fields)?,
        }
        rest = &rest[4 + len..];
    }
    Ok(fields)
}

/// One length-encoded string per column; a leading 0xFB byte denotes NULL.
fn decode_text_row<'a>(
    payload: &'a [u8],
    columns: &[ColumnMeta],
    fields: &mut Vec<FieldView<'a>>,
) -> Result<()> {
    let mut rest = payload;
    for meta in columns {
        if rest.first() == Some(&0xFB) {
            fields.push(FieldView::Null);
            rest = &rest[1..];
        } else {
            let (cell, after) = read_string_lenenc(rest)?;
            fields.push(decode_text_value(cell, meta)?);
            rest = after;
        }
    }
    if !rest.is_empty() {
        return Err(Error::ExtraBytes);
    }
    Ok(())
}

/// 0x00 tag, NULL bitmap with a 2-bit offset, then the binary values of the
/// non-NULL columns in order.
fn decode_binary_row<'a>(
    payload: &'a [u8],
    columns: &[ColumnMeta],
    fields: &mut Vec<FieldView<'a>>,
) -> Result<()> {
    let (tag, data) = read_int_1(payload)?;
    if tag != 0x00 {
        return Err(Error::ProtocolValue(format!(
            "binary row with tag 0x{:02x}",
            tag
        )));
    }

    let bitmap_len = NullBitmap::len_for(columns.len(), 2);
    let (bitmap, values) = read_string_fix(data, bitmap_len)?;
    let nulls = NullBitmap::for_resultset(bitmap);

    let mut rest = values;
    for (idx, meta) in columns.iter().enumerate() {
        if nulls.is_null(idx) {
            fields.push(FieldView::Null);
        } else {
            let (value, after) = decode_binary_value(meta, rest)?;
            fields.push(value);
            rest = after;
        }
    }
    if !rest.is_empty() {
        return Err(Error::ExtraBytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{ColumnFlags, ColumnType, StatusFlags};
    use crate::value::FieldValue;

    fn columns() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::for_test(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty(), 0),
            ColumnMeta::for_test(ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty(), 0),
        ]
    }

    fn ok() -> OkPayload {
        OkPayload {
            affected_rows: 2,
            last_insert_id: 9,
            status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
            warnings: 1,
            info: "done".to_string(),
        }
    }

    #[test]
    fn test_text_batch_decoding() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Text);
        core.begin_batch();
        core.push_row_packet(b"\x02-7\x05hello");
        core.push_row_packet(b"\x0242\xFB");
        core.decode_batch().unwrap();

        let batch = core.batch();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(
            batch.row(0),
            &[FieldView::Int(-7), FieldView::Bytes(b"hello")]
        );
        assert_eq!(batch.row(1), &[FieldView::Int(42), FieldView::Null]);
    }

    #[test]
    fn test_binary_batch_decoding() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Binary);
        core.begin_batch();

        // row: [5, NULL] — column 1 NULL = bit 3 of the bitmap byte
        let mut row = vec![0x00, 0b0000_1000];
        row.extend_from_slice(&5i32.to_le_bytes());
        core.push_row_packet(&row);
        core.decode_batch().unwrap();

        let batch = core.batch();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.row(0), &[FieldView::Int(5), FieldView::Null]);
    }

    #[test]
    fn test_text_row_extra_bytes_rejected() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Text);
        core.begin_batch();
        core.push_row_packet(b"\x011\x01x\x01y");
        assert!(matches!(core.decode_batch(), Err(Error::ExtraBytes)));
    }

    #[test]
    fn test_binary_row_bad_tag_rejected() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Binary);
        core.begin_batch();
        core.push_row_packet(&[0x01, 0x00, 0x00]);
        assert!(matches!(core.decode_batch(), Err(Error::ProtocolValue(_))));
    }

    #[test]
    fn test_take_batch_detaches_rows() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Text);
        core.begin_batch();
        core.push_row_packet(b"\x011\x03abc");
        core.decode_batch().unwrap();
        let rows = core.take_batch();

        // the core can start a new batch without touching the taken rows
        core.begin_batch();
        core.push_row_packet(b"\x012\x03xyz");
        core.decode_batch().unwrap();

        assert_eq!(rows.num_rows(), 1);
        assert_eq!(rows.row(0)[0], FieldView::Int(1));
        assert_eq!(rows.row(0)[1].to_owned(), FieldValue::from("abc"));
        assert_eq!(core.batch().row(0)[0], FieldView::Int(2));
    }

    #[test]
    fn test_terminal_state_accessors() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Text);
        assert!(core.is_reading_rows());
        assert_eq!(core.affected_rows(), None);

        core.set_complete(ok());
        assert!(core.is_complete());
        assert_eq!(core.affected_rows(), Some(2));
        assert_eq!(core.last_insert_id(), Some(9));
        assert_eq!(core.warning_count(), Some(1));
        assert_eq!(core.info(), Some("done"));
    }

    #[test]
    fn test_classify_terminal_forms() {
        // OK-as-EOF under DEPRECATE_EOF carries the full OK layout
        let ok = [0xFE, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00];
        match classify_row_packet(&ok, true).unwrap() {
            RowPacket::Finished(ok) => assert_eq!(ok.warnings, 1),
            other => panic!("expected Finished, got {:?}", other),
        }

        // a plain EOF packet has warnings first, then status
        let eof = [0xFE, 0x03, 0x00, 0x02, 0x00];
        match classify_row_packet(&eof, false).unwrap() {
            RowPacket::Finished(ok) => {
                assert_eq!(ok.warnings, 3);
                assert_eq!(ok.affected_rows, 0);
                assert!(ok
                    .status_flags
                    .contains(StatusFlags::SERVER_STATUS_AUTOCOMMIT));
            }
            other => panic!("expected Finished, got {:?}", other),
        }

        // a 9-byte 0xFE-led packet is a text row when EOF is still in use
        let row = [0xFE, 9, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(matches!(
            classify_row_packet(&row, false).unwrap(),
            RowPacket::Row
        ));

        assert!(matches!(
            classify_row_packet(b"\x01x", true).unwrap(),
            RowPacket::Row
        ));
    }

    #[test]
    fn test_failure_replays() {
        let mut core = ResultSetCore::new(columns(), RowEncoding::Text);
        core.set_failed(ErrPayload {
            error_code: 1317,
            sql_state: "70100".to_string(),
            message: "interrupted".to_string(),
        });
        assert!(matches!(core.failure(), Some(Error::Server(_))));
        assert!(matches!(core.failure(), Some(Error::Server(_))));
    }
}
