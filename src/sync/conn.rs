use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::instrument;
use zerocopy::{FromZeros, IntoBytes};

use crate::constant::CapabilityFlags;
use crate::error::{Error, Poison, Result};
use crate::opts::Opts;
use crate::protocol::command::prepared::{
    write_close_statement, write_execute, write_prepare, Prepare, PrepareEvent, PrepareOk,
};
use crate::protocol::command::query::write_query;
use crate::protocol::command::resultset::{ResponseEvent, ResultSetResponse, RowEncoding};
use crate::protocol::command::utility::{write_ping, write_quit};
use crate::protocol::command::ColumnMeta;
use crate::protocol::connection::{ConnectedSession, Handshake, HandshakeStatus};
use crate::protocol::packet::{
    build_frames, ErrPayloadBytes, OkPayloadBytes, PacketHeader, MAX_PACKET_BODY,
};
use crate::protocol::response::OkPayload;
use crate::resultset::{classify_row_packet, ResultSetCore, RowPacket};
use crate::row::{Rows, RowsView};
use crate::statement::Statement;
use crate::sync::stream::Stream;
use crate::value::FieldValue;

/// A blocking MySQL connection.
///
/// Generic over the byte stream so the protocol engine never opens sockets
/// itself; [`Conn::connect`] is the convenience constructor that does.
pub struct Conn<S = Stream> {
    stream: S,
    sequence_id: u8,
    read_buffer: Vec<u8>,
    write_buffer: Vec<u8>,
    frame_buffer: Vec<u8>,
    capabilities: CapabilityFlags,
    server_version: String,
    connection_id: u32,
    auth_plugin_name: String,
    poison: Option<Poison>,
    /// A resultset has been started and not drained to its terminal state.
    dirty_resultset: bool,
}

impl Conn<Stream> {
    /// Connect over TCP (or a unix socket) and authenticate, upgrading to
    /// TLS when the options ask for it and the server offers it.
    pub fn connect<O>(opts: O) -> Result<Self>
    where
        O: TryInto<Opts>,
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;

        #[cfg(not(feature = "tls"))]
        if opts.tls {
            return Err(Error::BadConfig(
                "TLS requested but the `tls` feature is disabled".to_string(),
            ));
        }

        #[cfg(unix)]
        if let Some(socket) = &opts.socket {
            let stream = Stream::unix(std::os::unix::net::UnixStream::connect(socket)?);
            return Self::handshake_over(stream, &opts);
        }

        let host = opts
            .host
            .as_deref()
            .ok_or_else(|| Error::BadConfig("missing host in connection options".to_string()))?;
        let tcp = TcpStream::connect((host, opts.port))?;
        tcp.set_nodelay(opts.tcp_nodelay)?;

        Self::handshake_over(Stream::tcp(tcp), &opts)
    }

    // Drives the handshake over the stream enum, acting on the TLS upgrade
    // when the state machine requests it.
    fn handshake_over(mut stream: Stream, opts: &Opts) -> Result<Conn<Stream>> {
        let mut sequence_id = 0u8;
        let mut read_buffer = Vec::new();
        let mut frame_buffer = Vec::new();

        let mut handshake = Handshake::new(
            opts.user.clone(),
            opts.password.clone().unwrap_or_default(),
            opts.db.clone(),
            opts.tls,
        );

        let session = loop {
            read_message(&mut stream, &mut read_buffer, &mut sequence_id)?;
            match handshake.drive(&read_buffer)? {
                HandshakeStatus::Reply(body) => {
                    write_message(&mut stream, &mut frame_buffer, &body, &mut sequence_id)?;
                }
                HandshakeStatus::UpgradeToTls(ssl_request) => {
                    write_message(&mut stream, &mut frame_buffer, &ssl_request, &mut sequence_id)?;
                    #[cfg(feature = "tls")]
                    {
                        let host = opts.host.as_deref().unwrap_or_default();
                        stream = stream.upgrade_to_tls(host)?;
                        let login = handshake.tls_upgraded()?;
                        write_message(&mut stream, &mut frame_buffer, &login, &mut sequence_id)?;
                    }
                    #[cfg(not(feature = "tls"))]
                    return Err(Error::BadConfig(
                        "TLS requested but the `tls` feature is disabled".to_string(),
                    ));
                }
                HandshakeStatus::ReadMore => {}
                HandshakeStatus::Connected(session) => break session,
            }
        };

        Ok(Conn::from_session(
            stream,
            session,
            read_buffer,
            frame_buffer,
        ))
    }
}

impl<S: Read + Write> Conn<S> {
    /// Authenticate over an already-connected byte stream.
    ///
    /// The stream is treated as insecure: no TLS upgrade is attempted and
    /// caching-SHA2 full authentication fails with `AuthPluginRequiresSsl`.
    pub fn handshake_with(mut stream: S, opts: &Opts) -> Result<Self> {
        let mut sequence_id = 0u8;
        let mut read_buffer = Vec::new();
        let mut frame_buffer = Vec::new();

        let mut handshake = Handshake::new(
            opts.user.clone(),
            opts.password.clone().unwrap_or_default(),
            opts.db.clone(),
            false,
        );

        let session = loop {
            read_message(&mut stream, &mut read_buffer, &mut sequence_id)?;
            match handshake.drive(&read_buffer)? {
                HandshakeStatus::Reply(body) => {
                    write_message(&mut stream, &mut frame_buffer, &body, &mut sequence_id)?;
                }
                HandshakeStatus::UpgradeToTls(_) => {
                    // unreachable: the machine was built with request_tls off
                    return Err(Error::BadConfig(
                        "TLS upgrade is not available on this stream".to_string(),
                    ));
                }
                HandshakeStatus::ReadMore => {}
                HandshakeStatus::Connected(session) => break session,
            }
        };

        Ok(Self::from_session(
            stream,
            session,
            read_buffer,
            frame_buffer,
        ))
    }

    fn from_session(
        stream: S,
        session: ConnectedSession,
        read_buffer: Vec<u8>,
        frame_buffer: Vec<u8>,
    ) -> Self {
        tracing::debug!(
            server_version = %session.server_version,
            connection_id = session.connection_id,
            "connected"
        );
        Self {
            stream,
            sequence_id: 0,
            read_buffer,
            write_buffer: Vec::new(),
            frame_buffer,
            capabilities: session.capabilities,
            server_version: session.server_version,
            connection_id: session.connection_id,
            auth_plugin_name: session.auth_plugin_name,
            poison: None,
            dirty_resultset: false,
        }
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn capability_flags(&self) -> CapabilityFlags {
        self.capabilities
    }

    /// Connection (thread) id assigned by the server
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Auth plugin the server advertised in its greeting
    pub fn auth_plugin_name(&self) -> &str {
        &self.auth_plugin_name
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    // ─── Channel ─────────────────────────────────────────────────────────

    fn check_usable(&self) -> Result<()> {
        match &self.poison {
            Some(poison) => Err(poison.into()),
            None => Ok(()),
        }
    }

    /// Record a fatal error so later operations replay it, then return it.
    fn fail<T>(&mut self, err: Error) -> Result<T> {
        if self.poison.is_none() {
            self.poison = err.to_poison();
        }
        Err(err)
    }

    fn read_packet(&mut self) -> Result<()> {
        match read_message(&mut self.stream, &mut self.read_buffer, &mut self.sequence_id) {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn send_command(&mut self) -> Result<()> {
        let body = std::mem::take(&mut self.write_buffer);
        let result = write_message(
            &mut self.stream,
            &mut self.frame_buffer,
            &body,
            &mut self.sequence_id,
        );
        self.write_buffer = body;
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    /// Every command starts here: poison and drain checks, then the
    /// per-command sequence number reset.
    fn begin_command(&mut self) -> Result<()> {
        self.check_usable()?;
        if self.dirty_resultset {
            return Err(Error::SyncViolation);
        }
        self.sequence_id = 0;
        self.write_buffer.clear();
        Ok(())
    }

    // ─── Commands ────────────────────────────────────────────────────────

    /// Execute a text-protocol query and return its resultset cursor.
    #[instrument(skip_all)]
    pub fn query(&mut self, sql: &str) -> Result<ResultSet<'_, S>> {
        self.begin_command()?;
        write_query(&mut self.write_buffer, sql);
        self.send_command()?;

        let core = self.read_resultset_header(RowEncoding::Text)?;
        Ok(ResultSet { conn: self, core })
    }

    /// Prepare a statement and fetch its parameter/column metadata.
    #[instrument(skip_all)]
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.begin_command()?;
        write_prepare(&mut self.write_buffer, sql);
        self.send_command()?;

        let mut machine = Prepare::new(self.deprecate_eof());
        let mut prepare_ok: Option<PrepareOk> = None;
        let mut param_meta = Vec::new();
        let mut column_meta = Vec::new();

        while !machine.is_finished() {
            self.read_packet()?;

            enum Step {
                Ok(PrepareOk),
                Param(ColumnMeta),
                Column(ColumnMeta),
                Nothing,
            }

            let step = match machine.drive(&self.read_buffer) {
                Ok(PrepareEvent::Ok(ok)) => Ok(Step::Ok(ok)),
                Ok(PrepareEvent::ParamColumn(payload)) => ColumnMeta::parse(payload).map(Step::Param),
                Ok(PrepareEvent::ResultColumn(payload)) => {
                    ColumnMeta::parse(payload).map(Step::Column)
                }
                Ok(PrepareEvent::Eof) => Ok(Step::Nothing),
                Err(err) => Err(err),
            };

            match step {
                Ok(Step::Ok(ok)) => {
                    param_meta.reserve(ok.num_params() as usize);
                    column_meta.reserve(ok.num_columns() as usize);
                    prepare_ok = Some(ok);
                }
                Ok(Step::Param(meta)) => param_meta.push(meta),
                Ok(Step::Column(meta)) => column_meta.push(meta),
                Ok(Step::Nothing) => {}
                Err(err) => return self.fail_command(err),
            }
        }

        let ok = prepare_ok.ok_or(Error::IncompleteMessage)?;
        Ok(Statement::new(
            ok.statement_id(),
            ok.num_params(),
            ok.num_columns(),
            param_meta,
            column_meta,
            self.connection_id,
        ))
    }

    /// Execute a prepared statement. The parameter arity is checked before
    /// any byte reaches the transport.
    #[instrument(skip_all, fields(statement_id = stmt.id()))]
    pub fn execute(&mut self, stmt: &Statement, params: &[FieldValue]) -> Result<ResultSet<'_, S>> {
        if stmt.is_closed() || stmt.connection_id() != self.connection_id {
            return Err(Error::StatementNotValid);
        }
        if params.len() != stmt.num_params() {
            return Err(Error::WrongNumParams {
                expected: stmt.num_params(),
                got: params.len(),
            });
        }

        self.begin_command()?;
        write_execute(&mut self.write_buffer, stmt.id(), params);
        self.send_command()?;

        let core = self.read_resultset_header(RowEncoding::Binary)?;
        Ok(ResultSet { conn: self, core })
    }

    /// Deallocate a prepared statement on the server. No response is sent.
    #[instrument(skip_all, fields(statement_id = stmt.id()))]
    pub fn close_statement(&mut self, stmt: &mut Statement) -> Result<()> {
        if stmt.is_closed() {
            return Ok(());
        }
        if stmt.connection_id() != self.connection_id {
            return Err(Error::StatementNotValid);
        }

        self.begin_command()?;
        write_close_statement(&mut self.write_buffer, stmt.id());
        self.send_command()?;
        stmt.mark_closed();
        Ok(())
    }

    /// Check that the server is alive.
    #[instrument(skip_all)]
    pub fn ping(&mut self) -> Result<()> {
        self.begin_command()?;
        write_ping(&mut self.write_buffer);
        self.send_command()?;

        self.read_packet()?;
        if let Some(err_bytes) = ErrPayloadBytes::try_from_payload(&self.read_buffer) {
            return Err(err_bytes.into());
        }
        let parsed = match OkPayloadBytes::try_from_payload(&self.read_buffer) {
            Some(ok_bytes) => OkPayload::try_from(ok_bytes),
            None => Err(Error::ProtocolValue(
                "unexpected response to ping".to_string(),
            )),
        };
        match parsed {
            Ok(_) => Ok(()),
            Err(err) => self.fail_command(err),
        }
    }

    /// Tell the server we are leaving and consume the connection.
    #[instrument(skip_all)]
    pub fn quit(mut self) -> Result<()> {
        self.begin_command()?;
        write_quit(&mut self.write_buffer);
        self.send_command()
    }

    // Reads the packets between the command request and the first row:
    // either an immediate OK, or column count + definitions (+ EOF).
    fn read_resultset_header(&mut self, encoding: RowEncoding) -> Result<ResultSetCore> {
        let mut response = ResultSetResponse::new(self.deprecate_eof());
        let mut columns: Vec<ColumnMeta> = Vec::new();

        loop {
            self.read_packet()?;

            enum Step {
                Done(OkPayload),
                Column(ColumnMeta),
                Nothing,
            }

            let step = match response.drive(&self.read_buffer) {
                Ok(ResponseEvent::NoResultSet(ok_bytes)) => OkPayload::try_from(ok_bytes).map(Step::Done),
                Ok(ResponseEvent::ColumnCount(count)) => {
                    columns.reserve(count);
                    Ok(Step::Nothing)
                }
                Ok(ResponseEvent::Column(payload)) => ColumnMeta::parse(payload).map(Step::Column),
                Ok(ResponseEvent::ColumnsEnd) => Ok(Step::Nothing),
                Err(err) => Err(err),
            };

            match step {
                Ok(Step::Done(ok)) => return Ok(ResultSetCore::already_complete(ok)),
                Ok(Step::Column(meta)) => columns.push(meta),
                Ok(Step::Nothing) => {}
                Err(err) => return self.fail_command(err),
            }

            if response.is_reading_rows() {
                self.dirty_resultset = true;
                return Ok(ResultSetCore::new(columns, encoding));
            }
        }
    }

    // A command-level failure: poison for fatal errors, plain return for
    // server errors.
    fn fail_command<T>(&mut self, err: Error) -> Result<T> {
        if err.is_fatal() {
            self.fail(err)
        } else {
            Err(err)
        }
    }
}

/// A streamed resultset bound to its connection.
///
/// The connection cannot issue another command until this cursor reaches a
/// terminal state; dropping it early leaves the connection in a state where
/// the next command fails with `SyncViolation`.
pub struct ResultSet<'a, S = Stream> {
    conn: &'a mut Conn<S>,
    core: ResultSetCore,
}

impl<'a, S> std::fmt::Debug for ResultSet<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet").field("core", &self.core).finish()
    }
}

impl<'a, S: Read + Write> ResultSet<'a, S> {
    /// Read the next batch of rows as views into this resultset's buffer.
    ///
    /// Returns an empty batch once the resultset is complete. The views are
    /// invalidated by the next read call.
    pub fn read_some_rows(&mut self) -> Result<RowsView<'_>> {
        if let Some(err) = self.core.failure() {
            return Err(err);
        }
        self.core.begin_batch();
        if self.core.is_complete() {
            return Ok(self.core.batch());
        }
        self.conn.check_usable()?;

        self.conn.read_packet()?;
        match classify_row_packet(&self.conn.read_buffer, self.conn.deprecate_eof()) {
            Ok(RowPacket::Row) => {
                self.core.push_row_packet(&self.conn.read_buffer);
                if let Err(err) = self.core.decode_batch() {
                    return self.conn.fail(err);
                }
            }
            Ok(RowPacket::Finished(ok)) => {
                self.core.set_complete(ok);
                self.conn.dirty_resultset = false;
            }
            Ok(RowPacket::Failed(err)) => {
                self.core.set_failed(err.clone());
                self.conn.dirty_resultset = false;
                return Err(Error::Server(err));
            }
            Err(err) => return self.conn.fail(err),
        }
        Ok(self.core.batch())
    }

    /// Drain the resultset and return every remaining row, detached from
    /// the connection buffers.
    pub fn read_all(&mut self) -> Result<Rows> {
        if let Some(err) = self.core.failure() {
            return Err(err);
        }
        self.core.begin_batch();
        if self.core.is_complete() {
            return Ok(Rows::empty(self.core.columns().len()));
        }
        self.conn.check_usable()?;

        loop {
            self.conn.read_packet()?;
            match classify_row_packet(&self.conn.read_buffer, self.conn.deprecate_eof()) {
                Ok(RowPacket::Row) => self.core.push_row_packet(&self.conn.read_buffer),
                Ok(RowPacket::Finished(ok)) => {
                    self.core.set_complete(ok);
                    self.conn.dirty_resultset = false;
                    break;
                }
                Ok(RowPacket::Failed(err)) => {
                    self.core.set_failed(err.clone());
                    self.conn.dirty_resultset = false;
                    return Err(Error::Server(err));
                }
                Err(err) => return self.conn.fail(err),
            }
        }

        if let Err(err) = self.core.decode_batch() {
            return self.conn.fail(err);
        }
        Ok(self.core.take_batch())
    }

    /// Whether the resultset was drained to its OK packet.
    pub fn complete(&self) -> bool {
        self.core.is_complete()
    }

    /// Column metadata of the current resultset.
    pub fn meta(&self) -> &[ColumnMeta] {
        self.core.columns()
    }

    /// Affected row count from the terminal OK, available once complete.
    pub fn affected_rows(&self) -> Option<u64> {
        self.core.affected_rows()
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.core.last_insert_id()
    }

    pub fn warning_count(&self) -> Option<u16> {
        self.core.warning_count()
    }

    pub fn info(&self) -> Option<&str> {
        self.core.info()
    }
}

/// Read one logical message into `buffer`, reassembling 16MB fragments and
/// enforcing the sequence number of every fragment.
pub(crate) fn read_message<S: Read>(
    stream: &mut S,
    buffer: &mut Vec<u8>,
    sequence_id: &mut u8,
) -> Result<()> {
    buffer.clear();
    let mut header = PacketHeader::new_zeroed();

    loop {
        stream.read_exact(header.as_mut_bytes())?;
        if header.sequence_id != *sequence_id {
            return Err(Error::SequenceNumberMismatch {
                expected: *sequence_id,
                got: header.sequence_id,
            });
        }
        *sequence_id = sequence_id.wrapping_add(1);

        let length = header.length();
        let start = buffer.len();
        buffer.resize(start + length, 0);
        stream.read_exact(&mut buffer[start..])?;

        if length < MAX_PACKET_BODY {
            return Ok(());
        }
    }
}

/// Frame `body` and write it in one call; sends are atomic at the message
/// level, so any error here poisons the connection.
pub(crate) fn write_message<S: Write>(
    stream: &mut S,
    frame_buffer: &mut Vec<u8>,
    body: &[u8],
    sequence_id: &mut u8,
) -> Result<()> {
    frame_buffer.clear();
    build_frames(frame_buffer, body, sequence_id);
    stream.write_all(frame_buffer)?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(len: usize) {
        let body: Vec<u8> = (0..len).map(|i| i as u8).collect();

        let mut wire = Vec::new();
        let mut seq = 0u8;
        write_message(&mut wire, &mut Vec::new(), &body, &mut seq).unwrap();

        let mut read_back = Vec::new();
        let mut read_seq = 0u8;
        read_message(&mut Cursor::new(&wire), &mut read_back, &mut read_seq).unwrap();

        assert_eq!(read_back, body, "length {}", len);
        assert_eq!(read_seq, seq, "sequence advanced identically");
    }

    #[test]
    fn test_message_round_trip_boundaries() {
        // including the mandatory-trailing-empty-packet boundary
        for len in [0usize, 1, MAX_PACKET_BODY - 1, MAX_PACKET_BODY, MAX_PACKET_BODY + 1] {
            round_trip(len);
        }
    }

    #[test]
    fn test_read_rejects_sequence_skew() {
        let mut wire = Vec::new();
        let mut seq = 5u8; // server stamped 5 where 0 was expected
        write_message(&mut wire, &mut Vec::new(), b"hello", &mut seq).unwrap();

        let mut buffer = Vec::new();
        let mut expected_seq = 0u8;
        let err = read_message(&mut Cursor::new(&wire), &mut buffer, &mut expected_seq).unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceNumberMismatch {
                expected: 0,
                got: 5
            }
        ));
    }

    #[test]
    fn test_read_rejects_skew_on_follow_up_fragment() {
        // first fragment full-size with seq 0, continuation stamped 7
        let mut wire = Vec::new();
        let mut seq = 0u8;
        write_message(&mut wire, &mut Vec::new(), &vec![0u8; MAX_PACKET_BODY], &mut seq).unwrap();
        let trailer_header_at = 4 + MAX_PACKET_BODY;
        wire[trailer_header_at + 3] = 7;

        let mut buffer = Vec::new();
        let mut expected_seq = 0u8;
        let err = read_message(&mut Cursor::new(&wire), &mut buffer, &mut expected_seq).unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceNumberMismatch {
                expected: 1,
                got: 7
            }
        ));
    }

    #[test]
    fn test_truncated_message_is_io_error() {
        let mut wire = Vec::new();
        let mut seq = 0u8;
        write_message(&mut wire, &mut Vec::new(), b"hello world", &mut seq).unwrap();
        wire.truncate(wire.len() - 3);

        let mut buffer = Vec::new();
        let mut expected_seq = 0u8;
        assert!(matches!(
            read_message(&mut Cursor::new(&wire), &mut buffer, &mut expected_seq),
            Err(Error::Io(_))
        ));
    }
}
