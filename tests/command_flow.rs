//! End-to-end command flows against a scripted in-memory transport.
//!
//! The mock stream plays back pre-recorded server packets; the tests drive
//! the real connection code through handshake, queries, prepared
//! statements, and the error paths.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use lean_mysql::constant::{
    CapabilityFlags, ColumnFlags, ColumnType, CAPABILITIES_ALWAYS_ENABLED,
};
use lean_mysql::protocol::primitive::{write_bytes_lenenc, write_int_lenenc};
use lean_mysql::sync::Conn;
use lean_mysql::value::FieldView;
use lean_mysql::{Error, FieldValue, Opts};

// ─── Mock transport ──────────────────────────────────────────────────────

struct MockStream {
    input: Cursor<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(script: Vec<u8>) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                input: Cursor::new(script),
                written: Arc::clone(&written),
            },
            written,
        )
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ─── Server packet builders ──────────────────────────────────────────────

fn packet(seq: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes()[..3]);
    out.push(seq);
    out.extend_from_slice(body);
    out
}

fn greeting_body(caps: CapabilityFlags, plugin: &str) -> Vec<u8> {
    let mut out = vec![10];
    out.extend_from_slice(b"8.0.33-mock\0");
    out.extend_from_slice(&99u32.to_le_bytes());
    out.extend_from_slice(b"abcdefgh"); // challenge head
    out.push(0);
    out.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
    out.push(45);
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&((caps.bits() >> 16) as u16).to_le_bytes());
    out.push(21);
    out.extend_from_slice(&[0u8; 10]);
    out.extend_from_slice(b"ijklmnopqrst\0"); // challenge tail + NUL
    out.extend_from_slice(plugin.as_bytes());
    out.push(0);
    out
}

fn ok_body(tag: u8, affected_rows: u64, last_insert_id: u64) -> Vec<u8> {
    let mut out = vec![tag];
    write_int_lenenc(&mut out, affected_rows);
    write_int_lenenc(&mut out, last_insert_id);
    out.extend_from_slice(&2u16.to_le_bytes()); // autocommit
    out.extend_from_slice(&0u16.to_le_bytes()); // warnings
    out
}

fn err_body(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut out = vec![0xFF];
    out.extend_from_slice(&code.to_le_bytes());
    out.push(b'#');
    out.extend_from_slice(state.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

fn column_body(name: &str, column_type: ColumnType, flags: ColumnFlags) -> Vec<u8> {
    let mut out = Vec::new();
    for field in ["def", "db", "t", "t", name, name] {
        write_bytes_lenenc(&mut out, field.as_bytes());
    }
    out.push(0x0c);
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&11u32.to_le_bytes());
    out.push(column_type as u8);
    out.extend_from_slice(&flags.bits().to_le_bytes());
    out.push(0);
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn prepare_ok_body(statement_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend_from_slice(&statement_id.to_le_bytes());
    out.extend_from_slice(&num_columns.to_le_bytes());
    out.extend_from_slice(&num_params.to_le_bytes());
    out.push(0x00);
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// greeting + auth OK: the client's login request carries sequence 1, so
/// the server's verdict is sequence 2
fn handshake_script_with_caps(script: &mut Vec<u8>, caps: CapabilityFlags) {
    script.extend_from_slice(&packet(0, &greeting_body(caps, "mysql_native_password")));
    script.extend_from_slice(&packet(2, &ok_body(0x00, 0, 0)));
}

fn handshake_script(script: &mut Vec<u8>) {
    let caps = CAPABILITIES_ALWAYS_ENABLED | CapabilityFlags::CLIENT_CONNECT_WITH_DB;
    handshake_script_with_caps(script, caps);
}

fn connect(script: Vec<u8>) -> (Conn<MockStream>, Arc<Mutex<Vec<u8>>>) {
    let (stream, written) = MockStream::new(script);
    let mut opts = Opts::default();
    opts.user = "root".to_string();
    opts.password = Some("hola".to_string());
    let conn = Conn::handshake_with(stream, &opts).expect("handshake");
    (conn, written)
}

// ─── Tests ───────────────────────────────────────────────────────────────

#[test]
fn handshake_populates_connection_facts() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    let (conn, written) = connect(script);

    assert_eq!(conn.server_version(), "8.0.33-mock");
    assert_eq!(conn.connection_id(), 99);
    assert_eq!(conn.auth_plugin_name(), "mysql_native_password");
    assert!(conn
        .capability_flags()
        .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF));

    // the login request went out as packet sequence 1
    let written = written.lock().unwrap();
    assert_eq!(written[3], 1);
    // scramble is 20 bytes, length-encoded, after the 32-byte fixed prefix
    // and "root\0"
    assert_eq!(written[4 + 32 + 5], 20);
}

#[test]
fn text_query_streams_rows() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &[0x02])); // two columns
    script.extend_from_slice(&packet(
        2,
        &column_body("id", ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(
        3,
        &column_body("name", ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(4, b"\x011\x05alice"));
    script.extend_from_slice(&packet(5, b"\x012\xFB"));
    script.extend_from_slice(&packet(6, &ok_body(0xFE, 0, 0)));

    let (mut conn, _) = connect(script);
    let mut rs = conn.query("SELECT id, name FROM t").unwrap();

    assert_eq!(rs.meta().len(), 2);
    assert_eq!(rs.meta()[0].name(), "id");
    assert!(!rs.complete());

    let batch = rs.read_some_rows().unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.row(0), &[FieldView::Int(1), FieldView::Bytes(b"alice")]);

    let rows = rs.read_all().unwrap();
    assert_eq!(rows.num_rows(), 1);
    assert_eq!(rows.row(0), &[FieldView::Int(2), FieldView::Null]);

    assert!(rs.complete());
    assert_eq!(rs.affected_rows(), Some(0));
    assert_eq!(rs.warning_count(), Some(0));

    // drained: further reads yield empty batches
    let batch = rs.read_some_rows().unwrap();
    assert!(batch.is_empty());
}

#[test]
fn server_error_leaves_connection_usable() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    // first query fails with unknown table
    script.extend_from_slice(&packet(
        1,
        &err_body(1146, "42S02", "Table 'test.t' doesn't exist"),
    ));
    // second query succeeds
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("1", ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(3, b"\x011"));
    script.extend_from_slice(&packet(4, &ok_body(0xFE, 0, 0)));

    let (mut conn, _) = connect(script);

    let err = conn.query("SELECT * FROM t").unwrap_err();
    match err {
        Error::Server(e) => {
            assert_eq!(e.error_code, 1146);
            assert_eq!(e.sql_state, "42S02");
        }
        other => panic!("expected server error, got {:?}", other),
    }

    let mut rs = conn.query("SELECT 1").unwrap();
    let rows = rs.read_all().unwrap();
    assert_eq!(rows.num_rows(), 1);
    assert_eq!(rows.row(0)[0], FieldView::Int(1));
}

#[test]
fn immediate_ok_resultset_is_complete() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &ok_body(0x00, 3, 7)));

    let (mut conn, _) = connect(script);
    let rs = conn.query("DELETE FROM t").unwrap();
    assert!(rs.complete());
    assert_eq!(rs.affected_rows(), Some(3));
    assert_eq!(rs.last_insert_id(), Some(7));
    assert!(rs.meta().is_empty());
}

#[test]
fn prepared_statement_round_trip() {
    let mut script = Vec::new();
    handshake_script(&mut script);

    // prepare: 2 params, 1 result column
    script.extend_from_slice(&packet(1, &prepare_ok_body(4, 1, 2)));
    script.extend_from_slice(&packet(
        2,
        &column_body("?", ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(
        3,
        &column_body("?", ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(
        4,
        &column_body("n", ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::UNSIGNED_FLAG),
    ));

    // execute: one binary row then the terminal OK
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("n", ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::UNSIGNED_FLAG),
    ));
    let mut row = vec![0x00, 0x00];
    row.extend_from_slice(&42u64.to_le_bytes());
    script.extend_from_slice(&packet(3, &row));
    script.extend_from_slice(&packet(4, &ok_body(0xFE, 0, 0)));

    let (mut conn, written) = connect(script);

    let stmt = conn.prepare("SELECT n FROM t WHERE a = ? AND b = ?").unwrap();
    assert_eq!(stmt.id(), 4);
    assert_eq!(stmt.num_params(), 2);
    assert_eq!(stmt.num_columns(), 1);
    assert_eq!(stmt.param_meta().len(), 2);
    assert_eq!(stmt.column_meta().len(), 1);

    // wrong arity fails before any I/O
    let written_before = written.lock().unwrap().len();
    let err = conn.execute(&stmt, &[FieldValue::Int(1)]).unwrap_err();
    assert!(matches!(
        err,
        Error::WrongNumParams {
            expected: 2,
            got: 1
        }
    ));
    assert_eq!(written.lock().unwrap().len(), written_before);

    // correct arity executes and decodes the binary row
    let params = vec![FieldValue::Int(1), FieldValue::from("x")];
    let mut rs = conn.execute(&stmt, &params).unwrap();
    let rows = rs.read_all().unwrap();
    assert_eq!(rows.num_rows(), 1);
    assert_eq!(rows.row(0)[0], FieldView::Uint(42));
    assert!(rs.complete());
}

#[test]
fn closed_statement_is_rejected() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &prepare_ok_body(11, 0, 0)));

    let (mut conn, written) = connect(script);
    let mut stmt = conn.prepare("DO 1").unwrap();

    // COM_STMT_CLOSE has no response
    conn.close_statement(&mut stmt).unwrap();
    assert!(stmt.is_closed());
    {
        let written = written.lock().unwrap();
        let close_frame = &written[written.len() - 9..];
        assert_eq!(close_frame[4], 0x19);
        assert_eq!(&close_frame[5..9], &11u32.to_le_bytes());
    }

    // closing again is a no-op
    conn.close_statement(&mut stmt).unwrap();

    let written_before = written.lock().unwrap().len();
    assert!(matches!(
        conn.execute(&stmt, &[]),
        Err(Error::StatementNotValid)
    ));
    assert_eq!(written.lock().unwrap().len(), written_before);
}

#[test]
fn undrained_resultset_blocks_next_command() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("c", ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
    ));

    let (mut conn, _) = connect(script);
    let rs = conn.query("SELECT c FROM t").unwrap();
    drop(rs); // rows never drained

    assert!(matches!(
        conn.query("SELECT 1"),
        Err(Error::SyncViolation)
    ));
}

#[test]
fn sequence_skew_poisons_the_connection() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    // the query response arrives with sequence 9 instead of 1
    script.extend_from_slice(&packet(9, &ok_body(0x00, 0, 0)));
    // a well-formed response that must never be reached
    script.extend_from_slice(&packet(1, &ok_body(0x00, 0, 0)));

    let (mut conn, _) = connect(script);

    assert!(matches!(
        conn.query("SELECT 1"),
        Err(Error::SequenceNumberMismatch {
            expected: 1,
            got: 9
        })
    ));

    // the same error replays on every later operation
    assert!(matches!(
        conn.ping(),
        Err(Error::SequenceNumberMismatch {
            expected: 1,
            got: 9
        })
    ));
    assert!(matches!(
        conn.query("SELECT 1"),
        Err(Error::SequenceNumberMismatch { .. })
    ));
}

#[test]
fn ping_and_quit() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &ok_body(0x00, 0, 0)));

    let (mut conn, written) = connect(script);
    conn.ping().unwrap();
    conn.quit().unwrap();

    let written = written.lock().unwrap();
    // quit is a one-byte command in a fresh packet with sequence 0
    let quit_frame = &written[written.len() - 5..];
    assert_eq!(quit_frame, &[0x01, 0x00, 0x00, 0x00, 0x01]);
}

#[test]
fn error_during_row_stream_fails_the_resultset() {
    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("c", ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(3, b"\x011"));
    script.extend_from_slice(&packet(
        4,
        &err_body(1317, "70100", "Query execution was interrupted"),
    ));
    // next command succeeds: a server error is not fatal
    script.extend_from_slice(&packet(1, &ok_body(0x00, 0, 0)));

    let (mut conn, _) = connect(script);
    let mut rs = conn.query("SELECT c FROM t").unwrap();

    let batch = rs.read_some_rows().unwrap();
    assert_eq!(batch.num_rows(), 1);

    let err = rs.read_some_rows().unwrap_err();
    assert!(matches!(&err, Error::Server(e) if e.error_code == 1317));
    // the failure replays on the cursor
    assert!(matches!(rs.read_some_rows(), Err(Error::Server(_))));
    assert!(!rs.complete());
    drop(rs);

    conn.ping().unwrap();
}

#[test]
fn eof_packets_are_honored_without_deprecate_eof() {
    let caps = CAPABILITIES_ALWAYS_ENABLED - CapabilityFlags::CLIENT_DEPRECATE_EOF;
    let mut script = Vec::new();
    handshake_script_with_caps(&mut script, caps);

    let eof = [0xFE, 0x00, 0x00, 0x02, 0x00];
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("c", ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(3, &eof)); // closes the column block
    script.extend_from_slice(&packet(4, b"\x015"));
    script.extend_from_slice(&packet(5, &eof)); // terminates the resultset

    let (mut conn, _) = connect(script);
    assert!(!conn
        .capability_flags()
        .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF));

    let mut rs = conn.query("SELECT c FROM t").unwrap();
    let rows = rs.read_all().unwrap();
    assert_eq!(rows.num_rows(), 1);
    assert_eq!(rows.row(0)[0], FieldView::Int(5));
    assert!(rs.complete());
    assert_eq!(rs.warning_count(), Some(0));
}

// ─── Async mirror ────────────────────────────────────────────────────────

#[tokio::test]
async fn async_query_has_identical_semantics() {
    use tokio::io::AsyncWriteExt;

    let mut script = Vec::new();
    handshake_script(&mut script);
    script.extend_from_slice(&packet(
        1,
        &err_body(1146, "42S02", "Table 'test.t' doesn't exist"),
    ));
    script.extend_from_slice(&packet(1, &[0x01]));
    script.extend_from_slice(&packet(
        2,
        &column_body("1", ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::empty()),
    ));
    script.extend_from_slice(&packet(3, b"\x011"));
    script.extend_from_slice(&packet(4, &ok_body(0xFE, 0, 0)));

    let (client, mut server) = tokio::io::duplex(1 << 20);
    server.write_all(&script).await.unwrap();

    let mut opts = Opts::default();
    opts.user = "root".to_string();
    opts.password = Some("hola".to_string());

    let mut conn = lean_mysql::tokio::Conn::handshake_with(client, &opts)
        .await
        .unwrap();
    assert_eq!(conn.server_version(), "8.0.33-mock");

    let err = conn.query("SELECT * FROM t").await.unwrap_err();
    assert!(matches!(&err, Error::Server(e) if e.error_code == 1146));

    let mut rs = conn.query("SELECT 1").await.unwrap();
    let rows = rs.read_all().await.unwrap();
    assert_eq!(rows.num_rows(), 1);
    assert_eq!(rows.row(0)[0], FieldView::Int(1));
    assert!(rs.complete());
}
