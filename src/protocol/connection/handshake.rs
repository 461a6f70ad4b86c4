use crate::constant::{CapabilityFlags, CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_REQUIRED};
use crate::error::{Error, Result};
use crate::protocol::auth;
use crate::protocol::packet::ErrPayloadBytes;
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::U32 as U32LE;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

const MAX_PACKET_SIZE: u32 = 16_777_216;
const CHARSET_UTF8MB4_GENERAL_CI: u8 = 45;

/// Initial handshake packet from the server (Protocol::HandshakeV10)
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub challenge: Vec<u8>,
    pub capabilities: CapabilityFlags,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

/// Read the server greeting
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    if payload.first() == Some(&0xFF) {
        // the server may refuse before greeting, e.g. too many connections
        return Err(ErrPayloadBytes(payload).into());
    }

    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version != 10 {
        return Err(Error::ServerUnsupported(format!(
            "handshake protocol version {}",
            protocol_version
        )));
    }

    let (server_version, data) = read_string_null(data)?;
    let (connection_id, data) = read_int_4(data)?;

    // first 8 bytes of the challenge
    let (challenge_head, data) = read_string_fix(data, 8)?;
    let (_filler, data) = read_int_1(data)?;

    let (cap_low, data) = read_int_2(data)?;
    let (charset, data) = read_int_1(data)?;
    let (status_flags, data) = read_int_2(data)?;
    let (cap_high, data) = read_int_2(data)?;
    let capabilities =
        CapabilityFlags::from_bits_truncate(((cap_high as u32) << 16) | cap_low as u32);

    let (challenge_len, data) = read_int_1(data)?;
    let (_reserved, data) = read_string_fix(data, 10)?;

    // remaining challenge bytes: max(13, declared - 8)
    let tail_len = (challenge_len as usize).saturating_sub(8).max(13);
    let (challenge_tail, data) = read_string_fix(data, tail_len)?;

    let mut challenge = Vec::with_capacity(challenge_head.len() + challenge_tail.len());
    challenge.extend_from_slice(challenge_head);
    challenge.extend_from_slice(challenge_tail);
    if challenge.last() == Some(&0) {
        challenge.pop();
    }

    let auth_plugin_name = if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        let (name, _rest) = read_string_null(data)?;
        String::from_utf8_lossy(name).into_owned()
    } else {
        String::new()
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version: String::from_utf8_lossy(server_version).into_owned(),
        connection_id,
        challenge,
        capabilities,
        charset,
        status_flags,
        auth_plugin_name,
    })
}

/// SSL request: the login-request prefix truncated at the reserved bytes,
/// sent before the TLS handshake begins.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
struct SslRequest {
    client_flag: U32LE,
    max_packet_size: U32LE,
    charset: u8,
    filler: [u8; 23],
}

fn write_ssl_request(out: &mut Vec<u8>, capabilities: CapabilityFlags) {
    let request = SslRequest {
        client_flag: U32LE::new(capabilities.bits()),
        max_packet_size: U32LE::new(MAX_PACKET_SIZE),
        charset: CHARSET_UTF8MB4_GENERAL_CI,
        filler: [0; 23],
    };
    out.extend_from_slice(request.as_bytes());
}

/// Write the login request (HandshakeResponse41)
fn write_login_request(
    out: &mut Vec<u8>,
    capabilities: CapabilityFlags,
    username: &str,
    auth_response: &[u8],
    database: Option<&str>,
    auth_plugin_name: &str,
) {
    write_int_4(out, capabilities.bits());
    write_int_4(out, MAX_PACKET_SIZE);
    write_int_1(out, CHARSET_UTF8MB4_GENERAL_CI);
    out.extend_from_slice(&[0u8; 23]);

    write_string_null(out, username);

    // always length-encoded: CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA is requested
    write_bytes_lenenc(out, auth_response);

    if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) {
        if let Some(db) = database {
            write_string_null(out, db);
        }
    }

    write_string_null(out, auth_plugin_name);
}

/// Auth switch request from the server
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub challenge: Vec<u8>,
}

/// Read an auth switch request (tag 0xFE, null-terminated plugin name,
/// rest-of-packet challenge)
pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest> {
    let (tag, data) = read_int_1(payload)?;
    if tag != 0xFE {
        return Err(Error::ProtocolValue(format!(
            "auth switch request with tag 0x{:02x}",
            tag
        )));
    }

    let (plugin_name, data) = read_string_null(data)?;
    let mut challenge = read_string_eof(data).to_vec();
    if challenge.last() == Some(&0) {
        challenge.pop();
    }

    Ok(AuthSwitchRequest {
        plugin_name: String::from_utf8_lossy(plugin_name).into_owned(),
        challenge,
    })
}

/// Connection facts captured once authentication succeeds.
#[derive(Debug, Clone)]
pub struct ConnectedSession {
    pub capabilities: CapabilityFlags,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_name: String,
}

/// What the frontend must do next.
#[derive(Debug)]
pub enum HandshakeStatus {
    /// Write these bytes as the next packet, then read the server's reply.
    /// An empty reply is still a packet (empty-password auth responses).
    Reply(Vec<u8>),
    /// Write these bytes, perform the TLS handshake on the transport, then
    /// call [`Handshake::tls_upgraded`] for the login request.
    UpgradeToTls(Vec<u8>),
    /// Read the next packet without writing anything.
    ReadMore,
    /// Authentication finished.
    Connected(ConnectedSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    AwaitGreeting,
    AwaitTlsUpgrade,
    AwaitAuthResult { secure: bool },
    AwaitFastAuthOk,
    Connected,
}

#[derive(Debug)]
struct SessionInfo {
    capabilities: CapabilityFlags,
    server_version: String,
    connection_id: u32,
    auth_plugin_name: String,
    plugin: String,
    challenge: Vec<u8>,
}

/// Sans-io connect/authenticate state machine.
///
/// The frontend reads one packet at a time, feeds the body to [`drive`],
/// and acts on the returned [`HandshakeStatus`]. The TLS upgrade is the
/// transport's job; the machine only sequences it.
///
/// [`drive`]: Handshake::drive
#[derive(Debug)]
pub struct Handshake {
    username: String,
    password: String,
    database: Option<String>,
    request_tls: bool,
    state: HandshakeState,
    session: Option<SessionInfo>,
}

impl Handshake {
    /// `request_tls` asks for the TLS upgrade; it only happens when the
    /// transport supports it and the server offers `CLIENT_SSL`.
    pub fn new(
        username: String,
        password: String,
        database: Option<String>,
        request_tls: bool,
    ) -> Self {
        Self {
            username,
            password,
            database,
            request_tls,
            state: HandshakeState::AwaitGreeting,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Connected
    }

    fn session(&self) -> &SessionInfo {
        self.session.as_ref().expect("handshake past greeting")
    }

    fn login_request(&self) -> Result<Vec<u8>> {
        let session = self.session();
        let auth_response = auth::compute_auth_response(
            &session.plugin,
            &self.password,
            &session.challenge,
        )?;
        let mut out = Vec::new();
        write_login_request(
            &mut out,
            session.capabilities,
            &self.username,
            &auth_response,
            self.database.as_deref(),
            &session.plugin,
        );
        Ok(out)
    }

    fn connected(&mut self) -> HandshakeStatus {
        self.state = HandshakeState::Connected;
        let session = self.session();
        HandshakeStatus::Connected(ConnectedSession {
            capabilities: session.capabilities,
            server_version: session.server_version.clone(),
            connection_id: session.connection_id,
            auth_plugin_name: session.auth_plugin_name.clone(),
        })
    }

    /// Call after the transport's TLS handshake completes; returns the login
    /// request to send over the now-encrypted stream.
    pub fn tls_upgraded(&mut self) -> Result<Vec<u8>> {
        debug_assert_eq!(self.state, HandshakeState::AwaitTlsUpgrade);
        let login = self.login_request()?;
        self.state = HandshakeState::AwaitAuthResult { secure: true };
        Ok(login)
    }

    pub fn drive(&mut self, payload: &[u8]) -> Result<HandshakeStatus> {
        match self.state {
            HandshakeState::AwaitGreeting => {
                let greeting = read_initial_handshake(payload)?;

                let missing = CAPABILITIES_REQUIRED - greeting.capabilities;
                if !missing.is_empty() {
                    return Err(Error::ServerUnsupported(format!(
                        "missing capabilities {:?}",
                        missing
                    )));
                }

                let mut requested = CAPABILITIES_ALWAYS_ENABLED;
                if self.database.is_some() {
                    requested |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
                }
                if self.request_tls {
                    requested |= CapabilityFlags::CLIENT_SSL;
                }
                let capabilities = requested & greeting.capabilities;

                tracing::debug!(
                    server_version = %greeting.server_version,
                    auth_plugin = %greeting.auth_plugin_name,
                    ?capabilities,
                    "greeting received"
                );

                self.session = Some(SessionInfo {
                    capabilities,
                    server_version: greeting.server_version,
                    connection_id: greeting.connection_id,
                    auth_plugin_name: greeting.auth_plugin_name.clone(),
                    plugin: greeting.auth_plugin_name,
                    challenge: greeting.challenge,
                });

                if capabilities.contains(CapabilityFlags::CLIENT_SSL) {
                    let mut out = Vec::new();
                    write_ssl_request(&mut out, capabilities);
                    self.state = HandshakeState::AwaitTlsUpgrade;
                    Ok(HandshakeStatus::UpgradeToTls(out))
                } else {
                    let login = self.login_request()?;
                    self.state = HandshakeState::AwaitAuthResult { secure: false };
                    Ok(HandshakeStatus::Reply(login))
                }
            }

            HandshakeState::AwaitTlsUpgrade => Err(Error::ProtocolValue(
                "packet received while waiting for the TLS upgrade".to_string(),
            )),

            HandshakeState::AwaitAuthResult { secure } => match payload.first() {
                None => Err(Error::IncompleteMessage),
                Some(0x00) => Ok(self.connected()),
                Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                Some(0xFE) => {
                    let switch = read_auth_switch_request(payload)?;
                    tracing::debug!(plugin = %switch.plugin_name, "auth switch requested");
                    let response = auth::compute_auth_response(
                        &switch.plugin_name,
                        &self.password,
                        &switch.challenge,
                    )?;
                    let session = self.session.as_mut().expect("handshake past greeting");
                    session.plugin = switch.plugin_name;
                    session.challenge = switch.challenge;
                    Ok(HandshakeStatus::Reply(response))
                }
                Some(0x01) => {
                    // auth-more-data: only caching-sha2 sends this
                    match auth::parse_fast_auth_signal(payload)? {
                        auth::FastAuthSignal::Success => {
                            self.state = HandshakeState::AwaitFastAuthOk;
                            Ok(HandshakeStatus::ReadMore)
                        }
                        auth::FastAuthSignal::FullAuthRequired => {
                            if secure {
                                Ok(HandshakeStatus::Reply(auth::cleartext_password(
                                    &self.password,
                                )))
                            } else {
                                Err(Error::AuthPluginRequiresSsl(
                                    self.session().plugin.clone(),
                                ))
                            }
                        }
                    }
                }
                Some(tag) => Err(Error::ProtocolValue(format!(
                    "unexpected auth result packet with tag 0x{:02x}",
                    tag
                ))),
            },

            HandshakeState::AwaitFastAuthOk => match payload.first() {
                Some(0x00) => Ok(self.connected()),
                Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                _ => Err(Error::ProtocolValue(
                    "expected OK after fast authentication".to_string(),
                )),
            },

            HandshakeState::Connected => Err(Error::ProtocolValue(
                "packet received after the handshake finished".to_string(),
            )),
        }
    }
}
