mod handshake;

pub use handshake::{
    read_auth_switch_request, read_initial_handshake, AuthSwitchRequest, ConnectedSession,
    Handshake, HandshakeStatus, InitialHandshake,
};
