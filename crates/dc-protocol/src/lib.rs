//! Wire protocols of the BOINC and Folding@home client daemons.
//!
//! This crate knows how bytes are framed, how requests are encoded and how
//! replies are decoded into [`dc_core`] types. It holds no connection
//! state beyond a single [`FramedConnection`].

pub mod boinc;
pub mod codec;
pub mod error;
pub mod fah;
pub mod pyon;
pub mod transport;

pub use boinc::{
    decode_auth_reply, decode_nonce, decode_state, nonce_hash, render_request, AuthReply,
    BoincRequest, BOINC_TERMINATOR,
};
pub use codec::{BoincCodec, DelimitedFrames, FahCodec, MAX_FRAME_LEN};
pub use error::{DecodeError, FrameError};
pub use fah::{decode_auth_ack, decode_slots, decode_units, AuthAck, FahCommand, FAH_PROMPT};
pub use pyon::{decode_pyon, normalize_pyon};
pub use transport::FramedConnection;
