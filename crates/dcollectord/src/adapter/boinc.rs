//! BOINC GUI-RPC adapter.
//!
//! Handshake: `auth1` -> nonce -> `auth2` with `md5(nonce + password)` ->
//! ack. A fetch cycle is a single `get_state` exchange.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use dc_core::{ClientConfig, PollError, ProtocolFamily, StateSnapshot};
use dc_protocol::{
    decode_auth_reply, decode_nonce, decode_state, AuthReply, BoincCodec, BoincRequest,
    FrameError, FramedConnection,
};

use super::{AdapterTimeouts, FetchFailure, FrameLog, LiveConnection, ProtocolAdapter, DEFAULT_IO_TIMEOUT};

/// Connect timeout of the GUI-RPC port.
pub const BOINC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BoincAdapter {
    timeouts: AdapterTimeouts,
}

impl BoincAdapter {
    pub fn new() -> Self {
        Self::with_timeouts(AdapterTimeouts {
            connect: BOINC_CONNECT_TIMEOUT,
            io: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_timeouts(timeouts: AdapterTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> AdapterTimeouts {
        self.timeouts
    }
}

impl Default for BoincAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for BoincAdapter {
    type Connection = BoincConnection;

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Boinc
    }

    async fn connect(&self, config: &ClientConfig) -> Result<BoincConnection, PollError> {
        config.validate()?;

        let conn = FramedConnection::connect(
            &config.address,
            config.port,
            self.timeouts.connect,
            self.timeouts.io,
            BoincCodec::new(),
        )
        .await
        .map_err(|e| PollError::connect(format!("{}: {e}", config.endpoint())))?;

        let mut connection = BoincConnection {
            conn,
            log: FrameLog::new(config),
        };

        match connection.authenticate(&config.password).await {
            Ok(()) => Ok(connection),
            Err(err) => {
                connection.disconnect().await;
                Err(err)
            }
        }
    }
}

/// An authenticated GUI-RPC session.
pub struct BoincConnection {
    conn: FramedConnection<BoincCodec>,
    log: FrameLog,
}

impl BoincConnection {
    async fn exchange(&mut self, request: BoincRequest) -> Result<Bytes, FrameError> {
        self.log.sent(&request.name());
        let frame = self.conn.request(request).await?;
        self.log.received(&frame);
        Ok(frame)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), PollError> {
        let frame = self
            .exchange(BoincRequest::Auth1)
            .await
            .map_err(|e| PollError::auth(format!("auth1: {e}")))?;
        let nonce = decode_nonce(&frame).map_err(|e| PollError::auth(format!("auth1: {e}")))?;

        let frame = self
            .exchange(BoincRequest::auth2(&nonce, password))
            .await
            .map_err(|e| PollError::auth(format!("auth2: {e}")))?;
        let reply = decode_auth_reply(&frame).map_err(|e| PollError::auth(format!("auth2: {e}")))?;

        match reply {
            AuthReply::Unauthorized => Err(PollError::auth("unauthorized")),
            AuthReply::Authorized => Ok(()),
            AuthReply::Other(elements) => {
                debug!(?elements, "auth2 reply without verdict, accepting");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LiveConnection for BoincConnection {
    async fn fetch_state(&mut self, _current: &StateSnapshot) -> Result<StateSnapshot, FetchFailure> {
        let frame = self
            .exchange(BoincRequest::GetState)
            .await
            .map_err(|e| FetchFailure::keep(PollError::fetch(format!("get_state: {e}"))))?;

        match decode_state(&frame) {
            Ok(state) => Ok(StateSnapshot::Boinc(state)),
            Err(e) => Err(FetchFailure::replace(
                PollError::decode(format!("get_state: {e}")),
                StateSnapshot::empty(ProtocolFamily::Boinc),
            )),
        }
    }

    async fn disconnect(self) {
        self.conn.shutdown().await;
    }
}
