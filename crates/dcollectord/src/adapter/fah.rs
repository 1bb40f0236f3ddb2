//! Folding@home command server adapter.
//!
//! Handshake: drain the banner, then `auth <password>`, sent even when the
//! password is empty. A fetch cycle is `slot-info` followed by `queue-info`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use dc_core::{ClientConfig, FahState, PollError, ProtocolFamily, Slot, StateSnapshot, Unit};
use dc_protocol::{
    decode_auth_ack, decode_slots, decode_units, AuthAck, FahCodec, FahCommand, FrameError,
    FramedConnection,
};

use super::{AdapterTimeouts, FetchFailure, FrameLog, LiveConnection, ProtocolAdapter, DEFAULT_IO_TIMEOUT};

/// Connect timeout of the command server port.
pub const FAH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FahAdapter {
    timeouts: AdapterTimeouts,
}

impl FahAdapter {
    pub fn new() -> Self {
        Self::with_timeouts(AdapterTimeouts {
            connect: FAH_CONNECT_TIMEOUT,
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

impl Default for FahAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for FahAdapter {
    type Connection = FahConnection;

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Fah
    }

    async fn connect(&self, config: &ClientConfig) -> Result<FahConnection, PollError> {
        config.validate()?;

        let conn = FramedConnection::connect(
            &config.address,
            config.port,
            self.timeouts.connect,
            self.timeouts.io,
            FahCodec::new(),
        )
        .await
        .map_err(|e| PollError::connect(format!("{}: {e}", config.endpoint())))?;

        let mut connection = FahConnection {
            conn,
            log: FrameLog::new(config),
        };

        match connection.handshake(&config.password).await {
            Ok(()) => Ok(connection),
            Err(err) => {
                connection.disconnect().await;
                Err(err)
            }
        }
    }
}

/// How one command of a fetch cycle failed.
enum CycleError {
    /// The exchange itself failed; the field keeps its previous value
    Request(PollError),
    /// The reply did not decode; the field becomes empty
    Decode(PollError),
}

/// An authenticated command server session.
pub struct FahConnection {
    conn: FramedConnection<FahCodec>,
    log: FrameLog,
}

impl FahConnection {
    async fn exchange(&mut self, command: FahCommand) -> Result<Bytes, FrameError> {
        self.log.sent(&command);
        let frame = self.conn.request(command).await?;
        self.log.received(&frame);
        Ok(frame)
    }

    async fn handshake(&mut self, password: &str) -> Result<(), PollError> {
        let banner = self
            .conn
            .recv()
            .await
            .map_err(|e| PollError::auth(format!("banner: {e}")))?;
        self.log.received(&banner);

        let frame = self
            .exchange(FahCommand::Auth(password.to_string()))
            .await
            .map_err(|e| PollError::auth(format!("auth: {e}")))?;

        match decode_auth_ack(&frame) {
            AuthAck::Accepted => Ok(()),
            AuthAck::Rejected(message) => Err(PollError::auth(message)),
        }
    }

    async fn fetch_slots(&mut self) -> Result<Vec<Slot>, CycleError> {
        let frame = self
            .exchange(FahCommand::SlotInfo)
            .await
            .map_err(|e| CycleError::Request(PollError::fetch(format!("slot-info: {e}"))))?;
        decode_slots(&frame)
            .map_err(|e| CycleError::Decode(PollError::decode(format!("slot-info: {e}"))))
    }

    async fn fetch_units(&mut self) -> Result<Vec<Unit>, CycleError> {
        let frame = self
            .exchange(FahCommand::QueueInfo)
            .await
            .map_err(|e| CycleError::Request(PollError::fetch(format!("queue-info: {e}"))))?;
        decode_units(&frame)
            .map_err(|e| CycleError::Decode(PollError::decode(format!("queue-info: {e}"))))
    }
}

#[async_trait]
impl LiveConnection for FahConnection {
    /// Slots and units are replaced independently. A request failure keeps
    /// the field from `current`, a decode failure empties it, and a slot
    /// failure skips the queue request.
    async fn fetch_state(&mut self, current: &StateSnapshot) -> Result<StateSnapshot, FetchFailure> {
        let previous = current.as_fah().cloned().unwrap_or_default();

        let slots = match self.fetch_slots().await {
            Ok(slots) => slots,
            Err(CycleError::Request(error)) => return Err(FetchFailure::keep(error)),
            Err(CycleError::Decode(error)) => {
                return Err(FetchFailure::replace(
                    error,
                    StateSnapshot::Fah(FahState {
                        slots: Vec::new(),
                        units: previous.units,
                    }),
                ));
            }
        };

        match self.fetch_units().await {
            Ok(units) => Ok(StateSnapshot::Fah(FahState { slots, units })),
            Err(CycleError::Request(error)) => Err(FetchFailure::replace(
                error,
                StateSnapshot::Fah(FahState {
                    slots,
                    units: previous.units,
                }),
            )),
            Err(CycleError::Decode(error)) => Err(FetchFailure::replace(
                error,
                StateSnapshot::Fah(FahState {
                    slots,
                    units: Vec::new(),
                }),
            )),
        }
    }

    async fn disconnect(self) {
        self.conn.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let adapter = FahAdapter::new();
        assert_eq!(adapter.timeouts().connect, Duration::from_secs(10));
        assert_eq!(adapter.timeouts().io, DEFAULT_IO_TIMEOUT);
        assert_eq!(adapter.family(), ProtocolFamily::Fah);
    }

    #[tokio::test]
    async fn test_empty_address_fails_without_dialing() {
        let config = ClientConfig::new(ProtocolFamily::Fah, "x", "", 36330, "pw");
        let err = FahAdapter::new().connect(&config).await.err().unwrap();
        assert!(matches!(err, PollError::Connect(_)));
    }
}
