//! Command Client: single-shot request/response over the bulk transport.

use crate::error::{Error, Result};
use crate::protocol::{decode, encode, reply};
use crate::transport::Transport;

/// Largest reply the client ever reads for a single command.
const REPLY_BUF_LEN: usize = 512;

/// Outcome of reading a reply: either a well-framed packet, or one of the
/// two "nothing useful came back" cases the wire can produce. The BSL
/// treats these identically at the call site, but keeping them distinct
/// here lets callers report the right [`Error`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameOutcome {
    Frame(u16, Vec<u8>),
    Timeout,
    Invalid,
}

impl FrameOutcome {
    fn into_ack_result(self) -> Result<()> {
        match self {
            Self::Frame(cmd, _) if cmd == reply::ACK => Ok(()),
            Self::Frame(cmd, _) => Err(Error::WrongReply(cmd)),
            Self::Timeout => Err(Error::Timeout),
            Self::Invalid => Err(Error::FrameInvalid),
        }
    }
}

/// Thin, non-owning wrapper that turns a [`BulkTransport`] into a
/// request/response command channel.
///
/// Borrows the transport for as long as it's needed and no longer —
/// nothing here is reentrant, matching the BSL's single-slot command
/// queue.
pub struct CommandClient<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> CommandClient<'t> {
    /// Wrap a transport for issuing commands against it.
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    /// Write a framed `command`/`payload` and read its framed reply.
    ///
    /// Returns the decoded `(command, payload)` pair, or `None` if the
    /// reply timed out or failed to decode as a valid frame.
    pub fn call(&mut self, command: u16, payload: &[u8], read_timeout_ms: u64) -> Result<Option<(u16, Vec<u8>)>> {
        let framed = encode(command, payload);
        self.transport.write(&framed)?;
        let raw = self.transport.read(REPLY_BUF_LEN, read_timeout_ms)?;
        Ok(match Self::outcome_of(&raw) {
            FrameOutcome::Frame(cmd, payload) => Some((cmd, payload)),
            FrameOutcome::Timeout | FrameOutcome::Invalid => None,
        })
    }

    /// [`call`](Self::call), but fails unless the reply decodes and its
    /// command byte is [`reply::ACK`].
    pub fn expect_ack(&mut self, command: u16, payload: &[u8], read_timeout_ms: u64) -> Result<()> {
        let framed = encode(command, payload);
        self.transport.write(&framed)?;
        let raw = self.transport.read(REPLY_BUF_LEN, read_timeout_ms)?;
        Self::outcome_of(&raw).into_ack_result()
    }

    /// Write raw, unframed bytes directly (the handshake sentinel, or the
    /// chunk body that follows a `MIDST_DATA` header) and await a framed
    /// ACK for them.
    pub fn expect_ack_after_raw(&mut self, bytes: &[u8], read_timeout_ms: u64) -> Result<()> {
        self.transport.write(bytes)?;
        let raw = self.transport.read(REPLY_BUF_LEN, read_timeout_ms)?;
        Self::outcome_of(&raw).into_ack_result()
    }

    /// Write raw, unframed bytes without reading a reply (the three-byte
    /// handshake sentinel is retried by the caller, which owns the read).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write(bytes)
    }

    /// Read up to `max_bytes`, waiting at most `timeout_ms`.
    pub fn read_raw(&mut self, max_bytes: usize, timeout_ms: u64) -> Result<Vec<u8>> {
        self.transport.read(max_bytes, timeout_ms)
    }

    fn outcome_of(raw: &[u8]) -> FrameOutcome {
        if raw.is_empty() {
            return FrameOutcome::Timeout;
        }
        match decode(raw) {
            Some((cmd, payload)) => FrameOutcome::Frame(cmd, payload),
            None => FrameOutcome::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::opcode;
    use crate::transport::fake::FakeTransport;

    #[test]
    fn call_writes_framed_command_and_decodes_reply() {
        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::ACK, &[]));
        let mut client = CommandClient::new(&mut transport);

        let reply = client.call(opcode::CONNECT, &[], 100).unwrap();
        assert_eq!(reply, Some((reply::ACK, Vec::new())));
        assert_eq!(transport.writes, vec![encode(opcode::CONNECT, &[])]);
    }

    #[test]
    fn expect_ack_succeeds_on_ack_reply() {
        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::ACK, &[]));
        let mut client = CommandClient::new(&mut transport);

        assert!(client.expect_ack(opcode::RESET, &[], 100).is_ok());
    }

    #[test]
    fn expect_ack_fails_on_wrong_reply_command() {
        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::VERSION, b"v1.0"));
        let mut client = CommandClient::new(&mut transport);

        let err = client.expect_ack(opcode::CONNECT, &[], 100).unwrap_err();
        assert!(matches!(err, Error::WrongReply(cmd) if cmd == reply::VERSION));
    }

    #[test]
    fn expect_ack_fails_on_timeout() {
        let mut transport = FakeTransport::new();
        transport.push_reply(Vec::new());
        let mut client = CommandClient::new(&mut transport);

        assert!(matches!(
            client.expect_ack(opcode::CONNECT, &[], 100).unwrap_err(),
            Error::Timeout
        ));
    }

    #[test]
    fn expect_ack_fails_on_garbage_bytes() {
        let mut transport = FakeTransport::new();
        transport.push_reply(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let mut client = CommandClient::new(&mut transport);

        assert!(matches!(
            client.expect_ack(opcode::CONNECT, &[], 100).unwrap_err(),
            Error::FrameInvalid
        ));
    }

    #[test]
    fn expect_ack_after_raw_writes_bytes_unframed() {
        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::ACK, &[]));
        let mut client = CommandClient::new(&mut transport);

        assert!(client.expect_ack_after_raw(b"chunk-bytes", 100).is_ok());
        assert_eq!(transport.writes, vec![b"chunk-bytes".to_vec()]);
    }
}
