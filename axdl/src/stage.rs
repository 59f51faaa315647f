//! Stage Driver: the ROM -> FDL1 -> FDL2 progression.
//!
//! The same command opcodes are reused at every loader generation; only
//! the payload widths and what has to happen between generations change
//! (see the module-level constants below and [`LoaderWidth`]).

use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::command::CommandClient;
use crate::error::{Error, Result};
use crate::protocol::{LOADER_CHUNK_SIZE, decode, midst_header, opcode, reply};
use crate::transport::Transport;

const HANDSHAKE_SENTINEL: [u8; 3] = [0x3C; 3];
const HANDSHAKE_RETRIES: u32 = 10;
const HANDSHAKE_SETTLE: Duration = Duration::from_millis(100);
const HANDSHAKE_READ_TIMEOUT_MS: u64 = 2000;

const CONNECT_TIMEOUT_MS: u64 = 2000;

// Loader chunks are small (1000 bytes) relative to image chunks, so
// shorter timeouts than the flash driver's are reasonable. Not specified
// by the device documentation; see DESIGN.md for the open-question note.
const START_TIMEOUT_MS: u64 = 2000;
const MIDST_HEADER_TIMEOUT_MS: u64 = 2000;
const MIDST_BODY_TIMEOUT_MS: u64 = 5000;
const ENDED_TIMEOUT_MS: u64 = 5000;
const EXEC_TIMEOUT_MS: u64 = 5000;

/// Which address/size width a loader's `START_DATA` header uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderWidth {
    /// `{base(4 LE), size(4 LE)}` — FDL1 and EIP, loaded below the 32-bit
    /// line.
    ThirtyTwoBit,
    /// `{base(8 LE), size(8 LE)}` — FDL2, which targets DRAM above the
    /// 32-bit range.
    SixtyFourBit,
}

/// Send the handshake sentinel and wait for a `VERSION` reply, retrying
/// up to 10 times.
///
/// Returns the version banner as a best-effort text decoding, or an
/// empty string if every attempt was exhausted without a well-framed
/// `VERSION` reply.
pub fn handshake(transport: &mut dyn Transport, stage_label: &str) -> Result<String> {
    for attempt in 1..=HANDSHAKE_RETRIES {
        transport.write(&HANDSHAKE_SENTINEL)?;
        thread::sleep(HANDSHAKE_SETTLE);
        let raw = transport.read(512, HANDSHAKE_READ_TIMEOUT_MS)?;

        if let Some((cmd, payload)) = decode(&raw) {
            if cmd == reply::VERSION {
                let text = String::from_utf8_lossy(&payload).into_owned();
                debug!("{stage_label} handshake succeeded on attempt {attempt}: {text}");
                return Ok(text);
            }
            debug!("{stage_label} handshake attempt {attempt}: unexpected reply {cmd:#06x}");
        } else {
            debug!("{stage_label} handshake attempt {attempt}: no reply");
        }
    }

    warn!("{stage_label} handshake exhausted {HANDSHAKE_RETRIES} attempts");
    Ok(String::new())
}

/// Begin a session against the currently running loader generation.
pub fn connect(transport: &mut dyn Transport) -> Result<()> {
    CommandClient::new(transport).expect_ack(opcode::CONNECT, &[], CONNECT_TIMEOUT_MS)
}

/// Stream a loader blob into device memory at `base_addr` and transfer
/// execution to it.
///
/// Sequence: `START_DATA` with the width-appropriate header, then one
/// `MIDST_DATA` + raw chunk pair per 1000-byte chunk, then `ENDED_DATA`,
/// then `EXEC_DATA`. Every step demands an ACK; the first missing one
/// aborts the whole download.
///
/// `progress(label, bytes_sent, total_bytes)` is called once per chunk,
/// after the device has ACKed that chunk's raw bytes — never on a timer,
/// so UI progress reflects device-side progress rather than host-side
/// buffering.
pub fn download_loader<F>(
    transport: &mut dyn Transport,
    width: LoaderWidth,
    path: &Path,
    base_addr: u64,
    label: &str,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    let data = std::fs::read(path).map_err(|e| file_error(e, path))?;
    let total = data.len();

    let start_payload = start_data_payload(width, base_addr, total as u64);

    let mut client = CommandClient::new(transport);
    client.expect_ack(opcode::START_DATA, &start_payload, START_TIMEOUT_MS)?;

    let mut sent = 0usize;
    for chunk in data.chunks(LOADER_CHUNK_SIZE) {
        let header = midst_header(chunk.len() as u32);
        client.expect_ack(opcode::MIDST_DATA, &header, MIDST_HEADER_TIMEOUT_MS)?;
        client.expect_ack_after_raw(chunk, MIDST_BODY_TIMEOUT_MS)?;
        sent += chunk.len();
        progress(label, sent, total);
    }

    client.expect_ack(opcode::ENDED_DATA, &[], ENDED_TIMEOUT_MS)?;
    client.expect_ack(opcode::EXEC_DATA, &[], EXEC_TIMEOUT_MS)?;
    Ok(())
}

fn start_data_payload(width: LoaderWidth, base_addr: u64, size: u64) -> Vec<u8> {
    match width {
        LoaderWidth::ThirtyTwoBit => {
            let mut payload = Vec::with_capacity(8);
            payload.extend_from_slice(&(base_addr as u32).to_le_bytes());
            payload.extend_from_slice(&(size as u32).to_le_bytes());
            payload
        },
        LoaderWidth::SixtyFourBit => {
            let mut payload = Vec::with_capacity(16);
            payload.extend_from_slice(&base_addr.to_le_bytes());
            payload.extend_from_slice(&size.to_le_bytes());
            payload
        },
    }
}

fn file_error(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound(path.display().to_string())
    } else {
        Error::Io(err)
    }
}
