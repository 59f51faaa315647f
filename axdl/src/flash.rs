//! Flash Driver: repartition, erase, and per-image burn sequencing.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::command::CommandClient;
use crate::error::{Error, Result};
use crate::manifest::{ImageAction, ImageDescriptor, PartitionEntry, Unit};
use crate::protocol::{IMAGE_CHUNK_SIZE, encode_name, midst_header, opcode};
use crate::transport::Transport;

/// Magic number heading a `REPARTITION` payload.
const REPARTITION_MAGIC: u32 = 0x3A72_6170;
const REPARTITION_VERSION: u8 = 1;

const REPARTITION_TIMEOUT_MS: u64 = 3_000;
const ERASE_TIMEOUT_MS: u64 = 120_000;
const IMAGE_START_TIMEOUT_MS: u64 = 2_000;
const IMAGE_MIDST_HEADER_TIMEOUT_MS: u64 = 5_000;
const IMAGE_MIDST_BODY_TIMEOUT_MS: u64 = 120_000;
const IMAGE_ENDED_TIMEOUT_MS: u64 = 120_000;

/// Replace the flash partition table.
pub fn repartition(transport: &mut dyn Transport, unit: Unit, partitions: &[PartitionEntry]) -> Result<()> {
    let payload = repartition_payload(unit, partitions);
    CommandClient::new(transport).expect_ack(opcode::REPARTITION, &payload, REPARTITION_TIMEOUT_MS)
}

fn repartition_payload(unit: Unit, partitions: &[PartitionEntry]) -> Vec<u8> {
    let count = u16::try_from(partitions.len()).unwrap_or(u16::MAX);

    let mut payload = Vec::with_capacity(8 + partitions.len() * (72 + 16));
    payload.extend_from_slice(&REPARTITION_MAGIC.to_le_bytes());
    payload.push(REPARTITION_VERSION);
    payload.push(unit.code());
    payload.extend_from_slice(&count.to_le_bytes());

    for partition in partitions {
        payload.extend_from_slice(&encode_name(&partition.id));
        payload.extend_from_slice(&partition.size.to_le_bytes());
        payload.extend_from_slice(&partition.gap.to_le_bytes());
    }

    payload
}

/// Erase a flash partition (or, with `name` addressing the whole device
/// layout, the entire flash).
pub fn erase_partition(transport: &mut dyn Transport, name: &str) -> Result<()> {
    let mut payload = Vec::with_capacity(8 + 72 + 8);
    payload.extend_from_slice(&0u64.to_le_bytes()); // flag
    payload.extend_from_slice(&encode_name(name));
    payload.extend_from_slice(&0u64.to_le_bytes()); // size = 0 -> erase entire partition
    CommandClient::new(transport).expect_ack(opcode::ERASE_FLASH, &payload, ERASE_TIMEOUT_MS)
}

/// Burn `file_path` into partition `name`: `START_DATA`, then chunked
/// `MIDST_DATA` transfer, then `ENDED_DATA`. Any missing ACK aborts the
/// image and is fatal for the job.
///
/// `progress(name, bytes_sent, total_bytes)` is called once per chunk,
/// after the device has ACKed that chunk's raw bytes — never on a timer,
/// so UI progress reflects device-side progress rather than host-side
/// buffering.
pub fn burn_image<F>(transport: &mut dyn Transport, name: &str, file_path: &Path, progress: &mut F) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    let data = std::fs::read(file_path).map_err(|e| file_error(e, file_path))?;
    let total = data.len();

    let mut start_payload = Vec::with_capacity(72 + 8 + 8);
    start_payload.extend_from_slice(&encode_name(name));
    start_payload.extend_from_slice(&(total as u64).to_le_bytes());
    start_payload.extend_from_slice(&0u64.to_le_bytes()); // reserved

    let mut client = CommandClient::new(transport);
    client.expect_ack(opcode::START_DATA, &start_payload, IMAGE_START_TIMEOUT_MS)?;

    let mut sent = 0usize;
    for chunk in data.chunks(IMAGE_CHUNK_SIZE) {
        let header = midst_header(chunk.len() as u32);
        client.expect_ack(opcode::MIDST_DATA, &header, IMAGE_MIDST_HEADER_TIMEOUT_MS)?;
        client.expect_ack_after_raw(chunk, IMAGE_MIDST_BODY_TIMEOUT_MS)?;
        sent += chunk.len();
        progress(name, sent, total);
    }

    client.expect_ack(opcode::ENDED_DATA, &[], IMAGE_ENDED_TIMEOUT_MS)
}

/// Iterate the manifest's image list in order, burning or erasing each
/// selected entry and skipping (with a warning) anything that resolves
/// to nothing.
///
/// `progress` is forwarded to [`burn_image`] for each burned entry; it is
/// not invoked for erases, which have no chunked transfer to report on.
pub fn run_image_list<F>(
    transport: &mut dyn Transport,
    images: &[ImageDescriptor],
    resolve: impl Fn(&str) -> Option<PathBuf>,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    for image in images {
        match image.classify(&resolve) {
            ImageAction::Skip { id, reason } => {
                warn!("skipping image '{id}': {reason}");
            },
            ImageAction::Erase { name } => {
                info!("erasing partition '{name}'");
                erase_partition(transport, name)?;
            },
            ImageAction::Burn { name, file } => {
                info!("burning '{name}' from {}", file.display());
                burn_image(transport, name, &file, progress)?;
            },
        }
    }
    Ok(())
}

fn file_error(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound(path.display().to_string())
    } else {
        Error::Io(err)
    }
}
