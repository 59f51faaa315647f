//! Top-level Sequencer: wires the manifest, transport, stage driver, and
//! flash driver into one ordered flash job.
//!
//! Phases follow spec.md §4.7 exactly. Archive extraction and manifest
//! parsing happen before this module ever runs (the CLI layer's job);
//! everything from opening the transport through the optional terminal
//! reset is driven from here.

use std::path::PathBuf;

use log::{info, warn};

use crate::command::CommandClient;
use crate::error::{Error, Result};
use crate::flash;
use crate::manifest::Manifest;
use crate::protocol::opcode;
use crate::stage::{self, LoaderWidth};
use crate::transport::Transport;

const SECURE_BOOT_TOKEN: &str = "secureboot";
const RESET_TIMEOUT_MS: u64 = 10_000;

/// Run one full flash job against an already-open transport: ROM
/// handshake, the EIP/FDL1/FDL2 progression, repartition, the image
/// burn list, and an optional terminal `RESET`.
///
/// `resolve` maps a bundle-relative file name (as it appears in the
/// manifest) to a path on disk; the caller owns where the bundle was
/// extracted to. Every phase up through the image list is fatal on
/// failure; the terminal `RESET` is best-effort, matching spec.md §9's
/// "reset ACK optional" note — the device may reboot before it can ACK.
///
/// `progress(label, bytes_sent, total_bytes)` is forwarded to every
/// chunked transfer (EIP/FDL1/FDL2 downloads, each burned image), called
/// once per chunk after the device ACKs it — real device-side progress,
/// not a host-side timer.
pub fn run<F>(
    transport: &mut dyn Transport,
    manifest: &Manifest,
    resolve: impl Fn(&str) -> Option<PathBuf>,
    send_reset: bool,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    manifest.validate()?;

    info!("handshaking with ROM");
    let rom_version = stage::handshake(transport, "ROM")?;
    stage::connect(transport)?;
    info!("connected to ROM ({rom_version:?})");

    if rom_version.contains(SECURE_BOOT_TOKEN) {
        download_eip(transport, manifest, &resolve, progress)?;
    }

    info!("downloading FDL1");
    let fdl1_path = resolve_required(&resolve, &manifest.fdl1.file, "fdl1")?;
    stage::download_loader(transport, LoaderWidth::ThirtyTwoBit, &fdl1_path, manifest.fdl1.base, "FDL1", progress)?;

    info!("FDL1 running; handshaking");
    stage::handshake(transport, "FDL1")?;
    stage::connect(transport)?;

    info!("downloading FDL2");
    let fdl2_path = resolve_required(&resolve, &manifest.fdl2.file, "fdl2")?;
    stage::download_loader(transport, LoaderWidth::SixtyFourBit, &fdl2_path, manifest.fdl2.base, "FDL2", progress)?;
    info!("FDL2 running");

    info!("repartitioning flash");
    flash::repartition(transport, manifest.unit, &manifest.partitions)?;

    info!("burning image list");
    flash::run_image_list(transport, &manifest.images, resolve, progress)?;

    if send_reset {
        send_terminal_reset(transport);
    }

    Ok(())
}

/// Download the encrypted image package ahead of FDL1, on secure-boot
/// devices only. Declared untested by the source (spec.md §9); a
/// missing EIP descriptor on a secure-boot device is a manifest error
/// rather than a silent skip, so non-secure-boot behavior can never be
/// altered by this branch.
fn download_eip<F>(
    transport: &mut dyn Transport,
    manifest: &Manifest,
    resolve: &impl Fn(&str) -> Option<PathBuf>,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    let Some(eip) = &manifest.eip else {
        return Err(Error::ManifestInvalid(
            "ROM reports secure boot but the manifest has no EIP descriptor".into(),
        ));
    };
    info!("ROM reports secure boot; downloading EIP ahead of FDL1");
    let path = resolve_required(resolve, &eip.file, "eip")?;
    stage::download_loader(transport, LoaderWidth::ThirtyTwoBit, &path, eip.base, "EIP", progress)
}

fn resolve_required(resolve: &impl Fn(&str) -> Option<PathBuf>, file: &str, label: &str) -> Result<PathBuf> {
    resolve(file).ok_or_else(|| Error::ManifestInvalid(format!("{label} file '{file}' not found in bundle")))
}

fn send_terminal_reset(transport: &mut dyn Transport) {
    info!("sending terminal RESET");
    let mut client = CommandClient::new(transport);
    match client.expect_ack(opcode::RESET, &0u32.to_le_bytes(), RESET_TIMEOUT_MS) {
        Ok(()) => info!("device acknowledged RESET"),
        Err(e) => warn!("no ACK for RESET ({e}); the device may have rebooted before replying"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{LoaderDescriptor, PartitionEntry, Unit};
    use crate::protocol::{decode, encode, opcode, reply};
    use crate::transport::fake::FakeTransport;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_blob(dir: &std::path::Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    fn manifest_without_images(fdl1: &str, fdl2: &str) -> Manifest {
        Manifest {
            fdl1: LoaderDescriptor { file: fdl1.into(), base: 0x1000 },
            fdl2: LoaderDescriptor { file: fdl2.into(), base: 0x5C00_0000_0000_0000 },
            eip: None,
            unit: Unit::Kb,
            partitions: vec![PartitionEntry { id: "boot".into(), size: 10, gap: 0 }],
            images: Vec::new(),
        }
    }

    #[test]
    fn full_job_without_images_or_reset_issues_expected_command_sequence() {
        let dir = std::env::temp_dir().join(format!("axdl-sequencer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fdl1 = write_blob(&dir, "fdl1.bin", b"fdl1-bytes");
        let fdl2 = write_blob(&dir, "fdl2.bin", b"fdl2-bytes");

        let manifest = manifest_without_images("fdl1.bin", "fdl2.bin");
        let mut files = HashMap::new();
        files.insert("fdl1.bin".to_string(), fdl1);
        files.insert("fdl2.bin".to_string(), fdl2);
        let resolve = move |name: &str| files.get(name).cloned();

        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::VERSION, b"ROM v1.0")); // ROM handshake
        transport.push_reply(encode(reply::ACK, &[])); // ROM CONNECT
        // FDL1 download: START, MIDST header, MIDST body, ENDED, EXEC.
        for _ in 0..5 {
            transport.push_reply(encode(reply::ACK, &[]));
        }
        transport.push_reply(encode(reply::VERSION, b"FDL1 v1.0")); // FDL1 handshake
        transport.push_reply(encode(reply::ACK, &[])); // FDL1 CONNECT
        for _ in 0..5 {
            transport.push_reply(encode(reply::ACK, &[])); // FDL2 download
        }
        transport.push_reply(encode(reply::ACK, &[])); // REPARTITION

        let result = run(&mut transport, &manifest, resolve, false, &mut |_, _, _| {});
        std::fs::remove_dir_all(&dir).ok();
        result.unwrap();

        let commands: Vec<u16> = transport.writes.iter().filter_map(|w| decode(w).map(|(cmd, _)| cmd)).collect();
        assert_eq!(
            commands,
            vec![
                opcode::CONNECT,
                opcode::START_DATA,
                opcode::MIDST_DATA,
                opcode::ENDED_DATA,
                opcode::EXEC_DATA,
                opcode::CONNECT,
                opcode::START_DATA,
                opcode::MIDST_DATA,
                opcode::ENDED_DATA,
                opcode::EXEC_DATA,
                opcode::REPARTITION,
            ]
        );
    }

    #[test]
    fn missing_ack_on_reset_only_warns_and_still_succeeds() {
        let dir = std::env::temp_dir().join(format!("axdl-sequencer-reset-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fdl1 = write_blob(&dir, "fdl1.bin", b"x");
        let fdl2 = write_blob(&dir, "fdl2.bin", b"y");

        let manifest = manifest_without_images("fdl1.bin", "fdl2.bin");
        let mut files = HashMap::new();
        files.insert("fdl1.bin".to_string(), fdl1);
        files.insert("fdl2.bin".to_string(), fdl2);
        let resolve = move |name: &str| files.get(name).cloned();

        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::VERSION, b"ROM"));
        transport.push_reply(encode(reply::ACK, &[]));
        for _ in 0..5 {
            transport.push_reply(encode(reply::ACK, &[]));
        }
        transport.push_reply(encode(reply::VERSION, b"FDL1"));
        transport.push_reply(encode(reply::ACK, &[]));
        for _ in 0..5 {
            transport.push_reply(encode(reply::ACK, &[]));
        }
        transport.push_reply(encode(reply::ACK, &[])); // REPARTITION
        transport.push_reply(Vec::new()); // RESET times out

        let result = run(&mut transport, &manifest, resolve, true, &mut |_, _, _| {});
        std::fs::remove_dir_all(&dir).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn secure_boot_version_without_eip_descriptor_is_a_manifest_error() {
        let dir = std::env::temp_dir().join(format!("axdl-sequencer-secureboot-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = manifest_without_images("fdl1.bin", "fdl2.bin");

        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::VERSION, b"ROM v1.0 secureboot"));
        transport.push_reply(encode(reply::ACK, &[]));

        let result = run(&mut transport, &manifest, |_| None, false, &mut |_, _, _| {});
        std::fs::remove_dir_all(&dir).ok();
        assert!(matches!(result.unwrap_err(), Error::ManifestInvalid(_)));
    }

    #[test]
    fn missing_fdl_file_aborts_before_any_download_write() {
        let manifest = manifest_without_images("fdl1.bin", "fdl2.bin");
        let mut transport = FakeTransport::new();
        transport.push_reply(encode(reply::VERSION, b"ROM"));
        transport.push_reply(encode(reply::ACK, &[]));

        let result = run(&mut transport, &manifest, |_| None, false, &mut |_, _, _| {});
        assert!(matches!(result.unwrap_err(), Error::ManifestInvalid(_)));
    }

    #[test]
    fn empty_fdl1_descriptor_fails_validation_before_any_wire_traffic() {
        let manifest = Manifest {
            fdl1: LoaderDescriptor { file: String::new(), base: 0 },
            ..manifest_without_images("fdl1.bin", "fdl2.bin")
        };
        let mut transport = FakeTransport::new();
        let result = run(&mut transport, &manifest, |_| None, false, &mut |_, _, _| {});
        assert!(matches!(result.unwrap_err(), Error::ManifestInvalid(_)));
        assert!(transport.writes.is_empty());
    }
}
