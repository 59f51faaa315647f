//! # axdl
//!
//! The BSL protocol engine: packet framing with checksum, the
//! command/response state machine spanning ROM → FDL1 → FDL2, chunked
//! bulk transfer with per-chunk handshaking, and the repartition +
//! multi-image burn driver that consumes a parsed manifest.
//!
//! This crate is the core protocol logic only. Archive extraction,
//! XML manifest parsing, argument parsing, and logging configuration
//! live in the `axdl-cli` binary crate; this library just consumes an
//! already-open [`Transport`] and an already-parsed [`Manifest`].
//!
//! ## Example
//!
//! ```no_run
//! use axdl::{BulkTransport, Manifest};
//!
//! # fn example(manifest: &Manifest) -> axdl::Result<()> {
//! let mut transport = BulkTransport::new();
//! transport.open(axdl::DEFAULT_VID, axdl::DEFAULT_PID, 15)?;
//! axdl::sequencer::run(&mut transport, manifest, |_name| None, true, &mut |_label, _sent, _total| {})?;
//! transport.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod flash;
pub mod manifest;
pub mod protocol;
pub mod sequencer;
pub mod stage;
pub mod transport;

pub use command::CommandClient;
pub use error::{Error, Result};
pub use manifest::{ImageAction, ImageDescriptor, LoaderDescriptor, Manifest, PartitionEntry, Unit};
pub use stage::LoaderWidth;
pub use transport::{BulkTransport, DEFAULT_PID, DEFAULT_VID, Transport};
