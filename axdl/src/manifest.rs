//! Typed representation of the firmware bundle the engine consumes.
//!
//! Archive extraction and XML parsing live in the CLI layer; this module
//! only describes the already-parsed shape and the few checks that must
//! pass before any wire traffic starts.

use std::path::PathBuf;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The multiplier applied to a partition's `size`/`gap` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Unit {
    /// 1 MiB (1,048,576 bytes) per unit.
    Mib,
    /// 512 KiB (524,288 bytes) per unit.
    Kb512,
    /// 1 KiB (1,024 bytes) per unit.
    Kb,
    /// 1 byte per unit.
    Byte,
}

impl Unit {
    /// Parse the 1-byte wire code for a unit selector.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Mib),
            1 => Ok(Self::Kb512),
            2 => Ok(Self::Kb),
            3 => Ok(Self::Byte),
            other => Err(Error::ManifestInvalid(format!("unknown partition unit code {other}"))),
        }
    }

    /// The 1-byte wire code for this unit selector.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Mib => 0,
            Self::Kb512 => 1,
            Self::Kb => 2,
            Self::Byte => 3,
        }
    }

    /// Bytes represented by a single unit of this kind.
    #[must_use]
    pub fn bytes_per_unit(self) -> i64 {
        match self {
            Self::Mib => 1_048_576,
            Self::Kb512 => 524_288,
            Self::Kb => 1024,
            Self::Byte => 1,
        }
    }
}

/// One row of the flash partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionEntry {
    /// Logical partition name (up to 36 code units on the wire).
    pub id: String,
    /// Size, in the manifest's [`Unit`].
    pub size: i64,
    /// Gap after this partition, in the manifest's [`Unit`] (typically 0).
    pub gap: i64,
}

/// A downloadable loader or encrypted image blob (FDL1, FDL2, or EIP).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoaderDescriptor {
    /// File name within the bundle.
    pub file: String,
    /// Load address in device memory.
    pub base: u64,
}

impl LoaderDescriptor {
    fn validate(&self, label: &str) -> Result<()> {
        if self.file.trim().is_empty() {
            return Err(Error::ManifestInvalid(format!("{label} descriptor has no file")));
        }
        Ok(())
    }
}

/// One entry of the image list: either a partition image to burn, or an
/// erase directive, depending on `type_`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageDescriptor {
    /// Logical image id.
    pub id: String,
    /// File name within the bundle, or empty if this entry has none (an
    /// erase directive, or an intentionally unselected slot).
    pub file: String,
    /// Load address; only meaningful for FDL1/FDL2/EIP-shaped entries.
    pub base: u64,
    /// Target partition name, overriding `id` when present.
    pub block_id: Option<String>,
    /// Opaque flag carried through from the manifest; not interpreted by
    /// this engine.
    pub flag: u32,
    /// Whether this image participates in the burn at all.
    pub select: bool,
    /// Free-text type; the sentinel `"ERASEFLASH"` (case-insensitive)
    /// triggers an erase instead of a download.
    pub type_: String,
}

const ERASE_SENTINEL: &str = "ERASEFLASH";

impl ImageDescriptor {
    /// The partition name to address on the wire: `block_id` if present,
    /// otherwise `id`.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.block_id.as_deref().unwrap_or(&self.id)
    }

    /// Whether this entry's type is the erase sentinel.
    #[must_use]
    pub fn is_erase(&self) -> bool {
        self.type_.eq_ignore_ascii_case(ERASE_SENTINEL)
    }

    /// Classify this entry into what the flash driver should actually do
    /// with it, resolving its bundle file (if any) through `resolve`.
    ///
    /// This is the sum type the design notes call for in place of
    /// inspecting untyped fields at burn time: callers match on the
    /// result instead of re-deriving "erase vs. burn vs. skip" logic
    /// themselves.
    pub fn classify(&self, resolve: impl FnOnce(&str) -> Option<PathBuf>) -> ImageAction<'_> {
        if !self.select {
            return ImageAction::Skip { id: &self.id, reason: "not selected" };
        }
        if self.is_erase() {
            return ImageAction::Erase { name: self.target_name() };
        }
        if self.file.trim().is_empty() {
            return ImageAction::Skip { id: &self.id, reason: "no file reference" };
        }
        match resolve(&self.file) {
            Some(path) => ImageAction::Burn { name: self.target_name(), file: path },
            None => ImageAction::Skip { id: &self.id, reason: "file not found in bundle" },
        }
    }
}

/// What [`ImageDescriptor::classify`] decided to do with one image-list
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAction<'a> {
    /// Erase the named partition entirely.
    Erase {
        /// Target partition name.
        name: &'a str,
    },
    /// Burn `file` into the named partition.
    Burn {
        /// Target partition name.
        name: &'a str,
        /// Resolved path to the image file on disk.
        file: PathBuf,
    },
    /// Do nothing for this entry, and why.
    Skip {
        /// The image's logical id, for logging.
        id: &'a str,
        /// Human-readable reason, for logging.
        reason: &'static str,
    },
}

/// The fully parsed firmware bundle an engine run consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Manifest {
    /// First-stage loader (runs in on-chip SRAM, 32-bit addressing).
    pub fdl1: LoaderDescriptor,
    /// Second-stage loader (runs in DRAM, 64-bit addressing, drives
    /// flash programming).
    pub fdl2: LoaderDescriptor,
    /// Encrypted image package, present only on secure-boot variants.
    pub eip: Option<LoaderDescriptor>,
    /// Unit multiplier applied to every partition's `size`/`gap`.
    pub unit: Unit,
    /// Ordered flash partition table.
    pub partitions: Vec<PartitionEntry>,
    /// Ordered image list, burned/erased in this order.
    pub images: Vec<ImageDescriptor>,
}

impl Manifest {
    /// Check the invariants that must hold before any wire traffic
    /// starts: FDL1 and FDL2 must both be present and reference a file.
    ///
    /// Per-image file resolution is checked later, against the extracted
    /// bundle, by [`ImageDescriptor::classify`] — a missing optional
    /// image is a warn-and-skip, not a manifest-load-time failure.
    pub fn validate(&self) -> Result<()> {
        self.fdl1.validate("fdl1")?;
        self.fdl2.validate("fdl2")?;
        if let Some(eip) = &self.eip {
            eip.validate("eip")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(file: &str) -> LoaderDescriptor {
        LoaderDescriptor { file: file.to_string(), base: 0x1000 }
    }

    fn manifest() -> Manifest {
        Manifest {
            fdl1: loader("fdl1.bin"),
            fdl2: loader("fdl2.bin"),
            eip: None,
            unit: Unit::Kb,
            partitions: Vec::new(),
            images: Vec::new(),
        }
    }

    #[test]
    fn unit_code_round_trips() {
        for code in 0..=3u8 {
            let unit = Unit::from_code(code).unwrap();
            assert_eq!(unit.code(), code);
        }
        assert!(Unit::from_code(4).is_err());
    }

    #[test]
    fn unit_bytes_per_unit_matches_spec() {
        assert_eq!(Unit::Mib.bytes_per_unit(), 1_048_576);
        assert_eq!(Unit::Kb512.bytes_per_unit(), 524_288);
        assert_eq!(Unit::Kb.bytes_per_unit(), 1024);
        assert_eq!(Unit::Byte.bytes_per_unit(), 1);
    }

    #[test]
    fn validate_rejects_missing_fdl_file() {
        let mut m = manifest();
        m.fdl2.file.clear();
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_manifest() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn unselected_image_never_resolves_a_file() {
        let image = ImageDescriptor {
            id: "a".into(),
            file: "a.bin".into(),
            base: 0,
            block_id: None,
            flag: 0,
            select: false,
            type_: String::new(),
        };
        let action = image.classify(|_| panic!("resolver must not run for an unselected image"));
        assert_eq!(action, ImageAction::Skip { id: "a", reason: "not selected" });
    }

    #[test]
    fn erase_sentinel_is_case_insensitive_and_skips_resolution() {
        let image = ImageDescriptor {
            id: "b".into(),
            file: String::new(),
            base: 0,
            block_id: Some("userdata".into()),
            flag: 0,
            select: true,
            type_: "eraseflash".into(),
        };
        let action = image.classify(|_| panic!("resolver must not run for an erase entry"));
        assert_eq!(action, ImageAction::Erase { name: "userdata" });
    }

    #[test]
    fn burn_target_prefers_block_id_over_id() {
        let image = ImageDescriptor {
            id: "fallback".into(),
            file: "rootfs.img".into(),
            base: 0,
            block_id: Some("rootfs_partition".into()),
            flag: 0,
            select: true,
            type_: "NORMAL".into(),
        };
        let action = image.classify(|name| Some(PathBuf::from(format!("/bundle/{name}"))));
        assert_eq!(
            action,
            ImageAction::Burn { name: "rootfs_partition", file: PathBuf::from("/bundle/rootfs.img") }
        );
    }

    #[test]
    fn missing_bundle_file_skips_with_reason() {
        let image = ImageDescriptor {
            id: "c".into(),
            file: "missing.bin".into(),
            base: 0,
            block_id: None,
            flag: 0,
            select: true,
            type_: "NORMAL".into(),
        };
        let action = image.classify(|_| None);
        assert_eq!(action, ImageAction::Skip { id: "c", reason: "file not found in bundle" });
    }
}
