//! AXP bundle loading: unzip the archive into a scoped temporary
//! directory and parse its single XML manifest into `axdl`'s typed
//! [`Manifest`].
//!
//! spec.md places archive extraction and XML parsing outside the core
//! engine's scope; this module is where a runnable tool performs them,
//! grounded on a known independent Rust reimplementation of this exact
//! device protocol that loads its bundles the same way (`zip` + a
//! serde-derived XML deserializer).

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axdl::{ImageDescriptor, LoaderDescriptor, Manifest, PartitionEntry, Unit};
use serde::Deserialize;
use tempfile::TempDir;

/// An AXP bundle extracted into a scoped temporary directory. The
/// directory and its contents are removed when this value is dropped,
/// on every exit path, matching spec.md §5's resource model.
pub struct ExtractedBundle {
    dir: TempDir,
}

impl ExtractedBundle {
    /// Resolve a bundle-relative file name to its extracted path, or
    /// `None` if no such file exists (an empty name, or one that was
    /// not present in the archive).
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.trim().is_empty() {
            return None;
        }
        let path = self.dir.path().join(name);
        path.is_file().then_some(path)
    }
}

/// Unzip `axp_path` and parse the manifest it contains.
pub fn load(axp_path: &Path) -> Result<(ExtractedBundle, Manifest)> {
    let file = File::open(axp_path).with_context(|| format!("opening bundle {}", axp_path.display()))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("reading {} as a zip archive", axp_path.display()))?;

    let dir = tempfile::tempdir().context("creating a scratch directory for the extracted bundle")?;
    let mut xml_path = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dir.path().join(&name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("extracting {} from the bundle", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)?;

        if out_path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")) {
            xml_path = Some(out_path);
        }
    }

    let xml_path = xml_path.with_context(|| format!("no XML manifest found inside {}", axp_path.display()))?;
    let xml = std::fs::read_to_string(&xml_path).context("reading the extracted manifest XML")?;
    let manifest = parse_manifest(&xml).context("parsing the manifest XML")?;

    Ok((ExtractedBundle { dir }, manifest))
}

#[derive(Debug, Deserialize)]
struct ConfigXml {
    #[serde(rename = "Project")]
    project: ProjectXml,
}

#[derive(Debug, Deserialize)]
struct ProjectXml {
    #[serde(rename = "Partitions")]
    partitions: PartitionsXml,
    #[serde(rename = "ImgList")]
    img_list: ImgListXml,
}

#[derive(Debug, Deserialize)]
struct PartitionsXml {
    #[serde(rename = "@unit")]
    unit: String,
    #[serde(rename = "Partition", default)]
    partition: Vec<PartitionXml>,
}

#[derive(Debug, Deserialize)]
struct PartitionXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@size")]
    size: String,
    #[serde(rename = "@gap", default)]
    gap: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgListXml {
    #[serde(rename = "Img", default)]
    img: Vec<ImgXml>,
}

#[derive(Debug, Deserialize)]
struct ImgXml {
    #[serde(rename = "@flag", default)]
    flag: Option<String>,
    #[serde(rename = "@select", default)]
    select: Option<String>,
    #[serde(rename = "ID", default)]
    id: Option<String>,
    #[serde(rename = "File", default)]
    file: Option<String>,
    #[serde(rename = "Type", default)]
    type_: Option<String>,
    #[serde(rename = "Block", default)]
    block: Option<BlockXml>,
}

#[derive(Debug, Deserialize)]
struct BlockXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "Base", default)]
    base: Option<String>,
}

/// One `<Img>` entry before it's been sorted into the manifest's
/// `fdl1`/`fdl2`/`eip`/`images` buckets by its `<ID>`.
struct RawImage {
    id: String,
    file: String,
    base: u64,
    block_id: Option<String>,
    flag: u32,
    select: bool,
    type_: String,
}

/// Parse a decimal or `0x`-prefixed hex numeric attribute, per
/// spec.md §6.
fn parse_num(s: &str) -> Result<i64> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).with_context(|| format!("invalid hex number '{s}'"))
    } else {
        trimmed.parse::<i64>().with_context(|| format!("invalid number '{s}'"))
    }
}

fn parse_num_u64(s: &str) -> Result<u64> {
    Ok(parse_num(s)? as u64)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "True" | "TRUE")
}

fn parse_manifest(xml: &str) -> Result<Manifest> {
    let config: ConfigXml = quick_xml::de::from_str(xml)?;
    let project = config.project;

    let unit_code = u8::try_from(parse_num(&project.partitions.unit)?).context("partition unit out of range")?;
    let unit = Unit::from_code(unit_code)?;

    let partitions = project
        .partitions
        .partition
        .into_iter()
        .map(|p| {
            Ok(PartitionEntry {
                id: p.id,
                size: parse_num(&p.size)?,
                gap: p.gap.as_deref().map(parse_num).transpose()?.unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let raw_images = project
        .img_list
        .img
        .into_iter()
        .map(|img| {
            let base = img
                .block
                .as_ref()
                .and_then(|b| b.base.as_deref())
                .map(parse_num_u64)
                .transpose()?
                .unwrap_or(0);
            let block_id = img.block.and_then(|b| b.id).filter(|s| !s.trim().is_empty());
            let flag = img
                .flag
                .as_deref()
                .map(parse_num)
                .transpose()?
                .unwrap_or(0) as u32;
            let select = img.select.as_deref().map(parse_bool).unwrap_or(true);
            Ok(RawImage {
                id: img.id.unwrap_or_default(),
                file: img.file.unwrap_or_default(),
                base,
                block_id,
                flag,
                select,
                type_: img.type_.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let take_loader = |label: &str| -> Result<LoaderDescriptor> {
        let raw = raw_images
            .iter()
            .find(|i| i.id.eq_ignore_ascii_case(label))
            .with_context(|| format!("manifest has no '{label}' image entry"))?;
        Ok(LoaderDescriptor { file: raw.file.clone(), base: raw.base })
    };
    let fdl1 = take_loader("FDL1")?;
    let fdl2 = take_loader("FDL2")?;
    let eip = raw_images
        .iter()
        .find(|i| i.id.eq_ignore_ascii_case("EIP"))
        .map(|raw| LoaderDescriptor { file: raw.file.clone(), base: raw.base });

    let images = raw_images
        .into_iter()
        .filter(|i| !matches!(i.id.to_ascii_uppercase().as_str(), "FDL1" | "FDL2" | "EIP"))
        .map(|raw| ImageDescriptor {
            id: raw.id,
            file: raw.file,
            base: raw.base,
            block_id: raw.block_id,
            flag: raw.flag,
            select: raw.select,
            type_: raw.type_,
        })
        .collect();

    let manifest = Manifest { fdl1, fdl2, eip, unit, partitions, images };
    manifest.validate().context("validating parsed manifest")?;
    Ok(manifest)
}
