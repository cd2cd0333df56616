// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hn4ctl - operator tooling for HN4 volume images.
//!
//! Everything here drives the engine through its public API against a
//! plain image file: creating volumes, inspecting and verifying surfaces,
//! dumping individual blocks, and running the TCC codec over arbitrary
//! files.
//!
//! ```text
//! hn4ctl create vol.hn4 --blocks 4096
//! hn4ctl stat vol.hn4 --json
//! hn4ctl dump vol.hn4 --lba 116
//! hn4ctl verify vol.hn4
//! hn4ctl pack weights.bin weights.tcc --device-class hdd
//! hn4ctl unpack weights.tcc restored.bin
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hn4::block::{header_crc_of, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_MAGIC};
use hn4::codec::{inspect_stream, ScanTuning};
use hn4::policy::DeviceClass;
use hn4::{compress, compress_bound, decompress, FileDevice, SectorIo, Volume};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Container magic for packed files ("TCCF").
const PACK_MAGIC: u32 = u32::from_le_bytes(*b"TCCF");

#[derive(Debug, Parser)]
#[command(name = "hn4ctl", about = "HN4 volume inspection and maintenance", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ClassArg {
    Ssd,
    Hdd,
    Nvm,
    Tape,
}

impl From<ClassArg> for DeviceClass {
    fn from(value: ClassArg) -> Self {
        match value {
            ClassArg::Ssd => DeviceClass::Ssd,
            ClassArg::Hdd => DeviceClass::Hdd,
            ClassArg::Nvm => DeviceClass::Nvm,
            ClassArg::Tape => DeviceClass::Tape,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a fresh volume image.
    Create {
        image: PathBuf,
        /// Volume size in blocks.
        #[arg(long)]
        blocks: u64,
        /// Block size in bytes.
        #[arg(long, default_value_t = 4096)]
        block_size: u32,
        /// First ballistic block.
        #[arg(long, default_value_t = 8)]
        flux_start: u64,
        /// First horizon block (default: 3/4 of the volume).
        #[arg(long)]
        horizon_start: Option<u64>,
    },
    /// Report geometry, occupancy and health for an image.
    Stat {
        image: PathBuf,
        #[arg(long, default_value_t = 4096)]
        block_size: u32,
        #[arg(long, default_value_t = 8)]
        flux_start: u64,
        #[arg(long)]
        horizon_start: Option<u64>,
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Decode and print one physical block.
    Dump {
        image: PathBuf,
        #[arg(long)]
        lba: u64,
        #[arg(long, default_value_t = 4096)]
        block_size: u32,
    },
    /// Walk the whole surface and report per-class verdicts.
    Verify {
        image: PathBuf,
        #[arg(long, default_value_t = 4096)]
        block_size: u32,
        #[arg(long, default_value_t = 8)]
        flux_start: u64,
    },
    /// Deep-verify committed blocks and regrade the quality mask.
    Scrub {
        image: PathBuf,
        #[arg(long, default_value_t = 4096)]
        block_size: u32,
        #[arg(long, default_value_t = 8)]
        flux_start: u64,
        #[arg(long)]
        horizon_start: Option<u64>,
    },
    /// Print the token breakdown of a packed TCC file.
    Inspect { input: PathBuf },
    /// Compress a file with the TCC structural codec.
    Pack {
        input: PathBuf,
        output: PathBuf,
        /// Device class selecting the encoder scan policy.
        #[arg(long, value_enum, default_value_t = ClassArg::Ssd)]
        device_class: ClassArg,
    },
    /// Restore a file packed with `pack`.
    Unpack { input: PathBuf, output: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Create { image, blocks, block_size, flux_start, horizon_start } => {
            create(&image, blocks, block_size, flux_start, horizon_start)
        }
        Command::Stat { image, block_size, flux_start, horizon_start, json } => {
            stat(&image, block_size, flux_start, horizon_start, json)
        }
        Command::Dump { image, lba, block_size } => dump(&image, lba, block_size),
        Command::Verify { image, block_size, flux_start } => verify(&image, block_size, flux_start),
        Command::Scrub { image, block_size, flux_start, horizon_start } => {
            scrub(&image, block_size, flux_start, horizon_start)
        }
        Command::Pack { input, output, device_class } => pack(&input, &output, device_class.into()),
        Command::Unpack { input, output } => unpack(&input, &output),
        Command::Inspect { input } => inspect(&input),
    }
}

fn open_volume(
    image: &PathBuf,
    block_size: u32,
    flux_start: u64,
    horizon_start: Option<u64>,
) -> Result<Volume> {
    let dev = FileDevice::open(image, DeviceClass::Ssd, 0)
        .with_context(|| format!("opening {}", image.display()))?;
    let mut builder = Volume::builder().block_size(block_size).flux_start(flux_start);
    if let Some(horizon) = horizon_start {
        builder = builder.horizon_start(horizon);
    }
    Ok(builder.open(Box::new(dev))?)
}

fn create(
    image: &PathBuf,
    blocks: u64,
    block_size: u32,
    flux_start: u64,
    horizon_start: Option<u64>,
) -> Result<()> {
    let capacity = blocks
        .checked_mul(u64::from(block_size))
        .context("volume size overflows")?;
    FileDevice::create(image, capacity, DeviceClass::Ssd, 0)
        .with_context(|| format!("creating {}", image.display()))?;
    // Fail early if the layout is unusable.
    let vol = open_volume(image, block_size, flux_start, horizon_start)?;
    let geo = vol.geometry();
    println!(
        "created {}: {} blocks x {} B (flux {}, horizon {})",
        image.display(),
        geo.total_blocks,
        geo.block_size,
        geo.flux_start,
        geo.horizon_start
    );
    Ok(())
}

fn stat(
    image: &PathBuf,
    block_size: u32,
    flux_start: u64,
    horizon_start: Option<u64>,
    json: bool,
) -> Result<()> {
    let vol = open_volume(image, block_size, flux_start, horizon_start)?;
    let geo = vol.geometry();
    let report = vol.rescan()?;
    let health = vol.health();

    if json {
        let doc = serde_json::json!({
            "geometry": {
                "block_size": geo.block_size,
                "total_blocks": geo.total_blocks,
                "flux_start": geo.flux_start,
                "horizon_start": geo.horizon_start,
                "payload_capacity": geo.payload_capacity(),
            },
            "surface": {
                "scanned": report.scanned,
                "committed": report.committed,
                "rotted": report.rotted,
                "io_errors": report.io_errors,
            },
            "blocks_in_use": vol.blocks_in_use(),
            "crc_failures": health.crc_failures,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("geometry : {} blocks x {} B", geo.total_blocks, geo.block_size);
        println!("regions  : flux {} / horizon {}", geo.flux_start, geo.horizon_start);
        println!("payload  : {} B per block", geo.payload_capacity());
        println!(
            "surface  : {} scanned, {} committed, {} rotted, {} unreadable",
            report.scanned, report.committed, report.rotted, report.io_errors
        );
    }
    Ok(())
}

fn dump(image: &PathBuf, lba: u64, block_size: u32) -> Result<()> {
    let dev = FileDevice::open(image, DeviceClass::Ssd, 0)
        .with_context(|| format!("opening {}", image.display()))?;
    let spb = block_size / dev.caps().logical_block_size;
    let mut block = vec![0u8; block_size as usize];
    dev.sync_read(lba * u64::from(spb), &mut block)
        .with_context(|| format!("reading lba {lba}"))?;

    let header = BlockHeader::read_from(&block[..BLOCK_HEADER_SIZE]);
    if header.magic != BLOCK_MAGIC {
        println!("lba {lba}: no block magic (free space or foreign data)");
        return Ok(());
    }
    let crc_ok = header.header_crc == header_crc_of(&block);
    println!("lba {lba}:");
    println!("  well_id    : {:#034x}", header.well_id);
    println!("  generation : {} (low32 {})", header.generation, header.generation_low());
    println!("  seq_index  : {}", header.seq_index);
    println!("  algo       : {} ({} B stored)", header.algo(), header.stored_len());
    println!("  header_crc : {:#010x} [{}]", header.header_crc, if crc_ok { "ok" } else { "BAD" });
    println!("  data_crc   : {:#010x}", header.data_crc);

    let preview = &block[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + 64.min(block.len() - BLOCK_HEADER_SIZE)];
    for (row, chunk) in preview.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("  {:04x}  {}", row * 16, hex.join(" "));
    }
    Ok(())
}

fn verify(image: &PathBuf, block_size: u32, flux_start: u64) -> Result<()> {
    let dev = FileDevice::open(image, DeviceClass::Ssd, 0)
        .with_context(|| format!("opening {}", image.display()))?;
    let total_blocks = dev.caps().total_capacity_bytes / u64::from(block_size);
    let spb = block_size / dev.caps().logical_block_size;

    tracing::debug!(total_blocks, flux_start, "verify walk");
    let mut committed = 0u64;
    let mut rotted = 0u64;
    let mut unreadable = 0u64;
    let mut sector = vec![0u8; dev.caps().logical_block_size as usize];

    for lba in flux_start..total_blocks {
        if dev.sync_read(lba * u64::from(spb), &mut sector).is_err() {
            println!("lba {lba}: UNREADABLE");
            unreadable += 1;
            continue;
        }
        let header = BlockHeader::read_from(&sector[..BLOCK_HEADER_SIZE]);
        if header.magic != BLOCK_MAGIC {
            continue;
        }
        if header.header_crc == header_crc_of(&sector) {
            committed += 1;
        } else {
            println!("lba {lba}: HEADER ROT (seq {})", header.seq_index);
            rotted += 1;
        }
    }

    println!("verify: {committed} committed, {rotted} rotted, {unreadable} unreadable");
    if rotted > 0 || unreadable > 0 {
        bail!("surface damage detected");
    }
    Ok(())
}

fn scrub(
    image: &PathBuf,
    block_size: u32,
    flux_start: u64,
    horizon_start: Option<u64>,
) -> Result<()> {
    let vol = open_volume(image, block_size, flux_start, horizon_start)?;
    // The bitmap starts blind on a fresh open; recover occupancy first.
    let rescan = vol.rescan()?;
    let report = vol.scrub()?;
    println!(
        "scrub: {} committed, {} pristine, {} demoted, {} poisoned",
        rescan.committed, report.pristine, report.demoted, report.poisoned
    );
    if report.poisoned > 0 {
        bail!("unreadable media encountered");
    }
    Ok(())
}

fn inspect(input: &PathBuf) -> Result<()> {
    let file = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if file.len() < 12 || file[0..4] != PACK_MAGIC.to_le_bytes() {
        bail!("{} is not a packed TCC file", input.display());
    }
    let stats = inspect_stream(&file[12..])?;
    println!("stream   : {} tokens, {} logical bytes", stats.tokens, stats.logical_len);
    println!(
        "literal  : {} tokens / {} bytes",
        stats.literal_tokens, stats.literal_bytes
    );
    println!(
        "isotope  : {} tokens / {} bytes",
        stats.isotope_tokens, stats.isotope_bytes
    );
    println!(
        "gradient : {} tokens / {} bytes",
        stats.gradient_tokens, stats.gradient_bytes
    );
    println!(
        "bitmask  : {} tokens / {} bytes ({} set words)",
        stats.bitmask_tokens, stats.bitmask_bytes, stats.bitmask_set_words
    );
    Ok(())
}

fn pack(input: &PathBuf, output: &PathBuf, class: DeviceClass) -> Result<()> {
    let src = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let tuning = ScanTuning::for_device(class, 0);
    tracing::debug!(len = src.len(), ?class, "packing");

    let mut packed = vec![0u8; compress_bound(src.len())];
    let n = compress(&src, &mut packed, &tuning)?;

    let mut file = Vec::with_capacity(12 + n);
    file.extend_from_slice(&PACK_MAGIC.to_le_bytes());
    file.extend_from_slice(&(src.len() as u64).to_le_bytes());
    file.extend_from_slice(&packed[..n]);
    fs::write(output, &file).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "packed {} -> {} ({} -> {} bytes, {:.1}%)",
        input.display(),
        output.display(),
        src.len(),
        n,
        if src.is_empty() { 100.0 } else { n as f64 * 100.0 / src.len() as f64 }
    );
    Ok(())
}

fn unpack(input: &PathBuf, output: &PathBuf) -> Result<()> {
    let file = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if file.len() < 12 || file[0..4] != PACK_MAGIC.to_le_bytes() {
        bail!("{} is not a packed TCC file", input.display());
    }
    let orig_len = u64::from_le_bytes(file[4..12].try_into().expect("fixed slice")) as usize;

    let mut dst = vec![0u8; orig_len];
    let n = decompress(&file[12..], &mut dst)?;
    if n != orig_len {
        bail!("length mismatch: trailer declared {orig_len}, stream produced {n}");
    }
    fs::write(output, &dst).with_context(|| format!("writing {}", output.display()))?;
    println!("unpacked {} -> {} ({} bytes)", input.display(), output.display(), n);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.bin");
        let packed = dir.path().join("out.tcc");
        let restored = dir.path().join("back.bin");

        let data: Vec<u8> = (0..10_000u32).map(|i| ((i / 32) % 256) as u8).collect();
        fs::write(&input, &data).expect("write input");

        pack(&input, &packed, DeviceClass::Ssd).expect("pack");
        unpack(&packed, &restored).expect("unpack");
        assert_eq!(fs::read(&restored).expect("read restored"), data);
    }

    #[test]
    fn test_unpack_rejects_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("junk.bin");
        fs::write(&input, b"not a tcc container").expect("write");
        assert!(unpack(&input, &dir.path().join("out.bin")).is_err());
    }

    #[test]
    fn test_pack_then_inspect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.bin");
        let packed = dir.path().join("out.tcc");
        fs::write(&input, vec![0u8; 2048]).expect("write input");

        pack(&input, &packed, DeviceClass::Ssd).expect("pack");
        inspect(&packed).expect("inspect");
    }

    #[test]
    fn test_create_then_stat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = dir.path().join("vol.hn4");
        create(&image, 256, 4096, 8, None).expect("create");
        stat(&image, 4096, 8, None, true).expect("stat");
    }
}
