//! mapstore CLI
//!
//! Diagnostic tool for the mapped storage layer: prints the mapping
//! geometry and exercises the parallel checksum and copy paths.

use std::process;

use clap::{Parser, Subcommand};
use mapstore::{Config, MappedFile, Result, StorageManager};
use tracing_subscriber::{fmt, EnvFilter};

/// mapstore CLI
#[derive(Parser, Debug)]
#[command(name = "mapstore-cli")]
#[command(about = "Diagnostics for memory-mapped temp-file storage")]
#[command(version)]
struct Args {
    /// Directory for temporary backing files
    #[arg(short, long, default_value = "./mapstore_tmp")]
    temp_dir: String,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print allocation granularity, page size and alignment
    Info,

    /// Fill a temp file with a pattern and print its CRC-32/CRC-64
    Checksum {
        /// File size in bytes
        #[arg(short, long, default_value = "10000")]
        size: u64,
    },

    /// Copy a pattern buffer into a temp file in parallel and verify it
    Copy {
        /// Buffer size in bytes
        #[arg(short, long, default_value = "16777216")]
        size: u64,

        /// Use the 32-byte lane copy
        #[arg(long)]
        wide: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mapstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("mapstore CLI v{}", mapstore::VERSION);
    tracing::info!("Temp directory: {}", args.temp_dir);

    let mut builder = Config::builder().temp_dir(&args.temp_dir);
    if let Some(workers) = args.workers {
        builder = builder.worker_threads(workers);
    }

    let manager = match StorageManager::new(builder.build()) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("Failed to start storage manager: {}", e);
            process::exit(1);
        }
    };

    let outcome = match args.command {
        Commands::Info => {
            info(&manager);
            Ok(())
        }
        Commands::Checksum { size } => checksum(&manager, size),
        Commands::Copy { size, wide } => copy(&manager, size, wide),
    };

    if let Err(e) = outcome {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn info(manager: &StorageManager) {
    println!("allocation granularity: {}", manager.granularity());
    println!("page size:              {}", manager.page_size());
    println!("alignment:              {}", manager.context().alignment());
    println!("temp dir:               {}", manager.temp_dir().display());
}

fn checksum(manager: &StorageManager, size: u64) -> Result<()> {
    let file = manager.create_tmp(size)?;
    fill_pattern(&file)?;

    let crc32 = manager.calc_crc32(&file)?;
    let crc64 = manager.calc_crc64(&file)?;
    println!("size:   {}", file.size());
    println!("crc32:  {:#010x}", crc32);
    println!("crc64:  {:#018x}", crc64);

    manager.free(file);
    Ok(())
}

fn copy(manager: &StorageManager, size: u64, wide: bool) -> Result<()> {
    let src: Vec<u8> = (0..size).map(pattern_byte).collect();

    let mut dst = None;
    if wide {
        manager.memcopy_avx2(&mut dst, &src)?;
    } else {
        manager.memcopy(&mut dst, &src)?;
    }
    let Some(file) = dst else {
        println!("nothing to copy");
        return Ok(());
    };

    let expected = manager.context().tables().checksum32(&src);
    let mut padded = src;
    padded.resize(file.size() as usize, 0);
    let expected_padded = manager.context().tables().checksum32(&padded);
    let actual = manager.calc_crc32(&file)?;

    println!("copied: {} bytes into {} byte file", size, file.size());
    println!("source crc32: {:#010x}", expected);
    println!("file crc32:   {:#010x} ({})", actual, if actual == expected_padded { "ok" } else { "MISMATCH" });

    manager.free(file);
    Ok(())
}

/// Write a deterministic pattern across the whole file, one granularity
/// window at a time
fn fill_pattern(file: &MappedFile) -> Result<()> {
    let size = file.size();
    let window = file.granularity();
    let mut offset = 0;
    while offset < size {
        let len = window.min(size - offset);
        let view = file.load(offset, len)?;
        let bytes: Vec<u8> = (0..len).map(|i| pattern_byte(offset + i)).collect();
        view.write(0, &bytes)?;
        file.unload(&view);
        offset += len;
    }
    Ok(())
}

fn pattern_byte(pos: u64) -> u8 {
    (pos.wrapping_mul(31) ^ (pos >> 8)) as u8
}
