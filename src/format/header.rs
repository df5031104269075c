//! Container header codec

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crc::CrcWidth;
use crate::error::{Result, StoreError};
use crate::mmap::MappedFile;

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Base magic, "SMMF"
pub const MAGIC: [u8; 4] = *b"SMMF";

/// Current header version
pub const FORMAT_VERSION: u32 = 1;

/// Header flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFlags(u64);

impl HeaderFlags {
    pub const COMPRESSED: u64 = 0x01;
    /// Set: LZ4, clear: ZSTD (only meaningful with COMPRESSED)
    pub const LZ4: u64 = 0x02;
    pub const CRC: u64 = 0x04;
    /// Set: CRC-32/ISO-HDLC, clear: CRC-64/XZ (only meaningful with CRC)
    pub const CRC32: u64 = 0x08;
    pub const ENCRYPTED: u64 = 0x10;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, bit: u64) -> bool {
        self.0 & bit == bit
    }

    pub fn insert(&mut self, bit: u64) {
        self.0 |= bit;
    }

    pub fn remove(&mut self, bit: u64) {
        self.0 &= !bit;
    }
}

/// Payload kind, stored as an 8-byte sub-magic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Data,
    Conf,
    SnapList,
    SnapData,
}

impl PayloadKind {
    pub fn sub_magic(&self) -> [u8; 8] {
        match self {
            PayloadKind::Data => *b"DATA    ",
            PayloadKind::Conf => *b"CONF    ",
            PayloadKind::SnapList => *b"SNAPLIST",
            PayloadKind::SnapData => *b"SNAPDATA",
        }
    }

    pub fn from_sub_magic(magic: &[u8; 8]) -> Option<Self> {
        match magic {
            b"DATA    " => Some(PayloadKind::Data),
            b"CONF    " => Some(PayloadKind::Conf),
            b"SNAPLIST" => Some(PayloadKind::SnapList),
            b"SNAPDATA" => Some(PayloadKind::SnapData),
            _ => None,
        }
    }
}

/// The 64-byte container header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    magic: [u8; 4],
    pub version: u32,
    /// Payload size in bytes
    pub chunk_size: u64,
    /// Unix seconds at creation
    pub timestamp: u64,
    pub flags: HeaderFlags,
    /// Whole-payload checksum; width selected by the flags
    pub crc: u64,
    sub_magic: [u8; 8],
    pub sub_chunk_size: u64,
    reserved: [u8; 8],
}

impl ContainerHeader {
    /// Header for a payload of `chunk_size` bytes, stamped with the current time
    pub fn new(kind: PayloadKind, chunk_size: u64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            chunk_size,
            timestamp,
            flags: HeaderFlags::empty(),
            crc: 0,
            sub_magic: kind.sub_magic(),
            sub_chunk_size: 0,
            reserved: [0; 8],
        }
    }

    /// Record a payload checksum and set the CRC flags to match
    pub fn with_crc(mut self, width: CrcWidth, crc: u64) -> Self {
        self.flags.insert(HeaderFlags::CRC);
        match width {
            CrcWidth::Crc32 => self.flags.insert(HeaderFlags::CRC32),
            CrcWidth::Crc64 => self.flags.remove(HeaderFlags::CRC32),
        }
        self.crc = crc;
        self
    }

    /// Checksum width in use, or `None` when integrity checking is off
    pub fn crc_width(&self) -> Option<CrcWidth> {
        if !self.flags.contains(HeaderFlags::CRC) {
            return None;
        }
        if self.flags.contains(HeaderFlags::CRC32) {
            Some(CrcWidth::Crc32)
        } else {
            Some(CrcWidth::Crc64)
        }
    }

    /// Payload kind, or `None` for an unknown sub-magic
    pub fn kind(&self) -> Option<PayloadKind> {
        PayloadKind::from_sub_magic(&self.sub_magic)
    }

    pub fn sub_magic(&self) -> [u8; 8] {
        self.sub_magic
    }

    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let bytes = bincode::serialize(self).map_err(|e| StoreError::Format(e.to_string()))?;
        bytes.as_slice().try_into().map_err(|_| {
            StoreError::Format(format!("header encoded to {} bytes, expected {}", bytes.len(), HEADER_SIZE))
        })
    }

    /// Decode and validate magic and version
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::Format(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let header: ContainerHeader = bincode::deserialize(&bytes[..HEADER_SIZE])
            .map_err(|e| StoreError::Format(e.to_string()))?;

        if header.magic != MAGIC {
            return Err(StoreError::Format(format!("bad magic {:02x?}", header.magic)));
        }
        if header.version != FORMAT_VERSION {
            return Err(StoreError::Format(format!("unsupported version {}", header.version)));
        }
        Ok(header)
    }
}

/// Write `header` to `[0, 64)` of `file`
pub fn write_header(file: &MappedFile, header: &ContainerHeader) -> Result<()> {
    let bytes = header.encode()?;
    let view = file.load(0, HEADER_SIZE as u64)?;
    view.write(0, &bytes)?;
    file.unload(&view);
    Ok(())
}

/// Read and validate the header at `[0, 64)` of `file`
pub fn read_header(file: &MappedFile) -> Result<ContainerHeader> {
    let mut bytes = [0u8; HEADER_SIZE];
    let view = file.load(0, HEADER_SIZE as u64)?;
    view.read(0, &mut bytes)?;
    file.unload(&view);
    ContainerHeader::decode(&bytes)
}
