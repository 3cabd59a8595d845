//! Floppy disk image
//!
//! A flat sector dump with geometry inferred from its size. Sectors are
//! addressed by cylinder/head/sector and read sequentially from the last seek.

use i86_core::logging::{log, LogCategory, LogLevel};

/// Bytes per sector
pub const SECTOR_SIZE: usize = 512;

/// Cylinder/head/sector layout of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
}

impl Geometry {
    /// Infer geometry from an image size in bytes
    pub fn for_image_size(size: usize) -> Self {
        let mut geometry = Geometry {
            cylinders: 80,
            heads: 2,
            sectors_per_track: 18,
        };

        if size <= 1_228_800 {
            geometry.sectors_per_track = 15;
        }
        if size <= 737_280 {
            geometry.sectors_per_track = 9;
        }
        if size <= 368_640 {
            geometry.cylinders = 40;
            geometry.sectors_per_track = 9;
        }
        if size <= 163_840 {
            geometry.cylinders = 40;
            geometry.heads = 1;
            geometry.sectors_per_track = 8;
        }

        geometry
    }

    /// Total sectors addressable through CHS
    pub fn total_sectors(&self) -> u32 {
        self.cylinders as u32 * self.heads as u32 * self.sectors_per_track as u32
    }
}

/// Standard floppy disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloppyFormat {
    /// 160KB - 5.25" SS (40 tracks, 8 sectors, 1 head)
    Floppy160K,
    /// 360KB - 5.25" DD (40 tracks, 9 sectors, 2 heads)
    Floppy360K,
    /// 720KB - 3.5" DD (80 tracks, 9 sectors, 2 heads)
    Floppy720K,
    /// 1.2MB - 5.25" HD (80 tracks, 15 sectors, 2 heads)
    Floppy1_2M,
    /// 1.44MB - 3.5" HD (80 tracks, 18 sectors, 2 heads)
    Floppy1_44M,
}

impl FloppyFormat {
    /// Get the size in bytes for this format
    pub fn size_bytes(&self) -> usize {
        match self {
            FloppyFormat::Floppy160K => 163_840,
            FloppyFormat::Floppy360K => 368_640,
            FloppyFormat::Floppy720K => 737_280,
            FloppyFormat::Floppy1_2M => 1_228_800,
            FloppyFormat::Floppy1_44M => 1_474_560,
        }
    }

    /// Blank, zero-filled image of this format
    pub fn blank_image(&self) -> Vec<u8> {
        vec![0; self.size_bytes()]
    }
}

/// A mounted floppy image with a read position
#[derive(Debug, Clone)]
pub struct FloppyImage {
    data: Vec<u8>,
    offset: usize,
    geometry: Geometry,
}

impl FloppyImage {
    pub fn open(data: Vec<u8>) -> Self {
        let geometry = Geometry::for_image_size(data.len());
        log(LogCategory::Disk, LogLevel::Info, || {
            format!(
                "Mounted {} byte floppy image: {} cylinders, {} heads, {} sectors/track",
                data.len(),
                geometry.cylinders,
                geometry.heads,
                geometry.sectors_per_track
            )
        });

        Self {
            data,
            offset: 0,
            geometry,
        }
    }

    /// Drop the image contents
    pub fn close(&mut self) {
        self.data.clear();
        self.offset = 0;
        self.geometry = Geometry {
            cylinders: 0,
            heads: 0,
            sectors_per_track: 0,
        };
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte offset of the next sector read
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Logical block address of a CHS triple, `None` when outside the geometry
    ///
    /// Sectors are 1-based.
    pub fn to_lba(&self, cylinder: u16, head: u8, sector: u8) -> Option<u32> {
        let g = &self.geometry;
        if sector == 0
            || sector > g.sectors_per_track
            || head >= g.heads
            || cylinder >= g.cylinders
        {
            return None;
        }

        Some(
            (cylinder as u32 * g.heads as u32 + head as u32) * g.sectors_per_track as u32
                + (sector as u32 - 1),
        )
    }

    /// Inverse of [`FloppyImage::to_lba`]: (cylinder, head, sector)
    pub fn from_lba(&self, lba: u32) -> (u16, u8, u8) {
        let heads = self.geometry.heads.max(1) as u32;
        let spt = self.geometry.sectors_per_track.max(1) as u32;

        let cylinder = lba / (heads * spt);
        let head = (lba / spt) % heads;
        let sector = lba % spt + 1;
        (cylinder as u16, head as u8, sector as u8)
    }

    /// Position the read pointer at a sector
    ///
    /// Fails when the CHS triple is outside the geometry or the sector starts
    /// at or beyond the end of the image.
    pub fn seek(&mut self, cylinder: u16, head: u8, sector: u8) -> bool {
        let Some(lba) = self.to_lba(cylinder, head, sector) else {
            log(LogCategory::Disk, LogLevel::Warn, || {
                format!("Seek to invalid CHS {}/{}/{}", cylinder, head, sector)
            });
            return false;
        };

        let offset = lba as usize * SECTOR_SIZE;
        log(LogCategory::Disk, LogLevel::Debug, || {
            format!(
                "Seek C={} H={} S={} -> LBA {} (offset 0x{:X})",
                cylinder, head, sector, lba, offset
            )
        });

        if offset >= self.data.len() {
            return false;
        }

        self.offset = offset;
        true
    }

    /// Read the sector at the read pointer and advance past it
    ///
    /// The last sector of a short image is returned truncated, and reading at
    /// the end of the image returns an empty vector.
    pub fn read_sector(&mut self) -> Vec<u8> {
        if self.offset >= self.data.len() {
            return Vec::new();
        }

        let end = (self.offset + SECTOR_SIZE).min(self.data.len());
        let sector = self.data[self.offset..end].to_vec();
        self.offset = end;
        sector
    }
}
