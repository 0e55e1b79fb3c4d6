//! NTFS boot-sector decoding and volume geometry.

use crate::error::{CoreError, Result};
use crate::source::ByteSource;

/// OEM identifier at offset 0x03 of every NTFS boot sector.
pub const NTFS_OEM_ID: [u8; 8] = *b"NTFS    ";

/// Default sector size used to convert a sector-denominated offset before
/// the boot sector itself has been read.
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Filesystem offset into the image, as supplied on the command line.
///
/// Sector- and byte-denominated forms are mutually exclusive; absent both,
/// the filesystem starts at byte 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemOffset {
    pub offset_sectors: Option<u64>,
    pub offset_bytes: Option<u64>,
}

impl FilesystemOffset {
    /// Resolves to a byte offset: explicit bytes win, then sectors scaled by
    /// `sector_size`, then 0.
    pub fn resolve(&self, sector_size: u64) -> u64 {
        if let Some(bytes) = self.offset_bytes {
            bytes
        } else if let Some(sectors) = self.offset_sectors {
            sectors * sector_size
        } else {
            0
        }
    }
}

/// Raw BPB fields of an NTFS boot sector.
#[derive(Debug, Clone)]
pub struct BootSector {
    pub oem_id: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub media_descriptor: u8,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    /// Signed power-of-two encoding: negative means 2^|x| bytes, positive
    /// means x clusters.
    pub clusters_per_mft_record: i8,
    pub clusters_per_index_record: i8,
    pub volume_serial: u64,
}

impl BootSector {
    /// Reads and decodes the 512-byte boot sector at `filesystem_offset`.
    pub fn read_from(source: &dyn ByteSource, filesystem_offset: u64) -> Result<Self> {
        let buf = source.read(filesystem_offset, 512)?;

        let mut oem_id = [0u8; 8];
        oem_id.copy_from_slice(&buf[0x03..0x0B]);
        if oem_id != NTFS_OEM_ID {
            return Err(CoreError::NotNtfs {
                offset: filesystem_offset,
                found: oem_id,
            });
        }

        Ok(Self {
            oem_id,
            bytes_per_sector: u16::from_le_bytes([buf[0x0B], buf[0x0C]]),
            sectors_per_cluster: buf[0x0D],
            media_descriptor: buf[0x15],
            total_sectors: u64::from_le_bytes(buf[0x28..0x30].try_into().unwrap()),
            mft_lcn: u64::from_le_bytes(buf[0x30..0x38].try_into().unwrap()),
            mft_mirror_lcn: u64::from_le_bytes(buf[0x38..0x40].try_into().unwrap()),
            clusters_per_mft_record: buf[0x40] as i8,
            clusters_per_index_record: buf[0x44] as i8,
            volume_serial: u64::from_le_bytes(buf[0x48..0x50].try_into().unwrap()),
        })
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    fn decode_record_size(&self, encoded: i8) -> u64 {
        if encoded < 0 {
            1u64 << (-encoded as u32)
        } else {
            encoded as u64 * self.bytes_per_cluster()
        }
    }

    pub fn mft_record_size(&self) -> u64 {
        self.decode_record_size(self.clusters_per_mft_record)
    }

    pub fn index_record_size(&self) -> u64 {
        self.decode_record_size(self.clusters_per_index_record)
    }

    /// Validates the BPB and produces the [`Geometry`] every other decoder
    /// keys off.
    pub fn geometry(&self, filesystem_offset: u64) -> Result<Geometry> {
        let sector_size = self.bytes_per_sector as u64;
        let bytes_per_cluster = self.bytes_per_cluster();
        let mft_record_size = self.mft_record_size();

        if sector_size == 0 || !sector_size.is_power_of_two() {
            return Err(CoreError::BadGeometry(format!(
                "bytes_per_sector {sector_size} is not a power of two"
            )));
        }
        if !bytes_per_cluster.is_power_of_two() || bytes_per_cluster < sector_size {
            return Err(CoreError::BadGeometry(format!(
                "bytes_per_cluster {bytes_per_cluster} is not a power of two >= sector size"
            )));
        }
        if mft_record_size == 0 || mft_record_size % sector_size != 0 {
            return Err(CoreError::BadGeometry(format!(
                "mft_record_size {mft_record_size} is not a multiple of sector size"
            )));
        }

        Ok(Geometry {
            filesystem_offset_bytes: filesystem_offset,
            sector_size,
            bytes_per_cluster,
            total_sectors: self.total_sectors,
            mft_lcn: self.mft_lcn,
            mft_mirror_lcn: self.mft_mirror_lcn,
            mft_record_size,
            index_record_size: self.index_record_size(),
            volume_serial: self.volume_serial,
        })
    }
}

/// Resolved volume geometry shared by all decoders.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub filesystem_offset_bytes: u64,
    pub sector_size: u64,
    pub bytes_per_cluster: u64,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub mft_record_size: u64,
    pub index_record_size: u64,
    pub volume_serial: u64,
}

impl Geometry {
    /// Absolute image offset of MFT record 0.
    pub fn mft_start_offset_bytes(&self) -> u64 {
        self.filesystem_offset_bytes + self.mft_lcn * self.bytes_per_cluster
    }

    /// Absolute image offset of the first byte of cluster `lcn`.
    pub fn cluster_offset_bytes(&self, lcn: u64) -> u64 {
        self.filesystem_offset_bytes + lcn * self.bytes_per_cluster
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A minimal valid boot sector: 512-byte sectors, 8 sectors per cluster,
    /// MFT at LCN 4, 1024-byte MFT records, 4096-byte index records.
    pub(crate) fn sample_boot_sector() -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        buf[0x03..0x0B].copy_from_slice(b"NTFS    ");
        buf[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        buf[0x0D] = 8;
        buf[0x15] = 0xF8;
        buf[0x28..0x30].copy_from_slice(&100_000u64.to_le_bytes());
        buf[0x30..0x38].copy_from_slice(&4u64.to_le_bytes());
        buf[0x38..0x40].copy_from_slice(&2u64.to_le_bytes());
        buf[0x40] = (-10i8) as u8; // 2^10 = 1024
        buf[0x44] = (-12i8) as u8; // 2^12 = 4096
        buf[0x48..0x50].copy_from_slice(&0xDEADBEEFu64.to_le_bytes());
        buf
    }

    #[test]
    fn test_decode_sample() {
        let image = sample_boot_sector();
        let bs = BootSector::read_from(&image, 0).unwrap();
        assert_eq!(bs.bytes_per_sector, 512);
        assert_eq!(bs.sectors_per_cluster, 8);
        assert_eq!(bs.bytes_per_cluster(), 4096);
        assert_eq!(bs.mft_record_size(), 1024);
        assert_eq!(bs.index_record_size(), 4096);
        assert_eq!(bs.mft_lcn, 4);

        let geo = bs.geometry(0).unwrap();
        assert_eq!(geo.mft_start_offset_bytes(), 4 * 4096);
    }

    #[test]
    fn test_positive_record_size_encoding() {
        let mut image = sample_boot_sector();
        image[0x40] = 1; // 1 cluster per record
        let bs = BootSector::read_from(&image, 0).unwrap();
        assert_eq!(bs.mft_record_size(), 4096);
    }

    #[test]
    fn test_rejects_wrong_oem() {
        let mut image = sample_boot_sector();
        image[0x03..0x0B].copy_from_slice(b"MSDOS5.0");
        match BootSector::read_from(&image, 0).unwrap_err() {
            CoreError::NotNtfs { offset, found } => {
                assert_eq!(offset, 0);
                assert_eq!(&found, b"MSDOS5.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_image_smaller_than_boot_sector() {
        let image = vec![0u8; 100];
        assert!(matches!(
            BootSector::read_from(&image, 0).unwrap_err(),
            CoreError::ReadOutOfRange { .. }
        ));
    }

    #[test]
    fn test_offset_equivalence_sectors_vs_bytes() {
        let sectors = FilesystemOffset {
            offset_sectors: Some(2048),
            offset_bytes: None,
        };
        let bytes = FilesystemOffset {
            offset_sectors: None,
            offset_bytes: Some(1_048_576),
        };
        assert_eq!(sectors.resolve(DEFAULT_SECTOR_SIZE), 1_048_576);
        assert_eq!(bytes.resolve(DEFAULT_SECTOR_SIZE), 1_048_576);

        let mut image = vec![0u8; 1_048_576 + 512];
        image[1_048_576..].copy_from_slice(&sample_boot_sector());
        let a = BootSector::read_from(&image, sectors.resolve(512)).unwrap();
        let b = BootSector::read_from(&image, bytes.resolve(512)).unwrap();
        assert_eq!(
            a.geometry(1_048_576).unwrap().mft_start_offset_bytes(),
            b.geometry(1_048_576).unwrap().mft_start_offset_bytes()
        );
    }

    #[test]
    fn test_bad_cluster_size_rejected() {
        let mut image = sample_boot_sector();
        image[0x0D] = 3; // 3 sectors per cluster: not a power of two
        let bs = BootSector::read_from(&image, 0).unwrap();
        assert!(matches!(
            bs.geometry(0).unwrap_err(),
            CoreError::BadGeometry(_)
        ));
    }
}
