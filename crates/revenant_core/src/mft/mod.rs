//! MFT engine: record iteration, extension merging, $DATA extraction.
//!
//! The engine bootstraps itself from record 0, whose own $DATA runlist
//! defines where every subsequent record lives. It can also run over an
//! extracted `$MFT` file, in which case records are contiguous.

mod entry;
mod selector;

pub use entry::{MftEntry, FILE_SIGNATURE, FLAG_DIRECTORY, FLAG_IN_USE};
pub use selector::InumSelector;

use std::collections::BTreeMap;

use crate::attr::{Attribute, AttributeBody, AttributeForm, AttributeType, Run};
use crate::boot::Geometry;
use crate::error::{CoreError, Result};
use crate::source::ByteSource;

/// Record size assumed for extracted `$MFT` files, where no boot sector is
/// available to say otherwise.
pub const DEFAULT_MFT_RECORD_SIZE: u64 = 1024;

/// Inum of the $LogFile entry.
pub const LOGFILE_INUM: u64 = 2;
/// Inum of the $Extend directory, whose index names $UsnJrnl.
pub const EXTEND_INUM: u64 = 11;

/// Byte extent of MFT data: `length` bytes of record data starting at
/// `data_offset` within the MFT, backed at `image_offset` in the image.
#[derive(Debug, Clone)]
struct Extent {
    data_offset: u64,
    image_offset: u64,
    length: u64,
}

#[derive(Debug, Clone)]
enum RecordMap {
    /// Extracted `$MFT` file: record i at `i * record_size`.
    Contiguous,
    /// Raw image: records located through record 0's $DATA runlist.
    Extents(Vec<Extent>),
}

/// Aggregate counters over the parsed entries.
#[derive(Debug, Clone, Default)]
pub struct MftStatistics {
    pub records_parsed: u64,
    pub records_in_use: u64,
    pub directories: u64,
    pub extension_records: u64,
    pub multi_stream_entries: u64,
    pub attribute_counts: BTreeMap<String, u64>,
}

/// The MFT engine. `entries` is keyed by inum and populated by the parse
/// operations; extension records are merged into their bases afterwards.
pub struct Mft<'s> {
    source: &'s dyn ByteSource,
    geometry: Option<Geometry>,
    map: RecordMap,
    record_size: u64,
    record_count: u64,
    sector_size: usize,
    pub entries: BTreeMap<u64, MftEntry>,
}

impl<'s> Mft<'s> {
    /// Bootstraps from a raw image: parses record 0 at the geometry's MFT
    /// start offset and expands its $DATA runlist into the record map.
    pub fn from_image(source: &'s dyn ByteSource, geometry: &Geometry) -> Result<Self> {
        let record_size = geometry.mft_record_size;
        let sector_size = geometry.sector_size as usize;
        let record0 = source.read(geometry.mft_start_offset_bytes(), record_size as usize)?;
        let entry0 = MftEntry::parse(0, &record0, sector_size)?;

        let data = entry0
            .data_attributes()
            .first()
            .ok_or(CoreError::MissingAttribute {
                inum: 0,
                attribute: "$DATA",
            })?;
        let extent = match &data.form {
            AttributeForm::NonResident(extent) => extent,
            AttributeForm::Resident { .. } => {
                return Err(CoreError::BadGeometry(
                    "MFT $DATA attribute is resident".into(),
                ))
            }
        };

        let mut extents = Vec::with_capacity(extent.runs.len());
        let mut data_offset = 0u64;
        for run in &extent.runs {
            match *run {
                Run::Allocated { lcn, clusters } => {
                    let length = clusters * geometry.bytes_per_cluster;
                    extents.push(Extent {
                        data_offset,
                        image_offset: geometry.cluster_offset_bytes(lcn),
                        length,
                    });
                    data_offset += length;
                }
                Run::Sparse { .. } => {
                    return Err(CoreError::BadGeometry(
                        "MFT $DATA runlist contains a sparse run".into(),
                    ))
                }
            }
        }

        let record_count = extent.real_size / record_size;
        let mut mft = Self {
            source,
            geometry: Some(geometry.clone()),
            map: RecordMap::Extents(extents),
            record_size,
            record_count,
            sector_size,
            entries: BTreeMap::new(),
        };
        mft.entries.insert(0, entry0);
        Ok(mft)
    }

    /// Runs over an extracted `$MFT` file where records are contiguous.
    pub fn from_extracted(source: &'s dyn ByteSource, record_size: u64) -> Self {
        Self {
            source,
            geometry: None,
            map: RecordMap::Contiguous,
            record_size,
            record_count: source.size() / record_size,
            sector_size: 512,
            entries: BTreeMap::new(),
        }
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    /// Raw (pre-fixup) bytes of record `inum`.
    pub fn read_record_bytes(&self, inum: u64) -> Result<Vec<u8>> {
        if inum >= self.record_count {
            return Err(CoreError::InumNotFound { inum });
        }
        let start = inum * self.record_size;
        match &self.map {
            RecordMap::Contiguous => self.source.read(start, self.record_size as usize),
            RecordMap::Extents(extents) => {
                let mut out = Vec::with_capacity(self.record_size as usize);
                let mut cursor = start;
                let end = start + self.record_size;
                while cursor < end {
                    let extent = extents
                        .iter()
                        .find(|e| cursor >= e.data_offset && cursor < e.data_offset + e.length)
                        .ok_or(CoreError::InumNotFound { inum })?;
                    let within = cursor - extent.data_offset;
                    let take = (extent.length - within).min(end - cursor);
                    out.extend(
                        self.source
                            .read(extent.image_offset + within, take as usize)?,
                    );
                    cursor += take;
                }
                Ok(out)
            }
        }
    }

    /// Parses a single record into `entries`.
    pub fn parse_inum(&mut self, inum: u64) -> Result<()> {
        let bytes = self.read_record_bytes(inum)?;
        let entry = MftEntry::parse(inum, &bytes, self.sector_size)?;
        self.entries.insert(inum, entry);
        Ok(())
    }

    /// Parses every record, skipping malformed ones with a diagnostic, then
    /// merges extension records. `on_record` observes progress.
    pub fn parse_all_with(&mut self, mut on_record: impl FnMut(u64)) {
        for inum in 0..self.record_count {
            if let Err(err) = self.parse_inum(inum) {
                log::warn!("skipping MFT record {inum}: {err}");
            }
            on_record(inum);
        }
        self.merge_extensions();
    }

    pub fn parse_all(&mut self) {
        self.parse_all_with(|_| {});
    }

    /// Parses the selected records, recovering per record, then merges
    /// extensions among what was parsed.
    pub fn parse_range(&mut self, selector: &InumSelector) {
        for inum in selector.resolve(self.record_count) {
            if let Err(err) = self.parse_inum(inum) {
                log::warn!("skipping MFT record {inum}: {err}");
            }
        }
        self.merge_extensions();
    }

    /// Folds extension-record attributes into their base entries. Extension
    /// entries stay in the map so raw/parsed exports still see them.
    fn merge_extensions(&mut self) {
        let extension_inums: Vec<u64> = self
            .entries
            .values()
            .filter(|e| !e.is_base_record())
            .map(|e| e.inum)
            .collect();
        for inum in extension_inums {
            let (base_inum, attributes): (u64, Vec<Attribute>) = {
                let ext = &self.entries[&inum];
                (
                    ext.base_reference.inum,
                    ext.attributes.values().flatten().cloned().collect(),
                )
            };
            match self.entries.get_mut(&base_inum) {
                Some(base) => {
                    for attribute in attributes {
                        base.attributes
                            .entry(attribute.type_code)
                            .or_default()
                            .push(attribute);
                    }
                }
                None => {
                    log::warn!("extension record {inum} references missing base {base_inum}")
                }
            }
        }
    }

    /// Full content of the `stream`-th $DATA attribute of `inum` (0 = the
    /// default stream). Sparse runs read back as zeros; output is truncated
    /// to the attribute's real size.
    pub fn extract_data(&self, inum: u64, stream: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(&inum)
            .ok_or(CoreError::InumNotFound { inum })?;
        let attribute =
            entry
                .data_attributes()
                .get(stream)
                .ok_or(CoreError::MissingAttribute {
                    inum,
                    attribute: "$DATA",
                })?;
        match (&attribute.form, &attribute.body) {
            (AttributeForm::Resident { .. }, AttributeBody::Data(content)) => Ok(content.clone()),
            (AttributeForm::NonResident(extent), _) => {
                let geometry = self.geometry.as_ref().ok_or_else(|| {
                    CoreError::BadGeometry(
                        "non-resident extraction requires a volume image".into(),
                    )
                })?;
                let mut out = Vec::with_capacity(extent.real_size as usize);
                for run in &extent.runs {
                    match *run {
                        Run::Allocated { lcn, clusters } => {
                            let bytes = (clusters * geometry.bytes_per_cluster) as usize;
                            out.extend(
                                self.source
                                    .read(geometry.cluster_offset_bytes(lcn), bytes)?,
                            );
                        }
                        Run::Sparse { clusters } => {
                            out.resize(
                                out.len() + (clusters * geometry.bytes_per_cluster) as usize,
                                0,
                            );
                        }
                    }
                }
                out.truncate(extent.real_size as usize);
                Ok(out)
            }
            (AttributeForm::Resident { .. }, _) => Err(CoreError::MissingAttribute {
                inum,
                attribute: "$DATA",
            }),
        }
    }

    /// Resolves the $UsnJrnl inum through the $Extend directory index.
    pub fn usnjrnl_inum(&self) -> Result<u64> {
        let extend = self
            .entries
            .get(&EXTEND_INUM)
            .ok_or(CoreError::InumNotFound { inum: EXTEND_INUM })?;
        let roots = extend
            .attributes
            .get(&AttributeType::IndexRoot)
            .ok_or(CoreError::MissingAttribute {
                inum: EXTEND_INUM,
                attribute: "$INDEX_ROOT",
            })?;
        for root in roots {
            if let AttributeBody::IndexRoot(index) = &root.body {
                if let Some(entry) = index.find_entry("$UsnJrnl") {
                    return Ok(entry.reference.inum);
                }
            }
        }
        Err(CoreError::MissingAttribute {
            inum: EXTEND_INUM,
            attribute: "$UsnJrnl index entry",
        })
    }

    /// Counters over everything parsed so far.
    pub fn statistics(&self) -> MftStatistics {
        let mut stats = MftStatistics::default();
        for entry in self.entries.values() {
            stats.records_parsed += 1;
            if entry.is_in_use() {
                stats.records_in_use += 1;
            }
            if entry.is_directory() {
                stats.directories += 1;
            }
            if !entry.is_base_record() {
                stats.extension_records += 1;
            }
            if entry.data_attributes().len() > 1 {
                stats.multi_stream_entries += 1;
            }
            for (type_code, list) in &entry.attributes {
                *stats
                    .attribute_counts
                    .entry(type_code.to_string())
                    .or_default() += list.len() as u64;
            }
        }
        stats
    }
}
