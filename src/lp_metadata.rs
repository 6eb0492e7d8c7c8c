/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! Android Logical Partition ("super" image) metadata parsing (§4.9).

use std::sync::Mutex;

use crate::error::{Error, Result};

const MAGIC: u32 = 0x414C_5030; // "0PLA" little-endian as u32
const MAJOR_VERSION: u16 = 10;
const HEADER_OFFSET_CANDIDATES: &[usize] = &[4096, 8192, 0x1000, 0x2000, 0x3000];
const SEARCH_BOUND: usize = 64 * 1024;
const CACHE_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpExtent {
    pub num_sectors: u64,
    pub target_type: u32,
    pub target_data: u64,
    pub target_source: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpPartitionInfo {
    pub name: String,
    pub extents: Vec<LpExtent>,
}

impl LpPartitionInfo {
    pub fn total_sectors(&self) -> u64 {
        self.extents.iter().map(|e| e.num_sectors).sum()
    }

    pub fn first_linear_offset(&self) -> i64 {
        self.extents
            .iter()
            .find(|e| e.target_type == 0)
            .map(|e| e.target_data as i64)
            .unwrap_or(-1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpMetadata {
    pub partitions: Vec<LpPartitionInfo>,
}

struct CacheEntry {
    key: (Vec<u8>, usize),
    value: LpMetadata,
}

fn cache() -> &'static Mutex<Vec<CacheEntry>> {
    static CACHE: std::sync::OnceLock<Mutex<Vec<CacheEntry>>> = std::sync::OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(Vec::new()))
}

fn cache_key(data: &[u8]) -> (Vec<u8>, usize) {
    let head = &data[..data.len().min(4096)];
    (md5::compute(head).to_vec(), data.len())
}

fn find_header_offset(data: &[u8]) -> Option<usize> {
    for &off in HEADER_OFFSET_CANDIDATES {
        if matches_magic(data, off) {
            return Some(off);
        }
    }
    let mut off = 0;
    while off < SEARCH_BOUND && off + 4 <= data.len() {
        if matches_magic(data, off) {
            return Some(off);
        }
        off += 4;
    }
    None
}

fn matches_magic(data: &[u8], off: usize) -> bool {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) == MAGIC)
        .unwrap_or(false)
        && data
            .get(off + 6..off + 8)
            .map(|b| u16::from_le_bytes(b.try_into().unwrap()) == MAJOR_VERSION)
            .unwrap_or(false)
}

struct Descriptor {
    offset: u32,
    count: u32,
    entry_size: u32,
}

fn read_descriptor(data: &[u8], off: usize) -> Option<Descriptor> {
    let b = data.get(off..off + 12)?;
    Some(Descriptor {
        offset: u32::from_le_bytes(b[0..4].try_into().unwrap()),
        count: u32::from_le_bytes(b[4..8].try_into().unwrap()),
        entry_size: u32::from_le_bytes(b[8..12].try_into().unwrap()),
    })
}

/// Parses the ALP0 "super" metadata, deep-copying out of an MD5-keyed
/// cache of bounded size (10 entries, full eviction on overflow).
pub fn parse(data: &[u8]) -> Result<LpMetadata> {
    let key = cache_key(data);
    {
        let guard = cache().lock().unwrap();
        if let Some(entry) = guard.iter().find(|e| e.key == key) {
            return Ok(entry.value.clone());
        }
    }

    let parsed = parse_uncached(data)?;

    let mut guard = cache().lock().unwrap();
    if guard.len() >= CACHE_CAPACITY {
        guard.clear();
    }
    guard.push(CacheEntry { key, value: parsed.clone() });

    Ok(parsed)
}

fn parse_uncached(data: &[u8]) -> Result<LpMetadata> {
    let header_offset =
        find_header_offset(data).ok_or_else(|| Error::container("no ALP0 header found"))?;

    // header_size(u32) + header_checksum(u32) + tables_size(u32) +
    // tables_checksum(u32) + partitions/extents/groups/block_devices
    // descriptors (12 bytes each) follow at a fixed layout after the
    // magic+version+header_size+checksum fields.
    let descriptors_base = header_offset + 12;
    let partitions_desc = read_descriptor(data, descriptors_base)
        .ok_or_else(|| Error::container("truncated ALP0 partitions descriptor"))?;
    let extents_desc = read_descriptor(data, descriptors_base + 12)
        .ok_or_else(|| Error::container("truncated ALP0 extents descriptor"))?;

    let tables_base = header_offset + 4 + 4 + 4 + 4 + 32 + 4 + 32;

    let mut extents = Vec::with_capacity(extents_desc.count as usize);
    for i in 0..extents_desc.count {
        let off =
            tables_base + extents_desc.offset as usize + (i * extents_desc.entry_size) as usize;
        let Some(raw) = data.get(off..off + 16) else { break };
        extents.push(LpExtent {
            num_sectors: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
            target_type: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            target_data: 0,
            target_source: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        });
        if let Some(last) = extents.last_mut()
            && let Some(data_bytes) = data.get(off + 16..off + 24)
        {
            last.target_data = u64::from_le_bytes(
                data_bytes.get(0..8).unwrap_or(&[0; 8]).try_into().unwrap_or([0; 8]),
            );
        }
    }

    let mut partitions = Vec::with_capacity(partitions_desc.count as usize);
    for i in 0..partitions_desc.count {
        let off = tables_base
            + partitions_desc.offset as usize
            + (i * partitions_desc.entry_size) as usize;
        let Some(raw) = data.get(off..off + partitions_desc.entry_size as usize) else { break };

        let name_bytes = &raw[0..36.min(raw.len())];
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();

        let first_extent_index =
            u32::from_le_bytes(raw[40..44].try_into().unwrap_or([0; 4])) as usize;
        let num_extents = u32::from_le_bytes(raw[44..48].try_into().unwrap_or([0; 4])) as usize;

        let part_extents = extents
            .iter()
            .skip(first_extent_index)
            .take(num_extents)
            .cloned()
            .collect();

        partitions.push(LpPartitionInfo { name, extents: part_extents });
    }

    Ok(LpMetadata { partitions })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_image() -> Vec<u8> {
        let header_offset = 4096;
        let mut data = vec![0u8; header_offset + 4096];

        data[header_offset..header_offset + 4].copy_from_slice(&MAGIC.to_le_bytes());
        data[header_offset + 6..header_offset + 8].copy_from_slice(&MAJOR_VERSION.to_le_bytes());

        let descriptors_base = header_offset + 12;
        // partitions descriptor: offset=0, count=1, entry_size=48
        data[descriptors_base..descriptors_base + 4].copy_from_slice(&0u32.to_le_bytes());
        data[descriptors_base + 4..descriptors_base + 8].copy_from_slice(&1u32.to_le_bytes());
        data[descriptors_base + 8..descriptors_base + 12].copy_from_slice(&48u32.to_le_bytes());
        // extents descriptor: offset=48, count=1, entry_size=24
        data[descriptors_base + 12..descriptors_base + 16].copy_from_slice(&48u32.to_le_bytes());
        data[descriptors_base + 16..descriptors_base + 20].copy_from_slice(&1u32.to_le_bytes());
        data[descriptors_base + 20..descriptors_base + 24].copy_from_slice(&24u32.to_le_bytes());

        let tables_base = header_offset + 4 + 4 + 4 + 4 + 32 + 4 + 32;

        let extent_off = tables_base + 48;
        data[extent_off..extent_off + 8].copy_from_slice(&2048u64.to_le_bytes());
        data[extent_off + 8..extent_off + 12].copy_from_slice(&0u32.to_le_bytes()); // LINEAR
        data[extent_off + 16..extent_off + 24].copy_from_slice(&100u64.to_le_bytes());

        let part_off = tables_base;
        data[part_off..part_off + 6].copy_from_slice(b"system");
        data[part_off + 40..part_off + 44].copy_from_slice(&0u32.to_le_bytes());
        data[part_off + 44..part_off + 48].copy_from_slice(&1u32.to_le_bytes());

        data
    }

    #[test]
    fn parses_single_partition_single_extent() {
        let data = build_minimal_image();
        let meta = parse(&data).unwrap();
        assert_eq!(meta.partitions.len(), 1);
        assert_eq!(meta.partitions[0].name, "system");
        assert_eq!(meta.partitions[0].total_sectors(), 2048);
        assert_eq!(meta.partitions[0].first_linear_offset(), 100);
    }

    #[test]
    fn repeated_parse_is_deep_copied_and_structurally_stable() {
        let data = build_minimal_image();
        let first = parse(&data).unwrap();
        let mut second = parse(&data).unwrap();
        assert_eq!(first, second);
        second.partitions[0].name.push_str("-mutated");
        let third = parse(&data).unwrap();
        assert_eq!(third.partitions[0].name, "system");
    }
}
