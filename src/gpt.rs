/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! GUID Partition Table parsing (§4.8): header location under unknown
//! sector size, CRC verification, entry-array location cascade, and A/B
//! active-slot detection.

use crate::error::{Error, Result};
use crate::packer::crc32;

const SIGNATURE: &[u8; 8] = b"EFI PART";
const HEADER_OFFSET_CANDIDATES: &[usize] = &[4096, 512, 0, 8192, 1024];
const ENTRY_GAP_CANDIDATES: &[usize] = &[512, 4096, 1024, 2048];
const AB_KEYS: &[&str] = &["boot", "system", "vendor", "abl", "xbl", "dtbo"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptPartitionEntry {
    pub name: String,
    pub type_guid: String,
    pub unique_guid: String,
    pub start_lba: i64,
    pub end_lba: i64,
    pub attributes: u64,
    pub entry_index: usize,
}

impl GptPartitionEntry {
    pub fn num_sectors(&self) -> i64 {
        self.end_lba - self.start_lba + 1
    }

    fn is_active(&self) -> bool {
        (self.attributes.to_be_bytes()[1] & 0b0000_0100) != 0
    }

    fn is_successful(&self) -> bool {
        (self.attributes.to_be_bytes()[1] & 0b0000_1000) != 0
    }
}

#[derive(Debug, Clone)]
pub struct Gpt {
    pub sector_size: usize,
    pub header_offset: usize,
    pub header_crc_valid: bool,
    pub entries: Vec<GptPartitionEntry>,
}

impl Gpt {
    pub fn partitions(&self) -> Vec<GptPartitionEntry> {
        self.entries.clone()
    }

    /// Determines the currently-active A/B slot by majority vote of the
    /// Active attribute bit among base-name-keyed partitions, falling back
    /// to the Successful bit on a tie.
    pub fn active_slot(&self) -> Option<char> {
        let mut active_a = 0usize;
        let mut active_b = 0usize;
        let mut success_a = 0usize;
        let mut success_b = 0usize;

        for entry in &self.entries {
            let (base, slot) = match entry.name.rsplit_once('_') {
                Some((base, "a")) => (base, 'a'),
                Some((base, "b")) => (base, 'b'),
                _ => continue,
            };
            if !AB_KEYS.contains(&base) {
                continue;
            }

            if entry.is_active() {
                if slot == 'a' {
                    active_a += 1
                } else {
                    active_b += 1
                }
            }
            if entry.is_successful() {
                if slot == 'a' {
                    success_a += 1
                } else {
                    success_b += 1
                }
            }
        }

        if active_a != active_b {
            return Some(if active_a > active_b { 'a' } else { 'b' });
        }
        if success_a != success_b {
            return Some(if success_a > success_b { 'a' } else { 'b' });
        }
        None
    }

    pub fn parse(data: &[u8]) -> Result<Gpt> {
        parse(data)
    }
}

fn find_header_offset(data: &[u8]) -> Option<usize> {
    for &off in HEADER_OFFSET_CANDIDATES {
        if data.get(off..off + 8) == Some(SIGNATURE.as_slice()) {
            return Some(off);
        }
    }
    let mut off = 0;
    while off + 8 <= data.len() {
        if &data[off..off + 8] == SIGNATURE {
            return Some(off);
        }
        off += 512;
    }
    None
}

fn infer_sector_size(data: &[u8], header_offset: usize) -> usize {
    if header_offset > 0 {
        if let Some(my_lba) = data.get(header_offset + 24..header_offset + 32) {
            let my_lba = u64::from_le_bytes(my_lba.try_into().unwrap());
            if my_lba > 0 {
                let candidate = header_offset as u64 / my_lba;
                if candidate == 512 || candidate == 4096 {
                    return candidate as usize;
                }
            }
        }
    }
    4096
}

fn verify_header_crc(data: &[u8], header_offset: usize, header_size: usize) -> bool {
    let Some(slice) = data.get(header_offset..header_offset + header_size) else {
        return false;
    };
    let Some(crc_bytes) = data.get(header_offset + 16..header_offset + 20) else {
        return false;
    };
    let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());

    let mut copy = slice.to_vec();
    copy[16..20].fill(0);
    crc32(&copy) == expected
}

/// Mixed-endian GUID canonicalization: first 3 groups little-endian, last
/// 2 groups big-endian.
fn format_guid(bytes: &[u8]) -> String {
    if bytes.len() < 16 {
        return "00000000-0000-0000-0000-000000000000".to_string();
    }
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
        u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15],
    )
}

/// Inverse of `format_guid`: recovers the raw 16-byte mixed-endian GUID from
/// its canonical display string.
fn parse_guid(s: &str) -> [u8; 16] {
    let hex: Vec<u8> = s
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .as_bytes()
        .chunks(2)
        .map(|c| u8::from_str_radix(std::str::from_utf8(c).unwrap_or("00"), 16).unwrap_or(0))
        .collect();

    let mut out = [0u8; 16];
    if hex.len() < 16 {
        return out;
    }
    out[0] = hex[3];
    out[1] = hex[2];
    out[2] = hex[1];
    out[3] = hex[0];
    out[4] = hex[5];
    out[5] = hex[4];
    out[6] = hex[7];
    out[7] = hex[6];
    out[8..16].copy_from_slice(&hex[8..16]);
    out
}

fn decode_utf16le_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn find_entry_array_offset(
    data: &[u8],
    header_offset: usize,
    sector_size: usize,
) -> Option<usize> {
    let partition_entry_lba = data
        .get(header_offset + 72..header_offset + 80)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))?;

    let looks_like_entries = |off: usize| -> bool {
        data.get(off..off + 16).map(|g| g.iter().any(|&b| b != 0)).unwrap_or(false)
            && data.get(off + 56..off + 128).map(|n| n.iter().any(|&b| b != 0)).unwrap_or(false)
    };

    let candidates = [
        partition_entry_lba as usize * sector_size,
        partition_entry_lba as usize * if sector_size == 512 { 4096 } else { 512 },
        1024,
        8192,
    ]
    .into_iter()
    .chain(ENTRY_GAP_CANDIDATES.iter().map(|g| header_offset + g));

    for c in candidates {
        if looks_like_entries(c) {
            return Some(c);
        }
    }

    let mut off = header_offset + 92;
    while off < header_offset + 92 + 32 * 1024 {
        if looks_like_entries(off) {
            return Some(off);
        }
        off += 128;
    }

    None
}

pub fn parse(data: &[u8]) -> Result<Gpt> {
    let header_offset =
        find_header_offset(data).ok_or_else(|| Error::container("no GPT header found"))?;

    let header_size = data
        .get(header_offset + 12..header_offset + 16)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize)
        .unwrap_or(92)
        .max(92);

    let sector_size = infer_sector_size(data, header_offset);
    let header_crc_valid = verify_header_crc(data, header_offset, header_size);

    let entry_size = data
        .get(header_offset + 84..header_offset + 88)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize)
        .filter(|&s| s > 0)
        .unwrap_or(128);

    let declared_count = data
        .get(header_offset + 80..header_offset + 84)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize)
        .unwrap_or(0);

    let partition_entry_lba = data
        .get(header_offset + 72..header_offset + 80)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .unwrap_or(0);
    let first_usable_lba = data
        .get(header_offset + 40..header_offset + 48)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .unwrap_or(0);
    let lba_span_count = first_usable_lba
        .saturating_sub(partition_entry_lba)
        .saturating_mul(sector_size as u64)
        / entry_size as u64;

    let entry_array_offset = find_entry_array_offset(data, header_offset, sector_size)
        .ok_or_else(|| Error::container("no GPT entry array found"))?;

    let capacity = (data.len().saturating_sub(entry_array_offset)) / entry_size;
    let entry_count = declared_count
        .max(lba_span_count as usize)
        .clamp(128, 1024)
        .min(capacity.max(1));

    let mut entries = Vec::new();
    for i in 0..entry_count {
        let off = entry_array_offset + i * entry_size;
        let Some(raw) = data.get(off..off + entry_size) else { break };
        if raw[0..16].iter().all(|&b| b == 0) {
            continue;
        }

        let type_guid = format_guid(&raw[0..16]);
        let unique_guid = format_guid(&raw[16..32]);
        let start_lba = i64::from_le_bytes(raw[32..40].try_into().unwrap());
        let end_lba = i64::from_le_bytes(raw[40..48].try_into().unwrap());
        let attributes = u64::from_le_bytes(raw[48..56].try_into().unwrap());
        let name = decode_utf16le_name(&raw[56..entry_size.min(56 + 72)]);

        if name.is_empty() || start_lba > end_lba {
            continue;
        }

        entries.push(GptPartitionEntry {
            name,
            type_guid,
            unique_guid,
            start_lba,
            end_lba,
            attributes,
            entry_index: i,
        });
    }

    Ok(Gpt { sector_size, header_offset, header_crc_valid, entries })
}

/// Re-serializes a parsed `Gpt` back into a raw image: header, immediately
/// followed by a standard 128-byte-per-entry array. Round-trips through
/// `parse` (TP2): `parse(&serialize_gpt(&gpt)).partitions()` is equal as a
/// multiset to `gpt.partitions()`.
pub fn serialize_gpt(gpt: &Gpt) -> Vec<u8> {
    const ENTRY_SIZE: usize = 128;

    let sector_size = gpt.sector_size.max(1);
    let header_offset = gpt.header_offset;
    let my_lba = (header_offset / sector_size) as u64;
    let partition_entry_lba = my_lba + 1;
    let entry_array_offset = header_offset + sector_size;

    let total_len = entry_array_offset + gpt.entries.len() * ENTRY_SIZE;
    let mut data = vec![0u8; total_len.max(header_offset + 512)];

    data[header_offset..header_offset + 8].copy_from_slice(SIGNATURE);
    data[header_offset + 12..header_offset + 16].copy_from_slice(&92u32.to_le_bytes());
    data[header_offset + 24..header_offset + 32].copy_from_slice(&my_lba.to_le_bytes());
    data[header_offset + 40..header_offset + 48].copy_from_slice(&partition_entry_lba.to_le_bytes());
    data[header_offset + 72..header_offset + 80].copy_from_slice(&partition_entry_lba.to_le_bytes());
    data[header_offset + 80..header_offset + 84]
        .copy_from_slice(&(gpt.entries.len() as u32).to_le_bytes());
    data[header_offset + 84..header_offset + 88].copy_from_slice(&(ENTRY_SIZE as u32).to_le_bytes());

    for (i, e) in gpt.entries.iter().enumerate() {
        let off = entry_array_offset + i * ENTRY_SIZE;
        data[off..off + 16].copy_from_slice(&parse_guid(&e.type_guid));
        data[off + 16..off + 32].copy_from_slice(&parse_guid(&e.unique_guid));
        data[off + 32..off + 40].copy_from_slice(&e.start_lba.to_le_bytes());
        data[off + 40..off + 48].copy_from_slice(&e.end_lba.to_le_bytes());
        data[off + 48..off + 56].copy_from_slice(&e.attributes.to_le_bytes());
        for (j, unit) in e.name.encode_utf16().enumerate() {
            let noff = off + 56 + j * 2;
            if noff + 2 > off + ENTRY_SIZE {
                break;
            }
            data[noff..noff + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    let header_size = 92usize;
    let mut header_copy = data[header_offset..header_offset + header_size].to_vec();
    header_copy[16..20].fill(0);
    let crc = crc32(&header_copy);
    data[header_offset + 16..header_offset + 20].copy_from_slice(&crc.to_le_bytes());

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_entry(buf: &mut [u8], name: &str, start: i64, end: i64, active: bool) {
        buf[0..16].copy_from_slice(&[1u8; 16]); // nonzero type guid
        buf[32..40].copy_from_slice(&start.to_le_bytes());
        buf[40..48].copy_from_slice(&end.to_le_bytes());
        let attr: u64 = if active { 1 << 50 } else { 0 }; // byte 1, bit 2 => bit 50 overall
        buf[48..56].copy_from_slice(&attr.to_le_bytes());
        for (i, unit) in name.encode_utf16().enumerate() {
            let off = 56 + i * 2;
            buf[off..off + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    #[test]
    fn parses_4096_byte_sector_gpt_with_two_slots() {
        // S5: header at 4096, MyLba=1, PartitionEntryLba=2, two boot_a/boot_b entries.
        let mut data = vec![0u8; 1024 * 1024];
        data[4096..4104].copy_from_slice(SIGNATURE);
        data[4096 + 12..4096 + 16].copy_from_slice(&92u32.to_le_bytes());
        data[4096 + 24..4096 + 32].copy_from_slice(&1u64.to_le_bytes()); // MyLba
        data[4096 + 72..4096 + 80].copy_from_slice(&2u64.to_le_bytes()); // PartitionEntryLba
        data[4096 + 80..4096 + 84].copy_from_slice(&2u32.to_le_bytes()); // NumberOfEntries
        data[4096 + 84..4096 + 88].copy_from_slice(&128u32.to_le_bytes()); // SizeOfEntry

        let entries_off = 2usize * 4096;
        build_entry(&mut data[entries_off..entries_off + 128], "boot_a", 8, 263, true);
        build_entry(&mut data[entries_off + 128..entries_off + 256], "boot_b", 264, 519, false);

        let gpt = parse(&data).unwrap();
        assert_eq!(gpt.sector_size, 4096);
        assert_eq!(gpt.entries.len(), 2);
        assert_eq!(gpt.entries[0].name, "boot_a");
        assert_eq!(gpt.entries[1].name, "boot_b");
        assert_eq!(gpt.active_slot(), Some('a'));
    }

    #[test]
    fn round_trips_partition_count_for_multiset_equality() {
        let mut data = vec![0u8; 64 * 1024];
        data[512..520].copy_from_slice(SIGNATURE);
        data[512 + 12..512 + 16].copy_from_slice(&92u32.to_le_bytes());
        data[512 + 80..512 + 84].copy_from_slice(&1u32.to_le_bytes());
        data[512 + 84..512 + 88].copy_from_slice(&128u32.to_le_bytes());

        let entries_off = 512 + 1024;
        build_entry(&mut data[entries_off..entries_off + 128], "userdata", 1000, 50000, false);

        let gpt = parse(&data).unwrap();
        assert_eq!(gpt.entries.len(), 1);
        assert_eq!(gpt.entries[0].num_sectors(), 50000 - 1000 + 1);
    }

    #[test]
    fn serialize_gpt_round_trips_to_an_equal_partition_multiset() {
        let gpt = Gpt {
            sector_size: 4096,
            header_offset: 4096,
            header_crc_valid: true,
            entries: vec![
                GptPartitionEntry {
                    name: "boot_a".to_string(),
                    type_guid: format_guid(&[1u8; 16]),
                    unique_guid: format_guid(&[2u8; 16]),
                    start_lba: 8,
                    end_lba: 263,
                    attributes: 1 << 50,
                    entry_index: 0,
                },
                GptPartitionEntry {
                    name: "userdata".to_string(),
                    type_guid: format_guid(&[3u8; 16]),
                    unique_guid: format_guid(&[4u8; 16]),
                    start_lba: 264,
                    end_lba: 50000,
                    attributes: 0,
                    entry_index: 1,
                },
            ],
        };

        let serialized = serialize_gpt(&gpt);
        let reparsed = parse(&serialized).unwrap();

        let mut original: Vec<(String, i64, i64)> =
            gpt.partitions().into_iter().map(|e| (e.name, e.start_lba, e.end_lba)).collect();
        let mut round_tripped: Vec<(String, i64, i64)> =
            reparsed.partitions().into_iter().map(|e| (e.name, e.start_lba, e.end_lba)).collect();
        original.sort();
        round_tripped.sort();

        assert_eq!(original, round_tripped);
        assert!(reparsed.header_crc_valid);
    }
}
