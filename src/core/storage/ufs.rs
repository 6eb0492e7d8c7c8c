/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! UFS storage layout, parsed from the DA's `GetUfsInfo` devctrl response.
//! UFS exposes the two boot LUNs plus the RPMB LUN and four general LUNs;
//! `Lu3` is treated as the conventional "user" data LUN.

use crate::core::storage::{PartitionKind, Storage, StorageType};
use crate::error::{Error, Result};
use crate::utilities::xml::get_tag_usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UfsPartition {
    Lu0,
    Lu1,
    Lu2,
    Lu3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UfsStorage {
    pub lu0_size: u64,
    pub lu1_size: u64,
    pub lu2_size: u64,
    pub lu3_size: u64,
    pub block_size: u32,
}

impl UfsStorage {
    /// `GetUfsInfo` returns four LUN sizes (bytes, LE u64) followed by the
    /// logical block size (LE u32).
    pub fn from_response(resp: &[u8]) -> Result<Self> {
        if resp.len() < 8 * 4 + 4 {
            return Err(Error::container("truncated UFS info response"));
        }
        let u64_at = |off: usize| u64::from_le_bytes(resp[off..off + 8].try_into().unwrap());

        Ok(UfsStorage {
            lu0_size: u64_at(0),
            lu1_size: u64_at(8),
            lu2_size: u64_at(16),
            lu3_size: u64_at(24),
            block_size: u32::from_le_bytes(resp[32..36].try_into().unwrap()),
        })
    }

    /// XML-DA's `GET-HW-INFO` reply carries the same fields as textual tags
    /// rather than a packed binary blob.
    pub fn from_xml_response(xml: &str) -> Result<Self> {
        Ok(UfsStorage {
            lu0_size: get_tag_usize(xml, "lu0_size")? as u64,
            lu1_size: get_tag_usize(xml, "lu1_size")? as u64,
            lu2_size: get_tag_usize(xml, "lu2_size")? as u64,
            lu3_size: get_tag_usize(xml, "lu3_size")? as u64,
            block_size: get_tag_usize(xml, "block_size")? as u32,
        })
    }
}

impl Storage for UfsStorage {
    fn kind(&self) -> StorageType {
        StorageType::Ufs
    }

    fn get_pl_part1(&self) -> PartitionKind {
        PartitionKind::Ufs(UfsPartition::Lu0)
    }

    fn get_pl_part2(&self) -> PartitionKind {
        PartitionKind::Ufs(UfsPartition::Lu1)
    }

    fn get_user_part(&self) -> PartitionKind {
        PartitionKind::Ufs(UfsPartition::Lu3)
    }

    fn get_pl1_size(&self) -> u64 {
        self.lu0_size
    }

    fn get_pl2_size(&self) -> u64 {
        self.lu1_size
    }

    fn get_user_size(&self) -> u64 {
        self.lu3_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_luns_and_block_size() {
        let mut resp = vec![0u8; 36];
        resp[24..32].copy_from_slice(&0x10_0000_0000u64.to_le_bytes());
        resp[32..36].copy_from_slice(&4096u32.to_le_bytes());
        let s = UfsStorage::from_response(&resp).unwrap();
        assert_eq!(s.lu3_size, 0x10_0000_0000);
        assert_eq!(s.block_size, 4096);
        assert_eq!(s.get_user_part(), PartitionKind::Ufs(UfsPartition::Lu3));
    }
}
