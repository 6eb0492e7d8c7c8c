/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! eMMC storage layout, parsed from the DA's `GetEmmcInfo` devctrl response.

use crate::core::storage::{PartitionKind, Storage, StorageType};
use crate::error::{Error, Result};
use crate::utilities::xml::get_tag_usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmmcPartition {
    Boot1,
    Boot2,
    Rpmb,
    Gp1,
    Gp2,
    Gp3,
    Gp4,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmmcStorage {
    pub boot1_size: u64,
    pub boot2_size: u64,
    pub rpmb_size: u64,
    pub gp_size: [u64; 4],
    pub user_size: u64,
}

impl EmmcStorage {
    /// `GetEmmcInfo` returns boot1/boot2/rpmb sizes, four GP partition
    /// sizes, and the user-area size as consecutive little-endian u64s.
    pub fn from_response(resp: &[u8]) -> Result<Self> {
        if resp.len() < 8 * 8 {
            return Err(Error::container("truncated eMMC info response"));
        }
        let u64_at = |off: usize| u64::from_le_bytes(resp[off..off + 8].try_into().unwrap());

        Ok(EmmcStorage {
            boot1_size: u64_at(0),
            boot2_size: u64_at(8),
            rpmb_size: u64_at(16),
            gp_size: [u64_at(24), u64_at(32), u64_at(40), u64_at(48)],
            user_size: u64_at(56),
        })
    }

    /// XML-DA's `GET-HW-INFO` reply carries the same fields as textual tags
    /// rather than a packed binary blob.
    pub fn from_xml_response(xml: &str) -> Result<Self> {
        Ok(EmmcStorage {
            boot1_size: get_tag_usize(xml, "boot1_size")? as u64,
            boot2_size: get_tag_usize(xml, "boot2_size")? as u64,
            rpmb_size: get_tag_usize(xml, "rpmb_size")? as u64,
            gp_size: [
                get_tag_usize(xml, "gp1_size")? as u64,
                get_tag_usize(xml, "gp2_size")? as u64,
                get_tag_usize(xml, "gp3_size")? as u64,
                get_tag_usize(xml, "gp4_size")? as u64,
            ],
            user_size: get_tag_usize(xml, "user_size")? as u64,
        })
    }
}

impl Storage for EmmcStorage {
    fn kind(&self) -> StorageType {
        StorageType::Emmc
    }

    fn get_pl_part1(&self) -> PartitionKind {
        PartitionKind::Emmc(EmmcPartition::Boot1)
    }

    fn get_pl_part2(&self) -> PartitionKind {
        PartitionKind::Emmc(EmmcPartition::Boot2)
    }

    fn get_user_part(&self) -> PartitionKind {
        PartitionKind::Emmc(EmmcPartition::User)
    }

    fn get_pl1_size(&self) -> u64 {
        self.boot1_size
    }

    fn get_pl2_size(&self) -> u64 {
        self.boot2_size
    }

    fn get_user_size(&self) -> u64 {
        self.user_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_width_le_fields() {
        let mut resp = vec![0u8; 64];
        resp[0..8].copy_from_slice(&0x0020_0000u64.to_le_bytes());
        resp[56..64].copy_from_slice(&0x7_0000_0000u64.to_le_bytes());
        let s = EmmcStorage::from_response(&resp).unwrap();
        assert_eq!(s.boot1_size, 0x0020_0000);
        assert_eq!(s.user_size, 0x7_0000_0000);
        assert_eq!(s.kind(), StorageType::Emmc);
    }

    #[test]
    fn rejects_truncated_response() {
        assert!(EmmcStorage::from_response(&[0u8; 10]).is_err());
    }
}
