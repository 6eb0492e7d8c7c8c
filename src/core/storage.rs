/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! Storage abstraction over eMMC/UFS physical partitioning (S.3), plus the
//! `parse_gpt` glue that turns a raw GPT image into `Partition` records for
//! a given storage kind.

pub mod emmc;
pub mod ufs;

use crate::error::Result;
use crate::gpt;
use downcast_rs::{Downcast, impl_downcast};

pub use emmc::{EmmcPartition, EmmcStorage};
pub use ufs::{UfsPartition, UfsStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Emmc,
    Ufs,
    Nand,
    Unknown,
}

/// Which physical section of the storage device an offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Emmc(EmmcPartition),
    Ufs(UfsPartition),
}

impl PartitionKind {
    /// The numeric `partition_type` code XFlash/XML-DA parameter blocks use
    /// to tell the DA which physical section an offset is relative to.
    pub fn as_u32(&self) -> u32 {
        match self {
            PartitionKind::Emmc(EmmcPartition::Boot1) => 1,
            PartitionKind::Emmc(EmmcPartition::Boot2) => 2,
            PartitionKind::Emmc(EmmcPartition::Rpmb) => 3,
            PartitionKind::Emmc(EmmcPartition::Gp1) => 4,
            PartitionKind::Emmc(EmmcPartition::Gp2) => 5,
            PartitionKind::Emmc(EmmcPartition::Gp3) => 6,
            PartitionKind::Emmc(EmmcPartition::Gp4) => 7,
            PartitionKind::Emmc(EmmcPartition::User) => 8,
            PartitionKind::Ufs(UfsPartition::Lu0) => 0,
            PartitionKind::Ufs(UfsPartition::Lu1) => 1,
            PartitionKind::Ufs(UfsPartition::Lu2) => 2,
            PartitionKind::Ufs(UfsPartition::Lu3) => 3,
        }
    }

    /// XML-DA's `READ-FLASH`/`WRITE-FLASH`/`ERASE-FLASH` commands take the
    /// section as a string tag rather than `as_u32`'s numeric code.
    pub fn as_xml_name(&self) -> &'static str {
        match self {
            PartitionKind::Emmc(EmmcPartition::Boot1) => "EMMC-BOOT-1",
            PartitionKind::Emmc(EmmcPartition::Boot2) => "EMMC-BOOT-2",
            PartitionKind::Emmc(EmmcPartition::Rpmb) => "EMMC-RPMB",
            PartitionKind::Emmc(EmmcPartition::Gp1) => "EMMC-GP1",
            PartitionKind::Emmc(EmmcPartition::Gp2) => "EMMC-GP2",
            PartitionKind::Emmc(EmmcPartition::Gp3) => "EMMC-GP3",
            PartitionKind::Emmc(EmmcPartition::Gp4) => "EMMC-GP4",
            PartitionKind::Emmc(EmmcPartition::User) => "EMMC-USER",
            PartitionKind::Ufs(UfsPartition::Lu0) => "UFS-LU0",
            PartitionKind::Ufs(UfsPartition::Lu1) => "UFS-LU1",
            PartitionKind::Ufs(UfsPartition::Lu2) => "UFS-LU2",
            PartitionKind::Ufs(UfsPartition::Lu3) => "UFS-LU3",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub name: String,
    pub size: usize,
    pub address: u64,
    pub kind: PartitionKind,
}

impl Partition {
    pub fn new(name: &str, size: usize, address: u64, kind: PartitionKind) -> Self {
        Partition { name: name.to_string(), size, address, kind }
    }
}

/// Device-reported physical storage layout. Implemented by `EmmcStorage`
/// and `UfsStorage`; held as `Arc<dyn Storage>` once detected so it can be
/// shared between `DeviceInfo` and the active `DAProtocol`.
pub trait Storage: Downcast + Send + Sync + std::fmt::Debug {
    fn kind(&self) -> StorageType;
    fn get_pl_part1(&self) -> PartitionKind;
    fn get_pl_part2(&self) -> PartitionKind;
    fn get_user_part(&self) -> PartitionKind;
    fn get_pl1_size(&self) -> u64;
    fn get_pl2_size(&self) -> u64;
    fn get_user_size(&self) -> u64;
}
impl_downcast!(Storage);

/// True when `kind` addresses a preloader region (boot1/boot2 on eMMC, the
/// `lu0`/`lu1` boot LUNs on UFS) rather than the general user area.
pub fn is_pl_part(kind: PartitionKind) -> bool {
    matches!(
        kind,
        PartitionKind::Emmc(EmmcPartition::Boot1)
            | PartitionKind::Emmc(EmmcPartition::Boot2)
            | PartitionKind::Ufs(UfsPartition::Lu0)
            | PartitionKind::Ufs(UfsPartition::Lu1)
    )
}

/// Parses a raw GPT image and maps every entry onto `storage_type`'s user
/// partition kind, producing the `Partition` records `DAProtocol::get_partitions`
/// expects.
pub fn parse_gpt(data: &[u8], storage_type: StorageType) -> Result<Vec<Partition>> {
    let gpt = gpt::parse(data)?;
    let user_kind = match storage_type {
        StorageType::Ufs => PartitionKind::Ufs(UfsPartition::Lu3),
        _ => PartitionKind::Emmc(EmmcPartition::User),
    };

    Ok(gpt
        .partitions()
        .into_iter()
        .map(|e| {
            Partition::new(
                &e.name,
                (e.num_sectors() as usize) * gpt.sector_size,
                e.start_lba as u64 * gpt.sector_size as u64,
                user_kind,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pl_boot_partitions_are_recognized_across_storage_kinds() {
        assert!(is_pl_part(PartitionKind::Emmc(EmmcPartition::Boot1)));
        assert!(is_pl_part(PartitionKind::Ufs(UfsPartition::Lu1)));
        assert!(!is_pl_part(PartitionKind::Emmc(EmmcPartition::User)));
    }

    #[test]
    fn as_u32_matches_emmc_and_ufs_codes() {
        assert_eq!(PartitionKind::Emmc(EmmcPartition::Boot1).as_u32(), 1);
        assert_eq!(PartitionKind::Emmc(EmmcPartition::User).as_u32(), 8);
        assert_eq!(PartitionKind::Ufs(UfsPartition::Lu0).as_u32(), 0);
        assert_eq!(PartitionKind::Ufs(UfsPartition::Lu3).as_u32(), 3);
    }

    #[test]
    fn as_xml_name_is_distinct_per_section() {
        let names: Vec<&str> = [
            PartitionKind::Emmc(EmmcPartition::Boot1),
            PartitionKind::Emmc(EmmcPartition::User),
            PartitionKind::Ufs(UfsPartition::Lu0),
            PartitionKind::Ufs(UfsPartition::Lu3),
        ]
        .iter()
        .map(|k| k.as_xml_name())
        .collect();

        let unique: std::collections::HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());
    }
}
