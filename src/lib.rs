/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod chip_db;
pub mod connection;
pub mod core;
pub mod da;
pub mod device;
pub mod error;
#[cfg(not(feature = "no_exploits"))]
pub mod exploit;
pub mod gpt;
pub mod lp_metadata;
pub mod packer;
pub mod rawprogram;
pub mod utilities;

pub use connection::port::{MTKPort, find_mtk_port};
pub use core::storage::{Partition, PartitionKind};
pub use da::DAProtocol;
pub use device::{Device, DeviceBuilder};

/// Reads a little-endian `u16` out of `$buf` at byte offset `$off`.
#[macro_export]
macro_rules! le_u16 {
    ($buf:expr, $off:expr) => {
        u16::from_le_bytes($buf[$off..$off + 2].try_into().unwrap())
    };
}

/// Reads a little-endian `u32` out of `$buf` at byte offset `$off`.
#[macro_export]
macro_rules! le_u32 {
    ($buf:expr, $off:expr) => {
        u32::from_le_bytes($buf[$off..$off + 4].try_into().unwrap())
    };
}
