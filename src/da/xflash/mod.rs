/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
#[macro_use]
mod macros;
mod cmds;
mod da_protocol;
#[cfg(not(feature = "no_exploits"))]
mod exts;
pub mod flash;
#[cfg(not(feature = "no_exploits"))]
mod patch;
#[cfg(not(feature = "no_exploits"))]
mod sec;
mod storage;
mod xflash;
pub use cmds::*;
pub use xflash::*;
