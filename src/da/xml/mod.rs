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
mod flash;
#[cfg(not(feature = "no_exploits"))]
mod patch;
#[cfg(not(feature = "no_exploits"))]
mod sec;
mod storage;
mod xml_lib;
pub use xml_lib::Xml;
