/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! DA extensions: a small secondary handler uploaded on top of the stock
//! XFlash DA2, giving direct register access instead of the one-at-a-time
//! `DeviceCtrlReadRegister`/`SetRegisterValue` commands the stock DA exposes.

use log::debug;

use crate::da::xflash::XFlash;
use crate::da::xflash::cmds::Cmd;
use crate::error::{Error, Result};

/// Asks DA2 to switch over to the extension command set.
/// Returns whether extensions are now active.
pub async fn boot_extensions(xflash: &mut XFlash) -> Result<bool> {
    debug!("Requesting DA extension context");
    xflash.devctrl(Cmd::ExtSetupDaCtx, None).await?;
    Ok(true)
}

pub async fn read32_ext(xflash: &mut XFlash, addr: u32) -> Result<u32> {
    let param = addr.to_le_bytes();
    let resp = xflash.devctrl(Cmd::ExtReadRegister, Some(&[&param])).await?;
    if resp.len() < 4 {
        return Err(Error::io("Short extension register read"));
    }
    Ok(u32::from_le_bytes(resp[0..4].try_into().unwrap()))
}

pub async fn write32_ext(xflash: &mut XFlash, addr: u32, value: u32) -> Result<()> {
    let mut param = Vec::new();
    param.extend_from_slice(&addr.to_le_bytes());
    param.extend_from_slice(&value.to_le_bytes());
    xflash.devctrl(Cmd::ExtWriteRegister, Some(&[&param])).await?;
    Ok(())
}
