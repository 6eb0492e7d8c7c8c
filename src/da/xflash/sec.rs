/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Bootloader lock-state (seccfg) read/write for XFlash, and the `CryptoIO`
//! bridge that lets `SEJCrypto` drive the device's SEJ hardware block through
//! this protocol's own `read32`/`write32`.

use std::io::Cursor;

use async_trait::async_trait;
use log::error;

use crate::core::crypto::config::{CryptoConfig, CryptoIO};
use crate::core::crypto::sej::SEJCrypto;
use crate::core::seccfg::{LockFlag, SecCfgV4};
use crate::da::DAProtocol;
use crate::da::xflash::XFlash;

/// TODO: Dynamically determine SEJ base (maybe through preloader), same
/// assumption `Device::set_seccfg_lock_state` makes.
const SEJ_BASE: u32 = 0x1000A000;

#[async_trait]
impl CryptoIO for XFlash {
    async fn read32(&mut self, addr: u32) -> u32 {
        match DAProtocol::read32(self, addr).await {
            Ok(val) => val,
            Err(e) => {
                error!("Failed to read32 at 0x{:08X}: {}", addr, e);
                0
            }
        }
    }

    async fn write32(&mut self, addr: u32, val: u32) {
        if let Err(e) = DAProtocol::write32(self, addr, val).await {
            error!("Failed to write32 at 0x{:08X}: {}", addr, e);
        }
    }
}

pub async fn parse_seccfg(xflash: &mut XFlash) -> Option<SecCfgV4> {
    let part = xflash.dev_info.get_partition("seccfg").await?;
    let storage = xflash.dev_info.storage().await?;
    let section = storage.get_user_part();

    let mut raw = Vec::new();
    let mut cursor = Cursor::new(&mut raw);
    let mut progress = |_, _| {};
    DAProtocol::read_flash(xflash, part.address, part.size, section, &mut progress, &mut cursor)
        .await
        .ok()?;

    let mut crypto_config = CryptoConfig::new(SEJ_BASE, xflash);
    let mut sej = SEJCrypto::new(&mut crypto_config);
    SecCfgV4::parse(&raw, &mut sej).await.ok()
}

pub async fn write_seccfg(xflash: &mut XFlash, seccfg: &mut SecCfgV4) -> Option<Vec<u8>> {
    let part = xflash.dev_info.get_partition("seccfg").await?;
    let storage = xflash.dev_info.storage().await?;
    let section = storage.get_user_part();

    // `set_lock_state` has already run on `seccfg` by the time callers reach
    // here; re-derive the `LockFlag` from it since `create` insists on one.
    let flag = if seccfg.lock_state == 4 { LockFlag::Lock } else { LockFlag::Unlock };
    let new_seccfg = {
        let mut crypto_config = CryptoConfig::new(SEJ_BASE, xflash);
        let mut sej = SEJCrypto::new(&mut crypto_config);
        seccfg.create(&mut sej, flag).await
    };

    let mut reader = Cursor::new(&new_seccfg);
    let mut progress = |_, _| {};
    DAProtocol::write_flash(xflash, part.address, part.size, &mut reader, section, &mut progress)
        .await
        .ok()?;

    Some(new_seccfg)
}
