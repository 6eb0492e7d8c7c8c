/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! `CryptoIO`: the MMIO read32/write32 seam `SEJCrypto` drives the SEJ
//! hardware block through, backed by whatever has BROM/preloader register
//! access (in practice, `Device` via the active `DAProtocol`).

use async_trait::async_trait;

#[async_trait]
pub trait CryptoIO: Send {
    async fn read32(&mut self, addr: u32) -> u32;
    async fn write32(&mut self, addr: u32, val: u32);
}

/// Base address plus the `CryptoIO` handle `SEJCrypto` issues register
/// accesses through. Register offsets are relative to `sej_base`.
pub struct CryptoConfig<'a> {
    pub sej_base: u32,
    io: &'a mut dyn CryptoIO,
}

impl<'a> CryptoConfig<'a> {
    pub fn new(sej_base: u32, io: &'a mut dyn CryptoIO) -> Self {
        CryptoConfig { sej_base, io }
    }

    pub async fn read_reg(&mut self, offset: u32) -> u32 {
        self.io.read32(self.sej_base + offset).await
    }

    pub async fn write_reg(&mut self, offset: u32, val: u32) {
        self.io.write32(self.sej_base + offset, val).await
    }
}
