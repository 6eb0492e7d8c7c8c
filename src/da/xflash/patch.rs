/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Static DA patching: flips the ARM/Thumb "return not verified" anchors in
//! a local copy of DA1/DA2 ahead of upload, for targets where Kamakiri2's
//! prepared-DA1 path applies (see `exploit::kamakiri`). Runtime patching of
//! a device that's already booted DA1 goes through `exploit::carbonara`
//! instead, since the on-disk signature can no longer be touched at that
//! point.

use log::info;

use crate::da::xflash::XFlash;
use crate::da::{DA, DAEntryRegion};
use crate::error::{Error, Result};
use crate::utilities::patching::bypass_security_checks;

fn patch_region(region: &DAEntryRegion) -> DAEntryRegion {
    let sig_len = region.sig_len as usize;
    let unsigned_len = region.data.len().saturating_sub(sig_len);
    let mut patched = bypass_security_checks(&region.data[..unsigned_len]);
    patched.extend_from_slice(&region.data[unsigned_len..]);

    DAEntryRegion {
        data: patched,
        offset: region.offset,
        length: region.length,
        addr: region.addr,
        region_length: region.region_length,
        sig_len: region.sig_len,
    }
}

/// Patches both DA1 and DA2 in a cloned `DA`, leaving the original untouched.
pub fn patch_da(xflash: &mut XFlash) -> Result<DA> {
    let mut da = xflash.da.clone();

    let da1_addr = da.get_da1().map(|r| r.addr);
    let da2_addr = da.get_da2().map(|r| r.addr);

    for region in da.regions.iter_mut() {
        if Some(region.addr) == da1_addr || Some(region.addr) == da2_addr {
            *region = patch_region(region);
        }
    }

    info!("[mtkflash] Patched DA1 and DA2 security checks");
    Ok(da)
}

/// Patches only DA1.
pub fn patch_da1(xflash: &mut XFlash) -> Result<DAEntryRegion> {
    let da1 = xflash.da.get_da1().ok_or_else(|| Error::other("DA1 region not found"))?;
    Ok(patch_region(da1))
}

/// Patches only DA2.
pub fn patch_da2(xflash: &mut XFlash) -> Result<DAEntryRegion> {
    let da2 = xflash.da.get_da2().ok_or_else(|| Error::other("DA2 region not found"))?;
    Ok(patch_region(da2))
}
