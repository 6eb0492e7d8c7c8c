/*
    SPDX-License-Identifier: GPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy

    Derived from:
    https://github.com/bkerler/mtkclient/blob/main/mtkclient/Library/Hardware/seccfg.py
    Original SPDX-License-Identifier: GPL-3.0-or-later
    Original SPDX-FileCopyrightText: 2018–2024 bkerler

    This file remains under the GPL-3.0-or-later license.
    However, as part of a larger project licensed under the AGPL-3.0-or-later,
    the combined work is subject to the networking terms of the AGPL-3.0-or-later,
    as for term 13 of the GPL-3.0-or-later license.
*/
use sha2::{Digest, Sha256};

use crate::core::crypto::sej::SEJCrypto;
use crate::error::{Error, Result};

const V4_MAGIC_BEGIN: u32 = 0x4D4D4D4D;
const V4_MAGIC_END: u32 = 0x45454545;

pub enum LockFlag {
    Lock,
    Unlock,
}

#[derive(Clone)]
pub enum SecCfgV4Algo {
    SW,
    HW,
    HWv3,
    HWv4,
}

#[derive(Default)]
pub struct SecCfgV4 {
    pub seccfg_ver: u32,
    pub seccfg_size: u32,
    pub lock_state: u32,
    pub critical_lock_state: u32,
    pub sboot_runtime: u32,
    algo: Option<SecCfgV4Algo>,
    enc_hash: Option<Vec<u8>>,
}

impl SecCfgV4 {
    pub fn new() -> Self {
        SecCfgV4 {
            seccfg_ver: 4,
            seccfg_size: 20,
            lock_state: 0,
            critical_lock_state: 0,
            sboot_runtime: 0,
            algo: None,
            enc_hash: None,
        }
    }

    pub fn parse_header(data: &[u8]) -> Result<SecCfgV4> {
        if data.len() < 0x20 {
            return Err(Error::other("SecCfg v4 data too short"));
        }

        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let seccfg_ver = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let seccfg_size = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let lock_state = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let critical_lock_state = u32::from_le_bytes(data[16..20].try_into().unwrap());
        let sboot_runtime = u32::from_le_bytes(data[20..24].try_into().unwrap());
        let endflag = u32::from_le_bytes(data[24..28].try_into().unwrap());
        let enc_hash = data[28..60].to_vec();

        if magic != V4_MAGIC_BEGIN || endflag != V4_MAGIC_END {
            return Err(Error::other("Invalid SecCfg v4 magic values"));
        }

        Ok(SecCfgV4 {
            seccfg_ver,
            seccfg_size,
            lock_state,
            critical_lock_state,
            sboot_runtime,
            algo: None,
            enc_hash: Some(enc_hash),
        })
    }

    pub fn get_hash(&self) -> Vec<u8> {
        let header_data = [
            V4_MAGIC_BEGIN.to_le_bytes(),
            self.seccfg_ver.to_le_bytes(),
            self.seccfg_size.to_le_bytes(),
            self.lock_state.to_le_bytes(),
            self.critical_lock_state.to_le_bytes(),
            self.sboot_runtime.to_le_bytes(),
            V4_MAGIC_END.to_le_bytes(),
        ]
        .concat();

        let hash = Sha256::digest(&header_data);
        hash.to_vec()
    }

    pub fn get_algo(&self) -> Option<SecCfgV4Algo> {
        self.algo.clone()
    }

    pub fn set_algo(&mut self, algo: SecCfgV4Algo) {
        self.algo = Some(algo);
    }

    pub fn set_encrypted_hash(&mut self, enc_hash: Vec<u8>) {
        self.enc_hash = Some(enc_hash);
    }

    pub fn get_encrypted_hash(&self) -> Vec<u8> {
        self.enc_hash.clone().unwrap_or_default()
    }

    pub fn set_lock_state(&mut self, lock_flag: LockFlag) {
        match lock_flag {
            LockFlag::Lock => {
                self.lock_state = 4;
                self.critical_lock_state = 1;
            }
            LockFlag::Unlock => {
                self.lock_state = 3;
                self.critical_lock_state = 0;
            }
        }
    }

    /// Parses a raw `seccfg` partition image and decrypts the trailing
    /// hash through the SEJ hardware oracle, verifying it against a
    /// freshly computed plaintext hash over the header fields.
    pub async fn parse(data: &[u8], sej: &mut SEJCrypto<'_, '_>) -> Result<SecCfgV4> {
        let mut cfg = Self::parse_header(data)?;

        let decrypted = sej.decrypt(&cfg.get_encrypted_hash()).await;
        if decrypted[..32] != cfg.get_hash()[..] {
            return Err(Error::other("SecCfg hash does not match SEJ-decrypted header"));
        }

        cfg.set_algo(SecCfgV4Algo::HWv4);
        Ok(cfg)
    }

    /// Applies `lock_flag` and re-encrypts the header hash through the SEJ
    /// oracle, producing a full partition image ready to be written back.
    pub async fn create(&mut self, sej: &mut SEJCrypto<'_, '_>, lock_flag: LockFlag) -> Vec<u8> {
        self.set_lock_state(lock_flag);

        let plain_hash = self.get_hash();
        let enc_hash = sej.encrypt(&plain_hash).await;
        self.set_encrypted_hash(enc_hash);

        self.create_image()
    }

    fn create_image(&self) -> Vec<u8> {
        let mut seccfg_data = Vec::new();
        seccfg_data.extend(&V4_MAGIC_BEGIN.to_le_bytes());
        seccfg_data.extend(&self.seccfg_ver.to_le_bytes());
        seccfg_data.extend(&self.seccfg_size.to_le_bytes());
        seccfg_data.extend(&self.lock_state.to_le_bytes());
        seccfg_data.extend(&self.critical_lock_state.to_le_bytes());
        seccfg_data.extend(&self.sboot_runtime.to_le_bytes());
        seccfg_data.extend(&V4_MAGIC_END.to_le_bytes());
        seccfg_data.extend_from_slice(&self.get_encrypted_hash());

        while !seccfg_data.len().is_multiple_of(0x200) {
            seccfg_data.push(0);
        }

        seccfg_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_hash_is_stable_for_identical_header_fields() {
        let cfg = SecCfgV4::new();
        assert_eq!(cfg.get_hash(), cfg.get_hash());
    }

    #[test]
    fn lock_and_unlock_set_distinct_state_pairs() {
        let mut cfg = SecCfgV4::new();
        cfg.set_lock_state(LockFlag::Lock);
        assert_eq!((cfg.lock_state, cfg.critical_lock_state), (4, 1));
        cfg.set_lock_state(LockFlag::Unlock);
        assert_eq!((cfg.lock_state, cfg.critical_lock_state), (3, 0));
    }

    #[test]
    fn parse_header_rejects_bad_magic() {
        let data = vec![0u8; 0x20];
        assert!(SecCfgV4::parse_header(&data).is_err());
    }
}
