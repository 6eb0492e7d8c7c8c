/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! SEJ (Security Engine for JTAG-class operations) hardware AES oracle,
//! driven over MMIO through `CryptoConfig`. Used only to authenticate the
//! `seccfg` lock-state record's header hash (§S.2) — no key material ever
//! leaves the SoC.

use std::time::Duration;

use crate::core::crypto::config::CryptoConfig;

const SEJ_CTRL: u32 = 0x0000;
const SEJ_CFG: u32 = 0x0004;
const SEJ_DATA_IN: u32 = 0x0008;
const SEJ_DATA_OUT: u32 = 0x000C;
const SEJ_STATUS: u32 = 0x0010;

const CTRL_START: u32 = 1 << 0;
const CTRL_DECRYPT: u32 = 1 << 1;
const CFG_AES_HW_KEY: u32 = 1 << 0;

const STATUS_DONE: u32 = 1 << 0;
const POLL_ATTEMPTS: u32 = 1000;

pub struct SEJCrypto<'a, 'b> {
    cfg: &'a mut CryptoConfig<'b>,
}

impl<'a, 'b> SEJCrypto<'a, 'b> {
    pub fn new(cfg: &'a mut CryptoConfig<'b>) -> Self {
        SEJCrypto { cfg }
    }

    async fn run_block(&mut self, block: &[u8; 16], decrypt: bool) -> [u8; 16] {
        self.cfg.write_reg(SEJ_CFG, CFG_AES_HW_KEY).await;

        for chunk in block.chunks(4) {
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            self.cfg.write_reg(SEJ_DATA_IN, word).await;
        }

        let ctrl = CTRL_START | if decrypt { CTRL_DECRYPT } else { 0 };
        self.cfg.write_reg(SEJ_CTRL, ctrl).await;

        for _ in 0..POLL_ATTEMPTS {
            if self.cfg.read_reg(SEJ_STATUS).await & STATUS_DONE != 0 {
                break;
            }
            tokio::time::sleep(Duration::from_micros(100)).await;
        }

        let mut out = [0u8; 16];
        for word_out in out.chunks_mut(4) {
            // DATA_OUT is a FIFO: each read pops the next output word.
            let word = self.cfg.read_reg(SEJ_DATA_OUT).await;
            word_out.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Encrypts `data` one 16-byte block at a time through the hardware AES
    /// oracle. `data` is zero-padded to a multiple of 16 bytes.
    pub async fn encrypt(&mut self, data: &[u8]) -> Vec<u8> {
        self.run_blocks(data, false).await
    }

    pub async fn decrypt(&mut self, data: &[u8]) -> Vec<u8> {
        self.run_blocks(data, true).await
    }

    async fn run_blocks(&mut self, data: &[u8], decrypt: bool) -> Vec<u8> {
        let mut padded = data.to_vec();
        while !padded.len().is_multiple_of(16) {
            padded.push(0);
        }

        let mut out = Vec::with_capacity(padded.len());
        for chunk in padded.chunks(16) {
            let block: [u8; 16] = chunk.try_into().unwrap();
            out.extend_from_slice(&self.run_block(&block, decrypt).await);
        }
        out
    }
}
