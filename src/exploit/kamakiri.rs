/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Kamakiri2: a DA1-level exploit. Unlike Carbonara, this patches DA1 itself
//! before it is ever uploaded, so it only applies when a patched DA1 can be
//! prepared ahead of time (XFlash's upload order lets us do this; XML-DA
//! boots DA1 as part of the initial handshake and relies on Carbonara
//! instead). Because no device round-trip is required, `run` only inspects
//! the local DA copy.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::da::{DA, DAProtocol};
use crate::error::{Error, Result};
use crate::exploit::Exploit;
use crate::utilities::patching::bypass_security_checks;

pub struct Kamakiri2 {
    da: Arc<Mutex<DA>>,
    patched_da: Option<DA>,
}

impl Kamakiri2 {
    pub fn new(da: Arc<Mutex<DA>>) -> Self {
        Kamakiri2 { da, patched_da: None }
    }

    pub fn get_patched_da(&self) -> Option<&DA> {
        self.patched_da.as_ref()
    }
}

#[async_trait::async_trait]
impl Exploit for Kamakiri2 {
    async fn run(&mut self, _da_protocol: &mut dyn DAProtocol) -> Result<bool> {
        let mut da = self.da.lock().await.clone();

        if da.regions.len() < 2 {
            return Err(Error::other("DA1 region not found"));
        }

        let da1 = da.regions[1].clone();
        let patched = bypass_security_checks(&da1.data);
        if patched == da1.data {
            // No known anchor found in this DA1; nothing to do, let Carbonara handle DA2.
            return Ok(false);
        }

        let mut new_da1 = da1;
        new_da1.data = patched;
        da.regions[1] = new_da1;

        self.patched_da = Some(da);
        Ok(true)
    }
}
