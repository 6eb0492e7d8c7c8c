/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod carbonara;
pub mod kamakiri;

use async_trait::async_trait;

use crate::da::DAProtocol;
use crate::error::Result;

/// A DA-level exploit: something that patches a stage of the Download Agent
/// (in a local copy, or in-place on the device's memory) to bypass a
/// security check the stock DA would otherwise enforce.
///
/// `run` drives whatever device interaction the exploit needs through the
/// active protocol; the patched artifact (if any) is retrieved afterwards
/// through the implementor's own accessor (`get_patched_da1`, etc.), since
/// different exploits patch different stages.
#[async_trait]
pub trait Exploit: Send {
    async fn run(&mut self, da: &mut dyn DAProtocol) -> Result<bool>;
}
