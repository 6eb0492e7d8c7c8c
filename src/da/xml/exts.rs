/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Unlike XFlash, XML-DA's DA2 natively exposes register read/write (see
//! `cmds::ReadRegister`/`WriteRegister`) without a separate extension stage,
//! so there is no stage2 payload to boot here. `boot_extensions` exists only
//! to keep the two protocols' `upload_da` flow symmetric.

use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::da::xml::Xml;
use crate::error::Result;

pub async fn boot_extensions(_xml: &mut Xml) -> Result<bool> {
    debug!("XML-DA extensions are native; nothing to boot");
    Ok(true)
}

pub async fn peek(
    xml: &mut Xml,
    addr: u32,
    length: usize,
    writer: &mut (dyn AsyncWrite + Unpin + Send),
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    let mut read = 0;
    while read < length {
        let word = xml.read32_raw(addr + read as u32).await?;
        let remaining = length - read;
        let n = remaining.min(4);
        writer.write_all(&word.to_le_bytes()[..n]).await?;
        read += n;
        progress(read, length);
    }
    writer.flush().await?;
    Ok(())
}
