/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::storage::PartitionKind;
use crate::da::xml::Xml;
use crate::da::xml::cmds::{
    EraseFlash,
    ErasePartition,
    ReadFlash,
    ReadPartition,
    WriteFlash,
    WritePartition,
    XmlCmdLifetime,
};
use crate::error::Result;

pub async fn read_flash(
    xml: &mut Xml,
    addr: u64,
    size: usize,
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
    writer: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<()> {
    info!("Reading flash at address {:#X} with size {:#X}", addr, size);

    xmlcmd_e!(xml, ReadFlash, section.as_xml_name().to_string(), size, addr)?;
    xml.upload_file(writer, progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}

pub async fn write_flash(
    xml: &mut Xml,
    addr: u64,
    size: usize,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    info!("Writing flash at address {:#X} with size {:#X}", addr, size);

    xmlcmd_e!(xml, WriteFlash, section.as_xml_name().to_string(), size, addr)?;
    xml.download_file(size, reader, progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}

pub async fn erase_flash(
    xml: &mut Xml,
    addr: u64,
    size: usize,
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    info!("Erasing flash at address {:#X} with size {:#X}", addr, size);

    xmlcmd_e!(xml, EraseFlash, section.as_xml_name().to_string(), size, addr)?;
    xml.progress_report(progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}

pub async fn download(
    xml: &mut Xml,
    part_name: String,
    size: usize,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    xmlcmd_e!(xml, WritePartition, part_name)?;
    xml.download_file(size, reader, progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}

pub async fn upload(
    xml: &mut Xml,
    part_name: String,
    writer: &mut (dyn AsyncWrite + Unpin + Send),
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    xmlcmd_e!(xml, ReadPartition, part_name)?;
    xml.upload_file(writer, progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}

pub async fn format(
    xml: &mut Xml,
    part_name: String,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    xmlcmd_e!(xml, ErasePartition, part_name)?;
    xml.progress_report(progress).await?;
    xml.lifetime_ack(XmlCmdLifetime::CmdEnd).await?;

    Ok(())
}
