/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::storage::PartitionKind;
use crate::da::DAProtocol;
use crate::da::xflash::XFlash;
use crate::da::xflash::cmds::*;
use crate::error::{Error, Result, XFlashError};

pub async fn read_flash(
    xflash: &mut XFlash,
    addr: u64,
    size: usize,
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
    writer: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<()> {
    info!("Reading flash at address {:#X} with size {:#X}", addr, size);

    let storage_type = xflash.get_storage_type().await as u32;

    // Format:
    // Storage Type (EMMC, UFS, NAND) u32
    // PartType u32 (BOOT or USER for EMMC)
    // Address u32
    // Size u32
    // Nand Specific
    let partition_type = section.as_u32();
    let nand_ext = [0u32; 8];

    let mut param = Vec::new();
    param.extend_from_slice(&storage_type.to_le_bytes());
    param.extend_from_slice(&partition_type.to_le_bytes());
    param.extend_from_slice(&addr.to_le_bytes());
    param.extend_from_slice(&(size as u64).to_le_bytes());
    param.extend_from_slice(&nand_ext.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>());

    xflash.send_cmd(Cmd::ReadData).await?;

    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    xflash.send_data(&[&param]).await?;

    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    let mut bytes_read = 0;

    loop {
        let chunk = xflash.read_data().await?;
        if chunk.is_empty() {
            debug!("No data received, breaking.");
            break;
        }
        writer.write_all(&chunk).await?;
        bytes_read += chunk.len();

        let hdr = xflash.generate_header(&[0u8; 4]);
        let ack_payload = [0u8; 4];

        xflash.conn.port.write_all(&hdr).await?;
        xflash.conn.port.write_all(&ack_payload).await?;
        xflash.conn.port.flush().await?;

        let status = xflash.get_status().await?;
        debug!("Status after chunk: 0x{:08X}", status);

        if status != 0 {
            debug!("Breaking loop, status: 0x{:08X}", status);
            break;
        }
        if bytes_read >= size {
            debug!("Requested size read. Breaking.");
            break;
        }

        progress(bytes_read, size);

        debug!("Read {}/{} bytes...", bytes_read, size);
    }

    writer.flush().await?;
    Ok(())
}

// TODO: Actually verify if the partition allows writing data.len() bytes
pub async fn write_flash(
    xflash: &mut XFlash,
    addr: u64,
    size: usize,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    info!("Writing flash at address {:#X} with size {:#X}", addr, size);

    let chunk_size = get_write_packet_length(xflash).await?;
    info!("Using chunk size of {} bytes", chunk_size);

    // It is mandatory to make the written size match `size` exactly, or stale
    // data is left behind in the partition past what the reader provided.
    let mut actual_data = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut actual_data).await?;
    if actual_data.len() < size {
        actual_data.resize(size, 0);
        debug!("Data to write at {:#X} was smaller than size, padding with zeros.", addr);
    }

    let storage_type = xflash.get_storage_type().await as u32;
    let partition_type = section.as_u32();
    let nand_ext = [0u32; 8];
    let mut param = Vec::new();
    param.extend_from_slice(&storage_type.to_le_bytes());
    param.extend_from_slice(&partition_type.to_le_bytes());
    param.extend_from_slice(&addr.to_le_bytes());
    param.extend_from_slice(&(size as u64).to_le_bytes());
    param.extend_from_slice(&nand_ext.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>());

    debug!("Sending write data cmd!");
    xflash.send_cmd(Cmd::WriteData).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    debug!("Parameters sent, streaming {} bytes in chunks of {}...", actual_data.len(), chunk_size);
    xflash.send_data(&[&param]).await?;

    let mut bytes_written = 0;
    let mut pos = 0;

    loop {
        if pos >= actual_data.len() {
            break;
        }

        let packet_end = std::cmp::min(pos + chunk_size, actual_data.len());
        let chunk = &actual_data[pos..packet_end];

        // DA expects a checksum of the data chunk before the actual data:
        // an additive 16-bit checksum of every byte, truncated with & 0xFFFF.
        let checksum = chunk.iter().fold(0u32, |total, &byte| total + byte as u32) & 0xFFFF;

        xflash.send(&0u32.to_be_bytes()).await?;
        xflash.send(&checksum.to_le_bytes()).await?;
        xflash.send(chunk).await?;

        bytes_written += chunk.len();
        pos = packet_end;

        progress(bytes_written, size);

        debug!("Written {}/{} bytes...", bytes_written, actual_data.len());
    }

    let status = xflash.get_status().await?;
    if status != 0 {
        error!("Device returned status {:#X} after writing data!", status);
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    info!("Flash write completed, {} bytes written.", bytes_written);

    Ok(())
}

pub async fn erase_flash(
    xflash: &mut XFlash,
    addr: u64,
    size: usize,
    section: PartitionKind,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    info!("Erasing flash at address {:#X} with size {:#X}", addr, size);

    let storage_type = xflash.get_storage_type().await as u32;
    let partition_type = section.as_u32();
    let nand_ext = [0u32; 8];
    let mut param = Vec::new();
    param.extend_from_slice(&storage_type.to_le_bytes());
    param.extend_from_slice(&partition_type.to_le_bytes());
    param.extend_from_slice(&addr.to_le_bytes());
    param.extend_from_slice(&(size as u64).to_le_bytes());
    param.extend_from_slice(&nand_ext.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>());

    xflash.send_cmd(Cmd::FormatPartition).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    xflash.send_data(&[&param]).await?;

    progress(size, size);

    let status = xflash.get_status().await?;
    if status != 0 {
        error!("Device returned status {:#X} after erase!", status);
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    Ok(())
}

pub async fn download(
    xflash: &mut XFlash,
    part_name: String,
    size: usize,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    // Works like write_flash, but instead of address and size it takes a
    // partition name and always writes the whole partition.
    let mut data = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut data).await?;

    xflash.send_cmd(Cmd::Download).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    let data_len = data.len();

    xflash.send(part_name.as_bytes()).await?;
    xflash.send(&data_len.to_le_bytes()[..]).await?;

    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    xflash.send(&0u32.to_le_bytes()).await?;

    let checksum = data.iter().fold(0u32, |total, &byte| total + byte as u32) & 0xFFFF;
    xflash.send(&checksum.to_le_bytes()).await?;

    let chunk_size = get_write_packet_length(xflash).await?;
    let mut pos = 0;
    while pos < data.len() {
        let end = std::cmp::min(pos + chunk_size, data.len());
        xflash.send(&data[pos..end]).await?;
        pos = end;
        progress(pos, data_len);
    }

    debug!("Download completed, {} bytes sent.", data_len);

    let status = xflash.get_status().await?;
    if status != 0 {
        error!("Device returned {:#X} after data upload", status);
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    Ok(())
}

pub async fn upload(
    xflash: &mut XFlash,
    part_name: String,
    writer: &mut (dyn AsyncWrite + Unpin + Send),
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    xflash.send_cmd(Cmd::Upload).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    xflash.send(part_name.as_bytes()).await?;

    let size_resp = xflash.read_data().await?;
    status_ok!(xflash);
    if size_resp.len() < 8 {
        return Err(Error::proto("Short upload size response"));
    }
    let size = u64::from_le_bytes(size_resp[0..8].try_into().unwrap()) as usize;

    let mut bytes_read = 0;
    loop {
        let chunk = xflash.read_data().await?;
        if chunk.is_empty() {
            break;
        }
        writer.write_all(&chunk).await?;
        bytes_read += chunk.len();

        let hdr = xflash.generate_header(&[0u8; 4]);
        xflash.conn.port.write_all(&hdr).await?;
        xflash.conn.port.write_all(&[0u8; 4]).await?;
        xflash.conn.port.flush().await?;

        let status = xflash.get_status().await?;
        if status != 0 || bytes_read >= size {
            break;
        }

        progress(bytes_read, size);
    }

    writer.flush().await?;
    Ok(())
}

pub async fn format(
    xflash: &mut XFlash,
    part_name: String,
    progress: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<()> {
    xflash.send_cmd(Cmd::Format).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    xflash.send(part_name.as_bytes()).await?;

    progress(0, 1);

    let status = xflash.get_status().await?;
    if status != 0 {
        error!("Device returned status {:#X} after format!", status);
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    progress(1, 1);
    Ok(())
}

pub(super) async fn get_packet_length(xflash: &mut XFlash) -> Result<(usize, usize)> {
    let packet_length = xflash.devctrl(Cmd::GetPacketLength, None).await?;
    let status = xflash.get_status().await?;
    if status != 0 {
        return Err(Error::XFlash(XFlashError::from_code(status)));
    }

    if packet_length.len() < 8 {
        return Err(Error::proto("Received packet length is too short"));
    }

    let write_len = u32::from_le_bytes(packet_length[0..4].try_into().unwrap()) as usize;
    let read_len = u32::from_le_bytes(packet_length[4..8].try_into().unwrap()) as usize;

    Ok((write_len, read_len))
}

async fn get_write_packet_length(xflash: &mut XFlash) -> Result<usize> {
    if let Some(len) = xflash.write_packet_length {
        return Ok(len);
    }

    let (write_len, read_len) = get_packet_length(xflash).await?;
    xflash.write_packet_length = Some(write_len);
    xflash.read_packet_length = Some(read_len);
    Ok(write_len)
}
