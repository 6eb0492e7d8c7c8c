/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
mod backend;
mod command;
pub mod port;
pub use backend::*;

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout};

use crate::chip_db;
use crate::connection::command::Command;
use crate::connection::port::{ConnectionType, MTKPort};
use crate::error::{Error, Result};
use crate::packer::{is_daa_triggered, is_success, xor_checksum16};

#[derive(Debug)]
pub struct Connection {
    pub port: Box<dyn MTKPort>,
    pub connection_type: ConnectionType,
    pub baudrate: u32,
}

impl Connection {
    pub fn new(port: Box<dyn MTKPort>) -> Self {
        let connection_type = port.get_connection_type();
        let baudrate = port.get_baudrate();

        Connection { port, connection_type, baudrate }
    }

    pub async fn write(&mut self, data: &[u8], size: usize) -> Result<Vec<u8>> {
        self.port.write_all(data).await?;
        let mut buf = vec![0u8; size];
        self.port.read_exact(&mut buf).await?;
        Ok(buf)
    }

    pub fn check(&self, data: &[u8], expected_data: &[u8]) -> Result<()> {
        if data == expected_data {
            Ok(())
        } else {
            error!("Data mismatch. Expected: {:x?}, Got: {:x?}", expected_data, data);
            Err(Error::conn("Data mismatch"))
        }
    }

    pub async fn echo(&mut self, data: &[u8], size: usize) -> Result<()> {
        self.port.write_all(data).await?;
        let mut buf = vec![0u8; size];
        self.port.read_exact(&mut buf).await?;
        self.check(&buf, data)
    }

    /// Writes `data` in 1 KiB chunks, with an empty flush packet every 8 KiB
    /// and one final flush after the last chunk, per the upload-phase
    /// framing `SEND_DA`/`SEND_CERT`/`SEND_ENV_PREPARE` all share.
    async fn write_chunked_with_flush(&mut self, data: &[u8]) -> Result<()> {
        for (i, chunk) in data.chunks(1024).enumerate() {
            self.port.write_all(chunk).await?;
            if (i + 1) % 8 == 0 {
                self.port.write_all(&[]).await?;
            }
        }
        self.port.write_all(&[]).await?;
        Ok(())
    }

    pub async fn handshake(&mut self) -> Result<()> {
        info!("Starting handshake...");
        self.port.handshake().await?;
        info!("Handshake completed!");
        Ok(())
    }

    pub async fn jump_da(&mut self, address: u32) -> Result<()> {
        debug!("Jump to DA at 0x{:08X}", address);

        self.echo(&[Command::JumpDa as u8], 1).await?;
        self.port.write_all(&address.to_le_bytes()).await?;

        let mut echoed = [0u8; 4];
        self.port.read_exact(&mut echoed).await?;
        self.check(&echoed, &address.to_le_bytes())?;

        let mut status = [0u8; 2];
        self.port.read_exact(&mut status).await?;

        let status_val = u16::from_le_bytes(status);
        if status_val != 0 {
            error!("JumpDA failed with status: {:04X}", status_val);
            return Err(Error::conn("JumpDA failed"));
        }

        sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    /// `SEND_DA` (§4.4): handles both the standard echo path and the
    /// alternative 0xE7/0x00 path some Preloaders use, returns the final
    /// upload status so the caller can classify DAA-triggered completion.
    pub async fn send_da(&mut self, da_data: &[u8], address: u32, sig_len: u32) -> Result<u16> {
        let payload_len = da_data.len() as u32 - sig_len;
        let payload = &da_data[..payload_len as usize];
        let checksum = xor_checksum16(payload);
        debug!("Sending DA, size: {}, checksum: 0x{:04X}", da_data.len(), checksum);

        self.port.discard_buffers().await?;
        self.port.write_all(&[Command::SendDa as u8]).await?;
        let mut resp = [0u8; 1];
        self.port.read_exact(&mut resp).await?;

        let standard_path = match resp[0] {
            0xD7 => true,
            0xE7 | 0x00 => false,
            other => {
                return Err(Error::proto(format!(
                    "unexpected SEND_DA acknowledgement byte 0x{:02X}",
                    other
                )));
            }
        };

        if standard_path {
            self.echo(&address.to_be_bytes(), 4).await?;
            self.echo(&(da_data.len() as u32).to_be_bytes(), 4).await?;
            self.echo(&sig_len.to_be_bytes(), 4).await?;
        } else {
            self.port.write_all(&address.to_be_bytes()).await?;
            self.port.write_all(&(da_data.len() as u32).to_be_bytes()).await?;
            self.port.write_all(&sig_len.to_be_bytes()).await?;
        }

        let mut status = [0u8; 2];
        self.port.read_exact(&mut status).await?;
        let status_val = u16::from_be_bytes(status);
        debug!("SEND_DA parameter status: 0x{:04X}", status_val);

        match status_val {
            0x0010 | 0x0011 => return Err(Error::AuthRequiredPreloaderDaa(status_val)),
            0x1D0D => return Err(Error::AuthRequiredSla),
            s if is_success(s) => {}
            s => return Err(Error::proto(format!("SEND_DA rejected, status 0x{:04X}", s))),
        }

        self.write_chunked_with_flush(da_data).await?;
        sleep(Duration::from_millis(10)).await;

        let mut recv_checksum = [0u8; 2];
        self.port.read_exact(&mut recv_checksum).await?;
        let mut final_status = [0u8; 2];
        self.port.read_exact(&mut final_status).await?;
        let final_status_val = u16::from_be_bytes(final_status);
        debug!("SEND_DA final status: 0x{:04X}", final_status_val);

        if is_daa_triggered(final_status_val) {
            warn!("SEND_DA completed with DAA side effect 0x{:04X}", final_status_val);
            return Ok(final_status_val);
        }
        if !is_success(final_status_val) {
            return Err(Error::proto(format!(
                "SEND_DA data transfer failed with status 0x{:04X}",
                final_status_val
            )));
        }

        Ok(final_status_val)
    }

    pub async fn get_hw_code(&mut self) -> Result<(u16, u16)> {
        self.echo(&[Command::GetHwCode as u8], 1).await?;

        let mut hw_code = [0u8; 2];
        let mut hw_ver = [0u8; 2];

        self.port.read_exact(&mut hw_code).await?;
        self.port.read_exact(&mut hw_ver).await?;

        Ok((u16::from_be_bytes(hw_code), u16::from_be_bytes(hw_ver)))
    }

    pub async fn get_hw_sw_ver(&mut self) -> Result<(u16, u16, u16)> {
        self.echo(&[Command::GetHwSwVer as u8], 1).await?;

        let mut hw_sub_code = [0u8; 2];
        let mut hw_ver = [0u8; 2];
        let mut sw_ver = [0u8; 2];

        self.port.read_exact(&mut hw_sub_code).await?;
        self.port.read_exact(&mut hw_ver).await?;
        self.port.read_exact(&mut sw_ver).await?;

        Ok((
            u16::from_be_bytes(hw_sub_code),
            u16::from_be_bytes(hw_ver),
            u16::from_be_bytes(sw_ver),
        ))
    }

    /// `GET_BL_VER` is *not* echoed; 0xFE means true BROM, anything else
    /// means Preloader.
    pub async fn get_bl_ver(&mut self) -> Result<u8> {
        self.port.write_all(&[Command::GetBlVer as u8]).await?;
        let mut resp = [0u8; 1];
        self.port.read_exact(&mut resp).await?;
        Ok(resp[0])
    }

    pub async fn get_version(&mut self) -> Result<u8> {
        self.echo(&[Command::GetVersion as u8], 1).await?;
        let mut resp = [0u8; 1];
        self.port.read_exact(&mut resp).await?;
        Ok(resp[0])
    }

    pub async fn get_soc_id(&mut self) -> Result<Vec<u8>> {
        self.echo(&[Command::GetSocId as u8], 1).await?;
        self.read_id_payload().await
    }

    pub async fn get_meid(&mut self) -> Result<Vec<u8>> {
        self.echo(&[Command::GetMeId as u8], 1).await?;
        self.read_id_payload().await
    }

    async fn read_id_payload(&mut self) -> Result<Vec<u8>> {
        let mut length_bytes = [0u8; 4];
        let read_result =
            timeout(Duration::from_millis(500), self.port.read_exact(&mut length_bytes)).await;

        let length_bytes = match read_result {
            Ok(Ok(_)) => length_bytes,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(vec![]),
        };

        let length = u32::from_be_bytes(length_bytes) as usize;
        if length == 0 || length > 64 {
            return Err(Error::proto(format!("implausible ID length {length}")));
        }

        let mut id = vec![0u8; length];
        self.port.read_exact(&mut id).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_le_bytes(status_bytes);
        if status != 0 {
            return Err(Error::conn(format!("ID read failed with status 0x{:04X}", status)));
        }

        Ok(id)
    }

    /// SBC = target_config & 0x1, SLA = target_config & 0x2, DAA = target_config & 0x4.
    pub async fn get_target_config(&mut self) -> Result<u32> {
        self.echo(&[Command::GetTargetConfig as u8], 1).await?;

        let mut config_bytes = [0u8; 4];
        self.port.read_exact(&mut config_bytes).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_le_bytes(status_bytes);

        if status > 0xFF {
            error!("GetTargetConfig failed with status: 0x{:04X}", status);
            return Err(Error::conn("GetTargetConfig failed"));
        }

        Ok(u32::from_be_bytes(config_bytes))
    }

    pub async fn get_pl_capabilities(&mut self) -> Result<u32> {
        self.echo(&[Command::GetPlCap as u8], 1).await?;

        let mut cap0 = [0u8; 4];
        let mut cap1 = [0u8; 4];

        self.port.read_exact(&mut cap0).await?;
        self.port.read_exact(&mut cap1).await?;

        Ok(u32::from_be_bytes(cap0))
    }

    /// Reads memory from the device, split into 4-byte chunks.
    pub async fn read32(&mut self, address: u32, size: usize) -> Result<Vec<u8>> {
        self.echo(&[Command::Read32 as u8], 1).await?;
        self.echo(&address.to_be_bytes(), 4).await?;
        self.echo(&(size as u32).to_be_bytes(), 4).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_be_bytes(status_bytes);
        if !is_success(status) {
            return Err(Error::conn(format!("Read32 failed with status: 0x{:04X}", status)));
        }

        let mut data = vec![0u8; size];
        for chunk in data.chunks_mut(4) {
            self.port.read_exact(chunk).await?;
        }

        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_be_bytes(status_bytes);
        if !is_success(status) {
            return Err(Error::conn(format!("Read32 failed with status: 0x{:04X}", status)));
        }

        Ok(data)
    }

    async fn write_words(&mut self, cmd: Command, address: u32, words: &[u32]) -> Result<()> {
        self.echo(&[cmd as u8], 1).await?;
        self.echo(&address.to_be_bytes(), 4).await?;
        self.echo(&(words.len() as u32).to_be_bytes(), 4).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_be_bytes(status_bytes);
        if !is_success(status) {
            return Err(Error::conn(format!("write failed with status 0x{:04X}", status)));
        }

        for word in words {
            self.echo(&word.to_be_bytes(), 4).await?;
        }

        self.port.read_exact(&mut status_bytes).await?;
        let status = u16::from_be_bytes(status_bytes);
        if !is_success(status) {
            return Err(Error::conn(format!("write failed with final status 0x{:04X}", status)));
        }

        Ok(())
    }

    pub async fn write32(&mut self, address: u32, value: u32) -> Result<()> {
        self.write_words(Command::Write32, address, &[value]).await
    }

    pub async fn write16(&mut self, address: u32, value: u16) -> Result<()> {
        self.echo(&[Command::Write16 as u8], 1).await?;
        self.echo(&address.to_be_bytes(), 4).await?;
        self.echo(&1u32.to_be_bytes(), 4).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("write16 parameter rejected"));
        }

        self.echo(&value.to_be_bytes(), 2).await?;

        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("write16 data rejected"));
        }

        Ok(())
    }

    /// Disables the hardware watchdog so a long flashing session doesn't
    /// get reset out from under us. A handful of legacy chips need a
    /// 16-bit write to a fixed address instead of the normal WDT register.
    pub async fn disable_watchdog(&mut self, hw_code: u16) -> Result<()> {
        let (addr, value, is_16bit) = chip_db::watchdog_write(hw_code);
        if is_16bit {
            self.write16(addr, value as u16).await
        } else {
            self.write32(addr, value).await
        }
    }

    /// `SEND_CERT` (0xE0): uploads the exploit/cert payload ahead of an
    /// AllInOneSignature-class exploit. Uses a plain additive checksum,
    /// not the XOR convention `SEND_DA` uses.
    pub async fn send_cert(&mut self, payload: &[u8]) -> Result<()> {
        self.echo(&[Command::SendCert as u8], 1).await?;
        self.echo(&(payload.len() as u32).to_be_bytes(), 4).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("SEND_CERT rejected"));
        }

        let checksum = crate::packer::add_checksum16(payload);
        self.write_chunked_with_flush(payload).await?;
        sleep(Duration::from_millis(10)).await;

        let mut recv_checksum = [0u8; 2];
        self.port.read_exact(&mut recv_checksum).await?;
        debug!(
            "SEND_CERT checksum: ours=0x{:04X} device=0x{:04X}",
            checksum,
            u16::from_be_bytes(recv_checksum)
        );

        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("SEND_CERT final status rejected"));
        }

        Ok(())
    }

    /// `SEND_ENV_PREPARE` (0xD9): EMI configuration upload, same shape as
    /// the parameter phase of `SEND_DA` but without a jump afterwards.
    pub async fn send_env_prepare(&mut self, address: u32, payload: &[u8]) -> Result<()> {
        self.echo(&[Command::SendEnvPrepare as u8], 1).await?;
        self.echo(&address.to_be_bytes(), 4).await?;
        self.echo(&(payload.len() as u32).to_be_bytes(), 4).await?;

        let mut status_bytes = [0u8; 2];
        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("SEND_ENV_PREPARE rejected"));
        }

        self.write_chunked_with_flush(payload).await?;

        self.port.read_exact(&mut status_bytes).await?;
        if !is_success(u16::from_be_bytes(status_bytes)) {
            return Err(Error::conn("SEND_ENV_PREPARE final status rejected"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug)]
    struct StubPort {
        inbox: VecDeque<u8>,
        outbox: Vec<u8>,
    }

    #[async_trait]
    impl MTKPort for StubPort {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
        async fn write_all(&mut self, data: &[u8]) -> Result<()> {
            self.outbox.extend_from_slice(data);
            Ok(())
        }
        async fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.inbox.len() < buf.len() {
                return Err(Error::conn("stub underflow"));
            }
            for b in buf.iter_mut() {
                *b = self.inbox.pop_front().unwrap();
            }
            Ok(buf.len())
        }
        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        async fn discard_buffers(&mut self) -> Result<()> {
            self.inbox.clear();
            Ok(())
        }
        async fn handshake(&mut self) -> Result<()> {
            Ok(())
        }
        fn get_connection_type(&self) -> ConnectionType {
            ConnectionType::Brom
        }
        fn get_baudrate(&self) -> u32 {
            921_600
        }
        fn get_port_name(&self) -> String {
            "stub".to_string()
        }
    }

    fn conn_with_reply(reply: &[u8]) -> Connection {
        Connection::new(Box::new(StubPort {
            inbox: reply.iter().copied().collect(),
            outbox: Vec::new(),
        }))
    }

    #[tokio::test]
    async fn get_hw_code_parses_big_endian_fields() {
        // S2: stub echoes FD, then replies 07 88 CA 00.
        let mut conn = conn_with_reply(&[0xFD, 0x07, 0x88, 0xCA, 0x00]);
        let (hw_code, hw_ver) = conn.get_hw_code().await.unwrap();
        assert_eq!(hw_code, 0x0788);
        assert_eq!(hw_ver, 0xCA00);
    }

    #[tokio::test]
    async fn get_bl_ver_is_not_echoed() {
        let mut conn = conn_with_reply(&[0xFE]);
        let v = conn.get_bl_ver().await.unwrap();
        assert_eq!(v, 0xFE);
    }
}
