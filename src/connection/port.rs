/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! The transport trait both backends (`usb_backend`, `serial_backend`)
//! implement, plus USB VID/PID enumeration.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Brom,
    Preloader,
    XFlash,
    XmlDa,
}

/// MediaTek VID, and the (vid, pid, connection_type) triples a freshly
/// enumerated port is known to present in BROM/Preloader/DA mode.
pub const MEDIATEK_VID: u16 = 0x0E8D;
pub const KNOWN_PORTS: &[(u16, u16, ConnectionType)] = &[
    (MEDIATEK_VID, 0x0003, ConnectionType::Brom),
    (MEDIATEK_VID, 0x2000, ConnectionType::Preloader),
    (MEDIATEK_VID, 0x2001, ConnectionType::Preloader),
];

/// The byte-oriented transport contract shared by every `Link` backend.
#[async_trait]
pub trait MTKPort: Send + Sync + std::fmt::Debug {
    async fn open(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, returning the number read.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize>;
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;

    /// Drops any bytes currently buffered on the read side without
    /// blocking for more — used around handshake retries and after a
    /// cancelled transaction.
    async fn discard_buffers(&mut self) -> Result<()>;

    /// Runs the BROM handshake byte dance (§4.4): write 0xA0 until 0x5F
    /// (or 0xA0, meaning already-handshaken) is seen, then exchange
    /// 0x0A/0x50/0x05 against their complements.
    async fn handshake(&mut self) -> Result<()>;

    fn get_connection_type(&self) -> ConnectionType;
    fn get_baudrate(&self) -> u32;
    fn get_port_name(&self) -> String;
}

/// Opens whichever backend this build was compiled with against the first
/// recognized MediaTek port.
pub async fn find_mtk_port() -> Result<Box<dyn MTKPort>> {
    #[cfg(feature = "serial")]
    {
        crate::connection::backend::serial_backend::SerialMTKPort::find_device()
            .await?
            .map(|p| Box::new(p) as Box<dyn MTKPort>)
            .ok_or_else(|| crate::error::Error::conn("no MediaTek serial port found"))
    }
    #[cfg(not(feature = "serial"))]
    {
        crate::connection::backend::usb_backend::UsbMTKPort::find_device()
            .await?
            .map(|p| Box::new(p) as Box<dyn MTKPort>)
            .ok_or_else(|| crate::error::Error::conn("no MediaTek USB port found"))
    }
}
