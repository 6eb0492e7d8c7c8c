/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! `tokio-serial`-backed transport for hosts where the MediaTek CDC-ACM
//! device enumerates as a plain tty/COM port instead of being driven
//! through raw USB bulk transfers.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::connection::port::{ConnectionType, MTKPort};
use crate::error::{Error, Result};

const BAUD_RATE: u32 = 921_600;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SerialMTKPort {
    path: String,
    stream: Option<SerialStream>,
    connection_type: ConnectionType,
}

impl fmt::Debug for SerialMTKPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SerialMTKPort {{ path: {:?}, connection_type: {:?} }}",
            self.path, self.connection_type
        )
    }
}

impl SerialMTKPort {
    pub fn new(path: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self { path: path.into(), stream: None, connection_type }
    }

    /// Enumerates host serial ports looking for one whose USB VID/PID
    /// identifies it as a MediaTek BROM/Preloader/DA CDC port.
    pub async fn find_device() -> Result<Option<Self>> {
        let ports = serialport::available_ports()
            .map_err(|e| Error::conn(format!("failed to enumerate serial ports: {e}")))?;

        for port in ports {
            if let serialport::SerialPortType::UsbPort(info) = &port.port_type
                && crate::connection::port::KNOWN_PORTS
                    .iter()
                    .any(|(vid, pid, _)| *vid == info.vid && *pid == info.pid)
            {
                let conn_type = crate::connection::port::KNOWN_PORTS
                    .iter()
                    .find(|(vid, pid, _)| *vid == info.vid && *pid == info.pid)
                    .map(|(_, _, t)| *t)
                    .unwrap_or(ConnectionType::Brom);
                return Ok(Some(SerialMTKPort::new(port.port_name, conn_type)));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl MTKPort for SerialMTKPort {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream = tokio_serial::new(&self.path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open_native_async()
            .map_err(|e| Error::conn(format!("failed to open {}: {e}", self.path)))?;

        // Assert DTR+RTS as BROM/Preloader expects; no hardware flow control.
        stream
            .write_data_terminal_ready(true)
            .map_err(|e| Error::conn(format!("failed to set DTR: {e}")))?;
        stream
            .write_request_to_send(true)
            .map_err(|e| Error::conn(format!("failed to set RTS: {e}")))?;

        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::conn("serial port not open"))?;
        tokio::time::timeout(READ_TIMEOUT, AsyncReadExt::read_exact(stream, buf))
            .await
            .map_err(|_| Error::conn("serial read timed out"))??;
        Ok(buf.len())
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::conn("serial port not open"))?;
        AsyncWriteExt::write_all(stream, buf).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            AsyncWriteExt::flush(stream).await?;
        }
        Ok(())
    }

    async fn discard_buffers(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::conn("serial port not open"))?;
        stream
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| Error::conn(format!("failed to clear serial buffers: {e}")))?;
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut resp = [0u8; 1];
        loop {
            self.write_all(&[0xA0]).await?;
            self.read_exact(&mut resp).await?;
            let b = resp[0];
            if b == 0x5F {
                break;
            }
            if b == 0xA0 {
                return Ok(());
            }
        }

        const SEQ: [u8; 3] = [0x0A, 0x50, 0x05];
        for &byte in &SEQ {
            self.write_all(&[byte]).await?;
            self.read_exact(&mut resp).await?;
            if resp[0] != (byte ^ 0xFF) {
                return Err(Error::conn(format!(
                    "Handshake failed: sent 0x{:02X}, expected 0x{:02X}, got 0x{:02X}",
                    byte,
                    byte ^ 0xFF,
                    resp[0]
                )));
            }
        }

        Ok(())
    }

    fn get_connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    fn get_baudrate(&self) -> u32 {
        BAUD_RATE
    }

    fn get_port_name(&self) -> String {
        self.path.clone()
    }
}
