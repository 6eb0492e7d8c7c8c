/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
#[cfg(feature = "serial")]
pub mod serial_backend;
#[cfg(not(feature = "serial"))]
pub mod usb_backend;

#[cfg(feature = "serial")]
pub use serial_backend::SerialMTKPort;
#[cfg(not(feature = "serial"))]
pub use usb_backend::UsbMTKPort;
