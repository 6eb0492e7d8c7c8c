/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Small helpers for checking the status word XFlash returns after most
//! commands. `status_ok!` bails unless the device reported success;
//! `status_any!` additionally accepts a whitelist of non-zero codes that
//! are not actually errors (e.g. the sync signal echoed back after BOOT-TO).

macro_rules! status_ok {
    ($self:expr) => {
        match $self.get_status().await {
            Ok(0) => {}
            Ok(s) => return Err(Error::XFlash(XFlashError::from_code(s))),
            Err(e) => return Err(e),
        }
    };
}

macro_rules! status_any {
    ($self:expr, $($allowed:expr),+ $(,)?) => {
        match $self.get_status().await {
            Ok(s) if [$($allowed),+].contains(&s) => {}
            Ok(s) => return Err(Error::XFlash(XFlashError::from_code(s))),
            Err(e) => return Err(e),
        }
    };
}
