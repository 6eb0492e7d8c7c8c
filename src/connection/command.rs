/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! BROM one-byte command codes (§4.4).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Read32 = 0xD1,
    Write16 = 0xD2,
    Write32 = 0xD4,
    JumpDa = 0xD5,
    SendDa = 0xD7,
    GetTargetConfig = 0xD8,
    SendEnvPrepare = 0xD9,
    SendCert = 0xE0,
    GetMeId = 0xE1,
    GetSocId = 0xE7,
    GetHwCode = 0xFD,
    GetHwSwVer = 0xFC,
    GetBlVer = 0xFE,
    GetVersion = 0xFF,
    GetPlCap = 0xC8,
}
