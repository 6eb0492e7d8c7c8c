/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Builds and sends an XML-DA command struct in one call. `xmlcmd!` returns
//! whatever `send_cmd` returns (`Ok(false)` meaning the device reported the
//! command as unsupported); `xmlcmd_e!` turns that `Ok(false)` into a hard
//! error for callers that have no fallback path.
macro_rules! xmlcmd {
    ($self:expr, $Cmd:ident) => {{
        let cmd = $Cmd::new();
        $self.send_cmd(&cmd).await
    }};
    ($self:expr, $Cmd:ident, $($arg:expr),+ $(,)?) => {{
        let cmd = $Cmd::new($(($arg).into()),+);
        $self.send_cmd(&cmd).await
    }};
}

macro_rules! xmlcmd_e {
    ($self:expr, $Cmd:ident $(, $arg:expr)*) => {{
        match xmlcmd!($self, $Cmd $(, $arg)*) {
            Ok(true) => Ok(true),
            Ok(false) => Err(crate::error::Error::Xml(crate::error::XmlError {
                kind: crate::error::XmlErrorKind::UnsupportedCmd,
                message: format!("CMD:{} is unsupported by this DA", stringify!($Cmd)),
            })),
            Err(e) => Err(e),
        }
    }};
}
