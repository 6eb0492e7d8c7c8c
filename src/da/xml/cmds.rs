/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::collections::BTreeMap;

/// MAGIC value for protocol communication
pub const MAGIC: u32 = 0xFEEEEEEF;
/// Each header contains this, to identify the DataType.
/// V6 doesn't seem to use anything other than this.
pub const DT_PROTOCOL_FLOW: u32 = 0x1;
pub const CMD_START: &[u8] = b"<command>CMD:START</command>";
pub const CMD_END: &[u8] = b"<command>CMD:END</command>";
pub const HOST_CMDS: &str =
    "CMD:DOWNLOAD-FILE^1@CMD:FILE-SYS-OPERATION^1@CMD:PROGRESS-REPORT^1@CMD:UPLOAD-FILE^1@";

/// Perform a (fake) file system operation
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum FileSystemOp {
    MkDir,
    Exists,
    FileSize(usize),
    RemoveAll,
    Remove,
}

impl FileSystemOp {
    pub fn default(&self) -> String {
        match self {
            FileSystemOp::MkDir => "MKDIR\u{0}".to_string(),
            FileSystemOp::Exists => "NOT-EXISTS\u{0}".to_string(), // To avoid more reads
            FileSystemOp::FileSize(size) => format!("{:X}", size),
            FileSystemOp::RemoveAll => "REMOVE-ALL\u{0}".to_string(),
            FileSystemOp::Remove => "REMOVE\u{0}".to_string(),
        }
    }
}

/// Lifetime of an XML command
#[derive(Clone, Copy)]
pub enum XmlCmdLifetime {
    CmdStart,
    CmdEnd,
}

/// Each XML command implements this by hand: `args()` returns the
/// `(section, tag, content)` triples `create_cmd` assembles into the
/// final document, grouped by section (`None` meaning the default `<arg>`
/// section).
pub trait XmlCommand {
    fn cmd_name(&self) -> &'static str;
    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)>;
    fn version(&self) -> &'static str {
        "1.0"
    }
}

pub struct BootTo {
    at_addr: u64,
    jmp_addr: u64,
    host_offset: u64,
    length: u64,
}

impl BootTo {
    pub fn new(at_addr: u64, jmp_addr: u64, host_offset: u64, length: u64) -> Self {
        BootTo { at_addr, jmp_addr, host_offset, length }
    }
}

impl XmlCommand for BootTo {
    fn cmd_name(&self) -> &'static str {
        "BOOT-TO"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "at_address", format!("0x{:x}", self.at_addr)),
            (None, "jmp_address", format!("0x{:x}", self.jmp_addr)),
            (
                None,
                "source_file",
                format!("MEM://0x{:x}:0x{:x}", self.host_offset, self.length),
            ),
        ]
    }
}

pub struct SetRuntimeParameter {
    checksum_level: String,
    battery_exist: String,
    da_log_level: String,
    log_channel: String,
    system_os: String,
    init_dram: String,
}

impl SetRuntimeParameter {
    pub fn new(
        checksum_level: String,
        battery_exist: String,
        da_log_level: String,
        log_channel: String,
        system_os: String,
        init_dram: String,
    ) -> Self {
        SetRuntimeParameter {
            checksum_level,
            battery_exist,
            da_log_level,
            log_channel,
            system_os,
            init_dram,
        }
    }
}

impl XmlCommand for SetRuntimeParameter {
    fn cmd_name(&self) -> &'static str {
        "SET-RUNTIME-PARAMETER"
    }

    fn version(&self) -> &'static str {
        "1.1"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "checksum_level", self.checksum_level.clone()),
            (None, "battery_exist", self.battery_exist.clone()),
            (None, "da_log_level", self.da_log_level.clone()),
            (None, "log_channel", self.log_channel.clone()),
            (None, "system_os", self.system_os.clone()),
            (Some("adv"), "initialize_dram", self.init_dram.clone()),
        ]
    }
}

pub struct HostSupportedCommands {
    host_capability: String,
}

impl HostSupportedCommands {
    pub fn new(host_capability: String) -> Self {
        HostSupportedCommands { host_capability }
    }
}

impl XmlCommand for HostSupportedCommands {
    fn cmd_name(&self) -> &'static str {
        "HOST-SUPPORTED-COMMANDS"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "host_capability", self.host_capability.clone())]
    }
}

pub struct NotifyInitHw;

impl NotifyInitHw {
    pub fn new() -> Self {
        NotifyInitHw
    }
}

impl XmlCommand for NotifyInitHw {
    fn cmd_name(&self) -> &'static str {
        "NOTIFY-INIT-HW"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        Vec::new()
    }
}

pub struct SetHostInfo {
    info: String,
}

impl SetHostInfo {
    pub fn new(info: String) -> Self {
        SetHostInfo { info }
    }
}

impl XmlCommand for SetHostInfo {
    fn cmd_name(&self) -> &'static str {
        "SET-HOST-INFO"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "info", self.info.clone())]
    }
}

pub struct GetSysProperty {
    key: String,
}

impl GetSysProperty {
    pub fn new(key: String) -> Self {
        GetSysProperty { key }
    }
}

impl XmlCommand for GetSysProperty {
    fn cmd_name(&self) -> &'static str {
        "GET-SYS-PROPERTY"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "key", self.key.clone()),
            (None, "target_file", "MEM://0x0:0x200000".to_string()),
        ]
    }
}

pub struct SecurityGetDevFwInfo;

impl SecurityGetDevFwInfo {
    pub fn new() -> Self {
        SecurityGetDevFwInfo
    }
}

impl XmlCommand for SecurityGetDevFwInfo {
    fn cmd_name(&self) -> &'static str {
        "SECURITY-GET-DEV-FW-INFO"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "target_file", "MEM://0x0:0x200000".to_string())]
    }
}

pub struct SecuritySetFlashPolicy {
    source_file: String,
}

impl SecuritySetFlashPolicy {
    pub fn new(source_file: String) -> Self {
        SecuritySetFlashPolicy { source_file }
    }
}

impl XmlCommand for SecuritySetFlashPolicy {
    fn cmd_name(&self) -> &'static str {
        "SECURITY-SET-FLASH-POLICY"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "source_file", self.source_file.clone())]
    }
}

pub struct GetHwInfo;

impl GetHwInfo {
    pub fn new() -> Self {
        GetHwInfo
    }
}

impl XmlCommand for GetHwInfo {
    fn cmd_name(&self) -> &'static str {
        "GET-HW-INFO"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "target_file", "MEM://0x0:0x200000".to_string())]
    }
}

pub struct ReadPartition {
    partition: String,
}

impl ReadPartition {
    pub fn new(partition: String) -> Self {
        ReadPartition { partition }
    }
}

impl XmlCommand for ReadPartition {
    fn cmd_name(&self) -> &'static str {
        "READ-PARTITION"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "partition", self.partition.clone()),
            (None, "target_file", format!("{}.bin", self.partition)),
        ]
    }
}

pub struct ReadFlash {
    partition: String,
    length: usize,
    offset: u64,
}

impl ReadFlash {
    pub fn new(partition: String, length: usize, offset: u64) -> Self {
        ReadFlash { partition, length, offset }
    }
}

impl XmlCommand for ReadFlash {
    fn cmd_name(&self) -> &'static str {
        "READ-FLASH"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "partition", self.partition.clone()),
            (None, "target_file", self.partition.clone()),
            (None, "length", format!("0x{:X}", self.length)),
            (None, "offset", format!("0x{:X}", self.offset)),
        ]
    }
}

pub struct WritePartition {
    partition: String,
}

impl WritePartition {
    pub fn new(partition: String) -> Self {
        WritePartition { partition }
    }
}

impl XmlCommand for WritePartition {
    fn cmd_name(&self) -> &'static str {
        "WRITE-PARTITION"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "partition", self.partition.clone()),
            (None, "source_file", format!("{}.bin", self.partition)),
        ]
    }
}

pub struct WriteFlash {
    partition: String,
    length: usize,
    offset: u64,
}

impl WriteFlash {
    pub fn new(partition: String, length: usize, offset: u64) -> Self {
        WriteFlash { partition, length, offset }
    }
}

impl XmlCommand for WriteFlash {
    fn cmd_name(&self) -> &'static str {
        "WRITE-FLASH"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "partition", self.partition.clone()),
            (None, "source_file", format!("MEM:\\0x0:0x{:X}", self.length)),
            (None, "offset", format!("0x{:X}", self.offset)),
        ]
    }
}

pub struct ErasePartition {
    partition: String,
}

impl ErasePartition {
    pub fn new(partition: String) -> Self {
        ErasePartition { partition }
    }
}

impl XmlCommand for ErasePartition {
    fn cmd_name(&self) -> &'static str {
        "ERASE-PARTITION"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "partition", self.partition.clone())]
    }
}

pub struct EraseFlash {
    section: String,
    length: usize,
    offset: u64,
}

impl EraseFlash {
    pub fn new(section: String, length: usize, offset: u64) -> Self {
        EraseFlash { section, length, offset }
    }
}

impl XmlCommand for EraseFlash {
    fn cmd_name(&self) -> &'static str {
        "ERASE-FLASH"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "partition", self.section.clone()),
            (None, "length", format!("0x{:X}", self.length)),
            (None, "offset", format!("0x{:X}", self.offset)),
        ]
    }
}

pub struct Reboot {
    action: String,
}

impl Reboot {
    pub fn new(action: String) -> Self {
        Reboot { action }
    }
}

impl XmlCommand for Reboot {
    fn cmd_name(&self) -> &'static str {
        "REBOOT"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "action", self.action.clone())]
    }
}

pub struct SetBootMode {
    mode: String,
    connect_type: String,
    mobile_log: String,
    adb: String,
}

impl SetBootMode {
    pub fn new(mode: String, connect_type: String, mobile_log: String, adb: String) -> Self {
        SetBootMode { mode, connect_type, mobile_log, adb }
    }
}

impl XmlCommand for SetBootMode {
    fn cmd_name(&self) -> &'static str {
        "SET-BOOT-MODE"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "mode", self.mode.clone()),
            (None, "connect_type", self.connect_type.clone()),
            (None, "mobile_log", self.mobile_log.clone()),
            (None, "adb", self.adb.clone()),
        ]
    }
}

/// Mirrors XFlash's `DeviceCtrlReadRegister` devctrl, but as an XML command;
/// the response comes back through the normal `CMD:UPLOAD-FILE` flow as four
/// raw bytes.
pub struct ReadRegister {
    address: u32,
}

impl ReadRegister {
    pub fn new(address: u32) -> Self {
        ReadRegister { address }
    }
}

impl XmlCommand for ReadRegister {
    fn cmd_name(&self) -> &'static str {
        "READ-REGISTER"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![(None, "address", format!("0x{:X}", self.address))]
    }
}

/// Mirrors XFlash's `SetRegisterValue` devctrl.
pub struct WriteRegister {
    address: u32,
    value: u32,
}

impl WriteRegister {
    pub fn new(address: u32, value: u32) -> Self {
        WriteRegister { address, value }
    }
}

impl XmlCommand for WriteRegister {
    fn cmd_name(&self) -> &'static str {
        "WRITE-REGISTER"
    }

    fn args(&self) -> Vec<(Option<&'static str>, &'static str, String)> {
        vec![
            (None, "address", format!("0x{:X}", self.address)),
            (None, "value", format!("0x{:X}", self.value)),
        ]
    }
}

pub fn create_cmd<C: XmlCommand>(cmd: &C) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><da><version>{}</version><command>CMD:{}</command>"#,
        cmd.version(),
        cmd.cmd_name()
    );

    let mut sections: BTreeMap<Option<&str>, Vec<(&str, String)>> = BTreeMap::new();

    for (section, tag, content) in cmd.args() {
        sections.entry(section).or_default().push((tag, content));
    }

    for (section, entries) in sections {
        let tag = section.unwrap_or("arg");
        xml.push_str(&format!("<{}>", tag));
        for (tag_path, content) in entries {
            let parts: Vec<&str> = tag_path.split('/').collect();

            for p in &parts {
                xml.push_str(&format!("<{}>", p));
            }

            xml.push_str(&content);

            for p in parts.iter().rev() {
                xml.push_str(&format!("</{}>", p));
            }
        }
        xml.push_str(&format!("</{}>", tag));
    }

    xml.push_str("</da>\u{0}");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_cmd_wraps_args_in_default_arg_section() {
        let cmd = ReadPartition::new("userdata".to_string());
        let xml = create_cmd(&cmd);

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(xml.contains("<command>CMD:READ-PARTITION</command>"));
        assert!(xml.contains("<arg><partition>userdata</partition><target_file>userdata.bin</target_file></arg>"));
        assert!(xml.ends_with("</da>\u{0}"));
    }

    #[test]
    fn create_cmd_splits_sectioned_args_into_their_own_element() {
        let cmd = SetRuntimeParameter::new(
            "NONE".into(),
            "AUTO-DETECT".into(),
            "INFO".into(),
            "UART".into(),
            "LINUX".into(),
            "YES".into(),
        );
        let xml = create_cmd(&cmd);

        assert!(xml.contains("<version>1.1</version>"));
        assert!(xml.contains("<arg><checksum_level>NONE</checksum_level>"));
        assert!(xml.contains("<adv><initialize_dram>YES</initialize_dram></adv>"));
    }

    #[test]
    fn read_register_encodes_address_as_hex() {
        let cmd = ReadRegister::new(0x1000_A000);
        let xml = create_cmd(&cmd);
        assert!(xml.contains("<address>0x1000A000</address>"));
    }
}
