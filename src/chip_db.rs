/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! Static hw_code -> per-chip constants lookup.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploitClass {
    None,
    Carbonara,
    Kamakiri2,
    AllInOneSignature,
}

#[derive(Debug, Clone)]
pub struct ChipInfo {
    pub hw_code: u16,
    pub name: &'static str,
    pub wdt_addr: u32,
    pub uart_addr: u32,
    pub brom_payload_addr: u32,
    pub da_payload_addr: u32,
    pub cqdma_base: Option<u32>,
    pub exploit: ExploitClass,
}

impl Default for ChipInfo {
    fn default() -> Self {
        ChipInfo {
            hw_code: 0,
            name: "unknown",
            wdt_addr: 0x1000_7000,
            uart_addr: 0x1100_2000,
            brom_payload_addr: 0x0010_0000,
            da_payload_addr: 0x0020_0000,
            cqdma_base: None,
            exploit: ExploitClass::None,
        }
    }
}

/// Chips requiring the legacy 16-bit watchdog write at a fixed address
/// instead of the normal 32-bit WDT register write.
pub const LEGACY_WDT_HW_CODES: &[u16] = &[0x6261, 0x2523, 0x7682, 0x7686];
pub const LEGACY_WDT_ADDR: u32 = 0xA205_0000;
pub const LEGACY_WDT_VALUE: u16 = 0x2200;

fn table() -> &'static [ChipInfo] {
    static TABLE: OnceLock<Vec<ChipInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            ChipInfo {
                hw_code: 0x0717,
                name: "MT6735",
                wdt_addr: 0x1000_0000,
                uart_addr: 0x1100_2000,
                brom_payload_addr: 0x1001_2000,
                da_payload_addr: 0x4000_0000,
                cqdma_base: None,
                exploit: ExploitClass::Kamakiri2,
            },
            ChipInfo {
                hw_code: 0x0788,
                name: "MT6761",
                wdt_addr: 0x1000_7000,
                uart_addr: 0x1100_2000,
                brom_payload_addr: 0x2000_1000,
                da_payload_addr: 0x4100_0000,
                cqdma_base: Some(0x1020_1000),
                exploit: ExploitClass::Carbonara,
            },
            ChipInfo {
                hw_code: 0x0699,
                name: "MT6799",
                wdt_addr: 0x1000_7000,
                uart_addr: 0x1100_2000,
                brom_payload_addr: 0x2000_1000,
                da_payload_addr: 0x4100_0000,
                cqdma_base: Some(0x1020_1000),
                exploit: ExploitClass::Carbonara,
            },
            ChipInfo {
                hw_code: 0x0813,
                name: "MT6833",
                wdt_addr: 0x1000_7000,
                uart_addr: 0x1100_2000,
                brom_payload_addr: 0x0010_0A00,
                da_payload_addr: 0x4102_7A00,
                cqdma_base: Some(0x1022_1000),
                exploit: ExploitClass::AllInOneSignature,
            },
            ChipInfo {
                hw_code: 0x0886,
                name: "MT6877",
                wdt_addr: 0x1000_7000,
                uart_addr: 0x1100_2000,
                brom_payload_addr: 0x0010_0A00,
                da_payload_addr: 0x4102_7A00,
                cqdma_base: Some(0x1022_1000),
                exploit: ExploitClass::AllInOneSignature,
            },
        ]
    })
}

pub fn lookup(hw_code: u16) -> ChipInfo {
    table()
        .iter()
        .find(|c| c.hw_code == hw_code)
        .cloned()
        .unwrap_or(ChipInfo { hw_code, ..ChipInfo::default() })
}

pub fn all_chips() -> Vec<ChipInfo> {
    table().to_vec()
}

pub fn chips_with_exploit() -> Vec<ChipInfo> {
    table().iter().filter(|c| c.exploit != ExploitClass::None).cloned().collect()
}

pub fn chips_with_allinone_signature() -> Vec<ChipInfo> {
    table()
        .iter()
        .filter(|c| c.exploit == ExploitClass::AllInOneSignature)
        .cloned()
        .collect()
}

pub fn is_allinone_signature_supported(hw_code: u16) -> bool {
    lookup(hw_code).exploit == ExploitClass::AllInOneSignature
}

pub fn exploit_type(hw_code: u16) -> &'static str {
    match lookup(hw_code).exploit {
        ExploitClass::None => "none",
        ExploitClass::Carbonara => "carbonara",
        ExploitClass::Kamakiri2 => "kamakiri2",
        ExploitClass::AllInOneSignature => "allinone_signature",
    }
}

pub fn watchdog_write(hw_code: u16) -> (u32, u32, bool) {
    if LEGACY_WDT_HW_CODES.contains(&hw_code) {
        (LEGACY_WDT_ADDR, LEGACY_WDT_VALUE as u32, true)
    } else {
        (lookup(hw_code).wdt_addr, 0x2200_0000, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hw_code_returns_default_record() {
        let chip = lookup(0xFFFF);
        assert_eq!(chip.wdt_addr, 0x1000_7000);
        assert_eq!(chip.da_payload_addr, 0x0020_0000);
        assert_eq!(chip.exploit, ExploitClass::None);
    }

    #[test]
    fn known_chip_round_trips_through_lookup() {
        let chip = lookup(0x0788);
        assert_eq!(chip.name, "MT6761");
        assert_eq!(chip.exploit, ExploitClass::Carbonara);
    }

    #[test]
    fn legacy_wdt_chips_use_the_16_bit_write() {
        let (addr, value, is_16bit) = watchdog_write(0x6261);
        assert_eq!(addr, LEGACY_WDT_ADDR);
        assert_eq!(value, LEGACY_WDT_VALUE as u32);
        assert!(is_16bit);
    }
}
