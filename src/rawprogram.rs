/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
//! Rawprogram/patch flashing-plan XML parser (§4.10).

use std::path::{Path, PathBuf};

use simple_xml::Element;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Program,
    Patch,
    Erase,
    Zeroout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlashTask {
    pub label: String,
    pub filename: Option<PathBuf>,
    pub lun: u32,
    pub start_sector: i64,
    pub num_sectors: i64,
    pub sector_size: u32,
    pub file_sector_offset: i64,
    pub is_sparse: bool,
    pub read_back_verify: bool,
    pub task_type: TaskType,
    pub priority: u32,
}

impl FlashTask {
    fn priority_for(label: &str) -> u32 {
        let lower = label.to_ascii_lowercase();
        if lower.contains("primarygpt") || lower.contains("gpt_main") {
            1
        } else if lower.contains("backupgpt") || lower.contains("gpt_backup") {
            2
        } else if lower.contains("xbl") || lower.contains("abl") {
            10
        } else {
            100
        }
    }
}

fn attr(el: &Element, name: &str) -> Option<String> {
    el.attributes.get(name).cloned()
}

fn parse_int_attr(raw: &str) -> Option<i64> {
    let raw = raw.trim().trim_end_matches('.');
    if let Some(expr) = raw.strip_prefix("NUM_DISK_SECTORS-") {
        return expr.trim().parse::<i64>().ok().map(|n| -n);
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    raw.parse::<i64>().ok()
}

fn file_len_sectors(xml_dir: &Path, filename: &str, sector_size: u32) -> Option<i64> {
    let path = xml_dir.join(filename);
    let meta = std::fs::metadata(&path).ok()?;
    Some((meta.len() as i64).div_ceil(sector_size as i64))
}

fn parse_program_element(el: &Element, xml_dir: &Path, is_patch: bool) -> Option<FlashTask> {
    let label = attr(el, "label").unwrap_or_else(|| "unnamed".to_string());
    let sector_size =
        attr(el, "SECTOR_SIZE_IN_BYTES").and_then(|s| parse_int_attr(&s)).unwrap_or(4096) as u32;
    let lun = attr(el, "physical_partition_number")
        .and_then(|s| parse_int_attr(&s))
        .unwrap_or(0) as u32;
    let start_sector = attr(el, "start_sector").and_then(|s| parse_int_attr(&s)).unwrap_or(0);
    let file_sector_offset =
        attr(el, "file_sector_offset").and_then(|s| parse_int_attr(&s)).unwrap_or(0);

    let filename = attr(el, "filename").filter(|f| !f.is_empty() && !f.starts_with("0:"));

    let mut num_sectors =
        attr(el, "num_partition_sectors").and_then(|s| parse_int_attr(&s)).unwrap_or(0);

    if num_sectors == 0 {
        num_sectors = attr(el, "size_in_KB")
            .and_then(|s| s.trim_end_matches('.').parse::<f64>().ok())
            .map(|kb| ((kb * 1024.0) / sector_size as f64).ceil() as i64)
            .filter(|&n| n > 0)
            .or_else(|| {
                filename.as_deref().and_then(|f| file_len_sectors(xml_dir, f, sector_size))
            })
            .unwrap_or(if label.eq_ignore_ascii_case("PrimaryGPT") && start_sector == 0 {
                6
            } else {
                0
            });
    }

    let is_sparse =
        attr(el, "sparse").map(|s| s.eq_ignore_ascii_case("true")).unwrap_or(false);
    let read_back_verify =
        attr(el, "read_back_verify").map(|s| s.eq_ignore_ascii_case("true")).unwrap_or(false);

    let task_type = if is_patch { TaskType::Patch } else { TaskType::Program };

    Some(FlashTask {
        priority: FlashTask::priority_for(&label),
        label,
        filename: filename.map(PathBuf::from),
        lun,
        start_sector,
        num_sectors,
        sector_size,
        file_sector_offset,
        is_sparse,
        read_back_verify,
        task_type,
    })
}

/// Enumerates `rawprogram*.xml`/`patch*.xml` beneath `root` (depth ≤ 5,
/// ≤ 10,000 files cached) and parses every `<program>`/`<patch>` element
/// into a sortable `FlashTask` list.
pub fn parse_plan(root: &Path) -> Result<Vec<FlashTask>> {
    let mut files = Vec::new();
    collect_xml_files(root, 0, &mut files);
    if files.len() > 10_000 {
        files.truncate(10_000);
    }

    let mut tasks = Vec::new();
    for path in files {
        let is_patch = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("patch"))
            .unwrap_or(false);

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::container(format!("failed to read {}: {e}", path.display())))?;
        let doc = simple_xml::parse(&content)
            .map_err(|e| Error::container(format!("invalid plan XML {}: {e}", path.display())))?;

        let dir = path.parent().unwrap_or(root).to_path_buf();
        for child in doc.children.iter().filter(|c| c.name == "program" || c.name == "patch") {
            if let Some(task) = parse_program_element(child, &dir, is_patch) {
                tasks.push(task);
            }
        }
    }

    tasks.sort_by(|a, b| {
        (a.priority, a.lun, a.start_sector).cmp(&(b.priority, b.lun, b.start_sector))
    });

    Ok(tasks)
}

fn collect_xml_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > 5 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_xml_files(&path, depth + 1, out);
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if (name.starts_with("rawprogram") || name.starts_with("patch")) && name.ends_with(".xml")
        {
            out.push(path);
        }
        if out.len() >= 10_000 {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_disk_sectors_minus_n_encodes_negative() {
        assert_eq!(parse_int_attr("NUM_DISK_SECTORS-33"), Some(-33));
    }

    #[test]
    fn hex_prefixed_values_decode() {
        assert_eq!(parse_int_attr("0x1A."), Some(0x1A));
    }

    #[test]
    fn gpt_tasks_sort_before_everything_else() {
        let gpt = FlashTask {
            label: "PrimaryGPT".into(),
            filename: None,
            lun: 0,
            start_sector: 0,
            num_sectors: 6,
            sector_size: 4096,
            file_sector_offset: 0,
            is_sparse: false,
            read_back_verify: false,
            task_type: TaskType::Program,
            priority: FlashTask::priority_for("PrimaryGPT"),
        };
        let xbl = FlashTask {
            label: "xbl_a".into(),
            priority: FlashTask::priority_for("xbl_a"),
            ..gpt.clone()
        };
        assert!(gpt.priority < xbl.priority);
    }

    #[test]
    fn read_back_verify_attribute_is_parsed() {
        let xml = r#"<data>
            <program label="boot_a" read_back_verify="true" num_partition_sectors="10" />
            <program label="boot_b" read_back_verify="false" num_partition_sectors="10" />
            <program label="boot_c" num_partition_sectors="10" />
        </data>"#;
        let doc = simple_xml::parse(xml).unwrap();
        let dir = Path::new(".");

        let tasks: Vec<FlashTask> = doc
            .children
            .iter()
            .filter(|c| c.name == "program")
            .filter_map(|c| parse_program_element(c, dir, false))
            .collect();

        assert!(tasks[0].read_back_verify);
        assert!(!tasks[1].read_back_verify);
        assert!(!tasks[2].read_back_verify);
    }
}
