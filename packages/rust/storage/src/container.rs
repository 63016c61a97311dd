//! Appendable JSON-list container.
//!
//! The file on disk is always a closed JSON array between two `append` calls.
//! Appending scans backward from the end of the file for the closing `]`,
//! truncates just after the last element (or just after `[` when the list is
//! empty), writes the new elements, and closes the list again.
//!
//! The backward scan only reads trailing whitespace plus two bytes, in fixed
//! size blocks, so its cost does not depend on the file size.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use leadfill_shared::{LeadfillError, Result};

/// Bytes read per step of the backward scan.
const SCAN_BLOCK: u64 = 4096;

/// What the backward scan found at the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No file at the path.
    Absent,
    /// Zero-length (or whitespace-only) file.
    Empty,
    /// A closed list; `has_elements` is false for `[]`.
    Closed { has_elements: bool },
}

/// Where the next append resumes writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tail {
    /// Offset to truncate at: one past the last byte that is kept.
    cut: u64,
    has_elements: bool,
}

/// A JSON array on disk that can be extended without rewriting it.
#[derive(Debug, Clone)]
pub struct AppendableContainer {
    path: PathBuf,
}

impl AppendableContainer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Classify the file without modifying it.
    ///
    /// Fails with [`LeadfillError::Corruption`] when the trailing structure is
    /// not a closed list.
    pub fn inspect(&self) -> Result<ContainerState> {
        if !self.path.exists() {
            return Ok(ContainerState::Absent);
        }
        let mut file = File::open(&self.path).map_err(|e| LeadfillError::io(&self.path, e))?;
        match self.locate_tail(&mut file)? {
            None => Ok(ContainerState::Empty),
            Some(tail) => Ok(ContainerState::Closed {
                has_elements: tail.has_elements,
            }),
        }
    }

    /// Append already-serialized elements.
    ///
    /// Each element is a pretty-printed JSON value; it is indented one level
    /// inside the list. An empty slice leaves the file untouched. On a
    /// corruption error nothing has been written.
    #[instrument(skip_all, fields(path = %self.path.display(), elements = elements.len()))]
    pub fn append(&self, elements: &[String]) -> Result<()> {
        if elements.is_empty() {
            return Ok(());
        }

        let body = render_elements(elements);

        if !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| LeadfillError::io(parent, e))?;
            }
            return self.write_fresh(&body);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| LeadfillError::io(&self.path, e))?;

        let Some(tail) = self.locate_tail(&mut file)? else {
            drop(file);
            return self.write_fresh(&body);
        };

        let separator = if tail.has_elements { ",\n" } else { "\n" };
        debug!(cut = tail.cut, has_elements = tail.has_elements, "reopening container");

        file.set_len(tail.cut)
            .map_err(|e| LeadfillError::io(&self.path, e))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| LeadfillError::io(&self.path, e))?;
        file.write_all(format!("{separator}{body}\n]").as_bytes())
            .map_err(|e| LeadfillError::io(&self.path, e))?;
        file.sync_all().map_err(|e| LeadfillError::io(&self.path, e))?;

        Ok(())
    }

    /// Parse the whole container. A missing or blank file is an empty list.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| LeadfillError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            LeadfillError::corruption(
                &self.path,
                line_col_offset(&content, e.line(), e.column()),
                format!("invalid JSON list: {e}"),
            )
        })
    }

    fn write_fresh(&self, body: &str) -> Result<()> {
        let mut file = File::create(&self.path).map_err(|e| LeadfillError::io(&self.path, e))?;
        file.write_all(format!("[\n{body}\n]").as_bytes())
            .map_err(|e| LeadfillError::io(&self.path, e))?;
        file.sync_all().map_err(|e| LeadfillError::io(&self.path, e))?;
        debug!("container created");
        Ok(())
    }

    /// Find the closing bracket and the byte before it.
    ///
    /// `Ok(None)` means the file holds nothing but whitespace.
    fn locate_tail(&self, file: &mut File) -> Result<Option<Tail>> {
        let len = file
            .metadata()
            .map_err(|e| LeadfillError::io(&self.path, e))?
            .len();

        let Some((closing, byte)) = last_non_whitespace(file, len, &self.path)? else {
            return Ok(None);
        };

        if byte != b']' {
            return Err(LeadfillError::corruption(
                &self.path,
                closing,
                format!(
                    "expected ']' as last non-whitespace byte, found {:?}",
                    char::from(byte)
                ),
            ));
        }

        match last_non_whitespace(file, closing, &self.path)? {
            None => Err(LeadfillError::corruption(
                &self.path,
                closing,
                "closing ']' has no matching '['",
            )),
            Some((pos, b'[')) => Ok(Some(Tail {
                cut: pos + 1,
                has_elements: false,
            })),
            Some((pos, _)) => Ok(Some(Tail {
                cut: pos + 1,
                has_elements: true,
            })),
        }
    }
}

/// Scan backward from `end` (exclusive) for the last non-whitespace byte.
fn last_non_whitespace(file: &mut File, end: u64, path: &Path) -> Result<Option<(u64, u8)>> {
    let mut block_end = end;
    let mut buf = vec![0u8; SCAN_BLOCK as usize];

    while block_end > 0 {
        let block_start = block_end.saturating_sub(SCAN_BLOCK);
        let len = (block_end - block_start) as usize;

        file.seek(SeekFrom::Start(block_start))
            .map_err(|e| LeadfillError::io(path, e))?;
        file.read_exact(&mut buf[..len])
            .map_err(|e| LeadfillError::io(path, e))?;

        if let Some(i) = buf[..len].iter().rposition(|b| !b.is_ascii_whitespace()) {
            return Ok(Some((block_start + i as u64, buf[i])));
        }
        block_end = block_start;
    }

    Ok(None)
}

/// Indent each element one level and join them with list separators.
fn render_elements(elements: &[String]) -> String {
    elements
        .iter()
        .map(|element| {
            element
                .lines()
                .map(|line| format!("  {line}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join(",\n")
}

/// Byte offset of a 1-based (line, column) position.
fn line_col_offset(content: &str, line: usize, column: usize) -> u64 {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("lf-container-{}", Uuid::now_v7()))
            .join(name)
    }

    fn element(n: u32) -> String {
        serde_json::to_string_pretty(&serde_json::json!({ "n": n })).unwrap()
    }

    fn numbers(container: &AppendableContainer) -> Vec<u64> {
        container
            .read_all::<serde_json::Value>()
            .unwrap()
            .iter()
            .map(|v| v["n"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn first_append_creates_closed_list() {
        let container = AppendableContainer::new(temp_path("out.json"));
        assert_eq!(container.inspect().unwrap(), ContainerState::Absent);

        container.append(&[element(1), element(2)]).unwrap();

        let content = std::fs::read_to_string(container.path()).unwrap();
        assert_eq!(content, "[\n  {\n    \"n\": 1\n  },\n  {\n    \"n\": 2\n  }\n]");
        assert_eq!(
            container.inspect().unwrap(),
            ContainerState::Closed { has_elements: true }
        );
    }

    #[test]
    fn appends_extend_in_order() {
        let container = AppendableContainer::new(temp_path("out.json"));
        container.append(&[element(1)]).unwrap();
        container.append(&[element(2), element(3)]).unwrap();
        // A fresh handle sees the same file, as after a restart.
        let reopened = AppendableContainer::new(container.path());
        reopened.append(&[element(4)]).unwrap();

        assert_eq!(numbers(&reopened), vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_append_is_noop() {
        let container = AppendableContainer::new(temp_path("out.json"));
        container.append(&[]).unwrap();
        assert!(!container.path().exists());

        container.append(&[element(1)]).unwrap();
        let before = std::fs::read(container.path()).unwrap();
        container.append(&[]).unwrap();
        assert_eq!(std::fs::read(container.path()).unwrap(), before);
    }

    #[test]
    fn zero_length_and_blank_files_start_fresh() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        std::fs::write(&path, "").unwrap();
        let container = AppendableContainer::new(&path);
        assert_eq!(container.inspect().unwrap(), ContainerState::Empty);
        container.append(&[element(7)]).unwrap();
        assert_eq!(numbers(&container), vec![7]);

        std::fs::write(&path, "  \n\t ").unwrap();
        container.append(&[element(8)]).unwrap();
        assert_eq!(numbers(&container), vec![8]);
    }

    #[test]
    fn empty_list_gets_first_elements() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[ \n ]\n\n").unwrap();

        let container = AppendableContainer::new(&path);
        assert_eq!(
            container.inspect().unwrap(),
            ContainerState::Closed { has_elements: false }
        );
        container.append(&[element(1)]).unwrap();

        assert_eq!(numbers(&container), vec![1]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n  {"));
    }

    #[test]
    fn trailing_whitespace_after_bracket_is_tolerated() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{\"n\": 1}]   \n\n").unwrap();

        let container = AppendableContainer::new(&path);
        container.append(&[element(2)]).unwrap();
        assert_eq!(numbers(&container), vec![1, 2]);
    }

    #[test]
    fn mangled_tail_is_rejected_without_writing() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mangled = "[\n  {\n    \"n\": 1\n  },\n  {\n    \"n\": 2";
        std::fs::write(&path, mangled).unwrap();

        let container = AppendableContainer::new(&path);
        let err = container.append(&[element(3)]).unwrap_err();
        match err {
            LeadfillError::Corruption { offset, reason, .. } => {
                assert_eq!(offset, mangled.len() as u64 - 1);
                assert!(reason.contains("expected ']'"));
            }
            other => panic!("expected corruption, got {other}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), mangled);
        assert!(container.inspect().is_err());
    }

    #[test]
    fn lone_closing_bracket_is_rejected() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "   ]").unwrap();

        let err = AppendableContainer::new(&path)
            .append(&[element(1)])
            .unwrap_err();
        assert!(err.to_string().contains("byte 3"));
    }

    #[test]
    fn scan_crosses_block_boundaries() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let padding = " ".repeat(SCAN_BLOCK as usize * 2 + 17);
        std::fs::write(&path, format!("[{{\"n\": 1}}{padding}]{padding}")).unwrap();

        let container = AppendableContainer::new(&path);
        container.append(&[element(2)]).unwrap();
        assert_eq!(numbers(&container), vec![1, 2]);
    }

    #[test]
    fn read_all_reports_position_of_bad_json() {
        let path = temp_path("out.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[\n  {\"n\": 1},\n  oops\n]").unwrap();

        let err = AppendableContainer::new(&path)
            .read_all::<serde_json::Value>()
            .unwrap_err();
        assert!(matches!(err, LeadfillError::Corruption { .. }));
    }
}
