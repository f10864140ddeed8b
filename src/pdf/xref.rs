//! Cross-reference table reconstruction by linear scan
//!
//! When a file's xref table or trailer is damaged, every `N G obj` header is
//! located by scanning the raw bytes, and a fresh xref section plus trailer
//! is appended so a regular parser can load the result.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Location of an indirect object in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectOffset {
    pub generation: u16,
    pub offset: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XrefError {
    #[error("no indirect objects found")]
    NoObjects,

    #[error("no document catalog found")]
    NoCatalog,
}

/// A repaired file image
#[derive(Debug, Clone)]
pub struct RebuiltXref {
    /// Original bytes (with a header prepended if it was missing) followed by
    /// the new xref section and trailer
    pub data: Vec<u8>,
    pub objects: BTreeMap<u32, ObjectOffset>,
    pub root: (u32, u16),
}

const HEADER_SEARCH_WINDOW: usize = 1024;
const DEFAULT_HEADER: &[u8] = b"%PDF-1.4\n";

/// Parse `N G obj` at the start of `line`. The keyword may be followed
/// directly by a delimiter, as in `3 0 obj<<`.
fn parse_object_header(line: &[u8]) -> Option<(u32, u16)> {
    let text = std::str::from_utf8(line).ok()?;
    let mut parts = text.split_ascii_whitespace();
    let id = parts.next()?.parse::<u32>().ok()?;
    let generation = parts.next()?.parse::<u16>().ok()?;
    let keyword = parts.next()?;
    let rest = keyword.strip_prefix("obj")?;
    if rest.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((id, generation))
}

/// Find every object header. Later definitions of the same object number
/// win, matching incremental-update semantics.
pub fn scan_object_offsets(data: &[u8]) -> BTreeMap<u32, ObjectOffset> {
    let mut objects = BTreeMap::new();
    let mut line_start = 0;

    while line_start < data.len() {
        let line_end = data[line_start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .map_or(data.len(), |p| line_start + p);

        let line = &data[line_start..line_end];
        let indent = line.iter().take_while(|b| b.is_ascii_whitespace()).count();
        // Only the leading bytes matter; avoids utf8-validating stream payloads
        let head = &line[indent..line.len().min(indent + 32)];
        if let Some((id, generation)) = parse_object_header(head) {
            objects.insert(
                id,
                ObjectOffset {
                    generation,
                    offset: line_start + indent,
                },
            );
        }

        line_start = line_end + 1;
    }

    objects
}

fn contains_catalog(span: &[u8]) -> bool {
    [&b"/Type /Catalog"[..], &b"/Type/Catalog"[..]]
        .iter()
        .any(|needle| span.windows(needle.len()).any(|w| w == *needle))
}

fn find_catalog(data: &[u8], objects: &BTreeMap<u32, ObjectOffset>) -> Option<(u32, u16)> {
    let mut starts: Vec<(usize, u32, u16)> = objects
        .iter()
        .map(|(id, loc)| (loc.offset, *id, loc.generation))
        .collect();
    starts.sort_unstable();

    let mut root = None;
    for (i, (offset, id, generation)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(data.len(), |next| next.0);
        if contains_catalog(&data[*offset..end]) {
            root = Some((*id, *generation));
        }
    }
    root
}

/// Rebuild the xref table of `data`
pub fn rebuild(data: &[u8]) -> Result<RebuiltXref, XrefError> {
    let has_header = data
        .windows(5)
        .take(HEADER_SEARCH_WINDOW)
        .any(|w| w == b"%PDF-");

    let mut repaired = Vec::with_capacity(data.len() + 1024);
    if !has_header {
        repaired.extend_from_slice(DEFAULT_HEADER);
    }
    repaired.extend_from_slice(data);

    let objects = scan_object_offsets(&repaired);
    if objects.is_empty() {
        return Err(XrefError::NoObjects);
    }
    let root = find_catalog(&repaired, &objects).ok_or(XrefError::NoCatalog)?;

    if !repaired.ends_with(b"\n") {
        repaired.push(b'\n');
    }
    let xref_offset = repaired.len();
    let size = objects.keys().next_back().map_or(1, |max| max + 1);

    let mut section = format!("xref\n0 {}\n", size);
    for id in 0..size {
        match objects.get(&id) {
            Some(loc) if id != 0 => {
                let _ = write!(section, "{:010} {:05} n\r\n", loc.offset, loc.generation);
            }
            _ if id == 0 => section.push_str("0000000000 65535 f\r\n"),
            _ => section.push_str("0000000000 00000 f\r\n"),
        }
    }
    let _ = write!(
        section,
        "trailer\n<< /Size {} /Root {} {} R >>\nstartxref\n{}\n%%EOF\n",
        size, root.0, root.1, xref_offset
    );
    repaired.extend_from_slice(section.as_bytes());

    Ok(RebuiltXref {
        data: repaired,
        objects,
        root,
    })
}
