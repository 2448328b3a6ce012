//! Reading the cross-reference sections of a PDF file.
//!
//! This module only parses what the file says: the merged entry table of all
//! sections reachable from the last `startxref`, the newest trailer and the
//! kind of the newest section. Keeping track of object states is up to the
//! caller.

use crate::object::dict::keys::{FIRST, INDEX, N, PREV, SIZE, W, XREF_STM};
use crate::object::{Dict, IndirectObject, Object, Stream};
use crate::reader::{Readable, Reader};
use log::{error, warn};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub(crate) const XREF_ENTRY_LEN: usize = 20;

/// An error that occurred while reading the cross-reference sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XRefError {
    /// No `startxref` keyword with a valid offset was found.
    MissingStartXRef,
    /// The section at the given offset could not be parsed.
    InvalidSection(u64),
    /// The file declares more objects than the configured limit.
    TooManyObjects { declared: u64, limit: usize },
}

impl Display for XRefError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStartXRef => write!(f, "no startxref found"),
            Self::InvalidSection(offset) => {
                write!(f, "invalid cross-reference section at offset {offset}")
            }
            Self::TooManyObjects { declared, limit } => {
                write!(f, "file declares {declared} objects, limit is {limit}")
            }
        }
    }
}

impl core::error::Error for XRefError {}

/// A single entry of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// A free slot, linking to the next free object number.
    Free { next: u32, gen_number: u16 },
    /// An object stored uncompressed at a byte offset.
    Normal { offset: u64, gen_number: u16 },
    /// An object stored in an object stream. The generation is always 0.
    Compressed { stream: u32, index: u32 },
}

/// The form of the newest cross-reference section of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// A classic `xref` table.
    Table,
    /// A cross-reference stream.
    Stream,
    /// A classic table whose trailer points to a supplementary stream.
    Hybrid,
}

/// The result of reading all cross-reference sections of a file.
#[derive(Debug, Clone)]
pub struct XRefSections {
    /// All entries, with newer sections taking precedence over older ones.
    pub entries: BTreeMap<u32, XRefEntry>,
    /// The trailer of the newest section. For a stream this is its dictionary.
    pub trailer: Dict,
    /// The offset the last `startxref` points to.
    pub startxref: u64,
    pub kind: XRefKind,
}

impl XRefSections {
    /// The number of object slots the file declares.
    pub fn size(&self) -> u64 {
        let highest = self.entries.keys().next_back().map(|n| u64::from(*n) + 1);

        self.trailer
            .get_i64(SIZE)
            .and_then(|s| u64::try_from(s).ok())
            .into_iter()
            .chain(highest)
            .max()
            .unwrap_or(1)
    }
}

/// Read the cross-reference sections of `data`, following `/Prev` and
/// `/XRefStm` links.
pub fn read_xref(data: &[u8], max_objects: usize) -> Result<XRefSections, XRefError> {
    let startxref = find_last_xref_pos(data).ok_or(XRefError::MissingStartXRef)?;

    let mut ctx = PopulateContext {
        data,
        max_objects,
        entries: BTreeMap::new(),
        visited: FxHashSet::default(),
    };

    let (trailer, is_stream) = ctx.populate(startxref)?;

    let kind = match (is_stream, trailer.contains_key(XREF_STM)) {
        (true, _) => XRefKind::Stream,
        (false, true) => XRefKind::Hybrid,
        (false, false) => XRefKind::Table,
    };

    Ok(XRefSections {
        entries: ctx.entries,
        trailer,
        startxref,
        kind,
    })
}

pub(crate) fn find_last_xref_pos(data: &[u8]) -> Option<u64> {
    let needle = b"startxref";
    let pos = data.windows(needle.len()).rposition(|w| w == needle)?;

    let mut r = Reader::new_at(data, pos + needle.len());
    r.skip_white_spaces_and_comments();

    r.read_unsigned()
}

struct PopulateContext<'a> {
    data: &'a [u8],
    max_objects: usize,
    entries: BTreeMap<u32, XRefEntry>,
    visited: FxHashSet<u64>,
}

impl PopulateContext<'_> {
    /// Insert the entries of the section at `pos` (and of all older sections it
    /// links to), returning its trailer and whether it was a stream.
    fn populate(&mut self, pos: u64) -> Result<(Dict, bool), XRefError> {
        if !self.visited.insert(pos) {
            warn!("cross-reference sections form a cycle at offset {pos}");

            return Err(XRefError::InvalidSection(pos));
        }

        let offset = usize::try_from(pos).map_err(|_| XRefError::InvalidSection(pos))?;

        let mut r = Reader::new_at(self.data, offset);
        // In case the position points to before the object number of a xref stream.
        r.skip_white_spaces_and_comments();

        if r.peek_tag(b"xref").is_some() {
            self.populate_from_table(&mut r, pos).map(|t| (t, false))
        } else {
            self.populate_from_stream(&mut r, pos).map(|t| (t, true))
        }
    }

    fn check_size(&self, declared: u64) -> Result<(), XRefError> {
        if declared > self.max_objects as u64 {
            error!("cross-reference table is larger than the allowed limit");

            return Err(XRefError::TooManyObjects {
                declared,
                limit: self.max_objects,
            });
        }

        Ok(())
    }

    fn populate_from_table(&mut self, r: &mut Reader<'_>, pos: u64) -> Result<Dict, XRefError> {
        let invalid = || XRefError::InvalidSection(pos);

        let trailer = read_xref_table_trailer(&mut r.clone()).ok_or_else(invalid)?;

        if let Some(size) = trailer.get_i64(SIZE) {
            self.check_size(u64::try_from(size).map_err(|_| invalid())?)?;
        }

        // Older sections are inserted first so that newer entries win.
        if let Some(prev) = trailer.get_i64(PREV).and_then(|p| u64::try_from(p).ok()) {
            self.populate(prev)?;
        }

        // In hybrid files, entries in `XRefStm` take precedence over `Prev`.
        let mut from_stream = FxHashSet::default();

        if let Some(xref_stm) = trailer.get_i64(XREF_STM).and_then(|p| u64::try_from(p).ok()) {
            let older = std::mem::take(&mut self.entries);
            let populated = self.populate(xref_stm);
            let stream_entries = std::mem::replace(&mut self.entries, older);
            populated?;

            from_stream.extend(
                stream_entries
                    .iter()
                    .filter(|(_, e)| !matches!(e, XRefEntry::Free { .. }))
                    .map(|(n, _)| *n),
            );
            self.entries.extend(stream_entries);
        }

        r.forward_tag(b"xref").ok_or_else(invalid)?;
        r.skip_white_spaces();

        while let Some(header) = r.read::<SubsectionHeader>() {
            let end = u64::from(header.start) + u64::from(header.num_entries);
            self.check_size(end)?;

            for obj_number in header.start..header.start + header.num_entries {
                let bytes = r.read_bytes(XREF_ENTRY_LEN).ok_or_else(invalid)?;
                let entry = read_table_entry(bytes).ok_or_else(invalid)?;

                // The table of a hybrid file lists compressed objects as free.
                if matches!(entry, XRefEntry::Free { .. }) && from_stream.contains(&obj_number) {
                    continue;
                }

                self.entries.insert(obj_number, entry);
            }
        }

        Ok(trailer)
    }

    fn populate_from_stream(&mut self, r: &mut Reader<'_>, pos: u64) -> Result<Dict, XRefError> {
        let invalid = || XRefError::InvalidSection(pos);

        let object = r.read::<IndirectObject>().ok_or_else(invalid)?.object;
        let Object::Stream(stream) = object else {
            return Err(invalid());
        };

        let size = stream
            .dict()
            .get_i64(SIZE)
            .and_then(|s| u64::try_from(s).ok())
            .ok_or_else(invalid)?;
        self.check_size(size)?;

        if let Some(prev) = stream.dict().get_i64(PREV).and_then(|p| u64::try_from(p).ok()) {
            self.populate(prev)?;
        }

        let widths = stream
            .dict()
            .get_array(W)
            .and_then(|w| {
                w.iter()
                    .map(|v| v.as_i64().and_then(|v| usize::try_from(v).ok()))
                    .collect::<Option<Vec<_>>>()
            })
            .filter(|w| w.len() == 3)
            .ok_or_else(invalid)?;

        if widths[1] > size_of::<u64>() || widths[0] > 1 || widths[2] > size_of::<u32>() {
            error!("xref stream field widths are larger than the allowed limit");

            return Err(invalid());
        }

        let xref_data = stream.decoded().ok_or_else(invalid)?;
        let mut xref_reader = Reader::new(&xref_data);

        let subsections = match stream.dict().get_array(INDEX) {
            Some(index) => index
                .chunks(2)
                .map(|pair| {
                    let start = u32::try_from(pair.first()?.as_i64()?).ok()?;
                    let len = u32::try_from(pair.get(1)?.as_i64()?).ok()?;

                    Some((start, len))
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?,
            None => vec![(0, u32::try_from(size).map_err(|_| invalid())?)],
        };

        for (start, len) in subsections {
            self.check_size(u64::from(start) + u64::from(len))?;

            for obj_number in start..start + len {
                let entry = read_stream_entry(&mut xref_reader, &widths).ok_or_else(invalid)?;
                self.entries.insert(obj_number, entry);
            }
        }

        let (mut dict, _) = stream.into_parts();
        dict.remove(crate::object::keys::LENGTH);

        Ok(dict)
    }
}

struct SubsectionHeader {
    start: u32,
    num_entries: u32,
}

impl Readable for SubsectionHeader {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        r.skip_white_spaces();
        let start = u32::try_from(r.read_unsigned()?).ok()?;
        r.skip_white_spaces();
        let num_entries = u32::try_from(r.read_unsigned()?).ok()?;
        r.skip_white_spaces();

        Some(Self { start, num_entries })
    }
}

fn read_table_entry(data: &[u8]) -> Option<XRefEntry> {
    let mut r = Reader::new(data);
    let first = r.read_unsigned()?;
    r.skip_white_spaces();
    let gen_number = u16::try_from(r.read_unsigned()?).ok()?;
    r.skip_white_spaces();

    match r.read_byte()? {
        b'n' => Some(XRefEntry::Normal {
            offset: first,
            gen_number,
        }),
        b'f' => Some(XRefEntry::Free {
            next: u32::try_from(first).ok()?,
            gen_number,
        }),
        _ => None,
    }
}

fn read_field(r: &mut Reader<'_>, width: usize) -> Option<u64> {
    let bytes = r.read_bytes(width)?;

    Some(bytes.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b)))
}

fn read_stream_entry(r: &mut Reader<'_>, widths: &[usize]) -> Option<XRefEntry> {
    // A missing type field defaults to an uncompressed object.
    let f_type = if widths[0] == 0 {
        1
    } else {
        read_field(r, widths[0])?
    };
    let f2 = read_field(r, widths[1])?;
    let f3 = read_field(r, widths[2])?;

    match f_type {
        0 => Some(XRefEntry::Free {
            next: u32::try_from(f2).ok()?,
            gen_number: u16::try_from(f3).ok()?,
        }),
        1 => Some(XRefEntry::Normal {
            offset: f2,
            gen_number: u16::try_from(f3).ok()?,
        }),
        2 => Some(XRefEntry::Compressed {
            stream: u32::try_from(f2).ok()?,
            index: u32::try_from(f3).ok()?,
        }),
        _ => {
            warn!("xref has unknown field type {f_type}");

            None
        }
    }
}

fn read_xref_table_trailer(r: &mut Reader<'_>) -> Option<Dict> {
    r.skip_white_spaces();
    r.forward_tag(b"xref")?;
    r.skip_white_spaces();

    while let Some(header) = r.read::<SubsectionHeader>() {
        r.jump(r.offset() + XREF_ENTRY_LEN * header.num_entries as usize);
    }

    r.skip_white_spaces();
    r.forward_tag(b"trailer")?;
    r.skip_white_spaces_and_comments();

    r.read::<Dict>()
}

/// The objects stored in a decoded object stream.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    data: Vec<u8>,
    offsets: Vec<(u32, usize)>,
}

impl ObjectStream {
    /// Decode an object stream.
    pub fn new(stream: &Stream) -> Option<Self> {
        let num_objects = usize::try_from(stream.dict().get_i64(N)?).ok()?;
        let first_offset = usize::try_from(stream.dict().get_i64(FIRST)?).ok()?;
        let data = stream.decoded()?;

        let mut r = Reader::new(&data);
        let mut offsets = Vec::with_capacity(num_objects.min(data.len()));

        for _ in 0..num_objects {
            r.skip_white_spaces_and_comments();
            let obj_num = u32::try_from(r.read_unsigned()?).ok()?;
            r.skip_white_spaces_and_comments();
            let relative_offset = usize::try_from(r.read_unsigned()?).ok()?;
            offsets.push((obj_num, first_offset.checked_add(relative_offset)?));
        }

        Some(Self { data, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Read the object at `index`, returning its object number and value.
    pub fn get(&self, index: u32) -> Option<(u32, Object)> {
        let (obj_num, offset) = *self.offsets.get(index as usize)?;
        let mut r = Reader::new_at(&self.data, offset);
        r.skip_white_spaces_and_comments();

        Some((obj_num, r.read::<Object>()?))
    }
}
