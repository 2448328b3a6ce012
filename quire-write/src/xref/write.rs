//! Writing cross-reference sections and the trailer.

use crate::error::{Error, Result};
use crate::state::Lifecycle;
use crate::writer::CountingWriter;
use crate::xref::{Location, XRefTable};
use log::{debug, error};
use quire_syntax::filter::deflate_encode;
use quire_syntax::object::keys::{
    ENCRYPT, FILTER, FLATE_DECODE, ID, INDEX, INFO, PREV, ROOT, SIZE, W, XREF, XREF_STM,
};
use quire_syntax::object::{Array, Dict, Name, ObjRef, Object, ObjectFlags, Stream, string};
use quire_syntax::write::{WriteDirect, write_indirect};
use quire_syntax::xref::XRefKind;
use std::io::Write;

/// The largest offset that fits into the ten digits of a classic entry.
pub(crate) const MAX_OFFSET: u64 = 9_999_999_999;

/// The values written into the trailer.
#[derive(Debug, Clone)]
pub(crate) struct TrailerInfo {
    pub(crate) root: ObjRef,
    pub(crate) info: Option<ObjRef>,
    pub(crate) id: [Vec<u8>; 2],
    pub(crate) encrypt: Option<ObjRef>,
}

impl TrailerInfo {
    fn apply(&self, dict: &mut Dict, size: u32) {
        dict.insert(SIZE, size);
        dict.insert(ROOT, self.root);

        if let Some(info) = self.info {
            dict.insert(INFO, info);
        }

        dict.insert(
            ID,
            Array::from_iter(
                self.id
                    .iter()
                    .map(|id| Object::String(string::String::new_hex(id.clone()))),
            ),
        );

        if let Some(encrypt) = self.encrypt {
            dict.insert(ENCRYPT, encrypt);
        }
    }
}

/// How the cross-reference information should be written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct XRefOptions {
    pub(crate) full_compression: bool,
    pub(crate) compress: bool,
    pub(crate) append_mode: bool,
    /// The offset and kind of the newest section of the file that is updated.
    pub(crate) previous: Option<(u64, XRefKind)>,
}

/// Write the cross-reference information of `xref`, followed by the trailer
/// and the `startxref` pointer.
///
/// With full compression a cross-reference stream is written. A classic table
/// is written when compression is off, and additionally when an incremental
/// update is appended to a hybrid file: readers don't follow the `/Prev` of a
/// stream into a classic section, so the chain has to continue through a
/// classic table that points to the new stream via `/XRefStm`.
pub(crate) fn write_xref_and_trailer<W: Write>(
    xref: &mut XRefTable,
    out: &mut CountingWriter<W>,
    options: &XRefOptions,
    trailer: &TrailerInfo,
) -> Result<()> {
    if !options.append_mode {
        xref.trim_trailing_free();
    }

    let previous = options.previous.filter(|_| options.append_mode);
    let previous_hybrid = matches!(previous, Some((_, XRefKind::Hybrid)));
    let mut startxref = out.position();
    let mut xref_stm = None;

    if options.full_compression {
        write_xref_stream(xref, out, options, trailer, previous, previous_hybrid)?;
        xref_stm = Some(startxref);
    }

    if !options.full_compression || previous_hybrid {
        startxref = out.position();
        check_offset(startxref)?;

        let sections = create_sections(xref, options.append_mode, true);
        let mut buf = b"xref\n".to_vec();

        for &(first, len) in &sections {
            buf.extend_from_slice(format!("{first} {len}\n").as_bytes());

            for obj_number in first..first + len {
                if let Some(entry) = xref.get(obj_number) {
                    let offset = entry_offset(entry.location(), entry.is_free())?;
                    let kind = if entry.is_free() { 'f' } else { 'n' };

                    buf.extend_from_slice(
                        format!("{offset:010} {:05} {kind} \n", entry.gen_number()).as_bytes(),
                    );
                }
            }
        }

        let mut dict = Dict::new();
        trailer.apply(&mut dict, xref.size());

        if let Some((prev, _)) = previous {
            dict.insert(PREV, prev as i64);
        }

        if let Some(xref_stm) = xref_stm {
            dict.insert(XREF_STM, xref_stm as i64);
        }

        buf.extend_from_slice(b"trailer\n");
        dict.write_direct(&mut buf);
        buf.push(b'\n');

        out.write_all(&buf)?;
    }

    debug!("wrote cross-reference information at {startxref}");
    out.write_all(format!("startxref\n{startxref}\n%%EOF\n").as_bytes())?;

    Ok(())
}

fn write_xref_stream<W: Write>(
    xref: &mut XRefTable,
    out: &mut CountingWriter<W>,
    options: &XRefOptions,
    trailer: &TrailerInfo,
    previous: Option<(u64, XRefKind)>,
    previous_hybrid: bool,
) -> Result<()> {
    let startxref = out.position();
    check_offset(startxref)?;

    // The stream is an object of the table itself and thus listed in it.
    let id = xref.create_next_reference()?;

    if let Some(entry) = xref.lookup_mut(id) {
        entry.location = Location::ByteOffset(startxref);
        entry.lifecycle = Lifecycle::Flushed;
        entry.flags.insert(ObjectFlags::UNENCRYPTED);
    }

    let sections = create_sections(xref, options.append_mode, false);
    let width = offset_size(startxref.max(u64::from(xref.size())));
    let mut data = vec![];

    for &(first, len) in &sections {
        for obj_number in first..first + len {
            let Some(entry) = xref.get(obj_number) else {
                continue;
            };

            let (kind, field2, field3) = match entry.location() {
                _ if entry.is_free() => (
                    0,
                    entry.location().offset_field(),
                    u64::from(entry.gen_number()),
                ),
                Location::InObjectStream { stream, index } => {
                    (2, u64::from(stream), u64::from(index))
                }
                location => (
                    1,
                    entry_offset(location, false)?,
                    u64::from(entry.gen_number()),
                ),
            };

            data.push(kind);
            write_field(&mut data, field2, width);
            write_field(&mut data, field3, 2);
        }
    }

    let mut dict = Dict::with_type(XREF);
    trailer.apply(&mut dict, xref.size());
    dict.insert(
        W,
        Array::from(vec![
            Object::from(1i64),
            Object::from(i64::from(width)),
            Object::from(2i64),
        ]),
    );
    dict.insert(
        INDEX,
        sections
            .iter()
            .flat_map(|(first, len)| [Object::from(*first), Object::from(*len)])
            .collect::<Array>(),
    );

    if let Some((prev, _)) = previous
        && !previous_hybrid
    {
        dict.insert(PREV, prev as i64);
    }

    if options.compress {
        data = deflate_encode(&data)?;
        dict.insert(FILTER, Name::new(FLATE_DECODE));
    }

    let mut buf = vec![];
    write_indirect(id, &Object::Stream(Stream::new(dict, data)), &mut buf);
    out.write_all(&buf)?;

    Ok(())
}

/// Compute the sections to write as `(first object number, length)` pairs.
///
/// A section is a maximal run of slots that exist. In append mode only
/// modified slots count, and `drop_compressed` leaves out objects stored in
/// object streams, which a classic table can't express.
pub(crate) fn create_sections(
    xref: &XRefTable,
    append_mode: bool,
    drop_compressed: bool,
) -> Vec<(u32, u32)> {
    let mut sections = vec![];
    let mut first = 0;
    let mut len = 0;

    for obj_number in 0..xref.size() {
        let included = xref.get(obj_number).is_some_and(|e| {
            (!append_mode || e.is_modified())
                && !(drop_compressed
                    && matches!(e.location(), Location::InObjectStream { .. })
                    && !e.is_free())
        });

        if included {
            if len == 0 {
                first = obj_number;
            }

            len += 1;
        } else if len > 0 {
            sections.push((first, len));
            len = 0;
        }
    }

    if len > 0 {
        sections.push((first, len));
    }

    sections
}

/// The number of bytes needed to store `value`, between 1 and 5.
pub(crate) fn offset_size(value: u64) -> u8 {
    let mut size = 5;
    let mut mask: u64 = 0xff_0000_0000;

    while size > 1 {
        if mask & value != 0 {
            break;
        }

        mask >>= 8;
        size -= 1;
    }

    size
}

fn write_field(out: &mut Vec<u8>, value: u64, width: u8) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[bytes.len() - usize::from(width)..]);
}

fn check_offset(offset: u64) -> Result<()> {
    if offset > MAX_OFFSET {
        error!("offset {offset} can't be written to a cross-reference table");

        return Err(Error::OffsetTooLarge(offset));
    }

    Ok(())
}

fn entry_offset(location: Location, free: bool) -> Result<u64> {
    let offset = location.offset_field();

    if !free {
        check_offset(offset)?;
    }

    Ok(offset)
}
