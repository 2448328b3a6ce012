//! Streams.

use crate::filter;
use crate::object::Dict;
use crate::object::dict::keys::LENGTH;
use crate::reader::{Readable, Reader};
use log::warn;
use std::fmt::{Debug, Formatter};

/// A stream of arbitrary data, together with its dictionary.
///
/// The data is kept in its encoded form.
#[derive(Clone, Default, PartialEq)]
pub struct Stream {
    dict: Dict,
    data: Vec<u8>,
}

impl Stream {
    pub fn new(dict: Dict, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut Dict {
        &mut self.dict
    }

    /// Return the raw, encoded data of the stream.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_raw_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Return the decoded data of the stream, if all its filters are supported.
    pub fn decoded(&self) -> Option<Vec<u8>> {
        filter::decode(&self.dict, &self.data)
    }

    pub fn into_parts(self) -> (Dict, Vec<u8>) {
        (self.dict, self.data)
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stream {:?} ({} bytes)", self.dict, self.data.len())
    }
}

impl Readable for Stream {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let dict = r.read::<Dict>()?;
        r.skip_white_spaces_and_comments();
        r.forward_tag(b"stream")?;
        // Lenient: some writers omit the end-of-line marker.
        r.read_eol().or(Some(()))?;

        let declared = dict
            .get_i64(LENGTH)
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| {
                let mut lookahead = r.clone();

                lookahead.read_bytes(*l).is_some() && {
                    lookahead.skip_white_spaces();
                    lookahead.peek_tag(b"endstream").is_some()
                }
            });

        let data = match declared {
            Some(len) => r.read_bytes(len)?,
            None => {
                if dict.get(LENGTH).is_some_and(|l| l.as_i64().is_some()) {
                    warn!("stream length is wrong, searching for endstream instead");
                }

                let tail = r.tail()?;
                let end = find_endstream(tail)?;
                r.read_bytes(end)?;

                trim_trailing_eol(&tail[..end])
            }
        };

        r.skip_white_spaces();
        r.forward_tag(b"endstream")?;

        Some(Self::new(dict, data.to_vec()))
    }
}

fn find_endstream(data: &[u8]) -> Option<usize> {
    data.windows(b"endstream".len())
        .position(|w| w == b"endstream")
}

fn trim_trailing_eol(data: &[u8]) -> &[u8] {
    let data = data.strip_suffix(b"\n").unwrap_or(data);

    data.strip_suffix(b"\r").unwrap_or(data)
}
