//! Decoding and encoding of stream data.
//!
//! Only the filters needed for the document structure itself are supported:
//! `FlateDecode` with optional PNG predictors, which is what cross-reference
//! streams and object streams use in practice.

use crate::object::dict::keys::{
    BITS_PER_COMPONENT, COLORS, COLUMNS, DECODE_PARMS, FILTER, FL, FLATE_DECODE, PREDICTOR,
};
use crate::object::{Dict, Object};
use crate::reader::Reader;
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use log::warn;
use std::io::{Read, Write};

/// Decode the data of a stream with the given dictionary.
pub fn decode(dict: &Dict, data: &[u8]) -> Option<Vec<u8>> {
    let filters: Vec<&[u8]> = match dict.get(FILTER) {
        None => vec![],
        Some(Object::Name(n)) => vec![n],
        Some(Object::Array(a)) => a.iter().map(|f| f.as_name().map(|n| &**n)).collect::<Option<_>>()?,
        Some(_) => return None,
    };

    let params: Vec<Option<&Dict>> = match dict.get(DECODE_PARMS) {
        Some(Object::Array(a)) => a.iter().map(|p| p.as_dict()).collect(),
        Some(Object::Dict(d)) => vec![Some(d)],
        _ => vec![],
    };

    let mut current = data.to_vec();

    for (i, filter) in filters.iter().enumerate() {
        current = match *filter {
            FLATE_DECODE | FL => flate_decode(&current, params.get(i).copied().flatten())?,
            other => {
                warn!(
                    "unsupported filter {}",
                    std::str::from_utf8(other).unwrap_or("{non-ascii}")
                );

                return None;
            }
        };
    }

    Some(current)
}

/// Compress data with zlib, as expected by `FlateDecode`.
pub fn deflate_encode(data: &[u8]) -> std::io::Result<Vec<u8>> {
    const COMPRESSION_LEVEL: u32 = 6;

    let mut e = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    e.write_all(data)?;
    e.finish()
}

fn flate_decode(data: &[u8], params: Option<&Dict>) -> Option<Vec<u8>> {
    let decoded = zlib(data).or_else(|| deflate(data))?;
    let params = params.map(PredictorParams::from_params).unwrap_or_default();

    apply_predictor(decoded, &params)
}

fn zlib(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = vec![];
    ZlibDecoder::new(data).read_to_end(&mut out).ok()?;

    Some(out)
}

fn deflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = vec![];
    DeflateDecoder::new(data).read_to_end(&mut out).ok()?;

    Some(out)
}

struct PredictorParams {
    predictor: u8,
    colors: u8,
    bits_per_component: u8,
    columns: usize,
}

impl PredictorParams {
    fn from_params(dict: &Dict) -> Self {
        let get = |key: &[u8], default: i64| dict.get_i64(key).unwrap_or(default);

        Self {
            predictor: u8::try_from(get(PREDICTOR, 1)).unwrap_or(1),
            colors: u8::try_from(get(COLORS, 1)).unwrap_or(1),
            bits_per_component: u8::try_from(get(BITS_PER_COMPONENT, 8)).unwrap_or(8),
            columns: usize::try_from(get(COLUMNS, 1)).unwrap_or(1),
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (usize::from(self.bits_per_component) * usize::from(self.colors)).div_ceil(8)
    }

    fn row_length_in_bytes(&self) -> usize {
        (self.columns * usize::from(self.bits_per_component) * usize::from(self.colors))
            .div_ceil(8)
    }
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Option<Vec<u8>> {
    match params.predictor {
        1 => Some(data),
        10..=15 => {
            let row_len = params.row_length_in_bytes();
            let bpp = params.bytes_per_pixel().max(1);

            if row_len == 0 {
                return None;
            }

            let num_rows = data.len() / (row_len + 1);
            let mut out = vec![0; num_rows * row_len];
            let mut r = Reader::new(&data);

            for i in 0..num_rows {
                let kind = r.read_byte()?;
                let in_row = r.read_bytes(row_len)?;
                let (prev, cur) = out.split_at_mut(i * row_len);
                let prev = (i > 0).then(|| &prev[(i - 1) * row_len..]);
                let cur = &mut cur[..row_len];

                for x in 0..row_len {
                    let left = if x >= bpp { cur[x - bpp] } else { 0 };
                    let up = prev.map(|p| p[x]).unwrap_or(0);
                    let up_left = match prev {
                        Some(p) if x >= bpp => p[x - bpp],
                        _ => 0,
                    };

                    cur[x] = match kind {
                        0 => in_row[x],
                        1 => in_row[x].wrapping_add(left),
                        2 => in_row[x].wrapping_add(up),
                        3 => in_row[x].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                        4 => in_row[x].wrapping_add(paeth(left, up, up_left)),
                        _ => return None,
                    };
                }
            }

            Some(out)
        }
        other => {
            warn!("unsupported predictor {other}");

            None
        }
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
