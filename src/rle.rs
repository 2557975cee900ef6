//! Run-length encoding for texture contents.
//!
//! Texture initial contents are mostly render targets and atlases, which tend
//! to have long stretches of a single color. This module compresses them
//! before they go into a capture. (If this isn't significantly cheaper than
//! PNG compression, we should just use that and drop this.)
//!
//! There are separate functions for byte data and for 32-bit texels, because
//! run-length encoding benefits greatly from even limited knowledge of the
//! data's structure. A stretch of identical RGBA8 texels, viewed as bytes, is a
//! repeating four-byte pattern with no runs at all; viewed as `u32` values, it
//! compresses perfectly.
//!
//! ## Format
//!
//! The data is written as alternating 'runs' and 'literals':
//!
//! - A 'run' is a count C followed by a value, and represents C repetitions of
//!   the value.
//!
//! - A 'literal' is a count C followed by that many values, and represents the
//!   given sequence of values.
//!
//! The overall stream is either empty, or starts with a run. A run is always
//! followed by a literal or the end of the data. A literal is always followed
//! by a run or the end of the data. Literal counts may be zero, if the encoding
//! really just wants to switch from one run to another run.
//!
//! Counts are unsigned LEB128. `u32` values are written little-endian, so
//! captures are portable between hosts.

use crate::error::SerialError;

use std::convert::TryFrom;

/// The shortest stretch of equal values worth ending a literal for.
const MIN_RUN: usize = 4;

/// Encode `data` as bytes.
pub fn encode_u8(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_general(&mut out, data, |out, values| out.extend_from_slice(values));
    out
}

/// Encode `data`, whose length must be a multiple of four, as little-endian
/// `u32` values.
pub fn encode_u32(data: &[u8]) -> Vec<u8> {
    debug_assert_eq!(data.len() % 4, 0);
    let words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let mut out = Vec::new();
    encode_general(&mut out, &words, |out, values| {
        for value in values {
            out.extend_from_slice(&value.to_le_bytes());
        }
    });
    out
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    // Writes to a `Vec` can't fail.
    let _ = leb128::write::unsigned(out, count as u64);
}

/// Write `data` to `out`, representing contiguous runs of equal elements as a
/// repetition count followed by the repeated value. Use `write_values` to
/// write the values themselves.
fn encode_general<T, W>(out: &mut Vec<u8>, mut data: &[T], mut write_values: W)
where
    T: Copy + PartialEq,
    W: FnMut(&mut Vec<u8>, &[T]),
{
    // If `data` is non-empty, start with a run.
    let mut lead = match data.split_first() {
        None => return,
        Some((head, tail)) => {
            data = tail;
            *head
        }
    };
    let mut run_length = 1;

    loop {
        // invariant: `data` is the portion of the input immediately following
        // `run_length` consecutive copies of `lead`.

        // Extend the run as far as we can.
        let extension_length = data.iter().take_while(|&&v| v == lead).count();

        write_count(out, run_length + extension_length);
        write_values(out, std::slice::from_ref(&lead));
        data = &data[extension_length..];

        // Write a literal. Figuring out the optimal place to end a literal and
        // switch to a run is not straightforward. Don't bother trying to be
        // optimal; just require `MIN_RUN` repetitions to switch to a run.
        let literal_tail = match data.split_first() {
            None => return,
            Some((head, tail)) => {
                lead = *head;
                tail
            }
        };
        run_length = 1;

        let mut literal_length = 1;
        for elt in literal_tail {
            literal_length += 1;
            if *elt == lead {
                run_length += 1;
                if run_length >= MIN_RUN {
                    break;
                }
            } else {
                lead = *elt;
                run_length = 1;
            }
        }

        // If we didn't find a long enough run, this literal goes to the end.
        if run_length < MIN_RUN {
            debug_assert_eq!(literal_length, data.len());
            write_count(out, literal_length);
            write_values(out, data);
            return;
        }

        // Write out this literal, and begin the next run.
        literal_length -= run_length;
        write_count(out, literal_length);
        write_values(out, &data[..literal_length]);
        data = &data[literal_length + run_length..];
    }
}

/// Decode byte data produced by `encode_u8`. Fail if the result would be
/// longer than `limit` bytes.
pub fn decode_u8(buf: &[u8], limit: usize) -> Result<Vec<u8>, SerialError> {
    decode_general(buf, limit, 1, |bytes| bytes[0], |out, value, count| {
        out.resize(out.len() + count, value)
    })
}

/// Decode texel data produced by `encode_u32`, returning it as bytes. Fail if
/// the result would be longer than `limit` bytes.
pub fn decode_u32(buf: &[u8], limit: usize) -> Result<Vec<u8>, SerialError> {
    decode_general(
        buf,
        limit,
        4,
        |bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        |out, value, count| {
            let bytes = value.to_le_bytes();
            for _ in 0..count {
                out.extend_from_slice(&bytes);
            }
        },
    )
}

fn read_count(buf: &mut &[u8]) -> Result<usize, SerialError> {
    let count = leb128::read::unsigned(buf).map_err(|err| match err {
        leb128::read::Error::Overflow => SerialError::Leb128Overflow,
        leb128::read::Error::IoError(_) => SerialError::UnexpectedEof,
    })?;
    usize::try_from(count).map_err(|_| SerialError::OutOfRange("rle count"))
}

/// Expand run-length encoded data from `buf`. Each value occupies `size`
/// bytes, and is parsed by `parse`; `push_run` appends `count` copies of a
/// value to the output.
fn decode_general<T, P, R>(
    mut buf: &[u8],
    limit: usize,
    size: usize,
    parse: P,
    mut push_run: R,
) -> Result<Vec<u8>, SerialError>
where
    T: Copy,
    P: Fn(&[u8]) -> T,
    R: FnMut(&mut Vec<u8>, T, usize),
{
    let mut expanded = Vec::new();
    let check = |expanded: &Vec<u8>, count: usize| -> Result<(), SerialError> {
        match count.checked_mul(size).and_then(|n| n.checked_add(expanded.len())) {
            Some(total) if total <= limit => Ok(()),
            _ => Err(SerialError::OutOfRange("rle expansion")),
        }
    };

    loop {
        if buf.is_empty() {
            break;
        }

        // Expand a run.
        let count = read_count(&mut buf)?;
        check(&expanded, count)?;
        if buf.len() < size {
            return Err(SerialError::UnexpectedEof);
        }
        let value = parse(&buf[..size]);
        buf = &buf[size..];
        push_run(&mut expanded, value, count);

        if buf.is_empty() {
            break;
        }

        // Copy a literal.
        let count = read_count(&mut buf)?;
        check(&expanded, count)?;
        let bytes = count * size;
        if buf.len() < bytes {
            return Err(SerialError::UnexpectedEof);
        }
        expanded.extend_from_slice(&buf[..bytes]);
        buf = &buf[bytes..];
    }

    Ok(expanded)
}

#[test]
fn test_encode_u8() {
    fn check(data: &[u8], rle: &[u8]) {
        assert_eq!(encode_u8(data), rle);
    }

    check(&[], &[]);
    check(&[1], &[1, 1]);
    check(&[1, 1], &[2, 1]);
    check(&[1, 1, 1, 2, 2, 2, 2], &[3, 1, 0, 4, 2]);
    check(&[1, 2, 3, 4, 5, 6], &[1, 1, 5, 2, 3, 4, 5, 6]);
    check(&[1, 2, 3, 3, 3], &[1, 1, 4, 2, 3, 3, 3]);
    check(&[1, 2, 3, 3, 3, 3], &[1, 1, 1, 2, 4, 3]);
    check(&[1, 2, 3, 3, 3, 3, 3], &[1, 1, 1, 2, 5, 3]);

    check(&[1, 2, 3, 3, 3, 3, 3, 4, 5], &[1, 1, 1, 2, 5, 3, 2, 4, 5]);
    check(
        &[1, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5],
        &[1, 1, 1, 2, 4, 3, 0, 4, 4, 0, 4, 5],
    );
}

#[test]
fn test_encode_u32() {
    fn texels(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes().to_vec()).collect()
    }

    // A solid RGBA8 color has no byte runs, but is a single texel run.
    let solid = texels(&[0x11223344; 100]);
    assert_eq!(encode_u32(&solid), vec![100, 0x44, 0x33, 0x22, 0x11]);

    let mixed = texels(&[7, 8, 9, 9, 9, 9]);
    assert_eq!(
        encode_u32(&mixed),
        vec![1, 7, 0, 0, 0, 1, 8, 0, 0, 0, 4, 9, 0, 0, 0]
    );
}

#[test]
fn test_decode_u8() {
    fn check(rle: &[u8], expected: &[u8]) {
        assert_eq!(decode_u8(rle, expected.len()).unwrap(), expected);
    }

    check(&[], &[]);
    check(&[1, 1], &[1]);
    check(&[2, 1], &[1, 1]);
    check(&[3, 1, 0, 4, 2], &[1, 1, 1, 2, 2, 2, 2]);
    check(&[1, 1, 5, 2, 3, 4, 5, 6], &[1, 2, 3, 4, 5, 6]);
    check(&[1, 1, 4, 2, 3, 3, 3], &[1, 2, 3, 3, 3]);
    check(&[1, 1, 1, 2, 4, 3], &[1, 2, 3, 3, 3, 3]);
    check(&[1, 1, 1, 2, 5, 3], &[1, 2, 3, 3, 3, 3, 3]);

    check(&[1, 1, 1, 2, 5, 3, 2, 4, 5], &[1, 2, 3, 3, 3, 3, 3, 4, 5]);
    check(
        &[1, 1, 1, 2, 4, 3, 0, 4, 4, 0, 4, 5],
        &[1, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5],
    );
}

#[test]
fn test_decode_u32() {
    let texels: Vec<u8> = [5_u32, 5, 5, 5, 5, 6, 7]
        .iter()
        .flat_map(|v| v.to_le_bytes().to_vec())
        .collect();
    let rle = encode_u32(&texels);
    assert_eq!(decode_u32(&rle, texels.len()).unwrap(), texels);
}

#[test]
fn test_decode_limits() {
    // A run claiming a billion copies must not be expanded.
    let mut rle = vec![];
    write_count(&mut rle, 1_000_000_000);
    rle.push(0xcc);
    assert!(matches!(
        decode_u8(&rle, 4096),
        Err(SerialError::OutOfRange(_))
    ));

    // A literal that runs off the end of the data.
    assert!(matches!(
        decode_u8(&[1, 1, 5, 2, 3], 100),
        Err(SerialError::UnexpectedEof)
    ));
    assert!(matches!(
        decode_u32(&[1, 1, 0], 100),
        Err(SerialError::UnexpectedEof)
    ));
}
