//! Bounded zlib inflation.
//!
//! All compressed payloads in the store (pack entries, delta streams, and
//! loose object files) are RFC 1950 zlib streams. The helpers here inflate
//! them with explicit output bounds so corrupt input can never trigger
//! unbounded allocation.
//!
//! Decompressor state and a 64 KiB output buffer are kept per thread:
//! resetting a `Decompress` is much cheaper than constructing one, and the
//! scratch is never observable to callers.

use std::cell::RefCell;
use std::fmt;

use flate2::{Decompress, FlushDecompress, Status};

/// Internal inflate buffer size.
const INFLATE_BUF_SIZE: usize = 64 * 1024;

thread_local! {
    static INFLATE_DECOMPRESS: RefCell<Decompress> = RefCell::new(Decompress::new(true));
    static INFLATE_BUF: RefCell<[u8; INFLATE_BUF_SIZE]> =
        const { RefCell::new([0u8; INFLATE_BUF_SIZE]) };
}

/// Runs an inflate operation using per-thread scratch buffers.
///
/// The scratch state is not re-entrant on the same thread; inflate helpers
/// must not call each other while a decompression is in flight.
fn with_inflate_scratch<F, R>(f: F) -> R
where
    F: FnOnce(&mut Decompress, &mut [u8]) -> R,
{
    INFLATE_DECOMPRESS.with(|de| {
        INFLATE_BUF.with(|buf| {
            let mut de = de.borrow_mut();
            de.reset(true);
            let mut buf = buf.borrow_mut();
            f(&mut de, &mut *buf)
        })
    })
}

/// Inflate error taxonomy.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum InflateError {
    /// Output exceeded the configured bound.
    LimitExceeded,
    /// The stream ended before producing the expected bytes.
    TruncatedInput,
    /// The decompressor made no progress on non-empty input.
    Stalled,
    /// The zlib backend reported corrupt data.
    Backend,
}

impl fmt::Display for InflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitExceeded => write!(f, "inflate limit exceeded"),
            Self::TruncatedInput => write!(f, "truncated input"),
            Self::Stalled => write!(f, "inflate stalled"),
            Self::Backend => write!(f, "inflate backend error"),
        }
    }
}

impl std::error::Error for InflateError {}

/// Inflates a zlib stream with a hard output cap.
///
/// Returns the number of input bytes consumed from `input`. The output
/// buffer is cleared before writing. On error, `out` may contain a partial
/// prefix; callers should discard it.
///
/// The stream is allowed to end before `max_out` bytes; use
/// [`inflate_exact`] when the output size is known.
pub fn inflate_limited(
    input: &[u8],
    out: &mut Vec<u8>,
    max_out: usize,
) -> Result<usize, InflateError> {
    out.clear();
    inflate_loop(input, |chunk, total| {
        if total > max_out {
            return Err(InflateError::LimitExceeded);
        }
        out.extend_from_slice(chunk);
        Ok(true)
    })
}

/// Inflates a zlib stream expecting exactly `expected` output bytes.
///
/// Returns the number of input bytes consumed from `input`. A stream that
/// ends exactly at the boundary is success; anything shorter is
/// `TruncatedInput`, anything longer is `LimitExceeded`.
pub fn inflate_exact(
    input: &[u8],
    out: &mut Vec<u8>,
    expected: usize,
) -> Result<usize, InflateError> {
    let consumed = inflate_limited(input, out, expected)?;
    if out.len() != expected {
        return Err(InflateError::TruncatedInput);
    }
    Ok(consumed)
}

/// Inflates only the leading `want` bytes of a zlib stream.
///
/// Stops as soon as `out` holds at least `want` bytes or the stream ends,
/// whichever comes first; a stream shorter than `want` is not an error.
/// Used to peek at loose object headers without inflating the payload.
pub fn inflate_prefix(
    input: &[u8],
    out: &mut Vec<u8>,
    want: usize,
) -> Result<usize, InflateError> {
    out.clear();
    inflate_loop(input, |chunk, total| {
        out.extend_from_slice(chunk);
        Ok(total < want)
    })
}

/// Shared decompression loop.
///
/// `sink` receives each output chunk along with the running total and
/// returns `Ok(false)` to stop early. Returns input bytes consumed.
fn inflate_loop(
    input: &[u8],
    mut sink: impl FnMut(&[u8], usize) -> Result<bool, InflateError>,
) -> Result<usize, InflateError> {
    with_inflate_scratch(|de, buf| {
        let mut in_pos: usize = 0;
        let mut out_total: usize = 0;

        loop {
            let before_in = de.total_in() as usize;
            let before_out = de.total_out() as usize;

            let status = de
                .decompress(&input[in_pos..], buf, FlushDecompress::None)
                .map_err(|_| InflateError::Backend)?;

            let consumed = de.total_in() as usize - before_in;
            let produced = de.total_out() as usize - before_out;
            in_pos += consumed;

            if produced != 0 {
                out_total += produced;
                if !sink(&buf[..produced], out_total)? {
                    return Ok(in_pos);
                }
            }

            match status {
                Status::StreamEnd => return Ok(in_pos),
                Status::Ok => {
                    if consumed == 0 && produced == 0 {
                        if in_pos >= input.len() {
                            return Err(InflateError::TruncatedInput);
                        }
                        return Err(InflateError::Stalled);
                    }
                }
                Status::BufError => {
                    if in_pos >= input.len() {
                        return Err(InflateError::TruncatedInput);
                    }
                }
            }
        }
    })
}
