//! Content-defined and exponential chunkers
//!
//! A chunker decides, from the bytes it has seen since its last boundary,
//! where to cut a stream. The tree builder feeds each level's encoded
//! records through one chunker; every emitted chunk becomes one node.

use bytes::{Bytes, BytesMut};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};

/// Bytes that influence the rolling hash.
///
/// The hash shifts left once per byte, so after 64 bytes a byte's table value
/// has left the `u64` entirely. Minimum sizes below this would let a boundary
/// fire before the hash has seen a full window.
pub const WINDOW_SIZE: usize = 64;

/// Splits a byte stream into chunks, reporting each through `on_chunk`.
pub trait Chunker: Send {
    /// Feed `data`, emitting a chunk at every boundary crossed
    fn write(&mut self, data: &[u8], on_chunk: &mut dyn FnMut(Bytes));

    /// Feed a record that must stay whole.
    ///
    /// If the record would push the buffer past `max_size`, the buffered
    /// bytes are emitted first. A boundary condition met anywhere inside the
    /// record cuts after its last byte.
    fn write_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes));

    /// Feed a record that may not end a chunk by itself.
    ///
    /// Boundary conditions met inside it are ignored; the following record
    /// decides the next cut. Index levels open every node this way so that
    /// no index node holds a single child.
    fn hold_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes));

    /// Emit whatever is buffered as a final chunk
    fn flush(&mut self, on_chunk: &mut dyn FnMut(Bytes));

    /// Drop buffered bytes and all boundary state
    fn reset(&mut self);

    /// Bytes buffered since the last boundary
    fn buffered(&self) -> usize;

    /// Largest chunk this chunker emits
    fn max_size(&self) -> usize;
}

/// Keyed content-defined chunker.
///
/// Per byte `b`: `rh = (rh << 1) + table[b]`; a boundary falls where the
/// low `log2(mean)` bits of `rh` are zero once `min_size` bytes are
/// buffered, or unconditionally at `max_size`.
pub struct ContentDefined {
    table: Box<[u64; 256]>,
    mask: u64,
    min_size: usize,
    max_size: usize,
    rh: u64,
    buf: BytesMut,
}

impl ContentDefined {
    /// Create a chunker.
    ///
    /// # Panics
    ///
    /// If `mean_size` is not a power of two, `min_size < WINDOW_SIZE`, or
    /// `min_size > max_size`.
    pub fn new(min_size: usize, mean_size: usize, max_size: usize, key: &[u8; 32]) -> Self {
        assert!(
            mean_size.is_power_of_two(),
            "mean size {mean_size} is not a power of two"
        );
        assert!(
            min_size >= WINDOW_SIZE,
            "min size {min_size} is below the window size {WINDOW_SIZE}"
        );
        assert!(
            min_size <= max_size,
            "min size {min_size} exceeds max size {max_size}"
        );
        Self {
            table: hash_table(key),
            mask: (mean_size as u64) - 1,
            min_size,
            max_size,
            rh: 0,
            buf: BytesMut::with_capacity(max_size),
        }
    }

    #[inline]
    fn roll(&mut self, b: u8) {
        self.rh = (self.rh << 1).wrapping_add(self.table[b as usize]);
    }

    #[inline]
    fn at_boundary(&self, len: usize) -> bool {
        len >= self.max_size || (len >= self.min_size && self.rh & self.mask == 0)
    }

    fn emit(&mut self, on_chunk: &mut dyn FnMut(Bytes)) {
        self.rh = 0;
        on_chunk(self.buf.split().freeze());
    }
}

impl Chunker for ContentDefined {
    fn write(&mut self, data: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        let mut start = 0;
        for (i, &b) in data.iter().enumerate() {
            self.roll(b);
            let len = self.buf.len() + (i + 1 - start);
            if self.at_boundary(len) {
                self.buf.extend_from_slice(&data[start..=i]);
                start = i + 1;
                self.emit(on_chunk);
            }
        }
        self.buf.extend_from_slice(&data[start..]);
    }

    fn write_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_size {
            self.emit(on_chunk);
        }
        let base = self.buf.len();
        let mut cut = false;
        for (i, &b) in record.iter().enumerate() {
            self.roll(b);
            cut |= self.at_boundary(base + i + 1);
        }
        self.buf.extend_from_slice(record);
        if cut {
            self.emit(on_chunk);
        }
    }

    fn hold_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_size {
            self.emit(on_chunk);
        }
        for &b in record {
            self.roll(b);
        }
        self.buf.extend_from_slice(record);
    }

    fn flush(&mut self, on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() {
            self.emit(on_chunk);
        }
    }

    fn reset(&mut self) {
        self.rh = 0;
        self.buf.clear();
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Derive the per-byte table from the key with ChaCha20 (zero nonce), one
/// big-endian `u64` from 8 bytes of keystream per slot.
fn hash_table(key: &[u8; 32]) -> Box<[u64; 256]> {
    let mut cipher = ChaCha20::new(Key::from_slice(key), Nonce::from_slice(&[0u8; 12]));
    let mut table = Box::new([0u64; 256]);
    for slot in table.iter_mut() {
        let mut block = [0u8; 8];
        cipher.apply_keystream(&mut block);
        *slot = u64::from_be_bytes(block);
    }
    table
}

/// Chunker whose target size doubles every `period` chunks.
///
/// Suited to append-only streams where later data should batch more
/// aggressively than earlier data.
pub struct Exponential {
    min_size: usize,
    max_size: usize,
    period: usize,
    emitted: usize,
    buf: BytesMut,
}

impl Exponential {
    /// Create a chunker.
    ///
    /// # Panics
    ///
    /// If `min_size` is zero, `min_size > max_size`, or `period` is zero.
    pub fn new(min_size: usize, max_size: usize, period: usize) -> Self {
        assert!(min_size > 0, "min size must be non-zero");
        assert!(
            min_size <= max_size,
            "min size {min_size} exceeds max size {max_size}"
        );
        assert!(period > 0, "period must be non-zero");
        Self {
            min_size,
            max_size,
            period,
            emitted: 0,
            buf: BytesMut::new(),
        }
    }

    /// Size the next chunk is cut at
    pub fn target(&self) -> usize {
        let mut target = self.min_size;
        for _ in 0..self.emitted / self.period {
            if target >= self.max_size {
                break;
            }
            target = target.saturating_mul(2);
        }
        target.min(self.max_size)
    }

    fn emit(&mut self, on_chunk: &mut dyn FnMut(Bytes)) {
        self.emitted += 1;
        on_chunk(self.buf.split().freeze());
    }
}

impl Chunker for Exponential {
    fn write(&mut self, mut data: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        while !data.is_empty() {
            let take = self.target().saturating_sub(self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() >= self.target() {
                self.emit(on_chunk);
            }
        }
    }

    fn write_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_size {
            self.emit(on_chunk);
        }
        self.buf.extend_from_slice(record);
        if self.buf.len() >= self.target() {
            self.emit(on_chunk);
        }
    }

    fn hold_record(&mut self, record: &[u8], on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_size {
            self.emit(on_chunk);
        }
        self.buf.extend_from_slice(record);
    }

    fn flush(&mut self, on_chunk: &mut dyn FnMut(Bytes)) {
        if !self.buf.is_empty() {
            self.emit(on_chunk);
        }
    }

    fn reset(&mut self) {
        self.emitted = 0;
        self.buf.clear();
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}
