//! LSB-first bit accumulator for DEFLATE streams.

/// Cursor over the bytes handed to one [`Inflater::inflate`](super::Inflater::inflate) call.
#[derive(Debug)]
pub(crate) struct Input<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Input<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    #[inline]
    pub(crate) fn next_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    #[inline]
    pub(crate) fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.data.len());
    }
}

/// Bits pulled from the input but not yet consumed.
///
/// Survives between calls, which is what lets a decode step that ran out of
/// input restart cleanly once more bytes arrive.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BitBuffer {
    bits: u64,
    count: u32,
}

impl BitBuffer {
    #[inline]
    pub(crate) const fn new() -> Self {
        Self { bits: 0, count: 0 }
    }

    /// Bits currently buffered.
    #[inline]
    pub(crate) fn available(&self) -> u32 {
        self.count
    }

    /// Pull bytes until at least `n` bits are buffered. Returns `false` when
    /// the input runs dry first.
    #[inline]
    pub(crate) fn fill(&mut self, input: &mut Input<'_>, n: u32) -> bool {
        debug_assert!(n <= 32);
        while self.count < n {
            match input.next_byte() {
                Some(byte) => {
                    self.bits |= (byte as u64) << self.count;
                    self.count += 8;
                }
                None => return false,
            }
        }
        true
    }

    /// Bit at `offset` from the front of the buffer, without consuming.
    #[inline]
    pub(crate) fn peek_bit(&self, offset: u32) -> u32 {
        ((self.bits >> offset) & 1) as u32
    }

    /// Drop `n` bits from the front.
    #[inline]
    pub(crate) fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.count);
        self.bits >>= n;
        self.count -= n;
    }

    /// Take `n` buffered bits as an integer, first bit in the lowest position.
    #[inline]
    pub(crate) fn take(&mut self, n: u32) -> u32 {
        let value = (self.bits & ((1u64 << n) - 1)) as u32;
        self.consume(n);
        value
    }

    /// Pull `n` bits if available; `None` leaves the buffer untouched apart
    /// from bytes already pulled.
    #[inline]
    pub(crate) fn read(&mut self, input: &mut Input<'_>, n: u32) -> Option<u32> {
        if self.fill(input, n) {
            Some(self.take(n))
        } else {
            None
        }
    }

    /// Discard bits up to the next byte boundary.
    #[inline]
    pub(crate) fn align_to_byte(&mut self) {
        let partial = self.count % 8;
        self.consume(partial);
    }

    /// Put a byte back in front of the stream.
    ///
    /// Only valid on an empty buffer.
    #[inline]
    pub(crate) fn push_front_byte(&mut self, byte: u8) {
        debug_assert_eq!(self.count, 0);
        self.bits = byte as u64;
        self.count = 8;
    }
}
