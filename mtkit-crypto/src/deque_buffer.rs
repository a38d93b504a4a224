//! A growable byte buffer with cheap prepends.
//!
//! Outgoing frames are built back to front: the envelope is written first,
//! then the encrypted-frame header (`key_id ‖ msg_key`) is prepended into
//! space reserved up front, so nothing has to be shifted.

use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

/// Growable byte buffer that supports efficient front-extension.
#[derive(Clone, Debug)]
pub struct DequeBuffer {
    buf: Vec<u8>,
    head: usize,
    default_head: usize,
}

impl DequeBuffer {
    /// Create with reserved space for `back` bytes in the back and `front` in the front.
    pub fn with_capacity(back: usize, front: usize) -> Self {
        let mut buf = Vec::with_capacity(front + back);
        buf.resize(front, 0);
        Self { buf, head: front, default_head: front }
    }

    /// Reset the buffer to empty (but keep allocation).
    pub fn clear(&mut self) {
        self.buf.truncate(self.default_head);
        self.buf[..self.default_head].fill(0);
        self.head = self.default_head;
    }

    /// Prepend `slice` to the front.
    pub fn extend_front(&mut self, slice: &[u8]) {
        if self.head >= slice.len() {
            self.head -= slice.len();
        } else {
            let shift = slice.len() - self.head;
            self.buf.splice(0..0, std::iter::repeat_n(0, shift));
            self.head = 0;
        }
        self.buf[self.head..self.head + slice.len()].copy_from_slice(slice);
    }

    /// Number of bytes in the buffer.
    pub fn len(&self) -> usize { self.buf.len() - self.head }

    /// True if empty.
    pub fn is_empty(&self) -> bool { self.head == self.buf.len() }

    /// Take the contents, dropping the unused front reservation.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.head);
        self.buf
    }
}

impl AsRef<[u8]> for DequeBuffer {
    fn as_ref(&self) -> &[u8] { &self.buf[self.head..] }
}
impl AsMut<[u8]> for DequeBuffer {
    fn as_mut(&mut self) -> &mut [u8] { &mut self.buf[self.head..] }
}
impl<I: SliceIndex<[u8]>> Index<I> for DequeBuffer {
    type Output = I::Output;
    fn index(&self, i: I) -> &Self::Output { self.as_ref().index(i) }
}
impl<I: SliceIndex<[u8]>> IndexMut<I> for DequeBuffer {
    fn index_mut(&mut self, i: I) -> &mut Self::Output { self.as_mut().index_mut(i) }
}
impl Extend<u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}
impl<'a> Extend<&'a u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = &'a u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_within_reservation() {
        let mut buf = DequeBuffer::with_capacity(4, 8);
        buf.extend([5u8, 6]);
        buf.extend_front(&[3, 4]);
        buf.extend_front(&[1, 2]);
        assert_eq!(buf.as_ref(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.into_vec(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn prepend_beyond_reservation() {
        let mut buf = DequeBuffer::with_capacity(2, 1);
        buf.extend([9u8]);
        buf.extend_front(&[1, 2, 3]);
        assert_eq!(buf.as_ref(), &[1, 2, 3, 9]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn clear_restores_reservation() {
        let mut buf = DequeBuffer::with_capacity(2, 4);
        buf.extend([1u8, 2]);
        buf.extend_front(&[0xff; 4]);
        buf.clear();
        assert!(buf.is_empty());
        buf.extend_front(&[7]);
        assert_eq!(buf.as_ref(), &[7]);
    }
}
