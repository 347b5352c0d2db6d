/// Bytes per buffer when the element count is not fixed by the `BUF` parameter.
pub const DEFAULT_BUFFER_BYTES: usize = 512;

/// The smallest number of slots a freshly created map has.
pub(crate) const INITIAL_MAP_SIZE: usize = 8;

/// The number of elements per buffer for a deque with buffer parameter `requested` and
/// elements of `element_size` bytes.
///
/// A non-zero `requested` is used as is. Otherwise the buffer holds as many elements as fit in
/// [`DEFAULT_BUFFER_BYTES`], and one element if even one does not fit.
///
/// # Panics
///
/// Panics if `requested` is zero and `element_size` is zero.
///
/// # Example
///
/// ```rust
/// use seg_deque::buffer_size;
///
/// assert_eq!(buffer_size(0, 4), 128);
/// assert_eq!(buffer_size(0, 1000), 1);
/// assert_eq!(buffer_size(16, 4), 16);
/// ```
#[must_use]
#[allow(clippy::integer_division, reason = "we want whole elements only")]
pub const fn buffer_size(requested: usize, element_size: usize) -> usize {
    if requested != 0 {
        return requested;
    }

    assert!(
        element_size != 0,
        "zero-sized elements have no default buffer size"
    );

    if element_size < DEFAULT_BUFFER_BYTES {
        DEFAULT_BUFFER_BYTES / element_size
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffers_hold_512_bytes() {
        assert_eq!(buffer_size(0, 1), 512);
        assert_eq!(buffer_size(0, 8), 64);
        assert_eq!(buffer_size(0, 24), 21);
        assert_eq!(buffer_size(0, 511), 1);
    }

    #[test]
    fn large_elements_get_one_per_buffer() {
        assert_eq!(buffer_size(0, 512), 1);
        assert_eq!(buffer_size(0, 4096), 1);
    }

    #[test]
    fn explicit_size_wins() {
        assert_eq!(buffer_size(4, 1), 4);
        assert_eq!(buffer_size(3, 4096), 3);
        assert_eq!(buffer_size(7, 0), 7);
    }

    #[test]
    #[should_panic]
    fn zero_sized_elements_need_an_explicit_size() {
        _ = buffer_size(0, 0);
    }
}
