use std::ptr::{self, NonNull};

use crate::TypeTraits;

/// Moves `value` into uninitialized storage.
///
/// # Safety
///
/// `ptr` must be valid for writes and properly aligned. Any value already stored there is
/// overwritten without being dropped.
#[inline]
pub unsafe fn construct<T>(ptr: NonNull<T>, value: T) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { ptr.write(value) }
}

/// Constructs a value in uninitialized storage from the result of `f`.
///
/// If `f` panics, the storage is left uninitialized.
///
/// # Safety
///
/// `ptr` must be valid for writes and properly aligned. Any value already stored there is
/// overwritten without being dropped.
#[inline]
pub unsafe fn construct_with<T>(ptr: NonNull<T>, f: impl FnOnce() -> T) {
    let value = f();

    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { ptr.write(value) }
}

/// Constructs `T::default()` in uninitialized storage.
///
/// # Safety
///
/// `ptr` must be valid for writes and properly aligned. Any value already stored there is
/// overwritten without being dropped.
#[inline]
pub unsafe fn construct_default<T: Default>(ptr: NonNull<T>) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { construct_with(ptr, T::default) }
}

/// Destroys the value at `ptr`, leaving the storage uninitialized.
///
/// # Safety
///
/// `ptr` must point to an initialized value that is not used again afterwards.
#[inline]
pub unsafe fn destroy<T>(ptr: NonNull<T>) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { ptr::drop_in_place(ptr.as_ptr()) }
}

/// Destroys every value in `[first, last)`, leaving the storage uninitialized.
///
/// If `T` declares a trivial destructor through [`TypeTraits`], this does nothing at all,
/// regardless of the range length. Otherwise each value is dropped in order; if one of the
/// destructors panics, the remaining values are still dropped before the panic propagates.
///
/// # Example
///
/// ```rust
/// use std::ptr::NonNull;
///
/// use tiered_alloc::destroy_range;
///
/// let mut values = std::mem::ManuallyDrop::new([String::from("a"), String::from("b")]);
/// let first = NonNull::new(values.as_mut_ptr()).unwrap();
///
/// // SAFETY: Both values are initialized and never touched again.
/// unsafe { destroy_range(first, first.add(2)) };
/// ```
///
/// # Panics
///
/// Panics if `T` is zero-sized and its destructor is not trivial. A pointer range cannot
/// express how many zero-sized values it holds; use [`destroy_n()`] for those.
///
/// # Safety
///
/// `first` and `last` must bound a range of initialized values within one allocation, with
/// `first <= last`. The values must not be used again afterwards.
pub unsafe fn destroy_range<T: TypeTraits>(first: NonNull<T>, last: NonNull<T>) {
    if T::HAS_TRIVIAL_DESTRUCTOR {
        return;
    }

    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { destroy_n(first, range_len(first, last)) }
}

/// Destroys `len` values starting at `first`, with the same trivial-destructor shortcut as
/// [`destroy_range()`].
///
/// # Safety
///
/// `first` must point to `len` initialized values within one allocation. The values must not
/// be used again afterwards.
pub unsafe fn destroy_n<T: TypeTraits>(first: NonNull<T>, len: usize) {
    if T::HAS_TRIVIAL_DESTRUCTOR || len == 0 {
        return;
    }

    // SAFETY: Forwarding safety requirements to the caller. Dropping a slice keeps dropping the
    // remaining elements if one of them panics.
    unsafe { ptr::drop_in_place(NonNull::slice_from_raw_parts(first, len).as_ptr()) }
}

/// # Safety
///
/// Both pointers must be within (or one past) the same allocation, `first <= last`.
#[inline]
pub(crate) unsafe fn range_len<T>(first: NonNull<T>, last: NonNull<T>) -> usize {
    assert!(
        size_of::<T>() != 0,
        "pointer ranges of zero-sized values have no length; pass the count instead"
    );

    // SAFETY: Forwarding safety requirements to the caller.
    let len = unsafe { last.offset_from(first) };

    usize::try_from(len).expect("range end must not precede range start")
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::mem::MaybeUninit;
    use std::rc::Rc;

    use super::*;

    thread_local! {
        static DROPS: Cell<usize> = const { Cell::new(0) };
    }

    #[allow(dead_code, reason = "the field only gives the type a size")]
    struct Counted(u8);

    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.set(DROPS.get() + 1);
        }
    }

    // SAFETY: Conservative defaults.
    unsafe impl TypeTraits for Counted {}

    struct CountedButSkippable;

    impl Drop for CountedButSkippable {
        fn drop(&mut self) {
            DROPS.set(DROPS.get() + 1);
        }
    }

    // SAFETY: Skipping the destructor only skips the counter update.
    unsafe impl TypeTraits for CountedButSkippable {
        const HAS_TRIVIAL_DESTRUCTOR: bool = true;
    }

    #[test]
    fn construct_and_destroy_single() {
        let mut slot = MaybeUninit::<Rc<u32>>::uninit();
        let ptr = NonNull::new(slot.as_mut_ptr()).unwrap();
        let shared = Rc::new(5);

        unsafe {
            construct(ptr, Rc::clone(&shared));
            assert_eq!(Rc::strong_count(&shared), 2);

            destroy(ptr);
            assert_eq!(Rc::strong_count(&shared), 1);

            construct_with(ptr, || Rc::clone(&shared));
            assert_eq!(**ptr.as_ref(), 5);
            destroy(ptr);

            let mut number = MaybeUninit::<u64>::uninit();
            let number_ptr = NonNull::new(number.as_mut_ptr()).unwrap();
            construct_default(number_ptr);
            assert_eq!(number.assume_init(), 0);
        }

        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn destroy_range_drops_each_value() {
        DROPS.set(0);

        let mut values = [const { MaybeUninit::<Counted>::uninit() }; 5];
        let first = NonNull::new(values.as_mut_ptr().cast::<Counted>()).unwrap();

        unsafe {
            for i in 0..5 {
                construct(first.add(i), Counted(0));
            }

            destroy_range(first, first.add(5));
        }

        assert_eq!(DROPS.get(), 5);
    }

    #[test]
    fn destroy_range_skips_trivial_destructors() {
        DROPS.set(0);

        let mut values = [const { MaybeUninit::<CountedButSkippable>::uninit() }; 5];
        let first = NonNull::new(values.as_mut_ptr().cast::<CountedButSkippable>()).unwrap();

        unsafe {
            for i in 0..5 {
                construct(first.add(i), CountedButSkippable);
            }

            destroy_range(first, first.add(5));
            destroy_n(first, 5);
        }

        assert_eq!(DROPS.get(), 0);
    }

    #[test]
    fn empty_range_is_noop() {
        DROPS.set(0);

        let mut value = MaybeUninit::<Counted>::uninit();
        let first = NonNull::new(value.as_mut_ptr()).unwrap();

        unsafe { destroy_range(first, first) };

        assert_eq!(DROPS.get(), 0);
    }

    struct Unit;

    impl Drop for Unit {
        fn drop(&mut self) {
            DROPS.set(DROPS.get() + 1);
        }
    }

    // SAFETY: Conservative defaults.
    unsafe impl TypeTraits for Unit {}

    #[test]
    #[should_panic(expected = "pointer ranges of zero-sized values have no length")]
    fn destroy_range_rejects_zero_sized_values() {
        let mut value = MaybeUninit::<Unit>::uninit();
        let first = NonNull::new(value.as_mut_ptr()).unwrap();

        unsafe { destroy_range(first, first) };
    }

    #[test]
    fn destroy_n_handles_zero_sized_values() {
        DROPS.set(0);

        let first = NonNull::<Unit>::dangling();

        unsafe { destroy_n(first, 3) };

        assert_eq!(DROPS.get(), 3);
    }
}
