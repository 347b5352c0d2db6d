//! Algorithms that fill uninitialized storage with values, all or nothing.
//!
//! Each algorithm either constructs every value or, if producing one of them panics, destroys
//! the values it already constructed before the panic propagates. The storage is then
//! uninitialized again, exactly as it was before the call.

use std::mem;
use std::ptr::{self, NonNull};

use scopeguard::{Always, ScopeGuard};

use crate::{TypeTraits, destroy_n};

/// Clones every value of `src` into the uninitialized storage at `dst` and returns the
/// position one past the last constructed value.
///
/// Types with trivial assignment are copied bitwise in one step.
///
/// # Example
///
/// ```rust
/// use std::mem::MaybeUninit;
/// use std::ptr::NonNull;
///
/// use tiered_alloc::uninitialized_copy;
///
/// let src = [String::from("x"), String::from("y")];
/// let mut storage = [const { MaybeUninit::<String>::uninit() }; 2];
/// let dst = NonNull::new(storage.as_mut_ptr().cast::<String>()).unwrap();
///
/// // SAFETY: The storage holds two uninitialized slots.
/// let end = unsafe { uninitialized_copy(&src, dst) };
///
/// // SAFETY: Both slots were initialized above.
/// let copied = unsafe { storage.map(|slot| slot.assume_init()) };
/// assert_eq!(copied, src);
/// # let _ = end;
/// ```
///
/// # Safety
///
/// `dst` must be valid for writes of `src.len()` values and must not overlap `src`. Any values
/// already stored there are overwritten without being dropped.
pub unsafe fn uninitialized_copy<T: Clone + TypeTraits>(src: &[T], dst: NonNull<T>) -> NonNull<T> {
    if T::HAS_TRIVIAL_ASSIGNMENT {
        debug_assert!(
            !mem::needs_drop::<T>(),
            "a type with trivial assignment must not have drop glue"
        );

        // SAFETY: The caller guarantees `dst` has room for `src.len()` values and does not
        // overlap `src`. Trivial assignment makes a bitwise copy equivalent to a clone.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len()) };

        // SAFETY: One past the end of the destination range.
        return unsafe { dst.add(src.len()) };
    }

    let mut constructed = rollback_guard(dst);

    for value in src {
        // SAFETY: The caller guarantees room for `src.len()` values and we write at most that
        // many, one past each previous one.
        unsafe { dst.add(*constructed).write(value.clone()) };

        // Cannot overflow because it is bounded by the length of a slice.
        *constructed = constructed.wrapping_add(1);
    }

    let count = ScopeGuard::into_inner(constructed);

    // SAFETY: One past the end of the destination range.
    unsafe { dst.add(count) }
}

/// Clones `value` into `n` consecutive uninitialized slots starting at `dst` and returns the
/// position one past the last constructed value.
///
/// Types with trivial assignment are copied bitwise.
///
/// # Safety
///
/// `dst` must be valid for writes of `n` values and must not overlap `value`. Any values
/// already stored there are overwritten without being dropped.
pub unsafe fn uninitialized_fill<T: Clone + TypeTraits>(
    dst: NonNull<T>,
    n: usize,
    value: &T,
) -> NonNull<T> {
    if T::HAS_TRIVIAL_ASSIGNMENT {
        debug_assert!(
            !mem::needs_drop::<T>(),
            "a type with trivial assignment must not have drop glue"
        );

        for index in 0..n {
            // SAFETY: The caller guarantees room for `n` values that do not overlap `value`.
            // Trivial assignment makes a bitwise copy equivalent to a clone.
            unsafe { ptr::copy_nonoverlapping(value, dst.add(index).as_ptr(), 1) };
        }

        // SAFETY: One past the end of the destination range.
        return unsafe { dst.add(n) };
    }

    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { uninitialized_fill_with(dst, n, || value.clone()) }
}

/// Fills `n` consecutive uninitialized slots starting at `dst` with values produced by `f`,
/// in order, and returns the position one past the last constructed value.
///
/// # Safety
///
/// `dst` must be valid for writes of `n` values. Any values already stored there are
/// overwritten without being dropped.
pub unsafe fn uninitialized_fill_with<T: TypeTraits>(
    dst: NonNull<T>,
    n: usize,
    mut f: impl FnMut() -> T,
) -> NonNull<T> {
    let mut constructed = rollback_guard(dst);

    while *constructed < n {
        let value = f();

        // SAFETY: The caller guarantees room for `n` values and the loop stops at `n`.
        unsafe { dst.add(*constructed).write(value) };

        // Cannot overflow because it stops at `n`.
        *constructed = constructed.wrapping_add(1);
    }

    let count = ScopeGuard::into_inner(constructed);

    // SAFETY: One past the end of the destination range.
    unsafe { dst.add(count) }
}

/// Counts constructed values and destroys them if dropped before being defused.
fn rollback_guard<T: TypeTraits>(
    dst: NonNull<T>,
) -> ScopeGuard<usize, impl FnOnce(usize), Always> {
    scopeguard::guard(0_usize, move |constructed| {
        // SAFETY: Exactly the first `constructed` slots were initialized by the caller of
        // this guard, and they are abandoned now.
        unsafe { destroy_n(dst, constructed) };
    })
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::mem::MaybeUninit;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use super::*;

    fn storage<T, const N: usize>() -> [MaybeUninit<T>; N] {
        [const { MaybeUninit::uninit() }; N]
    }

    fn start<T>(slots: &mut [MaybeUninit<T>]) -> NonNull<T> {
        NonNull::new(slots.as_mut_ptr().cast::<T>()).unwrap()
    }

    #[test]
    fn copy_trivial_values() {
        let src = [1_u32, 2, 3, 4];
        let mut slots = storage::<u32, 4>();
        let dst = start(&mut slots);

        let end = unsafe { uninitialized_copy(&src, dst) };

        assert_eq!(end, unsafe { dst.add(4) });
        assert_eq!(unsafe { slots.map(|slot| slot.assume_init()) }, src);
    }

    #[test]
    fn fill_trivial_values() {
        let mut slots = storage::<(u8, char), 6>();
        let dst = start(&mut slots);

        let end = unsafe { uninitialized_fill(dst, 6, &(7, 'z')) };

        assert_eq!(end, unsafe { dst.add(6) });
        assert!(
            unsafe { slots.map(|slot| slot.assume_init()) }
                .iter()
                .all(|&pair| pair == (7, 'z'))
        );
    }

    #[test]
    fn fill_with_produces_in_order() {
        let mut slots = storage::<String, 3>();
        let dst = start(&mut slots);
        let mut next = 0;

        unsafe {
            uninitialized_fill_with(dst, 3, || {
                next += 1;
                next.to_string()
            });
        }

        let values = unsafe { slots.map(|slot| slot.assume_init()) };
        assert_eq!(values, ["1", "2", "3"]);
    }

    #[test]
    fn fill_with_rolls_back_on_panic() {
        let shared = Rc::new(());
        let mut slots = storage::<Rc<()>, 4>();
        let dst = start(&mut slots);
        let mut produced = 0;

        let result = catch_unwind(AssertUnwindSafe(|| unsafe {
            uninitialized_fill_with(dst, 4, || {
                produced += 1;
                assert!(produced < 3, "third value fails");
                Rc::clone(&shared)
            });
        }));

        assert!(result.is_err());

        // The two values constructed before the failure were destroyed again.
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn fill_with_zero_is_noop() {
        let mut slots = storage::<String, 1>();
        let dst = start(&mut slots);

        let end = unsafe { uninitialized_fill_with(dst, 0, || unreachable!()) };
        assert_eq!(end, dst);
    }
}
