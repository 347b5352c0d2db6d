use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

/// Compile-time classification of an element type by how cheaply its values can be copied and
/// torn down.
///
/// Containers and the uninitialized-memory algorithms consult these constants once per type to
/// pick between a bulk path (bitwise copy, skipped destruction) and an element-wise path. The
/// choice is fixed by the type, never re-evaluated per element.
///
/// Both answers default to `false`, which is always correct. Scalars, raw pointers, shared
/// references and unit types opt in to `true`; arrays, tuples and [`Option`] inherit the answers
/// of their components.
///
/// # Example
///
/// ```rust
/// use tiered_alloc::{TypeTraits, has_trivial_destructor};
///
/// struct Connection {
///     _id: u32,
/// }
///
/// // SAFETY: The defaults are the conservative answers, which are valid for every type.
/// unsafe impl TypeTraits for Connection {}
///
/// assert!(has_trivial_destructor::<u64>());
/// assert!(!has_trivial_destructor::<Connection>());
/// ```
///
/// # Safety
///
/// Setting [`HAS_TRIVIAL_ASSIGNMENT`][Self::HAS_TRIVIAL_ASSIGNMENT] to `true` asserts that a
/// bitwise copy of a value is an independent, valid value equivalent to its clone. Claiming this
/// for a type that owns resources leads to double frees.
///
/// Setting [`HAS_TRIVIAL_DESTRUCTOR`][Self::HAS_TRIVIAL_DESTRUCTOR] to `true` asserts that
/// skipping the destructor is acceptable. For a type with drop glue this leaks whatever the
/// destructor would have released; it is never memory-unsafe.
pub unsafe trait TypeTraits {
    /// Whether a bitwise copy of a value is a correct substitute for cloning it.
    const HAS_TRIVIAL_ASSIGNMENT: bool = false;

    /// Whether destroying a value may be skipped entirely.
    const HAS_TRIVIAL_DESTRUCTOR: bool = false;
}

/// Whether values of `T` may be duplicated by a bitwise copy instead of being cloned.
#[must_use]
#[inline]
pub const fn has_trivial_assignment<T: TypeTraits + ?Sized>() -> bool {
    T::HAS_TRIVIAL_ASSIGNMENT
}

/// Whether destroying values of `T` may be skipped.
#[must_use]
#[inline]
pub const fn has_trivial_destructor<T: TypeTraits + ?Sized>() -> bool {
    T::HAS_TRIVIAL_DESTRUCTOR
}

macro_rules! trivial_type_traits {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: Plain values with no ownership and no drop glue.
            unsafe impl TypeTraits for $t {
                const HAS_TRIVIAL_ASSIGNMENT: bool = true;
                const HAS_TRIVIAL_DESTRUCTOR: bool = true;
            }
        )*
    };
}

trivial_type_traits!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    NonZero<u8>,
    NonZero<u16>,
    NonZero<u32>,
    NonZero<u64>,
    NonZero<u128>,
    NonZero<usize>,
    NonZero<i8>,
    NonZero<i16>,
    NonZero<i32>,
    NonZero<i64>,
    NonZero<i128>,
    NonZero<isize>,
);

// SAFETY: Raw pointers are plain addresses; copying one does not duplicate ownership.
unsafe impl<T: ?Sized> TypeTraits for *const T {
    const HAS_TRIVIAL_ASSIGNMENT: bool = true;
    const HAS_TRIVIAL_DESTRUCTOR: bool = true;
}

// SAFETY: Raw pointers are plain addresses; copying one does not duplicate ownership.
unsafe impl<T: ?Sized> TypeTraits for *mut T {
    const HAS_TRIVIAL_ASSIGNMENT: bool = true;
    const HAS_TRIVIAL_DESTRUCTOR: bool = true;
}

// SAFETY: `NonNull` is a raw pointer with a non-null guarantee that a copy preserves.
unsafe impl<T: ?Sized> TypeTraits for NonNull<T> {
    const HAS_TRIVIAL_ASSIGNMENT: bool = true;
    const HAS_TRIVIAL_DESTRUCTOR: bool = true;
}

// SAFETY: Shared references are `Copy` and have no drop glue.
unsafe impl<T: ?Sized> TypeTraits for &T {
    const HAS_TRIVIAL_ASSIGNMENT: bool = true;
    const HAS_TRIVIAL_DESTRUCTOR: bool = true;
}

// SAFETY: Zero-sized marker with no drop glue.
unsafe impl<T: ?Sized> TypeTraits for PhantomData<T> {
    const HAS_TRIVIAL_ASSIGNMENT: bool = true;
    const HAS_TRIVIAL_DESTRUCTOR: bool = true;
}

// SAFETY: An array is a bitwise copy of its elements and has drop glue only if they do.
unsafe impl<T: TypeTraits, const N: usize> TypeTraits for [T; N] {
    const HAS_TRIVIAL_ASSIGNMENT: bool = T::HAS_TRIVIAL_ASSIGNMENT;
    const HAS_TRIVIAL_DESTRUCTOR: bool = T::HAS_TRIVIAL_DESTRUCTOR;
}

// SAFETY: `None` carries nothing and `Some` carries a `T`, so `T` decides both answers.
unsafe impl<T: TypeTraits> TypeTraits for Option<T> {
    const HAS_TRIVIAL_ASSIGNMENT: bool = T::HAS_TRIVIAL_ASSIGNMENT;
    const HAS_TRIVIAL_DESTRUCTOR: bool = T::HAS_TRIVIAL_DESTRUCTOR;
}

// SAFETY: A `Cell` is its contents with interior mutability, which a copy does not share.
unsafe impl<T: TypeTraits> TypeTraits for Cell<T> {
    const HAS_TRIVIAL_ASSIGNMENT: bool = T::HAS_TRIVIAL_ASSIGNMENT;
    const HAS_TRIVIAL_DESTRUCTOR: bool = T::HAS_TRIVIAL_DESTRUCTOR;
}

macro_rules! tuple_type_traits {
    ($($name:ident),+) => {
        // SAFETY: A tuple is trivial exactly when every component is.
        unsafe impl<$($name: TypeTraits),+> TypeTraits for ($($name,)+) {
            const HAS_TRIVIAL_ASSIGNMENT: bool = true $(&& $name::HAS_TRIVIAL_ASSIGNMENT)+;
            const HAS_TRIVIAL_DESTRUCTOR: bool = true $(&& $name::HAS_TRIVIAL_DESTRUCTOR)+;
        }
    };
}

tuple_type_traits!(A);
tuple_type_traits!(A, B);
tuple_type_traits!(A, B, C);
tuple_type_traits!(A, B, C, D);
tuple_type_traits!(A, B, C, D, E);
tuple_type_traits!(A, B, C, D, E, F);

// Owning types keep the conservative answers.

// SAFETY: Conservative defaults.
unsafe impl TypeTraits for String {}

// SAFETY: Conservative defaults.
unsafe impl<T> TypeTraits for Vec<T> {}

// SAFETY: Conservative defaults.
unsafe impl<T: ?Sized> TypeTraits for Box<T> {}

// SAFETY: Conservative defaults.
unsafe impl<T: ?Sized> TypeTraits for Rc<T> {}

// SAFETY: Conservative defaults.
unsafe impl<T: ?Sized> TypeTraits for Arc<T> {}

// SAFETY: Conservative defaults.
unsafe impl<T: ?Sized> TypeTraits for RefCell<T> {}

#[cfg(test)]
mod tests {
    use std::mem;

    use static_assertions::const_assert;

    use super::*;

    const_assert!(has_trivial_assignment::<u32>());
    const_assert!(has_trivial_destructor::<*mut String>());
    const_assert!(!has_trivial_destructor::<String>());
    const_assert!(has_trivial_destructor::<[f64; 4]>());
    const_assert!(!has_trivial_assignment::<[String; 2]>());

    struct Opaque;

    // SAFETY: Conservative defaults.
    unsafe impl TypeTraits for Opaque {}

    #[test]
    fn user_types_default_to_conservative() {
        assert!(!has_trivial_assignment::<Opaque>());
        assert!(!has_trivial_destructor::<Opaque>());
    }

    #[test]
    fn composites_follow_components() {
        assert!(has_trivial_assignment::<(u8, i64, char)>());
        assert!(!has_trivial_assignment::<(u8, String)>());
        assert!(has_trivial_destructor::<Option<&str>>());
        assert!(!has_trivial_destructor::<Option<Vec<u8>>>());
        assert!(has_trivial_destructor::<Cell<usize>>());
    }

    #[test]
    fn trivial_scalars_have_no_drop_glue() {
        fn check<T: TypeTraits>() {
            if T::HAS_TRIVIAL_DESTRUCTOR {
                assert!(!mem::needs_drop::<T>());
            }
        }

        check::<u8>();
        check::<i128>();
        check::<f64>();
        check::<char>();
        check::<*const str>();
        check::<NonZero<usize>>();
        check::<(u16, bool)>();
        check::<[u64; 3]>();
    }
}
