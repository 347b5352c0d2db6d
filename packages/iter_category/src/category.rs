use std::fmt::Debug;

/// Tag of cursors that can be read once while moving forward.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "tags carry no data")]
pub struct InputIteratorTag;

/// Tag of cursors that can be written once while moving forward.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "tags carry no data")]
pub struct OutputIteratorTag;

/// Tag of cursors that move forward and can revisit a position through a copy.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "tags carry no data")]
pub struct ForwardIteratorTag;

/// Tag of cursors that also move backward.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "tags carry no data")]
pub struct BidirectionalIteratorTag;

/// Tag of cursors that jump by any offset and measure distances in constant time.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "tags carry no data")]
pub struct RandomAccessIteratorTag;

trait Sealed {}

/// One of the five cursor category tags.
///
/// The tags are zero-sized; algorithms select a strategy from a cursor's tag type at compile
/// time and never inspect a tag value at runtime.
///
/// This is a sealed trait; the five tags are its only implementations.
#[expect(private_bounds, reason = "intentional - sealed trait")]
pub trait IteratorCategory: Sealed + Copy + Default + Debug + Eq + 'static {
    /// Human-readable name of the category.
    const NAME: &'static str;
}

/// Categories whose cursors can be read: input and everything stronger.
pub trait InputCategory: IteratorCategory {}

/// Categories whose cursors can revisit positions: forward and everything stronger.
pub trait ForwardCategory: InputCategory {}

/// Categories whose cursors move in both directions: bidirectional and random access.
pub trait BidirectionalCategory: ForwardCategory {}

/// The random access category.
pub trait RandomAccessCategory: BidirectionalCategory {}

macro_rules! category {
    ($tag:ty, $name:literal $(, $marker:ident)*) => {
        impl Sealed for $tag {}

        impl IteratorCategory for $tag {
            const NAME: &'static str = $name;
        }

        $(impl $marker for $tag {})*
    };
}

category!(OutputIteratorTag, "output");
category!(InputIteratorTag, "input", InputCategory);
category!(ForwardIteratorTag, "forward", InputCategory, ForwardCategory);
category!(
    BidirectionalIteratorTag,
    "bidirectional",
    InputCategory,
    ForwardCategory,
    BidirectionalCategory
);
category!(
    RandomAccessIteratorTag,
    "random access",
    InputCategory,
    ForwardCategory,
    BidirectionalCategory,
    RandomAccessCategory
);

macro_rules! upcast {
    ($from:ty => $($to:ty),+) => {
        $(
            impl From<$from> for $to {
                #[inline]
                fn from(_: $from) -> Self {
                    Self
                }
            }
        )+
    };
}

upcast!(ForwardIteratorTag => InputIteratorTag);
upcast!(BidirectionalIteratorTag => ForwardIteratorTag, InputIteratorTag);
upcast!(RandomAccessIteratorTag => BidirectionalIteratorTag, ForwardIteratorTag, InputIteratorTag);

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RandomAccessIteratorTag: RandomAccessCategory, InputCategory);
    assert_impl_all!(BidirectionalIteratorTag: BidirectionalCategory, ForwardCategory);
    assert_not_impl_any!(BidirectionalIteratorTag: RandomAccessCategory);
    assert_not_impl_any!(ForwardIteratorTag: BidirectionalCategory);
    assert_not_impl_any!(InputIteratorTag: ForwardCategory);
    assert_not_impl_any!(OutputIteratorTag: InputCategory);

    assert_impl_all!(InputIteratorTag: From<RandomAccessIteratorTag>, From<ForwardIteratorTag>);
    assert_not_impl_any!(RandomAccessIteratorTag: From<InputIteratorTag>);

    #[test]
    fn tags_are_zero_sized() {
        assert_eq!(size_of::<InputIteratorTag>(), 0);
        assert_eq!(size_of::<RandomAccessIteratorTag>(), 0);
    }

    #[test]
    fn names() {
        assert_eq!(OutputIteratorTag::NAME, "output");
        assert_eq!(ForwardIteratorTag::NAME, "forward");
        assert_eq!(RandomAccessIteratorTag::NAME, "random access");
    }

    #[test]
    fn upcasts_are_lossless() {
        let input: InputIteratorTag = RandomAccessIteratorTag.into();
        assert_eq!(input, InputIteratorTag);

        let forward = ForwardIteratorTag::from(BidirectionalIteratorTag);
        assert_eq!(forward, ForwardIteratorTag);
    }
}
