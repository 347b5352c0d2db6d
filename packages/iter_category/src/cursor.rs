use num_traits::{PrimInt, Signed};

use crate::{BidirectionalCategory, IteratorCategory, RandomAccessCategory};

/// A position in a sequence, in the five-member form that category-dispatched algorithms
/// consume.
///
/// Unlike [`Iterator`], a cursor separates reading the current element from moving, and two
/// cursors into the same sequence can be compared to detect the end of a range.
///
/// The associated types are the five members every cursor publishes:
///
/// * [`Category`][Self::Category]: the strongest movement the cursor supports.
/// * [`Value`][Self::Value]: the element type.
/// * [`Difference`][Self::Difference]: a signed integer able to hold the distance between
///   two cursors.
/// * [`Pointer`][Self::Pointer]: what [`pointer()`][Self::pointer] returns.
/// * [`Reference`][Self::Reference]: what [`get()`][Self::get] returns.
pub trait Cursor: Clone + PartialEq {
    /// The strongest movement this cursor supports.
    type Category: IteratorCategory;

    /// The element type.
    type Value;

    /// Signed distance between two cursors.
    type Difference: PrimInt + Signed;

    /// Address form of the current position.
    type Pointer;

    /// Access form of the current element.
    type Reference;

    /// Reads the current element.
    fn get(&self) -> Self::Reference;

    /// The address of the current element.
    fn pointer(&self) -> Self::Pointer;

    /// Moves to the next position.
    fn increment(&mut self);
}

/// A cursor that can also move backward.
pub trait BidirectionalCursor: Cursor<Category: BidirectionalCategory> {
    /// Moves to the previous position.
    fn decrement(&mut self);
}

/// A cursor that moves by any offset and measures distances in constant time.
pub trait RandomAccessCursor: BidirectionalCursor<Category: RandomAccessCategory> {
    /// Moves by `n` positions, backward if `n` is negative.
    fn offset(&mut self, n: Self::Difference);

    /// The number of positions from `origin` to `self`, negative if `self` comes first.
    fn difference(&self, origin: &Self) -> Self::Difference;
}
