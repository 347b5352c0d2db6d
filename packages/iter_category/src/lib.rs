//! Category-tagged cursors and algorithms that pick their strategy from the tag.
//!
//! A [`Cursor`] publishes five associated types: its category, value, difference, pointer and
//! reference types. The category is one of five zero-sized tags:
//!
//! * [`InputIteratorTag`] and [`OutputIteratorTag`] for single-pass cursors.
//! * [`ForwardIteratorTag`] for multi-pass cursors that move forward.
//! * [`BidirectionalIteratorTag`] for cursors that also move backward.
//! * [`RandomAccessIteratorTag`] for cursors that jump and measure in constant time.
//!
//! Each stronger tag satisfies the marker traits of all weaker ones ([`InputCategory`],
//! [`ForwardCategory`], [`BidirectionalCategory`], [`RandomAccessCategory`]) and converts
//! into their tags with [`From`], so an algorithm written for a weaker category accepts
//! stronger cursors too.
//!
//! [`distance()`] and [`advance()`] select their implementation at compile time through
//! [`CategoryDispatch`]: linear walks for input, forward and bidirectional cursors and a
//! single jump for random access cursors.
//!
//! # Example
//!
//! ```rust
//! use iter_category::{ForwardOnly, SliceCursor, advance, distance};
//!
//! let data = [10, 20, 30, 40];
//!
//! // A slice cursor is random access: both calls are constant time.
//! let mut cursor = SliceCursor::begin(&data);
//! advance(&mut cursor, 3);
//! assert_eq!(distance(&SliceCursor::begin(&data), &cursor), 3);
//!
//! // The same sequence seen through a forward cursor gives the same answers by walking.
//! let first = ForwardOnly::new(SliceCursor::begin(&data));
//! let last = ForwardOnly::new(SliceCursor::end(&data));
//! assert_eq!(distance(&first, &last), 4);
//! ```

mod adapters;
mod category;
mod cursor;
mod dispatch;
mod range;
mod slice;

pub use adapters::*;
pub use category::*;
pub use cursor::*;
pub use dispatch::*;
pub use range::*;
pub use slice::*;
