//! A double-ended queue stored as a map of fixed-size buffers.
//!
//! [`Deque`] keeps its elements in equally sized buffers and the buffer addresses, in order, in
//! a central map. This gives it three properties at once:
//!
//! * Pushing and popping at either end take constant time and never move existing elements.
//! * Indexing takes constant time, including through the random access [`DequeCursor`].
//! * Inserting or removing in the middle shifts only the elements on the shorter side.
//!
//! Buffers and the map are allocated from a [`tiered_alloc::RawAlloc`]. By default that is the
//! calling thread's pool, so the small, equally sized buffers of many deques recycle each
//! other's memory.
//!
//! # Example
//!
//! ```rust
//! use seg_deque::Deque;
//!
//! let mut jobs: Deque<&str> = Deque::new();
//!
//! jobs.push_back("compile");
//! jobs.push_back("test");
//! jobs.push_front("fetch");
//!
//! assert_eq!(jobs.pop_front(), Some("fetch"));
//! assert_eq!(jobs.len(), 2);
//! assert_eq!(jobs[1], "test");
//! ```
//!
//! # Choosing the buffer size
//!
//! The `BUF` parameter fixes the number of elements per buffer. The default of zero picks as
//! many elements as fit in [`DEFAULT_BUFFER_BYTES`], at least one.
//!
//! ```rust
//! use seg_deque::Deque;
//! use tiered_alloc::DefaultAlloc;
//!
//! let deque = Deque::<u64, DefaultAlloc, 16>::new_in(DefaultAlloc);
//!
//! assert_eq!(Deque::<u64, DefaultAlloc, 16>::buffer_size(), 16);
//! assert_eq!(Deque::<u64>::buffer_size(), 64);
//! # drop(deque);
//! ```

mod buffer;
mod cursor;
mod deque;
mod iter;
mod raw_iter;

pub use buffer::*;
pub use cursor::*;
pub use deque::*;
pub use iter::*;
pub(crate) use raw_iter::*;
