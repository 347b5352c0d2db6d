//! A two-tier allocator with typed allocation and uninitialized-memory algorithms on top.
//!
//! The crate is layered the way containers consume memory:
//!
//! * [`MallocAllocator`] is the primitive tier. It passes every request straight to a
//!   [`RawHeap`] and, when the heap fails, runs an out-of-memory handler and retries until the
//!   request succeeds.
//! * [`PoolAllocator`] is the pooled tier. Requests of up to [`MAX_BYTES`] bytes are rounded up
//!   to a multiple of [`ALIGN`] and served from per-size free lists that are refilled in
//!   batches from large slabs. Larger requests go to the primitive tier.
//! * [`RawAlloc`] is the byte-level interface containers are generic over. [`DefaultAlloc`]
//!   reaches a per-thread default pool, [`MallocAlloc`] its primitive tier, and
//!   [`PoolHandle`] an explicitly configured pool.
//! * [`Allocator<T, A>`] converts element counts to byte sizes on top of a [`RawAlloc`].
//! * [`construct()`], [`destroy()`] and [`destroy_range()`] separate constructing values from
//!   allocating their storage, and [`uninitialized_copy()`], [`uninitialized_fill()`] and
//!   [`uninitialized_fill_with()`] fill raw storage all or nothing.
//!
//! [`TypeTraits`] classifies element types at compile time so that the algorithms can take
//! a bitwise fast path for plain data and skip destruction where it does nothing.
//!
//! # Example
//!
//! ```rust
//! use tiered_alloc::{Allocator, PoolAllocator, PoolHandle, construct, destroy_range};
//!
//! let pool = PoolHandle::new(PoolAllocator::new());
//! let alloc = Allocator::<u32, _>::with_raw(pool.clone());
//!
//! let values = alloc.allocate(4);
//!
//! // SAFETY: The storage holds four slots; all four are initialized before use, destroyed
//! // before release and released with the same count.
//! unsafe {
//!     for i in 0..4 {
//!         construct(values.add(i), u32::try_from(i).unwrap());
//!     }
//!
//!     assert_eq!(values.add(3).read(), 3);
//!
//!     destroy_range(values, values.add(4));
//!     alloc.deallocate(values, 4);
//! }
//!
//! // The 16-byte block went back on its free list, next to the rest of its batch.
//! assert_eq!(pool.with_pool(|pool| pool.free_list_len(16)), 20);
//! ```
//!
//! # Out-of-memory handling
//!
//! Infallible entry points treat exhaustion as fatal: after the out-of-memory handler (if any)
//! has had its chance, they log the failure and terminate through
//! [`std::alloc::handle_alloc_error`]. The `try_` entry points return [`Error`] instead.

mod allocator;
#[cfg(test)]
mod budget_heap;
mod builder;
mod construct;
mod default_alloc;
mod error;
mod heap;
mod malloc;
mod pool;
mod raw_alloc;
mod type_traits;
mod uninit;

pub use allocator::*;
pub use builder::*;
pub use construct::*;
pub use default_alloc::*;
pub use error::*;
pub use heap::*;
pub use malloc::{MallocAllocator, OomHandler};
pub use pool::*;
pub use raw_alloc::*;
pub use type_traits::*;
pub use uninit::*;

#[cfg(test)]
pub(crate) use budget_heap::BudgetHeap;
