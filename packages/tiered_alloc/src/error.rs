use thiserror::Error;

/// Errors reported by the fallible allocation entry points.
///
/// The infallible entry points (`allocate()` and friends) never return these; they treat
/// out-of-memory as fatal and terminate the process after logging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The heap could not satisfy a request and no out-of-memory handler was installed to
    /// free memory before a retry.
    #[error(
        "out of memory: could not allocate {size} bytes aligned to {align} and no out-of-memory handler is installed"
    )]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,

        /// Requested alignment in bytes.
        align: usize,
    },

    /// The total size of a typed array request does not fit in the address space.
    #[error("capacity overflow: {count} elements of {element_size} bytes each exceed the address space")]
    CapacityOverflow {
        /// Number of elements requested.
        count: usize,

        /// Size of one element in bytes.
        element_size: usize,
    },
}

/// A specialized `Result` type for allocation operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn out_of_memory_message_names_request() {
        let error = Error::OutOfMemory {
            size: 4096,
            align: 8,
        };

        let message = error.to_string();
        assert!(message.contains("4096"));
        assert!(message.contains("aligned to 8"));
    }

    #[test]
    fn capacity_overflow_message_names_request() {
        let error = Error::CapacityOverflow {
            count: usize::MAX,
            element_size: 16,
        };

        assert!(error.to_string().contains("16 bytes"));
    }
}
