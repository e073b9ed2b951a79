#![allow(
    clippy::collapsible_if,
    clippy::needless_range_loop,
    clippy::identity_op,
    clippy::len_without_is_empty,
    clippy::manual_div_ceil,
    clippy::manual_range_contains,
    clippy::too_many_arguments
)]

/// mimalloc for every binary and test built from this crate. Run buffers and
/// merge descriptors are large, long-lived allocations that glibc malloc
/// fragments badly.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod sio;
