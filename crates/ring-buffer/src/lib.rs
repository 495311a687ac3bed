//! Fixed-Capacity Ring Buffer
//!
//! A bounded FIFO that overwrites its oldest entry once full. It backs the
//! short rolling history windows of the feature engine and the collector's
//! pending-record buffer, where bounded memory matters more than keeping
//! every sample.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
