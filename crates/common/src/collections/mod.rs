//! Specialized data structures
//!
//! - **[`ring_buffer`]**: fixed-capacity history buffer that evicts the oldest
//!   entry first

pub mod ring_buffer;

pub use ring_buffer::RingBuffer;
