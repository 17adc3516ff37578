//! Real-time-safe access to spectral frames held in host buffer pools.
//!
//! A frame is one FFT window laid out as DC, Nyquist and an ordered run of
//! bins that are either rectangular or polar. Units receive float buffer
//! handles, [`resolve`] them into locked frames, convert with [`convert`] as
//! needed and work in place. Scratch memory comes from a bounded pool in
//! [`rt_alloc`]; running out retires the unit instead of stalling the block.

pub mod approx;
pub mod convert;
pub mod diag;
pub mod frame;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod kernels;
pub mod pool;
pub mod resolve;
pub mod rt;
pub mod rt_alloc;
pub mod unit;

pub use frame::{BinPair, Complex, Coord, Polar, SpectralFrame};
pub use resolve::{resolve_buffer, resolve_buffer_pair, ProcessContext, NO_BUFFER};
pub use rt::{Runtime, WorldOptions};
