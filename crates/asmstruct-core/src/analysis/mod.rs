//! Structuring analyses over a numbered procedure graph.
//!
//! The passes run in a fixed order, each one reading only what earlier
//! passes wrote:
//!
//! 1. [`dominators`]: immediate post-dominators
//! 2. [`conditionals`]: conditional headers, follows and switch bodies
//! 3. [`loops`]: loop headers, latches, kinds and follows
//! 4. [`jumps`]: jumps into and out of loops and case bodies
//!
//! [`pass::PassPipeline`] strings them together.

pub mod conditionals;
pub mod dominators;
pub mod intervals;
pub mod jumps;
pub mod loops;
pub mod order;
pub mod pass;

pub use intervals::{DerivedGraph, DerivedSequence, Interval};
pub use loops::{detector_for, IntervalLoops, LoopDetector, StampLoops};
pub use pass::{Pass, PassPipeline, PASS_NAMES};
