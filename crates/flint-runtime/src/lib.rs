//! Flint Runtime - Game loop infrastructure
//!
//! Provides the fixed-timestep clock that drives the animation worker:
//! - `GameClock` — fixed-timestep accumulator for deterministic updates

mod clock;

pub use clock::GameClock;
