#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]

mod math;
pub mod polygon;

pub use math::{line_normal, nudge_toward_center, sweep_origin, Vec2, EPS_VERTEX};
pub use polygon::{Polygon, Vertices};

#[cfg(test)]
mod tests;
