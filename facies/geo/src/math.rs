// Keep imports minimal; this module is shared by every partition builder.

use serde::{Deserialize, Serialize};

/// Coordinates closer than this are treated as the same vertex.
pub const EPS_VERTEX: f64 = 1.0e-12;

/// Point or direction in the (alpha1, alpha2) plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const CENTER: Self = Self { x: 0.5, y: 0.5 };

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
    #[must_use]
    pub fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y)
    }
    #[must_use]
    pub fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y)
    }
    #[must_use]
    pub fn mul(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }
    #[must_use]
    pub fn dot(self, o: Self) -> f64 {
        self.x * o.x + self.y * o.y
    }
    /// z-component of the 3D cross product.
    #[must_use]
    pub fn cross(self, o: Self) -> f64 {
        self.x * o.y - self.y * o.x
    }
    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }
    #[must_use]
    pub fn normalized(self) -> Self {
        let l = self.length();
        if l == 0.0 {
            self
        } else {
            self.mul(1.0 / l)
        }
    }
    /// Linear interpolation `self + t·(o − self)`.
    #[must_use]
    pub fn lerp(self, o: Self, t: f64) -> Self {
        self.add(o.sub(self).mul(t))
    }
    #[must_use]
    pub fn approx_eq(self, o: Self) -> bool {
        (self.x - o.x).abs() <= EPS_VERTEX && (self.y - o.y).abs() <= EPS_VERTEX
    }
}

/// Unit normal `(sin α, −cos α)` of a line running along `(cos α, sin α)`.
///
/// `angle_deg` is measured anticlockwise from the first axis.
#[inline]
#[must_use]
pub fn line_normal(angle_deg: f64) -> Vec2 {
    let (s, c) = angle_deg.to_radians().sin_cos();
    Vec2::new(s, -c)
}

/// Unit-square corner minimising `normal · p`.
///
/// Sweeping `normal · p` upward from this corner covers the square monotonically.
#[inline]
#[must_use]
pub fn sweep_origin(normal: Vec2) -> Vec2 {
    let x = if normal.x >= 0.0 { 0.0 } else { 1.0 };
    let y = if normal.y >= 0.0 { 0.0 } else { 1.0 };
    Vec2::new(x, y)
}

/// Move `p` by `step` toward 0.5 in each coordinate.
#[inline]
#[must_use]
pub fn nudge_toward_center(p: Vec2, step: f64) -> Vec2 {
    let toward = |v: f64| if v < 0.5 { v + step } else { v - step };
    Vec2::new(toward(p.x), toward(p.y))
}
