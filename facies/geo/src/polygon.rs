use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::math::Vec2;

/// Vertex storage; partitions of the unit square rarely exceed eight corners.
pub type Vertices = SmallVec<[Vec2; 8]>;

/// Simple polygon in the unit square, vertices in order, implicitly closed.
///
/// An empty vertex list is the degenerate polygon assigned to zero-area facies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pts: Vertices,
}

impl Polygon {
    /// Build from an ordered vertex sequence (first vertex not repeated).
    #[must_use]
    pub fn new<I: IntoIterator<Item = Vec2>>(pts: I) -> Self {
        let mut poly = Self { pts: pts.into_iter().collect() };
        poly.dedup();
        poly
    }

    /// Degenerate polygon with no vertices.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// `[0,1]²`, counter-clockwise from the origin.
    #[must_use]
    pub fn unit_square() -> Self {
        Self::new([
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ])
    }

    /// Axis-aligned rectangle `[x0,x1]×[y0,y1]`.
    #[must_use]
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new([Vec2::new(x0, y0), Vec2::new(x1, y0), Vec2::new(x1, y1), Vec2::new(x0, y1)])
    }

    /// Vertices in order, first vertex not repeated.
    #[must_use]
    pub fn points(&self) -> &[Vec2] {
        &self.pts
    }

    /// Vertices with the first one repeated at the end.
    #[must_use]
    pub fn closed_points(&self) -> Vec<Vec2> {
        let mut out: Vec<Vec2> = self.pts.to_vec();
        if let Some(&first) = self.pts.first() {
            out.push(first);
        }
        out
    }

    /// True when fewer than three distinct vertices remain.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.pts.len() < 3
    }

    /// Enclosed area (shoelace formula), orientation independent.
    #[must_use]
    pub fn area(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let n = self.pts.len();
        let mut twice = 0.0;
        for i in 0..n {
            let a = self.pts[i];
            let b = self.pts[(i + 1) % n];
            twice += a.cross(b);
        }
        0.5 * twice.abs()
    }

    /// Keep the part with `normal · p <= offset` (Sutherland–Hodgman, one plane).
    ///
    /// Exact for convex input; the result is convex again.
    #[must_use]
    pub fn clip(&self, normal: Vec2, offset: f64) -> Self {
        let n = self.pts.len();
        let mut out = Vertices::new();
        for i in 0..n {
            let cur = self.pts[i];
            let next = self.pts[(i + 1) % n];
            let dc = normal.dot(cur) - offset;
            let dn = normal.dot(next) - offset;
            if dc <= 0.0 {
                out.push(cur);
            }
            if (dc < 0.0 && dn > 0.0) || (dc > 0.0 && dn < 0.0) {
                out.push(cur.lerp(next, dc / (dc - dn)));
            }
        }
        let mut poly = Self { pts: out };
        poly.dedup();
        if poly.is_degenerate() {
            poly.pts.clear();
        }
        poly
    }

    /// Split along the line `normal · p = offset`; returns `(below, above)`.
    #[must_use]
    pub fn split(&self, normal: Vec2, offset: f64) -> (Self, Self) {
        (self.clip(normal, offset), self.clip(normal.mul(-1.0), -offset))
    }

    /// Ray-casting containment test along a horizontal ray toward `+x`.
    ///
    /// The point is inside iff an odd number of edges cross the ray strictly to
    /// its right. Zero-length edges are skipped. Points on the right or top
    /// boundary of a polygon count as outside.
    #[must_use]
    pub fn contains(&self, p: Vec2) -> bool {
        let n = self.pts.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        for i in 0..n {
            let a = self.pts[i];
            let b = self.pts[(i + 1) % n];
            if a == b {
                continue;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    // Drop consecutive duplicates, including a closing duplicate of the first vertex.
    fn dedup(&mut self) {
        self.pts.dedup_by(|b, a| a.approx_eq(*b));
        while self.pts.len() > 1 && self.pts[self.pts.len() - 1].approx_eq(self.pts[0]) {
            self.pts.pop();
        }
    }
}
