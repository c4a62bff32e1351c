use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::*;
use crate::polygon::Polygon;

#[test]
fn unit_square_has_unit_area() {
    let sq = Polygon::unit_square();
    assert_eq!(sq.points().len(), 4);
    assert!((sq.area() - 1.0).abs() < 1e-15);
    assert_eq!(sq.closed_points().len(), 5);
}

#[test]
fn clip_vertical_half() {
    let sq = Polygon::unit_square();
    let left = sq.clip(Vec2::new(1.0, 0.0), 0.5);
    assert!((left.area() - 0.5).abs() < 1e-15);
    for p in left.points() {
        assert!(p.x <= 0.5 + 1e-15);
    }
}

#[test]
fn split_conserves_area_for_random_lines() {
    let mut rng = StdRng::seed_from_u64(42);
    let sq = Polygon::unit_square();
    for _ in 0..500 {
        let angle: f64 = rng.gen_range(0.0..360.0);
        let n = line_normal(angle);
        let offset: f64 = rng.gen_range(-1.5..1.5);
        let (below, above) = sq.split(n, offset);
        let total = below.area() + above.area();
        assert!((total - 1.0).abs() < 1e-12, "angle={angle} offset={offset} total={total}");
    }
}

#[test]
fn clip_outside_is_degenerate() {
    let sq = Polygon::unit_square();
    let none = sq.clip(Vec2::new(1.0, 0.0), -0.1);
    assert!(none.is_degenerate());
    assert_eq!(none.area(), 0.0);
    assert!(!none.contains(Vec2::CENTER));
}

#[test]
fn contains_is_half_open_on_shared_edges() {
    let left = Polygon::rectangle(0.0, 0.0, 0.5, 1.0);
    let right = Polygon::rectangle(0.5, 0.0, 1.0, 1.0);
    let on_edge = Vec2::new(0.5, 0.5);
    assert!(!left.contains(on_edge));
    assert!(right.contains(on_edge));
    assert!(left.contains(Vec2::new(0.2, 0.5)));
    assert!(right.contains(Vec2::new(0.8, 0.5)));
    // Right/top boundary of the square belongs to nobody until nudged.
    let corner = Vec2::new(1.0, 1.0);
    assert!(!right.contains(corner));
    assert!(right.contains(nudge_toward_center(corner, 0.01)));
}

#[test]
fn contains_skips_zero_length_edges() {
    let poly = Polygon::new([
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(0.0, 0.0),
    ]);
    assert_eq!(poly.points().len(), 4);
    assert!(poly.contains(Vec2::new(0.3, 0.7)));
}

#[test]
fn contains_handles_non_convex() {
    // L-shape: the notch at the top right is outside.
    let l = Polygon::new([
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 0.4),
        Vec2::new(0.4, 0.4),
        Vec2::new(0.4, 1.0),
        Vec2::new(0.0, 1.0),
    ]);
    assert!((l.area() - 0.64).abs() < 1e-12);
    assert!(l.contains(Vec2::new(0.2, 0.9)));
    assert!(l.contains(Vec2::new(0.9, 0.2)));
    assert!(!l.contains(Vec2::new(0.7, 0.7)));
}

#[test]
fn sweep_origin_follows_quadrant() {
    assert_eq!(sweep_origin(line_normal(45.0)), Vec2::new(0.0, 1.0));
    assert_eq!(sweep_origin(line_normal(135.0)), Vec2::new(0.0, 0.0));
    assert_eq!(sweep_origin(line_normal(225.0)), Vec2::new(1.0, 0.0));
    assert_eq!(sweep_origin(line_normal(315.0)), Vec2::new(1.0, 1.0));
}

#[test]
fn nudge_moves_inward() {
    let p = nudge_toward_center(Vec2::new(0.0, 1.0), 0.01);
    assert!((p.x - 0.01).abs() < 1e-15);
    assert!((p.y - 0.99).abs() < 1e-15);
}
