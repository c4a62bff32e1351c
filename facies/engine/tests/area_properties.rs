use facies_engine::bayfill::BayfillFacies;
use facies_engine::config::{AREA_SUM_TOLERANCE, EPS_PROB};
use facies_engine::{
    AnglePolygonSpec, AngleRule, AngleSpec, BayfillRule, BayfillSpec, CubicLeafSpec, CubicRule,
    CubicSpec, Direction, FaciesCatalog, ParamValue, TruncConfig, Truncation, ZoneFaciesContext,
};
use facies_geo::Polygon;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn zone(names: &[&str]) -> ZoneFaciesContext {
    let catalog = FaciesCatalog::from_pairs(names.iter().zip(1..).map(|(n, c)| (*n, c))).unwrap();
    ZoneFaciesContext::new(&catalog, 1, names, ["X", "Y", "Z"]).unwrap()
}

fn no_memo() -> TruncConfig {
    TruncConfig { memo_resolution: 0, ..TruncConfig::default() }
}

fn random_probabilities(rng: &mut StdRng, n: usize) -> Vec<f64> {
    loop {
        let mut p: Vec<f64> = (0..n).map(|_| rng.gen::<f64>().powi(2)).collect();
        if rng.gen_bool(0.2) {
            p[rng.gen_range(0..n)] = 0.0;
        }
        let sum: f64 = p.iter().sum();
        if sum <= 0.0 {
            continue;
        }
        p.iter_mut().for_each(|v| *v /= sum);
        if p.iter().all(|&v| v <= 1.0 - EPS_PROB) {
            return p;
        }
    }
}

fn areas_by_facies(rule: &impl Truncation, n: usize) -> Vec<f64> {
    let polys = rule.polygons();
    let mut area = vec![0.0; n];
    for (pts, &f) in polys.polygons.iter().zip(&polys.facies) {
        area[f] += Polygon::new(pts.iter().copied()).area();
    }
    area
}

fn nested_cubic_spec() -> CubicSpec {
    let leaf = |f: &str, fraction: f64, l1, l2, l3| CubicLeafSpec { facies: f.into(), fraction, l1, l2, l3 };
    CubicSpec {
        direction: Direction::V,
        leaves: vec![
            leaf("A", 0.4, 1, 1, 0),
            leaf("B", 1.0, 1, 2, 0),
            leaf("C", 1.0, 2, 0, 0),
            leaf("A", 0.6, 3, 1, 1),
            leaf("D", 1.0, 3, 1, 2),
        ],
        background_fields: vec!["X".into(), "Y".into()],
        overlay: Vec::new(),
    }
}

fn bayfill_spec(sf: f64, ysf: f64, sbhd: f64) -> BayfillSpec {
    BayfillSpec {
        floodplain: "FP".into(),
        subbay: "SB".into(),
        wave_influenced_bayfill: "WBF".into(),
        bay_head_delta: "BHD".into(),
        lagoon: "LG".into(),
        sf: ParamValue::Constant(sf),
        ysf,
        sbhd,
        background_fields: vec!["X".into(), "Y".into(), "Z".into()],
    }
}

#[test]
fn cubic_areas_equal_probabilities() {
    let names = ["A", "B", "C", "D"];
    let ctx = zone(&names);
    let mut rule = CubicRule::new(&ctx, &nested_cubic_spec(), TruncConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let p = random_probabilities(&mut rng, names.len());
        rule.set_trunc_rule(&p, None).unwrap();
        let area = areas_by_facies(&rule, names.len());
        for (a, q) in area.iter().zip(&p) {
            assert!((a - q).abs() < 1e-9, "{area:?} vs {p:?}");
        }
    }
}

#[test]
fn angle_areas_equal_probabilities() {
    let names = ["A", "B", "C"];
    let ctx = zone(&names);
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..100 {
        let mut angle = || ParamValue::Constant(rng.gen_range(-180.0..180.0));
        let spec = AngleSpec {
            polygons: vec![
                AnglePolygonSpec { facies: "A".into(), angle: angle(), fraction: 0.5 },
                AnglePolygonSpec { facies: "B".into(), angle: angle(), fraction: 1.0 },
                AnglePolygonSpec { facies: "A".into(), angle: angle(), fraction: 0.5 },
                AnglePolygonSpec { facies: "C".into(), angle: angle(), fraction: 1.0 },
            ],
            background_fields: vec!["X".into(), "Y".into()],
            overlay: Vec::new(),
        };
        let mut rule = AngleRule::new(&ctx, &spec, no_memo()).unwrap();
        let p = random_probabilities(&mut rng, names.len());
        rule.set_trunc_rule(&p, None).unwrap();
        let area = areas_by_facies(&rule, names.len());
        for (a, q) in area.iter().zip(&p) {
            assert!((a - q).abs() < AREA_SUM_TOLERANCE, "{area:?} vs {p:?}");
        }
    }
}

#[test]
fn bayfill_areas_equal_probabilities() {
    let names = ["FP", "SB", "WBF", "BHD", "LG"];
    let ctx = zone(&names);
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..300 {
        let spec = bayfill_spec(rng.gen_range(0.01..=1.0), rng.gen(), rng.gen());
        let mut rule = BayfillRule::new(&ctx, &spec, no_memo()).unwrap();
        let p = random_probabilities(&mut rng, names.len());
        rule.set_trunc_rule(&p, None).unwrap();
        let Some(part) = rule.partition() else {
            continue;
        };
        for f in BayfillFacies::ALL {
            let a = part.facies_area(f);
            assert!((a - p[f.index()]).abs() < AREA_SUM_TOLERANCE, "{f:?}: {a} vs {p:?}");
        }
    }
}

#[test]
fn rebuilding_without_memo_is_identical() {
    let names = ["A", "B", "C"];
    let ctx = zone(&names);
    let spec = AngleSpec {
        polygons: [("A", 17.0), ("B", 203.0), ("C", 0.0)]
            .iter()
            .map(|(f, a)| AnglePolygonSpec { facies: (*f).into(), angle: ParamValue::Constant(*a), fraction: 1.0 })
            .collect(),
        background_fields: vec!["X".into(), "Y".into()],
        overlay: Vec::new(),
    };
    let mut rule = AngleRule::new(&ctx, &spec, no_memo()).unwrap();
    let p = [0.33, 0.21, 0.46];
    rule.set_trunc_rule(&p, None).unwrap();
    let first = rule.polygons();
    rule.set_trunc_rule(&p, None).unwrap();
    assert_eq!(first, rule.polygons());
    assert_eq!(rule.cache_stats().entries, 0);

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..500 {
        let alpha = [rng.gen::<f64>(), rng.gen::<f64>()];
        assert_eq!(rule.define_facies(&alpha).unwrap(), rule.define_facies(&alpha).unwrap());
    }
}

#[test]
fn cubic_rebuild_reproduces_boundaries() {
    let names = ["A", "B", "C", "D"];
    let ctx = zone(&names);
    let mut rule = CubicRule::new(&ctx, &nested_cubic_spec(), no_memo()).unwrap();
    let p = [0.31, 0.17, 0.28, 0.24];
    rule.set_trunc_rule(&p, None).unwrap();
    let first = rule.polygons();
    assert_eq!(first.len(), 5);
    rule.set_trunc_rule(&[0.25; 4], None).unwrap();
    rule.set_trunc_rule(&p, None).unwrap();
    assert_eq!(first, rule.polygons());
}

#[test]
fn bayfill_rebuild_reproduces_pieces() {
    let names = ["FP", "SB", "WBF", "BHD", "LG"];
    let ctx = zone(&names);
    let mut rng = StdRng::seed_from_u64(21);
    // The second vector falls back to the z threshold for the delta.
    for (p, sbhd) in [([0.15, 0.25, 0.2, 0.1, 0.3], 0.5), ([0.1, 0.1, 0.1, 0.4, 0.3], 0.1)] {
        let mut rule = BayfillRule::new(&ctx, &bayfill_spec(0.5, 0.5, sbhd), no_memo()).unwrap();
        rule.set_trunc_rule(&p, None).unwrap();
        let first = rule.polygons();
        let first_breakpoints = *rule.breakpoints().unwrap();
        assert!(!first.is_empty());
        rule.set_trunc_rule(&[0.2; 5], None).unwrap();
        rule.set_trunc_rule(&p, None).unwrap();
        assert_eq!(first, rule.polygons());
        assert_eq!(&first_breakpoints, rule.breakpoints().unwrap());
        assert_eq!(rule.cache_stats().entries, 0);
        for _ in 0..200 {
            let alpha = [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
            assert_eq!(rule.define_facies(&alpha).unwrap(), rule.define_facies(&alpha).unwrap());
        }
    }
}

#[test]
fn memoized_partitions_are_shared() {
    let names = ["A", "B", "C"];
    let ctx = zone(&names);
    let spec = AngleSpec {
        polygons: [("A", 60.0), ("B", 150.0), ("C", 0.0)]
            .iter()
            .map(|(f, a)| AnglePolygonSpec { facies: (*f).into(), angle: ParamValue::Constant(*a), fraction: 1.0 })
            .collect(),
        background_fields: vec!["X".into(), "Y".into()],
        overlay: Vec::new(),
    };
    let mut rule = AngleRule::new(&ctx, &spec, TruncConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let base = [0.3, 0.3, 0.4];
    for _ in 0..50 {
        let d = rng.gen_range(-0.004..0.004);
        rule.set_trunc_rule(&[base[0] + d, base[1] - d, base[2]], None).unwrap();
    }
    let stats = rule.cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits + stats.misses, 50);
}
