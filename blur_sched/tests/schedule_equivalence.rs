//! Tests that scheduling never changes what the pipeline computes.
//!
//! Every scheduled realization is compared pixel by pixel against the
//! unscheduled definition, on a deterministic input pattern.
//!
//! Run with: cargo test --test schedule_equivalence

use blur_sched::{
    configure, Backend, BlurSchedule, CpuBackend, ErrorKind, Kernel, ParamSampler, PatternSource,
    Pipeline, ScheduleParams, Source, Stage, StageSchedule, Var,
};

/// `input(x, y) = (x*31 + y*17) mod 1024 + 1`
fn pattern(x: i64, y: i64) -> i64 {
    (x * 31 + y * 17).rem_euclid(1024) + 1
}

/// The blur written out directly: average three columns of row averages.
fn direct_blur(x: i64, y: i64) -> i64 {
    let row = |yy: i64| (pattern(x - 1, yy) + pattern(x, yy) + pattern(x + 1, yy)) / 3;
    (row(y - 1) + row(y) + row(y + 1)) / 3
}

fn realize(pipeline: &Pipeline, schedule: &BlurSchedule, w: usize, h: usize) -> Vec<i32> {
    CpuBackend
        .compile(pipeline, schedule)
        .unwrap_or_else(|e| panic!("compile failed: {}", e))
        .run(w, h)
        .unwrap_or_else(|e| panic!("run failed for {}x{}: {}", w, h, e))
        .into_vec()
}

fn assert_equivalent(params: ScheduleParams, w: usize, h: usize) {
    let pipeline = Pipeline::build(PatternSource);
    let schedule = configure(params).unwrap();
    let got = realize(&pipeline, &schedule, w, h);
    let want = pipeline.realize_reference(w, h).unwrap().into_vec();
    if let Some(i) = got.iter().zip(&want).position(|(a, b)| a != b) {
        panic!(
            "{:?} on {}x{}: pixel ({}, {}) is {}, expected {}",
            params,
            w,
            h,
            i % w,
            i / w,
            got[i],
            want[i]
        );
    }
}

// ============================================================================
// Concrete scenario
// ============================================================================

#[test]
fn test_pattern_source_matches_formula() {
    for (x, y) in [(0, 0), (5, 9), (-1, -1), (1000, 3)] {
        assert_eq!(
            i64::from(PatternSource.at(x, y)),
            pattern(i64::from(x), i64::from(y))
        );
    }
}

#[test]
fn test_fixed_params_match_direct_formula() {
    let (w, h) = (768, 384);
    let pipeline = Pipeline::build(PatternSource);
    let out = CpuBackend
        .compile(&pipeline, &configure(ScheduleParams::FIXED).unwrap())
        .unwrap()
        .run(w, h)
        .unwrap();

    for (y, row) in out.rows().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            let expected = direct_blur(x as i64, y as i64);
            assert_eq!(i64::from(v), expected, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
#[ignore = "realizes the full 8192x8192 output"]
fn test_fixed_params_full_extent() {
    let n = 8192;
    let pipeline = Pipeline::build(PatternSource);
    let out = CpuBackend
        .compile(&pipeline, &configure(ScheduleParams::FIXED).unwrap())
        .unwrap()
        .run(n, n)
        .unwrap();

    // interior pixels away from the border
    for y in (2..n - 2).step_by(97) {
        for x in (2..n - 2).step_by(89) {
            assert_eq!(i64::from(out.get(x, y)), direct_blur(x as i64, y as i64));
        }
    }
    // the border reads the input outside the extent, which is defined
    assert_eq!(i64::from(out.get(0, 0)), direct_blur(0, 0));
    assert_eq!(
        i64::from(out.get(n - 1, n - 1)),
        direct_blur(n as i64 - 1, n as i64 - 1)
    );
}

// ============================================================================
// Randomized parameters
// ============================================================================

#[test]
fn test_random_valid_params_match_reference() {
    let mut sampler = ParamSampler::seeded(0x5eed);
    for _ in 0..24 {
        let v2 = sampler.sample(63) + 1;
        let v3 = sampler.sample(v2 - 1) + 1;
        let v4 = sampler.sample(v3 - 1) + 1;
        let v1 = sampler.sample(15) + 1;
        let params = ScheduleParams::new(v1, v2, v3, v4);

        // any extent at least one tile wide, usually ragged
        let w = v2 as usize + sampler.sample(40) as usize;
        let h = v3 as usize + sampler.sample(40) as usize;
        assert_equivalent(params, w, h);
    }
}

#[test]
fn test_sampled_exponent_params_match_reference() {
    let mut sampler = ParamSampler::seeded(99);
    for _ in 0..6 {
        let params = sampler.sample_exponents().to_params();
        assert_equivalent(params, params.v2 as usize + 3, params.v3 as usize + 1);
    }
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_extent_exactly_one_tile() {
    assert_equivalent(ScheduleParams::new(8, 256, 128, 8), 256, 128);
    assert_equivalent(ScheduleParams::new(1, 1, 1, 1), 1, 1);
}

#[test]
fn test_extent_one_pixel_past_a_tile() {
    assert_equivalent(ScheduleParams::new(8, 64, 32, 8), 65, 33);
}

#[test]
fn test_extent_smaller_than_tile_fails() {
    let pipeline = Pipeline::build(PatternSource);
    let kernel = CpuBackend
        .compile(&pipeline, &configure(ScheduleParams::FIXED).unwrap())
        .unwrap();
    let err = kernel.run(512, 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("y extent"), "{}", err);
}

#[test]
fn test_invalid_params_never_reach_backend() {
    let err = configure(ScheduleParams::new(8, 256, 64, 128)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// Hand-written schedules
// ============================================================================

#[test]
fn test_tiles_without_lanes() {
    let pipeline = Pipeline::build(PatternSource);
    let blur_x = StageSchedule::new(Stage::BlurX).compute_at(Stage::BlurY, Var::X_O);
    let blur_y = StageSchedule::new(Stage::BlurY)
        .split(Var::X, Var::X_O, Var::X_I, 10)
        .split(Var::Y, Var::Y_O, Var::Y_I, 7)
        .reorder(&[Var::X_I, Var::Y_I, Var::X_O, Var::Y_O])
        .parallel(Var::X_O);
    let schedule = BlurSchedule::new(blur_x, blur_y);
    let got = realize(&pipeline, &schedule, 43, 29);
    let want = pipeline.realize_reference(43, 29).unwrap().into_vec();
    assert_eq!(got, want);
}

#[test]
fn test_inline_producer_inside_tiles() {
    let pipeline = Pipeline::build(PatternSource);
    let blur_y = configure(ScheduleParams::new(4, 16, 16, 4)).unwrap().blur_y;
    let schedule = BlurSchedule::new(StageSchedule::new(Stage::BlurX), blur_y);
    let got = realize(&pipeline, &schedule, 40, 20);
    let want = pipeline.realize_reference(40, 20).unwrap().into_vec();
    assert_eq!(got, want);
}
