//! Property tests for the pure decision logic.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use core::cmp::Ordering;

use co2ampel::calibration::{
    Acceptance, CalibrationDecision, CalibrationRule, DriftCalibrationDetector,
};
use co2ampel::config::CalibrationThresholds;
use co2ampel::sensors::mhz19::{self, FRAME_LEN};
use co2ampel::status::{LedTier, classify_co2, classify_temperature};
use co2ampel::version::compare;
use proptest::prelude::*;

// ── Version ordering ──────────────────────────────────────────

fn arb_version() -> impl Strategy<Value = String> {
    proptest::collection::vec(0u32..1000, 0..=4).prop_map(|parts| {
        let body: Vec<String> = parts.iter().map(u32::to_string).collect();
        format!("v{}", body.join("."))
    })
}

proptest! {
    #[test]
    fn compare_is_antisymmetric(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
    }

    #[test]
    fn compare_is_transitive(a in arb_version(), b in arb_version(), c in arb_version()) {
        if compare(&a, &b) != Ordering::Greater && compare(&b, &c) != Ordering::Greater {
            prop_assert_ne!(compare(&a, &c), Ordering::Greater);
        }
    }

    #[test]
    fn trailing_zero_components_are_equal(a in arb_version()) {
        let padded = format!("{}.0", a);
        // "v" alone gains a component of 0, which still compares equal.
        prop_assert_eq!(compare(&a, &padded), Ordering::Equal);
    }

    #[test]
    fn bumping_last_component_is_newer(parts in proptest::collection::vec(0u32..1000, 1..=4)) {
        let mut bumped = parts.clone();
        if let Some(last) = bumped.last_mut() {
            *last += 1;
        }
        let fmt = |p: &[u32]| format!("v{}", p.iter().map(u32::to_string).collect::<Vec<_>>().join("."));
        prop_assert_eq!(compare(&fmt(&parts), &fmt(&bumped)), Ordering::Less);
    }

    #[test]
    fn compare_never_panics(a in ".{0,24}", b in ".{0,24}") {
        let _ = compare(&a, &b);
    }
}

// ── Status mapping ────────────────────────────────────────────

/// Number of lit indicators, a coarse measure of how alarming a state is.
fn lit(tiers: &[LedTier]) -> usize {
    tiers.iter().filter(|t| t.is_lit()).count()
}

proptest! {
    #[test]
    fn co2_indicators_never_shrink_as_ppm_rises(a in 0.0f32..5000.0, b in 0.0f32..5000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(lit(&classify_co2(lo)) <= lit(&classify_co2(hi)));
    }

    #[test]
    fn co2_below_threshold_is_dark(ppm in 0.0f32..800.0) {
        prop_assert_eq!(lit(&classify_co2(ppm)), 0);
    }

    #[test]
    fn co2_above_scale_is_saturated(ppm in 3000.0f32..100_000.0) {
        prop_assert_eq!(classify_co2(ppm), classify_co2(3000.0));
        prop_assert_eq!(lit(&classify_co2(ppm)), 3);
    }

    #[test]
    fn comfortable_band_shows_only_centre(t in 21.0f32..25.0) {
        let tiers = classify_temperature(t).unwrap();
        prop_assert_eq!(lit(&tiers), 1);
        prop_assert!(tiers[2].is_lit());
    }

    #[test]
    fn temperature_classified_below_sixty(t in -40.0f32..60.0) {
        prop_assert!(classify_temperature(t).is_some());
    }

    #[test]
    fn temperature_at_or_above_sixty_keeps_display(t in 60.0f32..1000.0) {
        prop_assert!(classify_temperature(t).is_none());
    }
}

// ── Calibration detector ──────────────────────────────────────

proptest! {
    /// Warm-up readings above 1400 ppm are never recorded.
    #[test]
    fn warmup_never_records_implausible_readings(
        readings in proptest::collection::vec(1.0f32..5000.0, 1..=4),
    ) {
        let mut d = DriftCalibrationDetector::new(CalibrationThresholds::default());
        for (i, ppm) in readings.iter().enumerate() {
            let before = d.window().read_count();
            let outcome = d.accept(*ppm, i as u64 * 30_000);
            if *ppm > 1400.0 {
                prop_assert_eq!(outcome, Acceptance::Discarded);
                prop_assert_eq!(d.window().read_count(), before);
            } else {
                prop_assert_eq!(d.window().read_count(), before + 1);
            }
        }
    }

    /// Any reading above 400 ppm resets the clean-air clock, so indoor air
    /// never triggers a clean-air calibration.
    #[test]
    fn indoor_air_never_looks_clean(
        readings in proptest::collection::vec(500.0f32..1400.0, 1..=200),
    ) {
        let mut d = DriftCalibrationDetector::new(CalibrationThresholds::default());
        for (i, ppm) in readings.iter().enumerate() {
            let outcome = d.accept(*ppm, i as u64 * 30_000);
            prop_assert_ne!(
                outcome.decision(),
                CalibrationDecision::CalibrateNow(CalibrationRule::CleanAir)
            );
        }
    }

    /// Invalid readings are always dropped.
    #[test]
    fn non_positive_readings_are_discarded(ppm in -5000.0f32..=0.0, now in 0u64..10_000_000) {
        let mut d = DriftCalibrationDetector::new(CalibrationThresholds::default());
        prop_assert_eq!(d.accept(ppm, now), Acceptance::Discarded);
    }
}

// ── MH-Z19 frame decoder ──────────────────────────────────────

proptest! {
    /// Arbitrary bytes never panic the decoder, and anything it accepts
    /// carries a valid checksum.
    #[test]
    fn decoder_accepts_only_checksummed_frames(bytes in proptest::array::uniform9(any::<u8>())) {
        let frame: [u8; FRAME_LEN] = bytes;
        if mhz19::decode_co2(&frame).is_ok() {
            prop_assert_eq!(mhz19::checksum(&frame), frame[8]);
        }
    }

    #[test]
    fn encoded_read_response_decodes_to_its_ppm(ppm in 1u16..=5000, temp in 0u8..=120) {
        let [hi, lo] = ppm.to_be_bytes();
        let mut frame = [0xFF, mhz19::CMD_READ_CO2, hi, lo, temp, 0, 0, 0, 0];
        frame[8] = mhz19::checksum(&frame);
        let r = mhz19::decode_co2(&frame).unwrap();
        prop_assert_eq!(r.ppm, ppm);
    }
}
