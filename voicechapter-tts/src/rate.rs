//! Signed speaking rate → engine-specific speed parameters.
//!
//! The rate option is a signed integer where 0 is normal speed, negative is
//! slower and positive is faster; -10..=10 is the meaningful range.

pub const MIN_RATE: i32 = -10;
pub const MAX_RATE: i32 = 10;

/// Piper `length_scale` (duration multiplier, > 1 is slower).
///
/// 0 → 1.0; negative r → 1 - r/3 (-3 → 2.0); positive r → 1.5/(r+1) (2 → 0.5).
pub fn neural_length_scale(rate: i32) -> f32 {
    match rate {
        0 => 1.0,
        r if r < 0 => 1.0 - r as f32 / 3.0,
        r => 1.5 / (r as f32 + 1.0),
    }
}

const ESPEAK_DEFAULT_WPM: f32 = 175.0;

/// espeak-ng words per minute. Each rate step is a fixed ratio, rate ±10 being
/// three times faster/slower than normal.
pub fn espeak_words_per_minute(rate: i32) -> u32 {
    let r = rate.clamp(MIN_RATE, MAX_RATE) as f32;
    let wpm = ESPEAK_DEFAULT_WPM * 3f32.powf(r / 10.0);
    wpm.round().clamp(80.0, 450.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neural_reference_points() {
        assert_eq!(neural_length_scale(0), 1.0);
        assert_eq!(neural_length_scale(-3), 2.0);
        assert_eq!(neural_length_scale(2), 0.5);
        assert!((neural_length_scale(-1) - 4.0 / 3.0).abs() < 1e-6);
        assert!((neural_length_scale(1) - 0.75).abs() < 1e-6);
        assert!((neural_length_scale(3) - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_neural_monotonic() {
        for r in MIN_RATE..MAX_RATE {
            assert!(neural_length_scale(r) > neural_length_scale(r + 1), "rate {}", r);
        }
    }

    #[test]
    fn test_espeak_wpm() {
        assert_eq!(espeak_words_per_minute(0), 175);
        assert!(espeak_words_per_minute(5) > 175);
        assert!(espeak_words_per_minute(-5) < 175);
        assert_eq!(espeak_words_per_minute(-10), 80);
        assert_eq!(espeak_words_per_minute(10), 450);
        assert_eq!(espeak_words_per_minute(50), espeak_words_per_minute(10));
    }
}
