//! Gain math.
//!
//! Gains handed to the mixer are linear amplitudes (1.0 = unity). Distance and
//! volume curves are computed in decibels and converted at the end.

use super::GainSupplier;
use std::sync::Arc;

pub const NOISE_FLOOR: f32 = -60.0;
pub const CHAT_FLOOR: f32 = -50.0;
pub const FRIEND_FLOOR: f32 = -20.0;
pub const NPC_FLOOR: f32 = -50.0;

/// Beyond this many tiles a speaker is not heard at all.
pub const MAX_DISTANCE: f32 = 15.0;

/// Upper bound for any mixed gain, +6 dB.
pub const MAX_GAIN_DB: f32 = 6.0;

pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Master volume slider (0-100) to decibels: `10 * ln(v / 100)`, or the
/// noise floor for a near-zero slider.
pub fn volume_to_db(volume: u8) -> f32 {
    let v = f32::from(volume.min(100));
    if v <= 0.1 {
        NOISE_FLOOR
    } else {
        (10.0 * (v / 100.0).ln()).max(NOISE_FLOOR)
    }
}

/// easeInOutQuad attenuation from 0 dB at the speaker to `floor` at `max_distance`.
pub fn attenuation_db(distance: f32, max_distance: f32, floor: f32) -> f32 {
    if distance < 1.0 {
        return 0.0;
    }
    floor * ease_in_out_quad(distance / max_distance)
}

/// Linear gain for a speaker `distance` tiles away.
///
/// Distances below zero or above [`MAX_DISTANCE`] (and NaN) give exactly zero:
/// out-of-range speakers are silent, not full volume. Every in-range distance
/// gives a strictly positive gain no quieter than `floor`.
pub fn distance_gain(distance: f32, floor: f32) -> f32 {
    if !(0.0..=MAX_DISTANCE).contains(&distance) {
        return 0.0;
    }
    db_to_linear(attenuation_db(distance, MAX_DISTANCE, floor).max(floor))
}

pub fn constant(gain: f32) -> GainSupplier {
    Arc::new(move || gain)
}

/// Gain that follows a live distance reading; `None` means the speaker is gone.
pub fn follow_distance<F>(distance: F, floor: f32) -> GainSupplier
where
    F: Fn() -> Option<f32> + Send + Sync + 'static,
{
    Arc::new(move || distance().map(|d| distance_gain(d, floor)).unwrap_or(0.0))
}

fn ease_in_out_quad(x: f32) -> f32 {
    if x < 0.5 {
        2.0 * x * x
    } else {
        1.0 - (-2.0 * x + 2.0).powi(2) / 2.0
    }
}

/// Scale PCM16 samples by a linear gain, saturating at the i16 range.
pub fn apply_gain(samples: &mut [i16], gain: f32) {
    if (gain - 1.0).abs() <= f32::EPSILON {
        return;
    }
    for s in samples.iter_mut() {
        *s = (*s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attenuation_reaches_floor_at_max_distance() {
        assert_eq!(attenuation_db(0.5, 15.0, NPC_FLOOR), 0.0);
        assert!((attenuation_db(15.0, 15.0, NPC_FLOOR) - NPC_FLOOR).abs() < 1e-4);
    }

    #[test]
    fn volume_curve() {
        assert_eq!(volume_to_db(100), 0.0);
        assert_eq!(volume_to_db(0), NOISE_FLOOR);
        assert!(volume_to_db(50) < 0.0);
    }

    #[test]
    fn apply_gain_saturates() {
        let mut s = [i16::MAX, -100, 100];
        apply_gain(&mut s, 2.0);
        assert_eq!(s, [i16::MAX, -200, 200]);
        apply_gain(&mut s, 0.0);
        assert_eq!(s, [0, 0, 0]);
    }
}
