//! Position and velocity arithmetic for MX-series servos in wheel mode.
//!
//! Positions are normalized into one rotation after applying the
//! per-actuator calibration offset. Velocities use the wire encoding where
//! bit 10 (value 1024) flips the turning direction.
//!
//! # Example
//! ```rust
//! use dxl_core::utils::math::position::{encode_velocity, normalize_position};
//! assert_eq!(normalize_position(4000, 200, 4096), 104);
//! assert_eq!(encode_velocity(300, true), 1324);
//! ```

/// Position units in one full rotation of an MX-series servo.
pub const DYN_ROTATION_TICKS: u16 = 4096;

/// Added to a moving-speed value to command the opposite direction.
pub const REVERSE_DIRECTION_OFFSET: u16 = 1024;

/// Apply `offset` to a raw reading and wrap it into `[0, rotation_ticks)`.
///
/// Uses Euclidean remainder so negative or oversized offsets still yield a
/// well-formed angle. `rotation_ticks` must be non-zero.
#[inline]
pub fn normalize_position(
    raw: u16,
    offset: i32,
    rotation_ticks: u16,
) -> u16 {
    let shifted = i64::from(raw) + i64::from(offset);
    shifted.rem_euclid(i64::from(rotation_ticks)) as u16
}

/// Moving-speed register value for a goal velocity.
///
/// Reversed actuators get [`REVERSE_DIRECTION_OFFSET`] added on top of the
/// requested magnitude. The input is never modified, so building the same
/// command twice gives the same value.
#[inline]
pub fn encode_velocity(
    goal_velocity: u16,
    reversed: bool,
) -> u16 {
    if reversed {
        goal_velocity.wrapping_add(REVERSE_DIRECTION_OFFSET)
    } else {
        goal_velocity
    }
}

/// Absolute distance between two positions, in ticks.
#[inline]
pub fn position_error(
    current: u16,
    goal: u16,
) -> u16 {
    current.abs_diff(goal)
}

/// Strictly inside the tolerance band around `goal`.
#[inline]
pub fn within_tolerance(
    current: u16,
    goal: u16,
    tolerance: u16,
) -> bool {
    position_error(current, goal) < tolerance
}

/// Whether some normalized position in `[0, rotation_ticks)` can ever get
/// within `tolerance` of `goal`.
#[inline]
pub fn goal_reachable(
    goal: u16,
    tolerance: u16,
    rotation_ticks: u16,
) -> bool {
    let last = u32::from(rotation_ticks).saturating_sub(1);
    u32::from(goal) < last + u32::from(tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_wraps_past_full_rotation() {
        assert_eq!(normalize_position(4095, 1, DYN_ROTATION_TICKS), 0);
        assert_eq!(normalize_position(4000, 200, DYN_ROTATION_TICKS), 104);
    }

    #[test]
    fn test_normalize_negative_offset() {
        assert_eq!(normalize_position(10, -20, DYN_ROTATION_TICKS), 4086);
        assert_eq!(normalize_position(0, -4096 * 3, DYN_ROTATION_TICKS), 0);
    }

    #[test]
    fn test_normalize_range_sweep() {
        let offsets = [i32::MIN, -70_000, -4097, -1, 0, 1, 2048, 4096, 70_000, i32::MAX];
        for &offset in offsets.iter() {
            for raw in (0..=u16::MAX).step_by(97) {
                let pos = normalize_position(raw, offset, DYN_ROTATION_TICKS);
                assert!(pos < DYN_ROTATION_TICKS, "raw {} offset {} -> {}", raw, offset, pos);
                let expected = (i64::from(raw) + i64::from(offset)).rem_euclid(4096);
                assert_eq!(i64::from(pos), expected);
            }
        }
    }

    #[test]
    fn test_encode_velocity_reversal() {
        assert_eq!(encode_velocity(300, false), 300);
        assert_eq!(encode_velocity(300, true), 1324);
        // Building twice from the same input never stacks the offset.
        let first = encode_velocity(300, true);
        let second = encode_velocity(300, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_within_tolerance_is_strict() {
        assert!(within_tolerance(100, 104, 5));
        assert!(within_tolerance(104, 100, 5));
        assert!(!within_tolerance(100, 105, 5));
        assert!(!within_tolerance(0, 4095, 5));
    }

    #[test]
    fn test_goal_reachable_near_end_of_rotation() {
        assert!(goal_reachable(0, 5, 4096));
        assert!(goal_reachable(4095, 5, 4096));
        assert!(goal_reachable(4099, 5, 4096));
        assert!(!goal_reachable(4100, 5, 4096));
        assert!(!goal_reachable(5000, 5, 4096));
    }
}
