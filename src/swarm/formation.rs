//! Formation geometry.
//!
//! Slot offsets are expressed in the leader's local frame: +Y is the
//! direction of travel, +X is the leader's right, +Z is up. Slot index
//! equals agent id; slot 0 is always the leader at the origin.

use glam::DVec3;

use super::Formation;

/// Compute the local slot offset table for a swarm of `n` agents.
///
/// Spacing comes from the live separation parameter so the separation force
/// does not immediately fight the formation layout.
pub fn slot_offsets(n: usize, formation: Formation, spacing: f64) -> Vec<DVec3> {
    let mut offsets = vec![DVec3::ZERO; n];

    match formation {
        Formation::Line => {
            // single column trailing the leader
            for (i, slot) in offsets.iter_mut().enumerate().skip(1) {
                *slot = DVec3::new(0.0, -(i as f64) * spacing, 0.0);
            }
        }
        Formation::FlyingV => {
            // left/right pairs, each wing ring one step farther back
            for (i, slot) in offsets.iter_mut().enumerate().skip(1) {
                let wing = ((i + 1) / 2) as f64;
                let side = if i % 2 == 1 { -1.0 } else { 1.0 };
                *slot = DVec3::new(side * wing * spacing, -wing * spacing, 0.0);
            }
        }
        Formation::Circle => {
            // leader centered, followers evenly spread on the ring
            for (i, slot) in offsets.iter_mut().enumerate().skip(1) {
                let theta = 2.0 * std::f64::consts::PI * (i as f64 - 1.0) / (n as f64 - 1.0);
                *slot = DVec3::new(spacing * theta.cos(), spacing * theta.sin(), 0.0);
            }
        }
    }

    offsets
}

/// Rotate a local slot offset into world space given the leader's velocity.
///
/// Builds a right-handed orthonormal frame from the heading. A near-zero
/// velocity returns the offset unrotated; a near-vertical heading swaps the
/// reference vertical for +X to avoid a degenerate cross product.
pub fn rotate_offset(offset: DVec3, leader_velocity: DVec3) -> DVec3 {
    let mag = leader_velocity.length();
    if mag < 1e-6 {
        return offset;
    }
    let heading = leader_velocity / mag;

    let vertical = if heading.x.abs() < 1e-3 && heading.y.abs() < 1e-3 {
        DVec3::X
    } else {
        DVec3::Z
    };

    let mut right = vertical.cross(heading);
    right /= right.length().max(1e-6);
    let mut up = heading.cross(right);
    up /= up.length().max(1e-6);

    offset.x * right + offset.y * heading + offset.z * up
}

/// Evenly distributed offsets on a sphere of the given radius, used to
/// arrange followers around the beacon once the leader arrives.
pub fn fibonacci_sphere(count: usize, radius: f64) -> Vec<DVec3> {
    let golden = std::f64::consts::PI * (1.0 + 5.0f64.sqrt());
    (0..count)
        .map(|i| {
            let t = (i as f64 + 0.5) / count as f64;
            let phi = (1.0 - 2.0 * t).acos();
            let theta = golden * i as f64;
            DVec3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_is_always_origin() {
        for f in [Formation::Line, Formation::FlyingV, Formation::Circle] {
            let slots = slot_offsets(7, f, 10.0);
            assert_eq!(slots.len(), 7);
            assert_eq!(slots[0], DVec3::ZERO);
        }
    }

    #[test]
    fn line_trails_along_negative_y() {
        let slots = slot_offsets(4, Formation::Line, 10.0);
        assert_eq!(slots[1], DVec3::new(0.0, -10.0, 0.0));
        assert_eq!(slots[2], DVec3::new(0.0, -20.0, 0.0));
        assert_eq!(slots[3], DVec3::new(0.0, -30.0, 0.0));
    }

    #[test]
    fn flying_v_alternates_sides() {
        let slots = slot_offsets(5, Formation::FlyingV, 10.0);
        assert_eq!(slots[1], DVec3::new(-10.0, -10.0, 0.0));
        assert_eq!(slots[2], DVec3::new(10.0, -10.0, 0.0));
        assert_eq!(slots[3], DVec3::new(-20.0, -20.0, 0.0));
        assert_eq!(slots[4], DVec3::new(20.0, -20.0, 0.0));
    }

    #[test]
    fn circle_spreads_followers_on_ring() {
        let slots = slot_offsets(5, Formation::Circle, 10.0);
        for slot in &slots[1..] {
            assert!((slot.length() - 10.0).abs() < 1e-9);
        }
        // first follower sits at angle zero
        assert!((slots[1] - DVec3::new(10.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn identical_formation_calls_are_idempotent() {
        let a = slot_offsets(9, Formation::Circle, 10.0);
        let b = slot_offsets(9, Formation::Circle, 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn rotation_is_identity_for_stationary_leader() {
        let offset = DVec3::new(3.0, -4.0, 1.0);
        assert_eq!(rotate_offset(offset, DVec3::ZERO), offset);
    }

    #[test]
    fn rotation_keeps_offsets_perpendicular_to_heading() {
        let offset = DVec3::new(10.0, -10.0, 0.0);

        // heading +Y: lateral axis is Z x Y = -X, trail stays along -Y
        let world = rotate_offset(offset, DVec3::new(0.0, 2.0, 0.0));
        assert!((world - DVec3::new(-10.0, -10.0, 0.0)).length() < 1e-9);

        // heading +X: lateral axis is Z x X = +Y, trail swings to -X
        let world = rotate_offset(offset, DVec3::new(3.0, 0.0, 0.0));
        assert!((world - DVec3::new(-10.0, 10.0, 0.0)).length() < 1e-9);

        // magnitude is preserved for any heading
        let world = rotate_offset(offset, DVec3::new(1.0, 2.0, 0.5));
        assert!((world.length() - offset.length()).abs() < 1e-9);

        // rotated offsets stay perpendicular to the heading for planar slots
        let heading = DVec3::new(1.0, 2.0, 0.0).normalize();
        let lateral = rotate_offset(DVec3::new(10.0, 0.0, 0.0), heading);
        assert!(lateral.dot(heading).abs() < 1e-9);
    }

    #[test]
    fn rotation_handles_vertical_heading() {
        let offset = DVec3::new(5.0, 0.0, 0.0);
        let world = rotate_offset(offset, DVec3::new(0.0, 0.0, 4.0));
        assert!(world.is_finite());
        assert!((world.length() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn fibonacci_sphere_lies_on_radius() {
        let pts = fibonacci_sphere(8, 8.4);
        assert_eq!(pts.len(), 8);
        for p in &pts {
            assert!((p.length() - 8.4).abs() < 1e-9);
        }
        // points are distinct
        for i in 0..pts.len() {
            for j in i + 1..pts.len() {
                assert!(pts[i].distance(pts[j]) > 1.0);
            }
        }
    }
}
