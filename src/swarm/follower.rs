//! Carrot-chasing path follower.
//!
//! Pure pursuit along a waypoint polyline: consume waypoints within the
//! tolerance, walk `lookahead` meters further along the path to find the
//! carrot, and steer at it with the current speed magnitude preserved.

use glam::DVec3;

const DEFAULT_LOOKAHEAD: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct PathFollower {
    waypoints: Vec<DVec3>,
    current: usize,
    lookahead: f64,
    tolerance: f64,
}

impl PathFollower {
    /// `tolerance` is typically the grid resolution.
    pub fn new(tolerance: f64) -> Self {
        PathFollower {
            waypoints: Vec::new(),
            current: 0,
            lookahead: DEFAULT_LOOKAHEAD,
            tolerance,
        }
    }

    pub fn set_lookahead(&mut self, lookahead: f64) {
        self.lookahead = lookahead;
    }

    /// Bind a new path and rewind the waypoint cursor.
    pub fn set_path(&mut self, waypoints: Vec<DVec3>) {
        self.waypoints = waypoints;
        self.current = 0;
    }

    pub fn waypoints(&self) -> &[DVec3] {
        &self.waypoints
    }

    /// All waypoints consumed (or no path bound).
    pub fn is_exhausted(&self) -> bool {
        self.current >= self.waypoints.len()
    }

    /// Advance past reached waypoints and compute the pursuit velocity for
    /// the leader. Returns `None` when there is nothing to chase: empty or
    /// fully consumed path, or the carrot is already underfoot.
    ///
    /// Only the direction changes; the commanded speed magnitude carries
    /// over from the current velocity.
    pub fn desired_velocity(&mut self, pos: DVec3, vel: DVec3) -> Option<DVec3> {
        while self.current < self.waypoints.len() {
            if pos.distance(self.waypoints[self.current]) < self.tolerance {
                self.current += 1;
            } else {
                break;
            }
        }
        if self.current >= self.waypoints.len() {
            return None;
        }

        let carrot = self.compute_carrot();
        let to_carrot = carrot - pos;
        let dist = to_carrot.length();
        if dist < 1e-6 {
            return None;
        }

        let speed = vel.length();
        Some(to_carrot / dist * speed)
    }

    /// Walk the polyline from the cursor, accumulating segment lengths until
    /// `lookahead` is spent; interpolate within the final segment. If the
    /// remaining path is shorter than the lookahead the carrot is the last
    /// waypoint.
    fn compute_carrot(&self) -> DVec3 {
        let mut remain = self.lookahead;
        for w in self.waypoints[self.current..].windows(2) {
            let seg = w[1] - w[0];
            let seg_len = seg.length();
            if remain < seg_len {
                return w[0] + seg * (remain / seg_len);
            }
            remain -= seg_len;
        }
        self.waypoints[self.waypoints.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_path() -> Vec<DVec3> {
        (0..=10)
            .map(|i| DVec3::new(i as f64 * 5.0, 0.0, 20.0))
            .collect()
    }

    #[test]
    fn empty_path_is_a_noop() {
        let mut f = PathFollower::new(5.0);
        assert!(f.is_exhausted());
        assert_eq!(f.desired_velocity(DVec3::ZERO, DVec3::X), None);
    }

    #[test]
    fn carrot_sits_lookahead_meters_ahead() {
        let mut f = PathFollower::new(5.0);
        f.set_path(straight_path());
        let vel = f
            .desired_velocity(DVec3::new(6.0, 0.0, 20.0), DVec3::new(2.0, 0.0, 0.0))
            .unwrap();
        // straight +X path: direction +X, speed preserved
        assert!((vel - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn speed_magnitude_is_preserved_in_turns() {
        let mut f = PathFollower::new(1.0);
        f.set_lookahead(14.0); // reaches past the corner
        f.set_path(vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::new(10.0, 10.0, 0.0),
        ]);
        let vel = f
            .desired_velocity(DVec3::new(8.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0))
            .unwrap();
        assert!((vel.length() - 3.0).abs() < 1e-9);
        // lookahead wraps the corner, so the carrot pulls into +Y
        assert!(vel.y > 0.0);
    }

    #[test]
    fn waypoints_within_tolerance_are_consumed() {
        let mut f = PathFollower::new(5.0);
        f.set_path(straight_path());
        // standing within tolerance of the first two waypoints
        let _ = f.desired_velocity(DVec3::new(4.0, 0.0, 20.0), DVec3::X);
        assert_eq!(f.current, 2);
    }

    #[test]
    fn path_end_reports_none_and_exhausts() {
        let mut f = PathFollower::new(5.0);
        f.set_path(vec![DVec3::new(0.0, 0.0, 20.0)]);
        assert_eq!(f.desired_velocity(DVec3::new(1.0, 0.0, 20.0), DVec3::X), None);
        assert!(f.is_exhausted());
        // rebinding rewinds the cursor
        f.set_path(straight_path());
        assert!(!f.is_exhausted());
    }

    #[test]
    fn short_remaining_path_targets_last_waypoint() {
        let mut f = PathFollower::new(0.5);
        f.set_path(vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(4.0, 0.0, 0.0)]);
        // remaining path (4 m) is shorter than the 10 m lookahead
        let vel = f
            .desired_velocity(DVec3::new(1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!((vel - DVec3::new(1.0, 0.0, 0.0)).length() < 1e-9);
    }
}
