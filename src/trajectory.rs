use crate::config::Config;
use crate::my_types::*;

/// Summary of an accepted trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryShape {
    pub mean: Vector2f,
    /// Per-axis standard deviation of the positions
    pub var: Vector2f,
    /// Sum of the step lengths
    pub length: f32,
    /// Step vectors divided by `length`, one per tracked frame
    pub displacements: Vec<Vector2f>,
}

/// Shape filter applied to finished trajectories before emission.
#[derive(Clone, Debug)]
pub struct TrajectoryValidator {
    pub min_var: f32,
    pub max_var: f32,
    pub max_dis: f32,
}

/// A single step longer than this share of the path is a tracking jump
const MAX_STEP_SHARE: f32 = 0.7;

impl TrajectoryValidator {
    pub fn new(config: &Config) -> Self {
        TrajectoryValidator {
            min_var: config.min_var,
            max_var: config.max_var,
            max_dis: config.max_dis,
        }
    }

    /// `None` for static, erratic or jumping trajectories.
    pub fn validate(&self, points: &[Vector2f]) -> Option<TrajectoryShape> {
        if points.len() < 2 {
            return None;
        }
        let norm = 1. / points.len() as f32;
        let mean = points.iter().sum::<Vector2f>() * norm;
        let var = points
            .iter()
            .map(|p| (p - mean).component_mul(&(p - mean)))
            .sum::<Vector2f>()
            * norm;
        let var = var.map(f32::sqrt);

        if var.x < self.min_var && var.y < self.min_var {
            return None;
        }
        if var.x > self.max_var || var.y > self.max_var {
            return None;
        }

        let steps: Vec<Vector2f> = points.windows(2).map(|w| w[1] - w[0]).collect();
        let mut length = 0.;
        let mut max_step = 0f32;
        for step in &steps {
            let n = step.norm();
            length += n;
            max_step = max_step.max(n);
        }
        if max_step > self.max_dis && max_step > length * MAX_STEP_SHARE {
            return None;
        }
        if length <= 0. {
            return None;
        }

        Some(TrajectoryShape {
            mean,
            var,
            length,
            displacements: steps.iter().map(|s| s / length).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn validator(min_var: f32) -> TrajectoryValidator {
        TrajectoryValidator {
            min_var,
            max_var: 50.,
            max_dis: 20.,
        }
    }

    fn line(start: (f32, f32), step: (f32, f32), n: usize) -> Vec<Vector2f> {
        (0..n)
            .map(|i| Vector2f::new(start.0 + step.0 * i as f32, start.1 + step.1 * i as f32))
            .collect()
    }

    #[test]
    fn test_uniform_motion() {
        let points = line((10., 10.), (1., 0.), 5);
        let shape = validator(1.).validate(&points).unwrap();
        assert_abs_diff_eq!(shape.mean.x, 12.);
        assert_abs_diff_eq!(shape.mean.y, 10.);
        assert_abs_diff_eq!(shape.var.x, 2f32.sqrt(), epsilon = 1e-6);
        assert_eq!(shape.var.y, 0.);
        assert_abs_diff_eq!(shape.length, 4.);
        assert_eq!(shape.displacements.len(), 4);
        for d in &shape.displacements {
            assert_abs_diff_eq!(d.x, 0.25);
            assert_eq!(d.y, 0.);
        }
    }

    #[test]
    fn test_static_rejected() {
        let points = vec![Vector2f::new(7., 7.); 16];
        assert!(validator(0.).validate(&points).is_none());
        assert!(validator(1.732).validate(&points).is_none());
        // slow drift stays under the default minimum spread
        let drift = line((5., 5.), (0.1, 0.1), 16);
        assert!(validator(1.732).validate(&drift).is_none());
    }

    #[test]
    fn test_erratic_rejected() {
        let wide: Vec<Vector2f> = (0..16)
            .map(|i| Vector2f::new(if i % 2 == 0 { 0. } else { 150. }, 0.))
            .collect();
        assert!(validator(1.).validate(&wide).is_none());
    }

    #[test]
    fn test_jump_rejected() {
        let mut points = line((0., 0.), (0.5, 0.), 15);
        let last = *points.last().unwrap();
        points.push(last + Vector2f::new(30., 0.));
        assert!(validator(1.).validate(&points).is_none());

        // the same large step is fine when it is a small share of the path
        let steady = line((0., 0.), (3., 0.), 16);
        assert!(validator(1.).validate(&steady).is_some());
    }
}
