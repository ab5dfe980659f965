//! Exponential moving average

/// First-order exponential smoother: `state = alpha * x + (1 - alpha) * state`.
///
/// The first sample initializes the state directly.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    alpha: f32,
    state: Option<f32>,
}

impl ExponentialMovingAverage {
    /// `alpha` is the weight of the newest sample, clamped to `[0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn update(&mut self, value: f32) -> f32 {
        let next = match self.state {
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
            None => value,
        };
        self.state = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ema() {
        let mut ema = ExponentialMovingAverage::new(0.8);
        assert!(ema.value().is_none());
        assert_eq!(ema.update(100.0), 100.0);
        assert_relative_eq!(ema.update(150.0), 140.0, epsilon = 1e-4);
        assert_relative_eq!(ema.update(150.0), 148.0, epsilon = 1e-4);
        ema.reset();
        assert!(ema.value().is_none());
    }

    #[test]
    fn test_alpha_one_passes_through() {
        let mut ema = ExponentialMovingAverage::new(1.5);
        ema.update(10.0);
        assert_eq!(ema.update(-3.0), -3.0);
    }
}
