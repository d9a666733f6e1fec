//! Scalar recursive estimator fusing venue mids into one fair value
//!
//! State model is a random walk: `v_t = v_{t-1} + w`, `Var(w) = q`.
//! Each venue mid is a noisy observation `y = v + e`, `Var(e) = R`.

/// Added to venue age so a zero-age quote does not divide by zero
pub const AGE_EPSILON: f64 = 1e-3;

/// One noisy observation of the fair value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub variance: f64,
}

/// Estimator output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub variance: f64,
}

/// Measurement noise of a venue quote as a function of its age and spread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub r0: f64,
    pub r1: f64,
    pub r2: f64,
}

impl NoiseModel {
    /// `1 / (age + eps)`: large for fresh quotes
    pub fn freshness_weight(age_secs: f64) -> f64 {
        1.0 / (age_secs.max(0.0) + AGE_EPSILON)
    }

    /// `r0 + r1 / weight + r2 * spread^2`. Fresher venues (higher weight) and
    /// tighter spreads give a smaller variance.
    pub fn variance(&self, age_secs: f64, spread: f64) -> f64 {
        self.r0 + self.r1 / Self::freshness_weight(age_secs) + self.r2 * spread * spread
    }
}

/// One-dimensional Kalman filter
#[derive(Debug, Clone)]
pub struct RecursiveEstimator {
    value: Option<f64>,
    /// State variance (uncertainty about `value`)
    variance: f64,
    /// Process noise
    q: f64,
}

impl RecursiveEstimator {
    pub fn new(q_process: f64) -> Self {
        Self {
            value: None,
            variance: 1.0,
            q: q_process,
        }
    }

    /// Predict-update cycle over a batch of measurements
    ///
    /// An uninitialized estimator is seeded from the first measurement, which
    /// is consumed. The remaining measurements are folded in after the predict
    /// step. With no measurements the previous estimate is returned unchanged.
    pub fn step(&mut self, measurements: &[Measurement]) -> Option<Estimate> {
        if measurements.is_empty() {
            return self.estimate();
        }

        let (mut v, mut p, rest) = match self.value {
            Some(v) => (v, self.variance, measurements),
            None => {
                let seed = measurements[0];
                (seed.value, seed.variance, &measurements[1..])
            }
        };

        // Predict: random walk, only the uncertainty grows
        p += self.q;

        for m in rest {
            let denom = p + m.variance;
            if !(denom > 0.0) {
                continue;
            }
            let gain = p / denom;
            v += gain * (m.value - v);
            p *= 1.0 - gain;
        }

        self.value = Some(v);
        self.variance = p;
        self.estimate()
    }

    pub fn estimate(&self) -> Option<Estimate> {
        self.value.map(|value| Estimate {
            value,
            variance: self.variance,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }
}

/// Freshness-weighted mean of `(mid, age_secs)` pairs with the weighted
/// dispersion of the mids around it
pub fn inverse_age_mean(points: &[(f64, f64)]) -> Option<Estimate> {
    let weights: Vec<f64> = points
        .iter()
        .map(|(_, age)| NoiseModel::freshness_weight(*age))
        .collect();
    let total: f64 = weights.iter().sum();
    if points.is_empty() || !(total > 0.0) {
        return None;
    }

    let mean = points
        .iter()
        .zip(&weights)
        .map(|((mid, _), w)| w * mid)
        .sum::<f64>()
        / total;
    let dispersion = points
        .iter()
        .zip(&weights)
        .map(|((mid, _), w)| w * (mid - mean).powi(2))
        .sum::<f64>()
        / total;

    Some(Estimate {
        value: mean,
        variance: dispersion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(value: f64, variance: f64) -> Measurement {
        Measurement { value, variance }
    }

    #[test]
    fn test_uninitialized_without_measurements() {
        let mut kf = RecursiveEstimator::new(1e-5);
        assert!(kf.step(&[]).is_none());
        assert!(!kf.is_initialized());
    }

    #[test]
    fn test_seed_from_first_measurement() {
        let mut kf = RecursiveEstimator::new(0.5);
        let est = kf.step(&[m(100.0, 2.0)]).unwrap();
        assert_eq!(est.value, 100.0);
        // Seed variance plus one predict step
        assert_eq!(est.variance, 2.5);
    }

    #[test]
    fn test_empty_step_returns_previous() {
        let mut kf = RecursiveEstimator::new(0.1);
        let first = kf.step(&[m(100.0, 1.0)]).unwrap();
        assert_eq!(kf.step(&[]), Some(first));
        assert_eq!(kf.step(&[]), Some(first));
    }

    #[test]
    fn test_update_hand_computed() {
        let mut kf = RecursiveEstimator::new(1.0);
        kf.step(&[m(100.0, 1.0)]); // v = 100, P = 2
        let est = kf.step(&[m(110.0, 2.0)]).unwrap();
        // P' = 3, K = 3 / 5, v = 100 + 0.6 * 10, P = 0.4 * 3
        assert!((est.value - 106.0).abs() < 1e-12);
        assert!((est.variance - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_fold_order_does_not_change_result() {
        let batch = [m(100.0, 1.0), m(101.0, 0.5), m(99.5, 2.0)];
        let mut reversed = batch;
        reversed.reverse();

        let mut a = RecursiveEstimator::new(0.1);
        let mut b = RecursiveEstimator::new(0.1);
        a.step(&[m(100.2, 1.0)]);
        b.step(&[m(100.2, 1.0)]);

        let ea = a.step(&batch).unwrap();
        let eb = b.step(&reversed).unwrap();
        assert!((ea.value - eb.value).abs() < 1e-9);
        assert!((ea.variance - eb.variance).abs() < 1e-12);
    }

    #[test]
    fn test_diffuse_prior_gives_inverse_variance_weighting() {
        let mut kf = RecursiveEstimator::new(0.0);
        kf.step(&[m(50005.0, 1e6)]);
        let est = kf.step(&[m(50010.0, 1.0), m(50000.0, 4.0)]).unwrap();
        let expected = (50010.0 / 1.0 + 50000.0 / 4.0) / (1.0 / 1.0 + 1.0 / 4.0);
        assert!((est.value - expected).abs() < 1e-3);
        assert!((est.variance - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_zero_variance_does_not_produce_nan() {
        let mut kf = RecursiveEstimator::new(0.0);
        kf.step(&[m(100.0, 0.0)]);
        let est = kf.step(&[m(101.0, 0.0)]).unwrap();
        assert!(est.value.is_finite());
        assert_eq!(est.value, 100.0);
    }

    #[test]
    fn test_noise_model_prefers_fresh_and_tight() {
        let model = NoiseModel {
            r0: 1.0,
            r1: 10.0,
            r2: 0.5,
        };
        assert!(model.variance(0.01, 1.0) < model.variance(0.2, 1.0));
        assert!(model.variance(0.01, 1.0) < model.variance(0.01, 2.0));
        assert!((model.variance(0.0, 0.0) - (1.0 + 10.0 * AGE_EPSILON)).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_age_mean_reference_case() {
        let est = inverse_age_mean(&[(50010.0, 0.010), (50000.0, 0.200)]).unwrap();
        let w1 = 1.0 / (0.01 + AGE_EPSILON);
        let w2 = 1.0 / (0.2 + AGE_EPSILON);
        let expected = (w1 * 50010.0 + w2 * 50000.0) / (w1 + w2);
        assert!((est.value - expected).abs() < 1e-9);
        assert!((est.value - 50009.48).abs() < 0.01);
        assert!(est.variance > 0.0);
        assert!(inverse_age_mean(&[]).is_none());
    }
}
