//! EWMA volatility of the fused fair price

/// Exponentially weighted moving average with a half-life in samples
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: f64,
    warmed_up: bool,
}

impl Ewma {
    /// `alpha = 1 - exp(ln(0.5) / halflife)`; a non-positive half-life falls back to 1
    pub fn from_halflife(halflife: f64) -> Self {
        let halflife = if halflife > 0.0 { halflife } else { 1.0 };
        Self {
            alpha: 1.0 - (0.5_f64.ln() / halflife).exp(),
            value: 0.0,
            warmed_up: false,
        }
    }

    /// Blend in a new point. The first point seeds the average.
    pub fn update(&mut self, point: f64) -> f64 {
        if self.warmed_up {
            self.value = self.alpha * point + (1.0 - self.alpha) * self.value;
        } else {
            self.value = point;
            self.warmed_up = true;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }
}

/// Tracks the EWMA of squared (annualized) log-returns of the fair price
#[derive(Debug, Clone)]
pub struct VolatilityTracker {
    ewma: Ewma,
    ann_factor: f64,
    prev_fair: Option<f64>,
}

impl VolatilityTracker {
    pub fn new(halflife_s: f64, ann_factor: f64) -> Self {
        Self {
            ewma: Ewma::from_halflife(halflife_s),
            ann_factor,
            prev_fair: None,
        }
    }

    /// Record a fair price and return the current sigma.
    /// The first observation only sets the reference price.
    pub fn observe(&mut self, fair: f64) -> f64 {
        if let Some(prev) = self.prev_fair {
            if prev > 0.0 && fair > 0.0 {
                let r = (fair / prev).ln();
                self.ewma.update(r * r * self.ann_factor);
            }
        }
        if fair > 0.0 && fair.is_finite() {
            self.prev_fair = Some(fair);
        }
        self.sigma()
    }

    pub fn variance(&self) -> f64 {
        self.ewma.value()
    }

    pub fn sigma(&self) -> f64 {
        self.ewma.value().max(0.0).sqrt()
    }
}
