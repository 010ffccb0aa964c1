use std::sync::{
    PoisonError,
    RwLock,
};

/// Running count/min/max/mean/variance of a sample stream, without keeping the samples.
///
/// Writers take the lock exclusively, readers share it, so a reader always sees the
/// aggregates of some whole number of `add` calls.
#[derive(Debug, Default)]
pub struct Stats {
    inner: RwLock<Welford>,
}

/// A consistent copy of the accumulator, taken under a single read lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Standard deviation over mean, absent when the mean is zero.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        (self.mean != 0.0).then(|| self.std_dev() / self.mean)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Welford {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        // rounding can leave the running mean a ulp outside [min, max]
        self.mean.clamp(self.min, self.max)
    }

    fn variance(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).max(0.0)
        } else {
            0.0
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: f64) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).add(value);
    }

    pub fn reset(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Welford::default();
    }

    pub fn count(&self) -> u64 {
        self.read().count
    }

    /// Smallest sample seen, `None` before the first one.
    pub fn min(&self) -> Option<f64> {
        let inner = self.read();
        (inner.count > 0).then_some(inner.min)
    }

    /// Largest sample seen, `None` before the first one.
    pub fn max(&self) -> Option<f64> {
        let inner = self.read();
        (inner.count > 0).then_some(inner.max)
    }

    pub fn mean(&self) -> f64 {
        self.read().mean()
    }

    /// Sample variance (n - 1 denominator); `0` with fewer than two samples.
    pub fn variance(&self) -> f64 {
        self.read().variance()
    }

    /// All aggregates at once, or `None` if nothing was added yet.
    pub fn summary(&self) -> Option<Summary> {
        let inner = self.read();
        (inner.count > 0).then(|| Summary {
            count: inner.count,
            mean: inner.mean(),
            variance: inner.variance(),
            min: inner.min,
            max: inner.max,
        })
    }

    fn read(&self) -> Welford {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
