//! Gain parameter with a single linear ramp.

/// A scheduled linear transition, in seconds of context time.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: f32,
    to: f32,
    start: f64,
    end: f64,
}

/// Gain value plus at most one pending ramp.
#[derive(Debug, Clone)]
pub(crate) struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    pub(crate) fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Value at time `t` (seconds).
    pub(crate) fn value_at(&self, t: f64) -> f32 {
        let Some(r) = self.ramp else {
            return self.value;
        };
        if t <= r.start {
            r.from
        } else if t >= r.end {
            r.to
        } else {
            let progress = ((t - r.start) / (r.end - r.start)) as f32;
            r.from + (r.to - r.from) * progress
        }
    }

    pub(crate) fn set(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Freezes at the value reached at `t`.
    pub(crate) fn cancel(&mut self, t: f64) -> f32 {
        self.value = self.value_at(t);
        self.ramp = None;
        self.value
    }

    /// Replaces any ramp with one from the value held at `start` to `target`.
    pub(crate) fn ramp(&mut self, target: f32, start: f64, end: f64) {
        let from = self.value_at(start);
        if end <= start {
            self.set(target);
            return;
        }
        self.ramp = Some(Ramp {
            from,
            to: target,
            start,
            end,
        });
    }

    /// Drops a ramp that has fully elapsed at `t`.
    pub(crate) fn settle(&mut self, t: f64) {
        if let Some(r) = self.ramp {
            if t >= r.end {
                self.value = r.to;
                self.ramp = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_interpolates() {
        let mut p = GainParam::new(1.0);
        p.ramp(0.0, 1.0, 2.0);
        assert_eq!(p.value_at(0.5), 1.0);
        assert!((p.value_at(1.5) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(2.5), 0.0);
    }

    #[test]
    fn test_cancel_freezes_midway() {
        let mut p = GainParam::new(0.0);
        p.ramp(1.0, 0.0, 1.0);
        let v = p.cancel(0.25);
        assert!((v - 0.25).abs() < 1e-6);
        assert!((p.value_at(10.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_new_ramp_starts_from_current() {
        let mut p = GainParam::new(1.0);
        p.ramp(0.0, 0.0, 1.0);
        p.ramp(1.0, 0.5, 1.5);
        assert!((p.value_at(0.5) - 0.5).abs() < 1e-6);
        assert!((p.value_at(1.0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_settle_and_empty_ramp() {
        let mut p = GainParam::new(1.0);
        p.ramp(0.2, 0.0, 1.0);
        p.settle(1.0);
        assert_eq!(p.value_at(0.0), 0.2);

        p.ramp(0.7, 3.0, 3.0);
        assert_eq!(p.value_at(0.0), 0.7);
    }
}
