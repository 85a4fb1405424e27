// Integer log-domain arithmetic.
//
// Every score in the decoder (acoustic, grammar, beam width, penalty) lives
// in a common integer log domain: log base `b` of a linear probability,
// with `b` chosen very close to 1 so that scores are finely quantised
// integers. Addition of scores corresponds to multiplication of
// probabilities.

/// Sentinel score for "inactive / no path".
///
/// Chosen far below any reachable score but far enough from `i32::MIN` that
/// adding a beam width or a transition probability to it cannot wrap.
pub const WORST_SCORE: i32 = i32::MIN / 2;

/// Conversion context between linear probabilities and integer log scores.
#[derive(Debug, Clone, Copy)]
pub struct LogMath {
    /// `1 / ln(base)`; multiplying a natural log by this yields a log-base
    /// score.
    inv_ln_base: f64,
}

impl LogMath {
    /// Default log base. Small enough that a score step is ~1/10000 of a
    /// natural-log unit.
    pub const DEFAULT_BASE: f64 = 1.0001;

    /// Create a conversion context for the given base (must be > 1).
    pub fn new(base: f64) -> Self {
        assert!(base > 1.0, "log base must be > 1, got {base}");
        Self {
            inv_ln_base: 1.0 / base.ln(),
        }
    }

    /// Convert a linear probability to an integer log score.
    ///
    /// Zero and negative probabilities map to [`WORST_SCORE`].
    pub fn log(&self, p: f64) -> i32 {
        if p <= 0.0 {
            return WORST_SCORE;
        }
        self.ln_to_log(p.ln())
    }

    /// Convert a natural-log value to an integer log score.
    pub fn ln_to_log(&self, ln: f64) -> i32 {
        let score = ln * self.inv_ln_base;
        if score <= WORST_SCORE as f64 {
            WORST_SCORE
        } else {
            score.round() as i32
        }
    }

    /// Convert an integer log score back to a natural-log value.
    pub fn log_to_ln(&self, score: i32) -> f64 {
        score as f64 / self.inv_ln_base
    }

    /// Convert an integer log score back to a linear probability.
    pub fn exp(&self, score: i32) -> f64 {
        if score <= WORST_SCORE {
            0.0
        } else {
            self.log_to_ln(score).exp()
        }
    }
}

impl Default for LogMath {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_of_one_is_zero() {
        let lm = LogMath::default();
        assert_eq!(lm.log(1.0), 0);
    }

    #[test]
    fn log_of_zero_is_worst() {
        let lm = LogMath::default();
        assert_eq!(lm.log(0.0), WORST_SCORE);
        assert_eq!(lm.log(-0.5), WORST_SCORE);
    }

    #[test]
    fn log_is_monotonic() {
        let lm = LogMath::default();
        let a = lm.log(0.5);
        let b = lm.log(0.25);
        let c = lm.log(0.125);
        assert!(a > b);
        assert!(b > c);
        // Multiplication of probabilities is addition of scores.
        assert!((b - (a + a)).abs() <= 1);
        assert!((c - (a + b)).abs() <= 1);
    }

    #[test]
    fn exp_round_trips() {
        let lm = LogMath::default();
        for &p in &[1.0, 0.5, 0.005, 1e-8, 7e-29] {
            let back = lm.exp(lm.log(p));
            assert!((back - p).abs() / p < 1e-3, "p={p} back={back}");
        }
        assert_eq!(lm.exp(WORST_SCORE), 0.0);
    }

    #[test]
    fn tiny_probabilities_stay_finite() {
        let lm = LogMath::default();
        let s = lm.log(1e-48);
        assert!(s > WORST_SCORE);
        assert!(s < 0);
    }
}
