//! Bracketed scalar root finding (Brent's method).
//!
//! Used to locate turning points of the effective potential and the exact
//! instants at which an integrated orbit crosses a turning point or the
//! capture radius.

use thiserror::Error;

/// Failure modes of [`Brent::find_root`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RootError {
    #[error("root not bracketed: f({a}) = {fa}, f({b}) = {fb}")]
    NotBracketed { a: f64, b: f64, fa: f64, fb: f64 },
    #[error("no convergence after {iterations} iterations (best estimate {best})")]
    MaxIterations { best: f64, iterations: usize },
}

/// A located root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    pub x: f64,
    pub fx: f64,
    pub iterations: usize,
}

/// Brent's method: bisection safeguarded inverse quadratic / secant steps.
#[derive(Debug, Clone, Copy)]
pub struct Brent {
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for Brent {
    fn default() -> Self {
        Self {
            tol: 1e-12,
            max_iter: 100,
        }
    }
}

impl Brent {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self { tol, max_iter }
    }

    /// Find a root of `f` in `[a, b]`. `fa` / `fb` may be supplied when
    /// already known to save evaluations.
    pub fn find_root<F>(
        &self,
        mut f: F,
        mut a: f64,
        mut b: f64,
        fa: Option<f64>,
        fb: Option<f64>,
    ) -> Result<Root, RootError>
    where
        F: FnMut(f64) -> f64,
    {
        let mut fa = fa.unwrap_or_else(|| f(a));
        let mut fb = fb.unwrap_or_else(|| f(b));

        if fa == 0.0 {
            return Ok(Root {
                x: a,
                fx: fa,
                iterations: 0,
            });
        }
        if fb == 0.0 {
            return Ok(Root {
                x: b,
                fx: fb,
                iterations: 0,
            });
        }
        if fa * fb > 0.0 || fa.is_nan() || fb.is_nan() {
            return Err(RootError::NotBracketed { a, b, fa, fb });
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let mut c = a;
        let mut fc = fa;
        let mut d = b - a;
        let mut bisected = true;

        for iter in 0..self.max_iter {
            if fa.abs() < fb.abs() {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut fa, &mut fb);
            }

            if fb == 0.0 || (b - a).abs() <= self.tol {
                return Ok(Root {
                    x: b,
                    fx: fb,
                    iterations: iter + 1,
                });
            }

            let s = if fa != fc && fb != fc {
                a * fb * fc / ((fa - fb) * (fa - fc))
                    + b * fa * fc / ((fb - fa) * (fb - fc))
                    + c * fa * fb / ((fc - fa) * (fc - fb))
            } else if fb != fa {
                b - fb * (b - a) / (fb - fa)
            } else {
                0.5 * (a + b)
            };

            let reject = (s - (3.0 * a + b) / 4.0) * (s - b) > 0.0
                || (bisected && (s - b).abs() >= (b - c).abs() / 2.0)
                || (!bisected && (s - b).abs() >= (c - d).abs() / 2.0)
                || (bisected && (b - c).abs() < self.tol)
                || (!bisected && (c - d).abs() < self.tol);

            let s = if reject {
                bisected = true;
                0.5 * (a + b)
            } else {
                bisected = false;
                s
            };

            let fs = f(s);
            d = c;
            c = b;
            fc = fb;

            if fa * fs < 0.0 {
                b = s;
                fb = fs;
            } else {
                a = s;
                fa = fs;
            }
        }

        Err(RootError::MaxIterations {
            best: b,
            iterations: self.max_iter,
        })
    }

    /// Like [`Brent::find_root`], but falls back to the best estimate when
    /// the iteration budget runs out.
    pub fn find_root_or_best<F>(
        &self,
        mut f: F,
        a: f64,
        b: f64,
        fa: Option<f64>,
        fb: Option<f64>,
    ) -> Result<Root, RootError>
    where
        F: FnMut(f64) -> f64,
    {
        match self.find_root(&mut f, a, b, fa, fb) {
            Err(RootError::MaxIterations { best, iterations }) => Ok(Root {
                x: best,
                fx: f(best),
                iterations,
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_square_root_of_two() {
        let root = Brent::default()
            .find_root(|x| x * x - 2.0, 0.0, 2.0, None, None)
            .expect("bracketed");
        assert!((root.x - 2f64.sqrt()).abs() < 1e-11);
        assert!(root.iterations < 50);
    }

    #[test]
    fn finds_root_of_reversed_bracket() {
        let root = Brent::default()
            .find_root(|x| x.cos(), 3.0, 1.0, None, None)
            .expect("bracketed");
        assert!((root.x - std::f64::consts::FRAC_PI_2).abs() < 1e-11);
    }

    #[test]
    fn endpoint_root_returns_immediately() {
        let root = Brent::default()
            .find_root(|x| x - 1.0, 1.0, 4.0, None, None)
            .expect("endpoint");
        assert_eq!(root.x, 1.0);
        assert_eq!(root.iterations, 0);
    }

    #[test]
    fn unbracketed_interval_is_rejected() {
        let err = Brent::default()
            .find_root(|x| x * x + 1.0, -1.0, 1.0, None, None)
            .unwrap_err();
        assert!(matches!(err, RootError::NotBracketed { .. }));
    }

    #[test]
    fn exhausted_budget_still_yields_estimate() {
        let brent = Brent::new(0.0, 3);
        let root = brent
            .find_root_or_best(|x| x.powi(3) - 0.5, 0.0, 1.0, None, None)
            .expect("estimate");
        assert!(root.x > 0.0 && root.x < 1.0);
        assert_eq!(root.iterations, 3);
    }
}
