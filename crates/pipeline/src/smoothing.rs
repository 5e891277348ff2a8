//! Low-order polynomial smoothing of the interval-to-car-ahead channel.
//! Plays the role a Savitzky-Golay filter would, re-expressed without an
//! external numerics crate: a local quadratic least-squares fit evaluated
//! at the window's center.

/// Smooths a per-driver series of optional samples. Missing samples stay
/// missing; only runs of present values are smoothed, each against a window
/// that shrinks near both ends of the run:
/// `safe_window = min(window, max(3, valid_count//2*2-1))`.
pub fn smooth_interval(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    let mut i = 0;
    while i < n {
        if values[i].is_none() {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        while end + 1 < n && values[end + 1].is_some() {
            end += 1;
        }
        let run = &values[start..=end];
        let valid_count = run.len();
        let safe_window = window.min((valid_count / 2 * 2).max(3).saturating_sub(1)).max(1);
        let half = safe_window / 2;
        for (offset, _) in run.iter().enumerate() {
            let center = start + offset;
            let lo = center.saturating_sub(half).max(start);
            let hi = (center + half).min(end);
            let xs: Vec<f64> = (lo..=hi).map(|k| (k as f64) - (center as f64)).collect();
            let ys: Vec<f64> = (lo..=hi).map(|k| values[k].unwrap()).collect();
            out[center] = Some(quadratic_fit_center(&xs, &ys));
        }
        i = end + 1;
    }
    out
}

/// Least-squares quadratic fit `y = a + b*x + c*x^2` evaluated at `x = 0`
/// (returns `a`). Falls back to the mean when the local window is too small
/// or degenerate to support a quadratic term.
fn quadratic_fit_center(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if xs.len() < 3 {
        return ys.iter().sum::<f64>() / n;
    }
    let sx: f64 = xs.iter().sum();
    let sx2: f64 = xs.iter().map(|x| x * x).sum();
    let sx3: f64 = xs.iter().map(|x| x.powi(3)).sum();
    let sx4: f64 = xs.iter().map(|x| x.powi(4)).sum();
    let sy: f64 = ys.iter().sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let sx2y: f64 = xs.iter().zip(ys).map(|(x, y)| x * x * y).sum();

    // Normal equations for [a, b, c]^T:
    // [ n   sx  sx2 ] [a]   [sy  ]
    // [ sx  sx2 sx3 ] [b] = [sxy ]
    // [ sx2 sx3 sx4 ] [c]   [sx2y]
    let m = [[n, sx, sx2, sy], [sx, sx2, sx3, sxy], [sx2, sx3, sx4, sx2y]];
    match solve_3x3(m) {
        Some([a, _b, _c]) => a,
        None => sy / n,
    }
}

fn solve_3x3(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let mut pivot = col;
        for row in (col + 1)..3 {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        let pv = m[col][col];
        for v in m[col].iter_mut() {
            *v /= pv;
        }
        for row in 0..3 {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            for k in 0..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    Some([m[0][3], m[1][3], m[2][3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooths_constant_run_to_itself() {
        let values: Vec<Option<f64>> = vec![Some(1.0); 7];
        let smoothed = smooth_interval(&values, 5);
        for v in smoothed {
            assert!((v.unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_samples_stay_missing() {
        let values = vec![Some(1.0), None, Some(2.0), Some(2.1), None];
        let smoothed = smooth_interval(&values, 5);
        assert!(smoothed[1].is_none());
        assert!(smoothed[4].is_none());
        assert!(smoothed[0].is_some());
    }

    #[test]
    fn idempotent_on_already_smooth_linear_trend() {
        let values: Vec<Option<f64>> = (0..9).map(|i| Some(i as f64)).collect();
        let once = smooth_interval(&values, 5);
        let once_f: Vec<Option<f64>> = once.clone();
        let twice = smooth_interval(&once_f, 5);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a.unwrap() - b.unwrap()).abs() < 1e-9);
        }
    }
}
