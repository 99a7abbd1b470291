//! Small numeric helpers over `f64` series.

/// Samples used at each end of the series for the trend baseline.
const TREND_EDGE: usize = 5;

pub fn mean(values: &[f64]) -> f64 {
    // ---
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    // ---
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentage change between the mean of the first and the last
/// `min(5, n)` samples, rounded to 2 decimals. 0 for fewer than 2 samples
/// or a zero baseline.
pub fn trend(values: &[f64]) -> f64 {
    // ---
    if values.len() < 2 {
        return 0.0;
    }
    let edge = TREND_EDGE.min(values.len());
    let start = mean(&values[..edge]);
    let end = mean(&values[values.len() - edge..]);
    if start == 0.0 {
        return 0.0;
    }
    round_to((end - start) / start * 100.0, 2)
}

/// Pearson correlation coefficient. `None` when either series has fewer
/// than 3 points, the lengths differ, or a series is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    // ---
    if xs.len() < 3 || ys.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    // The float mean of a constant series need not equal its value, so the
    // variance alone cannot detect it.
    if is_constant(xs) || is_constant(ys) {
        return None;
    }
    let (mx, my) = (mean(xs), mean(ys));

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
