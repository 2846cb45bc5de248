use std::f64::consts::PI;

/// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / 2f64.sqrt()))
}

pub fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Expected improvement of a posterior `(mean, std)` over `y_max`, with
/// exploration margin `xi`. Zero where the posterior is certain.
pub fn expected_improvement(mean: f64, std: f64, y_max: f64, xi: f64) -> f64 {
    if std.is_nan() || std <= 0.0 {
        return 0.0;
    }
    let a = mean - y_max - xi;
    let z = a / std;
    a * normal_cdf(z) + std * normal_pdf(z)
}
