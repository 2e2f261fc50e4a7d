//! Resolution helpers: reciprocal cells, B matrices and 1/d² of a reflection, plus the
//! small statistics used when looking at resolution shells.
use super::error::ResolutionError;

/// Largest relative error tolerated when recovering axis lengths from a B matrix
const INVERSION_TOLERANCE: f64 = 0.001;

/// Unit cell parameters: a, b, c and alpha, beta, gamma in degrees
pub type Cell = [f64; 6];

pub type Vector = [f64; 3];

fn dot(a: &Vector, b: &Vector) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cosines, sines and the volume factor sqrt(1 - ca² - cb² - cg² + 2 ca cb cg)
fn trig(cell: &Cell) -> Result<([f64; 3], [f64; 3], f64), ResolutionError> {
    if cell[..3].iter().any(|length| *length <= 0.0) {
        return Err(ResolutionError::DegenerateCell);
    }
    let angles = [
        cell[3].to_radians(),
        cell[4].to_radians(),
        cell[5].to_radians(),
    ];
    let cos = angles.map(f64::cos);
    let sin = angles.map(f64::sin);
    let volume_sq = 1.0 - cos[0] * cos[0] - cos[1] * cos[1] - cos[2] * cos[2]
        + 2.0 * cos[0] * cos[1] * cos[2];
    if volume_sq <= 0.0 || sin.iter().any(|s| s.abs() < f64::EPSILON) {
        return Err(ResolutionError::DegenerateCell);
    }
    Ok((cos, sin, volume_sq.sqrt()))
}

/// Convert real space cell parameters to reciprocal space
pub fn real_to_reciprocal(cell: &Cell) -> Result<Cell, ResolutionError> {
    let [a, b, c, ..] = *cell;
    let ([ca, cb, cg], [sa, sb, sg], factor) = trig(cell)?;
    let volume = a * b * c * factor;

    let a_star = b * c * sa / volume;
    let b_star = c * a * sb / volume;
    let c_star = a * b * sg / volume;

    let alpha_star = ((cb * cg - ca) / (sb * sg)).acos().to_degrees();
    let beta_star = ((ca * cg - cb) / (sa * sg)).acos().to_degrees();
    let gamma_star = ((ca * cb - cg) / (sa * sb)).acos().to_degrees();

    Ok([a_star, b_star, c_star, alpha_star, beta_star, gamma_star])
}

/// Compute the B matrix (as three axis vectors) from reciprocal cell parameters
pub fn b_matrix(reciprocal: &Cell) -> Result<[Vector; 3], ResolutionError> {
    let [a, b, c, ..] = *reciprocal;
    let ([ca, cb, cg], [_, sb, sg], factor) = trig(reciprocal)?;
    let volume = a * b * c * factor;

    let car = (cb * cg - ca) / (sb * sg);
    let sar = volume / (a * b * c * sb * sg);

    let axes = [
        [a, 0.0, 0.0],
        [b * cg, b * sg, 0.0],
        [c * cb, -c * sb * car, c * sb * sar],
    ];

    for (axis, expected) in axes.iter().zip([a, b, c]) {
        let length = dot(axis, axis).sqrt();
        if (length - expected).abs() / length > INVERSION_TOLERANCE {
            return Err(ResolutionError::InversionError(expected, length));
        }
    }
    Ok(axes)
}

/// Resolution of reflection h, k, l as 1/d²
pub fn resolution(h: i32, k: i32, l: i32, b: &[Vector; 3]) -> f64 {
    let mut d: Vector = [0.0; 3];
    for j in 0..3 {
        d[j] = h as f64 * b[0][j] + k as f64 * b[1][j] + l as f64 * b[2][j];
    }
    dot(&d, &d)
}

/// Resolution in Ångström of reflection h, k, l of a real space cell
pub fn d_spacing(h: i32, k: i32, l: i32, cell: &Cell) -> Result<f64, ResolutionError> {
    if (h, k, l) == (0, 0, 0) {
        return Err(ResolutionError::OriginReflection);
    }
    let b = b_matrix(&real_to_reciprocal(cell)?)?;
    Ok(1.0 / resolution(h, k, l, &b).sqrt())
}

/// Mean and (population) standard deviation; None for no values
pub fn mean_sd(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Pearson correlation coefficient. None if the lengths differ, there are no values or
/// either set has no spread.
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean = |values: &[f64]| values.iter().sum::<f64>() / n;
    let ab = a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / n;
    let a2 = a.iter().map(|x| x * x).sum::<f64>() / n;
    let b2 = b.iter().map(|y| y * y).sum::<f64>() / n;
    let (ma, mb) = (mean(a), mean(b));

    let denominator = ((a2 - ma * ma) * (b2 - mb * mb)).sqrt();
    if denominator == 0.0 || denominator.is_nan() {
        return None;
    }
    Some((ab - ma * mb) / denominator)
}
