//! Scalar inverses of the built-in elementwise functions.
//!
//! Each function receives the requested result and the current operands (at the same broadcast
//! position) and returns the new value of one operand. The suffix names the operand solved for.

use std::f64::consts::PI;

pub fn add_0(target: f64, args: &[f64]) -> f64 {
    target - args[1]
}

pub fn add_1(target: f64, args: &[f64]) -> f64 {
    target - args[0]
}

pub fn subtract_0(target: f64, args: &[f64]) -> f64 {
    target + args[1]
}

pub fn subtract_1(target: f64, args: &[f64]) -> f64 {
    args[0] - target
}

pub fn multiply_0(target: f64, args: &[f64]) -> f64 {
    target / args[1]
}

pub fn multiply_1(target: f64, args: &[f64]) -> f64 {
    target / args[0]
}

pub fn divide_0(target: f64, args: &[f64]) -> f64 {
    target * args[1]
}

pub fn divide_1(target: f64, args: &[f64]) -> f64 {
    args[0] / target
}

pub fn power_0(target: f64, args: &[f64]) -> f64 {
    with_sign_of(target.abs().powf(1.0 / args[1]), args[0])
}

pub fn power_1(target: f64, args: &[f64]) -> f64 {
    target.ln() / args[0].ln()
}

pub fn negative(target: f64, _args: &[f64]) -> f64 {
    -target
}

pub fn exp(target: f64, _args: &[f64]) -> f64 {
    target.ln()
}

pub fn log(target: f64, _args: &[f64]) -> f64 {
    target.exp()
}

pub fn sqrt(target: f64, _args: &[f64]) -> f64 {
    target * target
}

/// Keeps the sign the operand had.
pub fn square(target: f64, args: &[f64]) -> f64 {
    with_sign_of(target.sqrt(), args[0])
}

/// Keeps the sign the operand had.
pub fn abs(target: f64, args: &[f64]) -> f64 {
    with_sign_of(target.abs(), args[0])
}

/// The solution of `sin(x) = target` closest to the current operand.
pub fn sin(target: f64, args: &[f64]) -> f64 {
    let principal = target.clamp(-1.0, 1.0).asin();
    let current = args[0];
    let turns = ((current - principal) / (2.0 * PI)).round();
    let mirrored_turns = ((current - (PI - principal)) / (2.0 * PI)).round();
    let candidates = [
        principal + 2.0 * PI * turns,
        PI - principal + 2.0 * PI * mirrored_turns,
    ];
    candidates
        .into_iter()
        .min_by(|a, b| (a - current).abs().total_cmp(&(b - current).abs()))
        .unwrap_or(principal)
}

fn with_sign_of(magnitude: f64, operand: f64) -> f64 {
    if operand < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_inverses() {
        assert_eq!(add_0(10.0, &[1.0, 4.0]), 6.0);
        assert_eq!(subtract_1(10.0, &[3.0, 4.0]), -7.0);
        assert_eq!(divide_1(2.0, &[8.0, 1.0]), 4.0);
        assert_eq!(power_0(9.0, &[-2.0, 2.0]), -3.0);
    }

    #[test]
    fn test_sin_picks_nearest_branch() {
        let current = 2.0 * PI + 0.1;
        let solved = sin(0.5, &[current]);
        assert!((solved.sin() - 0.5).abs() < 1e-12);
        assert!((solved - current).abs() < 1.0);
    }
}
