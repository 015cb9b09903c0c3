//! Arbitrary-precision-style numeric values for the big-number literals.
//!
//! Backed by `i128`, which holds 38 decimal digits — far beyond what rule
//! expressions compute with. Semantics follow the reference classes the
//! generated code names: scale-preserving decimal arithmetic, exact division
//! only, `toString` printing the stored scale.

use crate::error::EvaluationError;
use std::cmp::Ordering;
use std::fmt;

/// Scale-preserving decimal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BigDec {
    unscaled: i128,
    scale: u32,
}

/// Extra digits tried before division is declared non-terminating.
const DIV_EXTRA_SCALE: u32 = 32;

fn pow10(n: u32) -> Result<i128, EvaluationError> {
    10i128
        .checked_pow(n)
        .ok_or_else(|| EvaluationError::Arithmetic("decimal scale overflow".to_string()))
}

impl BigDec {
    pub fn new(unscaled: i128, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    pub fn from_i64(v: i64) -> Self {
        Self::new(v as i128, 0)
    }

    /// Parse literal digits (`"0"`, `"10.25"`, `"-3.5"`).
    pub fn parse(text: &str) -> Result<Self, EvaluationError> {
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, f),
            None => (text, ""),
        };
        let digits = format!("{int_part}{frac_part}");
        let unscaled: i128 = digits
            .parse()
            .map_err(|_| EvaluationError::Arithmetic(format!("invalid decimal '{text}'")))?;
        Ok(Self::new(unscaled, frac_part.len() as u32))
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Rescale both operands to the larger scale.
    fn aligned(self, other: BigDec) -> Result<(i128, i128, u32), EvaluationError> {
        let scale = self.scale.max(other.scale);
        let a = self
            .unscaled
            .checked_mul(pow10(scale - self.scale)?)
            .ok_or_else(|| EvaluationError::Arithmetic("decimal overflow".to_string()))?;
        let b = other
            .unscaled
            .checked_mul(pow10(scale - other.scale)?)
            .ok_or_else(|| EvaluationError::Arithmetic("decimal overflow".to_string()))?;
        Ok((a, b, scale))
    }

    pub fn add(self, other: BigDec) -> Result<BigDec, EvaluationError> {
        let (a, b, scale) = self.aligned(other)?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| EvaluationError::Arithmetic("decimal overflow".to_string()))?;
        Ok(BigDec::new(sum, scale))
    }

    pub fn sub(self, other: BigDec) -> Result<BigDec, EvaluationError> {
        self.add(other.neg())
    }

    pub fn mul(self, other: BigDec) -> Result<BigDec, EvaluationError> {
        let unscaled = self
            .unscaled
            .checked_mul(other.unscaled)
            .ok_or_else(|| EvaluationError::Arithmetic("decimal overflow".to_string()))?;
        Ok(BigDec::new(unscaled, self.scale + other.scale))
    }

    /// Exact division. Fails with an arithmetic error when the quotient does
    /// not terminate within [`DIV_EXTRA_SCALE`] extra digits.
    pub fn div(self, other: BigDec) -> Result<BigDec, EvaluationError> {
        if other.unscaled == 0 {
            return Err(EvaluationError::DivisionByZero);
        }
        let (a, b, _) = self.aligned(other)?;
        // Quotient of the aligned unscaled values is scale 0; extend until
        // the remainder is exhausted.
        let mut numerator = a;
        for extra in 0..=DIV_EXTRA_SCALE {
            if numerator % b == 0 {
                return Ok(BigDec::new(numerator / b, extra));
            }
            numerator = numerator.checked_mul(10).ok_or_else(|| {
                EvaluationError::Arithmetic("decimal overflow during division".to_string())
            })?;
        }
        Err(EvaluationError::Arithmetic(
            "non-terminating decimal expansion".to_string(),
        ))
    }

    pub fn neg(self) -> BigDec {
        BigDec::new(-self.unscaled, self.scale)
    }

    pub fn compare(self, other: BigDec) -> Result<Ordering, EvaluationError> {
        let (a, b, _) = self.aligned(other)?;
        Ok(a.cmp(&b))
    }

    pub fn to_f64(self) -> f64 {
        self.unscaled as f64 / 10f64.powi(self.scale as i32)
    }

    pub fn to_i64(self) -> i64 {
        (self.unscaled / pow10(self.scale).unwrap_or(1)) as i64
    }
}

impl fmt::Display for BigDec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let negative = self.unscaled < 0;
        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let (int_part, frac_part) = if digits.len() > scale {
            let split = digits.len() - scale;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{:0>width$}", digits, width = scale))
        };
        if negative {
            write!(f, "-{int_part}.{frac_part}")
        } else {
            write!(f, "{int_part}.{frac_part}")
        }
    }
}

/// Integer counterpart, also `i128`-backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BigInt(pub i128);

impl BigInt {
    pub fn from_i64(v: i64) -> Self {
        BigInt(v as i128)
    }

    pub fn parse(text: &str) -> Result<Self, EvaluationError> {
        text.parse()
            .map(BigInt)
            .map_err(|_| EvaluationError::Arithmetic(format!("invalid integer '{text}'")))
    }

    pub fn add(self, other: BigInt) -> Result<BigInt, EvaluationError> {
        self.0
            .checked_add(other.0)
            .map(BigInt)
            .ok_or_else(|| EvaluationError::Arithmetic("integer overflow".to_string()))
    }

    pub fn sub(self, other: BigInt) -> Result<BigInt, EvaluationError> {
        self.0
            .checked_sub(other.0)
            .map(BigInt)
            .ok_or_else(|| EvaluationError::Arithmetic("integer overflow".to_string()))
    }

    pub fn mul(self, other: BigInt) -> Result<BigInt, EvaluationError> {
        self.0
            .checked_mul(other.0)
            .map(BigInt)
            .ok_or_else(|| EvaluationError::Arithmetic("integer overflow".to_string()))
    }

    pub fn div(self, other: BigInt) -> Result<BigInt, EvaluationError> {
        if other.0 == 0 {
            return Err(EvaluationError::DivisionByZero);
        }
        Ok(BigInt(self.0 / other.0))
    }

    pub fn neg(self) -> BigInt {
        BigInt(-self.0)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["0", "2", "10.25", "0.05", "123.450"] {
            assert_eq!(BigDec::parse(text).unwrap().to_string(), text);
        }
        assert_eq!(BigDec::parse("-3.5").unwrap().to_string(), "-3.5");
    }

    #[test]
    fn addition_preserves_integer_scale() {
        // 0B += 1 += 1 must print "2", not "2.0"
        let s = BigDec::parse("0").unwrap();
        let one = BigDec::from_i64(1);
        let s = s.add(one).unwrap().add(one).unwrap();
        assert_eq!(s.to_string(), "2");
    }

    #[test]
    fn addition_aligns_scales() {
        let a = BigDec::parse("1.5").unwrap();
        let b = BigDec::parse("0.25").unwrap();
        assert_eq!(a.add(b).unwrap().to_string(), "1.75");
    }

    #[test]
    fn multiplication_sums_scales() {
        let a = BigDec::parse("1.5").unwrap();
        let b = BigDec::parse("0.2").unwrap();
        assert_eq!(a.mul(b).unwrap().to_string(), "0.30");
    }

    #[test]
    fn exact_division() {
        let a = BigDec::from_i64(1);
        let b = BigDec::from_i64(8);
        assert_eq!(a.div(b).unwrap().to_string(), "0.125");
    }

    #[test]
    fn non_terminating_division_fails() {
        let a = BigDec::from_i64(1);
        let b = BigDec::from_i64(3);
        assert!(matches!(
            a.div(b),
            Err(EvaluationError::Arithmetic(msg)) if msg.contains("non-terminating")
        ));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(
            BigDec::from_i64(1).div(BigDec::from_i64(0)),
            Err(EvaluationError::DivisionByZero)
        ));
        assert!(matches!(
            BigInt::from_i64(1).div(BigInt::from_i64(0)),
            Err(EvaluationError::DivisionByZero)
        ));
    }

    #[test]
    fn comparison_ignores_scale() {
        let a = BigDec::parse("1.50").unwrap();
        let b = BigDec::parse("1.5").unwrap();
        assert_eq!(a.compare(b).unwrap(), Ordering::Equal);
        // but equality does not
        assert_ne!(a, b);
    }

    #[test]
    fn big_int_arithmetic() {
        let a = BigInt::parse("42").unwrap();
        let b = BigInt::from_i64(8);
        assert_eq!(a.add(b).unwrap().to_string(), "50");
        assert_eq!(a.div(b).unwrap().to_string(), "5");
    }
}
