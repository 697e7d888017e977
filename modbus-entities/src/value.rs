//! Numeric and decoded value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A configured number that keeps its integer or float nature.
///
/// `2` stays an integer so that integer readings scaled by it still format
/// without a decimal point; `2.0` forces float arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::Int(0)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(i64::from(v))
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// Result of scale/offset arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    /// Compute `scale * self + offset`.
    ///
    /// Stays integral while every operand is an integer and the result fits,
    /// otherwise widens to `f64`.
    pub fn linear(self, scale: Number, offset: Number) -> Numeric {
        if let (Numeric::Int(v), Number::Int(s), Number::Int(o)) = (self, scale, offset) {
            if let Some(r) = v
                .checked_mul(i128::from(s))
                .and_then(|x| x.checked_add(i128::from(o)))
            {
                return Numeric::Int(r);
            }
        }
        Numeric::Float(scale.as_f64() * self.as_f64() + offset.as_f64())
    }
}

/// One value unpacked from a structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i128),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// The value as a number, if arithmetic applies to it.
    pub fn numeric(&self) -> Option<Numeric> {
        match self {
            Scalar::Int(v) => Some(Numeric::Int(*v)),
            Scalar::Float(v) => Some(Numeric::Float(*v)),
            Scalar::Bool(b) => Some(Numeric::Int(i128::from(*b))),
            Scalar::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write_float(f, *v),
            Scalar::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Scalar::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

/// Shortest round-trip form, keeping `.0` on integral values.
///
/// Exponents below -4 or from 16 up switch to scientific notation with a
/// signed, two-digit exponent (`1e+16`, `1.5e-05`).
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }

    let scientific = format!("{:e}", v);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        if v.fract() == 0.0 {
            write!(f, "{:.1}", v)
        } else {
            write!(f, "{}", v)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f, "{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// A decoded register value, held as the entity's last-known value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Text, either decoded from a string layout or restored from storage.
    Text(String),
    /// A single scaled number with its display precision.
    Number { value: Numeric, precision: u32 },
    /// A single extracted bit.
    Bit(bool),
    /// Several unscaled fields from a custom structure.
    Tuple(Vec<Scalar>),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Text(s) => f.write_str(s),
            DecodedValue::Number {
                value: Numeric::Int(v),
                precision: 0,
            } => write!(f, "{}", v),
            DecodedValue::Number { value, precision } => {
                write!(f, "{:.*}", *precision as usize, value.as_f64())
            }
            DecodedValue::Bit(b) => f.write_str(if *b { "1" } else { "0" }),
            DecodedValue::Tuple(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_stays_integral() {
        let r = Numeric::Int(100).linear(Number::Int(2), Number::Int(5));
        assert_eq!(r, Numeric::Int(205));
    }

    #[test]
    fn test_linear_widens_on_float_operand() {
        let r = Numeric::Int(100).linear(Number::Float(0.5), Number::Int(0));
        assert_eq!(r, Numeric::Float(50.0));

        let r = Numeric::Int(100).linear(Number::Int(1), Number::Float(0.25));
        assert_eq!(r, Numeric::Float(100.25));
    }

    #[test]
    fn test_linear_widens_on_overflow() {
        let r = Numeric::Int(i128::MAX).linear(Number::Int(2), Number::Int(0));
        assert!(matches!(r, Numeric::Float(_)));
    }

    #[test]
    fn test_number_untagged() {
        let n: Number = serde_json::from_str("2").unwrap();
        assert_eq!(n, Number::Int(2));
        let n: Number = serde_json::from_str("2.5").unwrap();
        assert_eq!(n, Number::Float(2.5));
    }

    #[test]
    fn test_display_number() {
        let v = DecodedValue::Number {
            value: Numeric::Int(205),
            precision: 0,
        };
        assert_eq!(v.to_string(), "205");

        let v = DecodedValue::Number {
            value: Numeric::Int(205),
            precision: 1,
        };
        assert_eq!(v.to_string(), "205.0");

        let v = DecodedValue::Number {
            value: Numeric::Float(1.0 / 3.0),
            precision: 3,
        };
        assert_eq!(v.to_string(), "0.333");

        let v = DecodedValue::Number {
            value: Numeric::Float(100.0),
            precision: 0,
        };
        assert_eq!(v.to_string(), "100");
    }

    #[test]
    fn test_display_tuple() {
        let v = DecodedValue::Tuple(vec![
            Scalar::Int(-3),
            Scalar::Float(1.0),
            Scalar::Float(0.5),
            Scalar::Bytes(b"ok".to_vec()),
        ]);
        assert_eq!(v.to_string(), "-3,1.0,0.5,ok");
    }

    #[test]
    fn test_display_float_exponents() {
        let render = |v: f64| Scalar::Float(v).to_string();
        assert_eq!(render(1e16), "1e+16");
        assert_eq!(render(1.5e16), "1.5e+16");
        assert_eq!(render(1e15), "1000000000000000.0");
        assert_eq!(render(1e-5), "1e-05");
        assert_eq!(render(-2.5e-7), "-2.5e-07");
        assert_eq!(render(0.0001), "0.0001");
        assert_eq!(render(1e300), "1e+300");
        assert_eq!(render(f64::INFINITY), "inf");
        assert_eq!(render(f64::NAN), "nan");
    }

    #[test]
    fn test_display_bit() {
        assert_eq!(DecodedValue::Bit(true).to_string(), "1");
        assert_eq!(DecodedValue::Bit(false).to_string(), "0");
    }
}
