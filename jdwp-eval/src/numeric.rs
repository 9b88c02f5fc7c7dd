// Java primitive arithmetic
//
// Binary numeric promotion (JLS 5.6.2), wrapping two's-complement integer
// arithmetic, IEEE 754 floating point and the primitive casting conversions.

use crate::error::{EvalResult, EvaluationError};
use crate::value::{Primitive, PrimitiveKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `~x`
    BitNot,
    /// `!x`
    Not,
}

enum Promoted {
    Int(i32, i32),
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
}

fn mismatch(op: &str, left: &Primitive, right: &Primitive) -> EvaluationError {
    EvaluationError::TypeMismatch(format!(
        "operator {} cannot be applied to {}, {}",
        op,
        left.kind(),
        right.kind()
    ))
}

fn promote(op: BinaryOp, left: Primitive, right: Primitive) -> EvalResult<Promoted> {
    use PrimitiveKind::*;
    let widest = match (left.kind(), right.kind()) {
        (Boolean, _) | (_, Boolean) => return Err(mismatch(op.symbol(), &left, &right)),
        (Double, _) | (_, Double) => Double,
        (Float, _) | (_, Float) => Float,
        (Long, _) | (_, Long) => Long,
        _ => Int,
    };

    let promoted = match widest {
        Double => Promoted::Double(to_f64(&left), to_f64(&right)),
        Float => Promoted::Float(to_f32(&left), to_f32(&right)),
        Long => Promoted::Long(to_i64(&left), to_i64(&right)),
        _ => Promoted::Int(to_i64(&left) as i32, to_i64(&right) as i32),
    };
    Ok(promoted)
}

fn to_i64(value: &Primitive) -> i64 {
    value.as_i64().unwrap_or_default()
}

fn to_f64(value: &Primitive) -> f64 {
    value.as_f64().unwrap_or_default()
}

fn to_f32(value: &Primitive) -> f32 {
    match *value {
        Primitive::Float(v) => v,
        Primitive::Long(v) => v as f32,
        _ => to_i64(value) as f32,
    }
}

/// Apply a binary operator to two primitives
pub fn binary(op: BinaryOp, left: Primitive, right: Primitive) -> EvalResult<Primitive> {
    if let (Primitive::Boolean(a), Primitive::Boolean(b)) = (left, right) {
        let result = match op {
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => return Err(mismatch(op.symbol(), &left, &right)),
        };
        return Ok(Primitive::Boolean(result));
    }

    if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr) {
        return shift(op, left, right);
    }

    let result = match promote(op, left, right)? {
        Promoted::Int(a, b) => match op {
            BinaryOp::Add => Primitive::Int(a.wrapping_add(b)),
            BinaryOp::Sub => Primitive::Int(a.wrapping_sub(b)),
            BinaryOp::Mul => Primitive::Int(a.wrapping_mul(b)),
            BinaryOp::Div if b == 0 => return Err(EvaluationError::DivideByZero),
            BinaryOp::Div => Primitive::Int(a.wrapping_div(b)),
            BinaryOp::Rem if b == 0 => return Err(EvaluationError::DivideByZero),
            BinaryOp::Rem => Primitive::Int(a.wrapping_rem(b)),
            BinaryOp::And => Primitive::Int(a & b),
            BinaryOp::Or => Primitive::Int(a | b),
            BinaryOp::Xor => Primitive::Int(a ^ b),
            _ => compare(op, a, b),
        },
        Promoted::Long(a, b) => match op {
            BinaryOp::Add => Primitive::Long(a.wrapping_add(b)),
            BinaryOp::Sub => Primitive::Long(a.wrapping_sub(b)),
            BinaryOp::Mul => Primitive::Long(a.wrapping_mul(b)),
            BinaryOp::Div if b == 0 => return Err(EvaluationError::DivideByZero),
            BinaryOp::Div => Primitive::Long(a.wrapping_div(b)),
            BinaryOp::Rem if b == 0 => return Err(EvaluationError::DivideByZero),
            BinaryOp::Rem => Primitive::Long(a.wrapping_rem(b)),
            BinaryOp::And => Primitive::Long(a & b),
            BinaryOp::Or => Primitive::Long(a | b),
            BinaryOp::Xor => Primitive::Long(a ^ b),
            _ => compare(op, a, b),
        },
        Promoted::Float(a, b) => match op {
            BinaryOp::Add => Primitive::Float(a + b),
            BinaryOp::Sub => Primitive::Float(a - b),
            BinaryOp::Mul => Primitive::Float(a * b),
            BinaryOp::Div => Primitive::Float(a / b),
            BinaryOp::Rem => Primitive::Float(a % b),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                return Err(mismatch(op.symbol(), &left, &right))
            }
            _ => compare(op, a, b),
        },
        Promoted::Double(a, b) => match op {
            BinaryOp::Add => Primitive::Double(a + b),
            BinaryOp::Sub => Primitive::Double(a - b),
            BinaryOp::Mul => Primitive::Double(a * b),
            BinaryOp::Div => Primitive::Double(a / b),
            BinaryOp::Rem => Primitive::Double(a % b),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                return Err(mismatch(op.symbol(), &left, &right))
            }
            _ => compare(op, a, b),
        },
    };
    Ok(result)
}

// PartialOrd gives false for every NaN comparison and true for NaN != x
fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Primitive {
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    };
    Primitive::Boolean(result)
}

/// Shifts promote each operand separately; the distance is masked to the
/// width of the promoted left operand
fn shift(op: BinaryOp, left: Primitive, right: Primitive) -> EvalResult<Primitive> {
    let distance = match right.as_i64() {
        Some(d) if right.kind().is_integral() => d,
        _ => return Err(mismatch(op.symbol(), &left, &right)),
    };

    match left {
        Primitive::Long(v) => {
            let d = (distance & 0x3f) as u32;
            let result = match op {
                BinaryOp::Shl => v.wrapping_shl(d),
                BinaryOp::Shr => v.wrapping_shr(d),
                _ => ((v as u64) >> d) as i64,
            };
            Ok(Primitive::Long(result))
        }
        _ => {
            let v = left
                .as_int_index()
                .ok_or_else(|| mismatch(op.symbol(), &left, &right))?;
            let d = (distance & 0x1f) as u32;
            let result = match op {
                BinaryOp::Shl => v.wrapping_shl(d),
                BinaryOp::Shr => v.wrapping_shr(d),
                _ => ((v as u32) >> d) as i32,
            };
            Ok(Primitive::Int(result))
        }
    }
}

/// Apply a unary operator
pub fn unary(op: UnaryOp, operand: Primitive) -> EvalResult<Primitive> {
    let fail = || {
        EvaluationError::TypeMismatch(format!(
            "operator {} cannot be applied to {}",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Plus => "+",
                UnaryOp::BitNot => "~",
                UnaryOp::Not => "!",
            },
            operand.kind()
        ))
    };

    let result = match (op, operand) {
        (UnaryOp::Not, Primitive::Boolean(v)) => Primitive::Boolean(!v),
        (UnaryOp::Not, _) | (_, Primitive::Boolean(_)) => return Err(fail()),
        (UnaryOp::Neg, Primitive::Long(v)) => Primitive::Long(v.wrapping_neg()),
        (UnaryOp::Neg, Primitive::Float(v)) => Primitive::Float(-v),
        (UnaryOp::Neg, Primitive::Double(v)) => Primitive::Double(-v),
        (UnaryOp::Plus, Primitive::Long(_))
        | (UnaryOp::Plus, Primitive::Float(_))
        | (UnaryOp::Plus, Primitive::Double(_)) => operand,
        (UnaryOp::BitNot, Primitive::Long(v)) => Primitive::Long(!v),
        (UnaryOp::BitNot, Primitive::Float(_)) | (UnaryOp::BitNot, Primitive::Double(_)) => {
            return Err(fail())
        }
        (_, small) => {
            let v = small.as_int_index().ok_or_else(fail)?;
            match op {
                UnaryOp::Neg => Primitive::Int(v.wrapping_neg()),
                UnaryOp::BitNot => Primitive::Int(!v),
                _ => Primitive::Int(v),
            }
        }
    };
    Ok(result)
}

/// Primitive casting conversion (identity, widening or narrowing)
///
/// Floating values narrow to int or long with saturation (NaN becomes 0);
/// narrower integral targets go through int first, as the JVM does.
pub fn cast(value: Primitive, target: PrimitiveKind) -> EvalResult<Primitive> {
    let source = value.kind();
    if source == target {
        return Ok(value);
    }
    if source == PrimitiveKind::Boolean || target == PrimitiveKind::Boolean {
        return Err(EvaluationError::IllegalCast {
            from: source.name().to_string(),
            to: target.name().to_string(),
        });
    }

    let result = match value {
        Primitive::Float(_) | Primitive::Double(_) => {
            let v = to_f64(&value);
            match target {
                PrimitiveKind::Double => Primitive::Double(v),
                PrimitiveKind::Float => Primitive::Float(v as f32),
                PrimitiveKind::Long => Primitive::Long(v as i64),
                _ => narrow_int(v as i32, target),
            }
        }
        _ => {
            let v = to_i64(&value);
            match target {
                PrimitiveKind::Double => Primitive::Double(v as f64),
                PrimitiveKind::Float => Primitive::Float(v as f32),
                PrimitiveKind::Long => Primitive::Long(v),
                _ => narrow_int(v as i32, target),
            }
        }
    };
    Ok(result)
}

fn narrow_int(v: i32, target: PrimitiveKind) -> Primitive {
    match target {
        PrimitiveKind::Byte => Primitive::Byte(v as i8),
        PrimitiveKind::Short => Primitive::Short(v as i16),
        PrimitiveKind::Char => Primitive::Char(v as u16),
        _ => Primitive::Int(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_promotion_picks_widest() {
        let sum = binary(BinaryOp::Add, Primitive::Byte(1), Primitive::Char(2)).unwrap();
        assert_eq!(sum, Primitive::Int(3));

        let mixed = binary(BinaryOp::Mul, Primitive::Int(3), Primitive::Long(4)).unwrap();
        assert_eq!(mixed, Primitive::Long(12));

        let float = binary(BinaryOp::Div, Primitive::Long(1), Primitive::Float(4.0)).unwrap();
        assert_eq!(float, Primitive::Float(0.25));

        let double = binary(BinaryOp::Sub, Primitive::Float(1.5), Primitive::Double(0.5)).unwrap();
        assert_eq!(double, Primitive::Double(1.0));
    }

    #[test]
    fn test_integer_overflow_wraps() {
        let wrapped = binary(BinaryOp::Add, Primitive::Int(i32::MAX), Primitive::Int(1)).unwrap();
        assert_eq!(wrapped, Primitive::Int(i32::MIN));

        let min_div = binary(BinaryOp::Div, Primitive::Int(i32::MIN), Primitive::Int(-1)).unwrap();
        assert_eq!(min_div, Primitive::Int(i32::MIN));

        let min_rem =
            binary(BinaryOp::Rem, Primitive::Long(i64::MIN), Primitive::Long(-1)).unwrap();
        assert_eq!(min_rem, Primitive::Long(0));
    }

    #[test]
    fn test_float_division_by_zero_is_not_an_error() {
        let inf = binary(BinaryOp::Div, Primitive::Double(1.0), Primitive::Int(0)).unwrap();
        assert_eq!(inf, Primitive::Double(f64::INFINITY));

        match binary(BinaryOp::Rem, Primitive::Float(1.0), Primitive::Float(0.0)).unwrap() {
            Primitive::Float(v) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nan_comparisons() {
        let nan = Primitive::Double(f64::NAN);
        for op in [BinaryOp::Eq, BinaryOp::Lt, BinaryOp::Le, BinaryOp::Gt, BinaryOp::Ge] {
            assert_eq!(binary(op, nan, nan).unwrap(), Primitive::Boolean(false));
        }
        assert_eq!(binary(BinaryOp::Ne, nan, nan).unwrap(), Primitive::Boolean(true));
    }

    #[test]
    fn test_shift_distance_masked() {
        let int = binary(BinaryOp::Shl, Primitive::Int(1), Primitive::Long(33)).unwrap();
        assert_eq!(int, Primitive::Int(2));

        let long = binary(BinaryOp::Shl, Primitive::Long(1), Primitive::Int(33)).unwrap();
        assert_eq!(long, Primitive::Long(1 << 33));

        let ushr = binary(BinaryOp::Ushr, Primitive::Int(-1), Primitive::Int(28)).unwrap();
        assert_eq!(ushr, Primitive::Int(0xf));

        let shr = binary(BinaryOp::Shr, Primitive::Byte(-16), Primitive::Int(2)).unwrap();
        assert_eq!(shr, Primitive::Int(-4));

        assert!(binary(BinaryOp::Shl, Primitive::Double(1.0), Primitive::Int(1)).is_err());
    }

    #[test]
    fn test_boolean_operators() {
        let t = Primitive::Boolean(true);
        let f = Primitive::Boolean(false);
        assert_eq!(binary(BinaryOp::Xor, t, f).unwrap(), t);
        assert_eq!(binary(BinaryOp::And, t, f).unwrap(), f);
        assert!(matches!(
            binary(BinaryOp::Add, t, f),
            Err(EvaluationError::TypeMismatch(_))
        ));
        assert!(matches!(
            binary(BinaryOp::Eq, t, Primitive::Int(1)),
            Err(EvaluationError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_unary() {
        assert_eq!(
            unary(UnaryOp::Neg, Primitive::Int(i32::MIN)).unwrap(),
            Primitive::Int(i32::MIN)
        );
        assert_eq!(unary(UnaryOp::BitNot, Primitive::Byte(0)).unwrap(), Primitive::Int(-1));
        assert_eq!(unary(UnaryOp::Plus, Primitive::Char(65)).unwrap(), Primitive::Int(65));
        assert_eq!(
            unary(UnaryOp::Not, Primitive::Boolean(false)).unwrap(),
            Primitive::Boolean(true)
        );
        assert!(unary(UnaryOp::Not, Primitive::Int(0)).is_err());
        assert!(unary(UnaryOp::BitNot, Primitive::Float(1.0)).is_err());
    }

    #[test]
    fn test_casts() {
        assert_eq!(cast(Primitive::Int(300), PrimitiveKind::Byte).unwrap(), Primitive::Byte(44));
        assert_eq!(
            cast(Primitive::Double(300.7), PrimitiveKind::Byte).unwrap(),
            Primitive::Byte(44)
        );
        assert_eq!(
            cast(Primitive::Double(1e20), PrimitiveKind::Int).unwrap(),
            Primitive::Int(i32::MAX)
        );
        assert_eq!(
            cast(Primitive::Float(f32::NAN), PrimitiveKind::Long).unwrap(),
            Primitive::Long(0)
        );
        assert_eq!(cast(Primitive::Int(-1), PrimitiveKind::Char).unwrap(), Primitive::Char(0xffff));
        assert_eq!(cast(Primitive::Long(1 << 40), PrimitiveKind::Int).unwrap(), Primitive::Int(0));
        assert!(matches!(
            cast(Primitive::Boolean(true), PrimitiveKind::Int),
            Err(EvaluationError::IllegalCast { .. })
        ));
    }

    proptest! {
        #[test]
        fn integral_division_by_zero_always_fails(
            a in any::<i64>(),
            as_int in any::<bool>(),
            rem in any::<bool>(),
        ) {
            let op = if rem { BinaryOp::Rem } else { BinaryOp::Div };
            let (left, zero) = if as_int {
                (Primitive::Int(a as i32), Primitive::Int(0))
            } else {
                (Primitive::Long(a), Primitive::Long(0))
            };
            prop_assert_eq!(binary(op, left, zero), Err(EvaluationError::DivideByZero));
        }

        #[test]
        fn int_addition_matches_wrapping(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(
                binary(BinaryOp::Add, Primitive::Int(a), Primitive::Int(b)).unwrap(),
                Primitive::Int(a.wrapping_add(b))
            );
        }
    }
}
