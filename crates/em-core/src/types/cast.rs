use thiserror::Error;

use super::{ScalarKind, Type};

/// How a value of one type becomes another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Noop,
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    SIToFP,
    FPToSI,
    PtrToInt,
    IntToPtr,
    Bitcast,
    /// Aggregate to aggregate through memory.
    Reinterpret,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("cannot cast '{from}' to void")]
    ToVoid { from: String },
    #[error("cannot cast a void value to '{to}'")]
    FromVoid { to: String },
    #[error("cannot cast between aggregate '{from}' and non-aggregate '{to}'")]
    Aggregate { from: String, to: String },
    #[error("cannot cast between pointer and floating type ('{from}' to '{to}')")]
    PointerFloat { from: String, to: String },
    #[error("cannot cast '{from}' to '{to}'")]
    Unsupported { from: String, to: String },
}

/// Decides the conversion from `from` to `to`.
pub fn cast_kind(from: &Type, to: &Type) -> Result<CastKind, CastError> {
    let names = || (from.canonical(), to.canonical());
    if to.is_void() {
        return Err(CastError::ToVoid {
            from: from.canonical(),
        });
    }
    if from.is_void() {
        return Err(CastError::FromVoid { to: to.canonical() });
    }
    if from.same_as(to) {
        return Ok(CastKind::Noop);
    }

    match (from.strip(), to.strip()) {
        (Type::Scalar(a), Type::Scalar(b)) => Ok(scalar_cast(*a, *b)),
        (Type::Aggregate { .. }, Type::Aggregate { .. }) => Ok(CastKind::Reinterpret),
        (Type::Aggregate { .. }, _) | (_, Type::Aggregate { .. }) => {
            let (from, to) = names();
            Err(CastError::Aggregate { from, to })
        }
        (Type::Pointer(_) | Type::Function(_), Type::Pointer(_) | Type::Function(_)) => {
            Ok(CastKind::Bitcast)
        }
        (Type::Array(..), Type::Pointer(_)) => Ok(CastKind::Bitcast),
        (Type::Pointer(_), Type::Scalar(kind)) if kind.is_integer() => Ok(CastKind::PtrToInt),
        (Type::Scalar(kind), Type::Pointer(_)) if kind.is_integer() => Ok(CastKind::IntToPtr),
        (Type::Pointer(_), Type::Scalar(_)) | (Type::Scalar(_), Type::Pointer(_)) => {
            let (from, to) = names();
            Err(CastError::PointerFloat { from, to })
        }
        _ => {
            let (from, to) = names();
            Err(CastError::Unsupported { from, to })
        }
    }
}

fn scalar_cast(from: ScalarKind, to: ScalarKind) -> CastKind {
    match (from.is_float(), to.is_float()) {
        (true, true) => match from.bits().cmp(&to.bits()) {
            std::cmp::Ordering::Less => CastKind::FPExt,
            std::cmp::Ordering::Greater => CastKind::FPTrunc,
            std::cmp::Ordering::Equal if from == to => CastKind::Noop,
            std::cmp::Ordering::Equal => CastKind::FPTrunc,
        },
        (false, true) => CastKind::SIToFP,
        (true, false) => CastKind::FPToSI,
        (false, false) => match from.bits().cmp(&to.bits()) {
            std::cmp::Ordering::Greater => CastKind::Trunc,
            std::cmp::Ordering::Equal => CastKind::Noop,
            std::cmp::Ordering::Less if from.is_unsigned() => CastKind::ZExt,
            std::cmp::Ordering::Less => CastKind::SExt,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(kind: ScalarKind) -> Type {
        Type::Scalar(kind)
    }

    #[test]
    fn scalar_casts_pick_width_and_signedness() {
        use ScalarKind::*;
        assert_eq!(cast_kind(&scalar(Int), &scalar(Char)), Ok(CastKind::Trunc));
        assert_eq!(cast_kind(&scalar(Char), &scalar(Long)), Ok(CastKind::SExt));
        assert_eq!(cast_kind(&scalar(Uchar), &scalar(Long)), Ok(CastKind::ZExt));
        assert_eq!(cast_kind(&scalar(Int), &scalar(Uint)), Ok(CastKind::Noop));
        assert_eq!(cast_kind(&scalar(Float), &scalar(Double)), Ok(CastKind::FPExt));
        assert_eq!(cast_kind(&scalar(Double), &scalar(Float)), Ok(CastKind::FPTrunc));
        assert_eq!(cast_kind(&scalar(Uint), &scalar(Double)), Ok(CastKind::SIToFP));
        assert_eq!(cast_kind(&scalar(Float), &scalar(Int)), Ok(CastKind::FPToSI));
    }

    #[test]
    fn pointer_casts() {
        let ptr = Type::int().pointer_to();
        assert_eq!(cast_kind(&ptr, &Type::Scalar(ScalarKind::Long)), Ok(CastKind::PtrToInt));
        assert_eq!(cast_kind(&Type::int(), &ptr), Ok(CastKind::IntToPtr));
        assert_eq!(
            cast_kind(&ptr, &Type::Scalar(ScalarKind::Char).pointer_to()),
            Ok(CastKind::Bitcast)
        );
        assert!(matches!(
            cast_kind(&ptr, &Type::Scalar(ScalarKind::Double)),
            Err(CastError::PointerFloat { .. })
        ));
    }

    #[test]
    fn aggregate_and_void_casts() {
        let a = Type::named("A");
        let b = Type::named("B");
        assert_eq!(cast_kind(&a, &b), Ok(CastKind::Reinterpret));
        assert!(matches!(cast_kind(&a, &Type::int()), Err(CastError::Aggregate { .. })));
        assert!(matches!(cast_kind(&Type::int(), &a), Err(CastError::Aggregate { .. })));
        assert!(matches!(cast_kind(&Type::int(), &Type::Void), Err(CastError::ToVoid { .. })));
    }
}
