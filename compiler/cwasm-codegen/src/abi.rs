//! How C types map onto WebAssembly values, signatures and memory accesses.

use cwasm_ir::ty::{IrFloatKind, IrFunctionTy, IrIntegerKind, IrTy};
use cwasm_wasm::instr::{LoadKind, MemArg, StoreKind};
use cwasm_wasm::{FuncType, ValType};

/// The operand type holding a value of `ty`. Aggregates are represented by their address.
pub fn val_type(ty: &IrTy) -> Option<ValType> {
    match ty {
        IrTy::Void | IrTy::Function(_) => None,
        IrTy::Integer(IrIntegerKind::I64 | IrIntegerKind::U64) => Some(ValType::I64),
        IrTy::Integer(_) | IrTy::Pointer(_) | IrTy::Array(_, _) | IrTy::Record(_) => {
            Some(ValType::I32)
        }
        IrTy::Float(IrFloatKind::F32) => Some(ValType::F32),
        IrTy::Float(IrFloatKind::F64) => Some(ValType::F64),
    }
}

/// Lower a C function type.
///
/// A struct or union result is written through a hidden leading destination pointer, and a
/// variadic function takes the address of its argument area as a hidden trailing parameter.
pub fn signature(ty: &IrFunctionTy) -> FuncType {
    let mut params = Vec::with_capacity(ty.parameters.len() + 2);
    if ty.return_type.is_record() {
        params.push(ValType::I32);
    }
    params.extend(ty.parameters.iter().filter_map(val_type));
    if ty.variadic {
        params.push(ValType::I32);
    }
    let result = match ty.return_type.is_record() {
        true => None,
        false => val_type(&ty.return_type),
    };
    FuncType::new(params, result)
}

/// The integer kind a scalar is handled as. Pointers are unsigned 32-bit integers.
pub fn integer_kind(ty: &IrTy) -> Option<IrIntegerKind> {
    match ty {
        IrTy::Integer(kind) => Some(*kind),
        IrTy::Pointer(_) => Some(IrIntegerKind::U32),
        _ => None,
    }
}

fn natural_align(width: u32) -> MemArg {
    MemArg::new(0, width.trailing_zeros())
}

/// The instruction loading a scalar of `ty`. Narrow integers are extended to their promoted
/// representation.
pub fn load(ty: &IrTy) -> (LoadKind, MemArg) {
    let kind = match ty {
        IrTy::Integer(IrIntegerKind::Bool | IrIntegerKind::U8) => LoadKind::I32U8,
        IrTy::Integer(IrIntegerKind::I8) => LoadKind::I32S8,
        IrTy::Integer(IrIntegerKind::I16) => LoadKind::I32S16,
        IrTy::Integer(IrIntegerKind::U16) => LoadKind::I32U16,
        IrTy::Integer(IrIntegerKind::I64 | IrIntegerKind::U64) => LoadKind::I64,
        IrTy::Float(IrFloatKind::F32) => LoadKind::F32,
        IrTy::Float(IrFloatKind::F64) => LoadKind::F64,
        _ => LoadKind::I32,
    };
    (kind, natural_align(kind.width()))
}

pub fn store(ty: &IrTy) -> (StoreKind, MemArg) {
    let kind = match ty {
        IrTy::Integer(IrIntegerKind::Bool | IrIntegerKind::U8 | IrIntegerKind::I8) => {
            StoreKind::I32T8
        }
        IrTy::Integer(IrIntegerKind::I16 | IrIntegerKind::U16) => StoreKind::I32T16,
        IrTy::Integer(IrIntegerKind::I64 | IrIntegerKind::U64) => StoreKind::I64,
        IrTy::Float(IrFloatKind::F32) => StoreKind::F32,
        IrTy::Float(IrFloatKind::F64) => StoreKind::F64,
        _ => StoreKind::I32,
    };
    (kind, natural_align(kind.width()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_results_become_leading_pointer() {
        let ty = IrFunctionTy {
            return_type: IrTy::Record(cwasm_ir::ty::RecordId(0)),
            parameters: vec![IrTy::DOUBLE, IrTy::pointer_to(IrTy::CHAR)],
            variadic: true,
            prototype: true,
        };
        let lowered = signature(&ty);
        assert_eq!(
            lowered.params,
            vec![ValType::I32, ValType::F64, ValType::I32, ValType::I32]
        );
        assert_eq!(lowered.result, None);
    }

    #[test]
    fn test_narrow_loads_extend() {
        assert_eq!(load(&IrTy::CHAR).0, LoadKind::I32S8);
        assert_eq!(load(&IrTy::Integer(IrIntegerKind::U16)).0, LoadKind::I32U16);
        assert_eq!(store(&IrTy::Integer(IrIntegerKind::U64)), (StoreKind::I64, MemArg::new(0, 3)));
    }
}
