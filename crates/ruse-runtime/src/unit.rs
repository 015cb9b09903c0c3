//! Unit loading: decoding, structural verification, and method-ref linking.
//!
//! `load` is the runtime's analogue of class definition. A unit that fails
//! verification is refused outright — the direct emitter is expected to
//! produce verifiable units, so a rejection here is an emitter bug and must
//! surface, never be silently retried.

use crate::chunk::{
    decode_unit, descriptor_param_count, descriptor_return, CodeUnit, MethodDef, Op,
};
use crate::digest::{content_digest, normalized_method_text};
use crate::error::CompileError;
use crate::types::{MethodInfo, TypeRegistry};
use std::sync::Arc;

/// The entry method every evaluator unit carries.
pub const EVAL_METHOD: &str = "eval";

/// Link result for one pooled method ref.
#[derive(Debug, Clone)]
pub enum MethodBinding {
    /// Resolved to a registered native implementation.
    Native(Arc<MethodInfo>),
    /// Instance dispatch through the receiver's runtime type.
    Virtual,
    /// A method of this same unit (the erasure bridge forwarding).
    OwnMethod(usize),
}

/// A verified, linked unit ready for execution.
#[derive(Debug)]
pub struct LoadedUnit {
    pub unit: CodeUnit,
    pub bindings: Vec<MethodBinding>,
    /// Normalized `eval` instruction text (the dedup identity).
    pub normalized: String,
    /// Murmur3-F digest of `normalized`.
    pub digest: [u8; 16],
}

impl LoadedUnit {
    pub fn name(&self) -> &str {
        self.unit.name()
    }
}

/// Decode, verify and link unit bytes.
pub fn load(bytes: &[u8], types: &TypeRegistry) -> Result<Arc<LoadedUnit>, CompileError> {
    let unit = decode_unit(bytes)?;
    verify(&unit)?;

    let normalized = normalized_method_text(&unit, EVAL_METHOD).ok_or_else(|| {
        CompileError::new(format!("unit '{}' has no {EVAL_METHOD} method", unit.name()))
    })?;
    let digest = content_digest(&normalized);

    let bindings = link(&unit, types)?;

    Ok(Arc::new(LoadedUnit {
        unit,
        bindings,
        normalized,
        digest,
    }))
}

// ─── Linking ─────────────────────────────────────────────────────────────

fn link(unit: &CodeUnit, types: &TypeRegistry) -> Result<Vec<MethodBinding>, CompileError> {
    let own_name = unit.name().to_string();
    let mut bindings = Vec::with_capacity(unit.method_refs.len());

    for idx in 0..unit.method_refs.len() {
        let (owner, name, descriptor) = unit.ref_parts(idx as u16);

        if owner == own_name {
            let target = unit
                .methods
                .iter()
                .position(|m| unit.string(m.name) == name && unit.string(m.descriptor) == descriptor)
                .ok_or_else(|| {
                    CompileError::new(format!(
                        "unit '{own_name}' references missing own method {name}{descriptor}"
                    ))
                })?;
            bindings.push(MethodBinding::OwnMethod(target));
            continue;
        }

        let arity = if let Some(argc) = descriptor.strip_prefix('*') {
            // dynamic-arity ref from the fallback path
            argc.parse::<usize>().map_err(|_| {
                CompileError::new(format!("bad dynamic descriptor '{descriptor}'"))
            })?
        } else {
            descriptor_param_count(descriptor)
        };

        match types.find_method(owner, name, arity) {
            Some(info) if info.native.is_some() => bindings.push(MethodBinding::Native(info)),
            Some(_) => bindings.push(MethodBinding::Virtual),
            None if name == "<init>" => {
                return Err(CompileError::new(format!(
                    "no constructor {owner}/{arity} registered"
                )));
            }
            None => bindings.push(MethodBinding::Virtual),
        }
    }

    Ok(bindings)
}

// ─── Structural verification ─────────────────────────────────────────────

/// Verify pool indices, slot bounds, branch targets and stack balance.
pub fn verify(unit: &CodeUnit) -> Result<(), CompileError> {
    for method in &unit.methods {
        verify_method(unit, method).map_err(|e| {
            CompileError::new(format!(
                "verification of {}.{} failed: {}",
                unit.name(),
                unit.string(method.name),
                e.message
            ))
        })?;
    }
    Ok(())
}

fn verify_method(unit: &CodeUnit, method: &MethodDef) -> Result<(), CompileError> {
    let code = &method.code;
    if code.is_empty() {
        return Err(CompileError::new("empty code"));
    }

    // Per-instruction stack depth; None = not yet reached.
    let mut depths: Vec<Option<u32>> = vec![None; code.len()];
    let mut worklist = vec![(0usize, 0u32)];

    while let Some((pc, depth)) = worklist.pop() {
        if pc >= code.len() {
            return Err(CompileError::new("control flow past end of code"));
        }
        match depths[pc] {
            Some(existing) if existing != depth => {
                return Err(CompileError::new(format!(
                    "stack depth mismatch at {pc}: {existing} vs {depth}"
                )));
            }
            Some(_) => continue,
            None => depths[pc] = Some(depth),
        }

        let op = &code[pc];
        check_operands(unit, method, op)?;

        let (pops, pushes) = stack_effect(unit, op)?;
        if depth < pops {
            return Err(CompileError::new(format!(
                "stack underflow at {pc}: depth {depth}, pops {pops}"
            )));
        }
        let after = depth - pops + pushes;

        match op {
            Op::Return(_) | Op::ReturnVoid => {}
            Op::Goto(target) => worklist.push((*target as usize, after)),
            Op::If(_, target)
            | Op::IfICmp(_, target)
            | Op::IfAcmpEq(target)
            | Op::IfAcmpNe(target)
            | Op::IfNull(target)
            | Op::IfNonNull(target) => {
                worklist.push((*target as usize, after));
                worklist.push((pc + 1, after));
            }
            _ => {
                if pc + 1 == code.len() {
                    return Err(CompileError::new("control falls off end of code"));
                }
                worklist.push((pc + 1, after));
            }
        }
    }

    Ok(())
}

fn check_operands(unit: &CodeUnit, method: &MethodDef, op: &Op) -> Result<(), CompileError> {
    let slot_ok = |slot: u16| {
        if slot < method.max_slots {
            Ok(())
        } else {
            Err(CompileError::new(format!(
                "slot {slot} out of bounds (max {})",
                method.max_slots
            )))
        }
    };
    let string_ok = |idx: u16| {
        if (idx as usize) < unit.strings.len() {
            Ok(())
        } else {
            Err(CompileError::new(format!("string index {idx} out of bounds")))
        }
    };
    let ref_ok = |idx: u16| {
        if (idx as usize) < unit.method_refs.len() {
            Ok(())
        } else {
            Err(CompileError::new(format!(
                "method ref index {idx} out of bounds"
            )))
        }
    };

    match *op {
        Op::Const(idx) => {
            if (idx as usize) >= unit.consts.len() {
                return Err(CompileError::new(format!(
                    "constant index {idx} out of bounds"
                )));
            }
            Ok(())
        }
        Op::Load(_, slot) | Op::Store(_, slot) | Op::Iinc(slot, _) => slot_ok(slot),
        Op::CheckCast(idx)
        | Op::DynGetField(idx)
        | Op::DynSetField(idx)
        | Op::DynInvoke(idx, _)
        | Op::DynNew(idx, _)
        | Op::DynCast(idx) => string_ok(idx),
        Op::InvokeStatic(idx)
        | Op::InvokeVirtual(idx)
        | Op::InvokeInterface(idx)
        | Op::InvokeCtor(idx)
        | Op::DynInvokeStatic(idx, _) => ref_ok(idx),
        _ => Ok(()),
    }
}

/// (pops, pushes) of one instruction.
fn stack_effect(unit: &CodeUnit, op: &Op) -> Result<(u32, u32), CompileError> {
    Ok(match *op {
        Op::Const(_) | Op::Load(..) => (0, 1),
        Op::Store(..) => (1, 0),
        Op::Iinc(..) => (0, 0),
        Op::Add(_)
        | Op::Sub(_)
        | Op::Mul(_)
        | Op::Div(_)
        | Op::Rem(_)
        | Op::BitAnd(_)
        | Op::BitOr(_)
        | Op::BitXor(_)
        | Op::Shl(_)
        | Op::Shr(_)
        | Op::Ushr(_) => (2, 1),
        Op::Neg(_) | Op::Conv(..) | Op::CheckCast(_) => (1, 1),
        Op::Lcmp | Op::Fcmpl | Op::Fcmpg | Op::Dcmpl | Op::Dcmpg => (2, 1),
        Op::If(..) | Op::IfNull(_) | Op::IfNonNull(_) => (1, 0),
        Op::IfICmp(..) | Op::IfAcmpEq(_) | Op::IfAcmpNe(_) => (2, 0),
        Op::Goto(_) => (0, 0),
        Op::InvokeStatic(idx) | Op::InvokeCtor(idx) => {
            let (_, _, desc) = unit.ref_parts(idx);
            let (argc, pushes) = invoke_shape(desc, matches!(op, Op::InvokeCtor(_)))?;
            (argc, pushes)
        }
        Op::InvokeVirtual(idx) | Op::InvokeInterface(idx) => {
            let (_, _, desc) = unit.ref_parts(idx);
            let (argc, pushes) = invoke_shape(desc, false)?;
            (argc + 1, pushes)
        }
        Op::Pop => (1, 0),
        Op::Return(_) => (1, 0),
        Op::ReturnVoid => (0, 0),
        Op::DynAdd
        | Op::DynSub
        | Op::DynMul
        | Op::DynDiv
        | Op::DynRem
        | Op::DynBitAnd
        | Op::DynBitOr
        | Op::DynBitXor
        | Op::DynShl
        | Op::DynShr
        | Op::DynUshr
        | Op::DynCmp(_) => (2, 1),
        Op::DynNeg | Op::DynNot | Op::DynBitNot | Op::DynGetField(_) | Op::DynCast(_) => (1, 1),
        Op::DynSetField(_) | Op::DynIndex => (2, 1),
        Op::DynIndexSet => (3, 1),
        Op::DynInvoke(_, argc) => (argc as u32 + 1, 1),
        Op::DynInvokeStatic(_, argc) | Op::DynNew(_, argc) => (argc as u32, 1),
    })
}

fn invoke_shape(descriptor: &str, is_ctor: bool) -> Result<(u32, u32), CompileError> {
    if let Some(argc) = descriptor.strip_prefix('*') {
        let argc: u32 = argc
            .parse()
            .map_err(|_| CompileError::new(format!("bad dynamic descriptor '{descriptor}'")))?;
        return Ok((argc, 1));
    }
    let argc = descriptor_param_count(descriptor) as u32;
    let pushes = if is_ctor || descriptor_return(descriptor) != "V" {
        1
    } else {
        0
    };
    Ok((argc, pushes))
}
