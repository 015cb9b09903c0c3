//! Normalized bytecode rendering and content hashing for deduplication.
//!
//! Two evaluators with identical `eval` instruction streams produce
//! identical normalized strings, enabling Murmur3-based node sharing in the
//! unit registry. The rendering is label-offset-free: branches print only
//! their opcode, so two units that differ in layout but not in instruction
//! sequence still collide, and slot/pool indices keep the rendering exact.
//!
//! NOTE: Murmur3-F is **not** cryptographically secure. The registry guards
//! against collisions by also comparing the normalized string.

use crate::chunk::{CodeUnit, Op, PoolConst};

/// Render the instructions of the named method as the canonical
/// one-line-per-instruction string. Returns `None` if the method is absent.
pub fn normalized_method_text(unit: &CodeUnit, method_name: &str) -> Option<String> {
    let (_, method) = unit.method_named(method_name)?;
    let mut out = String::with_capacity(method.code.len() * 12);

    for op in &method.code {
        render_op(unit, op, &mut out);
        out.push('\n');
    }

    Some(out)
}

fn render_op(unit: &CodeUnit, op: &Op, out: &mut String) {
    use std::fmt::Write;

    match *op {
        Op::Const(idx) => match unit.consts.get(idx as usize) {
            Some(PoolConst::Int(v)) => {
                let _ = write!(out, "const {v}");
            }
            Some(PoolConst::Long(v)) => {
                let _ = write!(out, "const {v}");
            }
            Some(PoolConst::Float(bits)) => {
                let _ = write!(out, "const {}", f32::from_bits(*bits));
            }
            Some(PoolConst::Double(bits)) => {
                let _ = write!(out, "const {}", f64::from_bits(*bits));
            }
            Some(PoolConst::Str(s)) => {
                let _ = write!(out, "const {}", unit.string(*s));
            }
            Some(PoolConst::Null) | None => out.push_str("const null"),
        },
        Op::Load(kind, slot) => {
            let _ = write!(out, "{}LOAD {slot}", kind.prefix());
        }
        Op::Store(kind, slot) => {
            let _ = write!(out, "{}STORE {slot}", kind.prefix());
        }
        Op::Iinc(slot, delta) => {
            let _ = write!(out, "IINC {slot} {delta}");
        }
        Op::Add(k) => {
            let _ = write!(out, "{}ADD", k.prefix());
        }
        Op::Sub(k) => {
            let _ = write!(out, "{}SUB", k.prefix());
        }
        Op::Mul(k) => {
            let _ = write!(out, "{}MUL", k.prefix());
        }
        Op::Div(k) => {
            let _ = write!(out, "{}DIV", k.prefix());
        }
        Op::Rem(k) => {
            let _ = write!(out, "{}REM", k.prefix());
        }
        Op::Neg(k) => {
            let _ = write!(out, "{}NEG", k.prefix());
        }
        Op::BitAnd(w) => {
            let _ = write!(out, "{}AND", w.prefix());
        }
        Op::BitOr(w) => {
            let _ = write!(out, "{}OR", w.prefix());
        }
        Op::BitXor(w) => {
            let _ = write!(out, "{}XOR", w.prefix());
        }
        Op::Shl(w) => {
            let _ = write!(out, "{}SHL", w.prefix());
        }
        Op::Shr(w) => {
            let _ = write!(out, "{}SHR", w.prefix());
        }
        Op::Ushr(w) => {
            let _ = write!(out, "{}USHR", w.prefix());
        }
        Op::Conv(from, to) => {
            let _ = write!(out, "{}2{}", from.prefix(), to.prefix());
        }
        Op::Lcmp => out.push_str("LCMP"),
        Op::Fcmpl => out.push_str("FCMPL"),
        Op::Fcmpg => out.push_str("FCMPG"),
        Op::Dcmpl => out.push_str("DCMPL"),
        Op::Dcmpg => out.push_str("DCMPG"),
        // Branches are rendered without their target
        Op::If(cmp, _) => {
            let _ = write!(out, "jump IF{}", cmp.suffix());
        }
        Op::IfICmp(cmp, _) => {
            let _ = write!(out, "jump IF_ICMP{}", cmp.suffix());
        }
        Op::IfAcmpEq(_) => out.push_str("jump IF_ACMPEQ"),
        Op::IfAcmpNe(_) => out.push_str("jump IF_ACMPNE"),
        Op::IfNull(_) => out.push_str("jump IFNULL"),
        Op::IfNonNull(_) => out.push_str("jump IFNONNULL"),
        Op::Goto(_) => out.push_str("jump GOTO"),
        Op::CheckCast(idx) => {
            let _ = write!(out, "CHECKCAST {}", unit.string(idx));
        }
        Op::InvokeStatic(idx) => {
            let (owner, name, desc) = unit.ref_parts(idx);
            let _ = write!(out, "INVOKESTATIC {owner}.{name}{desc}");
        }
        Op::InvokeVirtual(idx) => {
            let (owner, name, desc) = unit.ref_parts(idx);
            let _ = write!(out, "INVOKEVIRTUAL {owner}.{name}{desc}");
        }
        Op::InvokeInterface(idx) => {
            let (owner, name, desc) = unit.ref_parts(idx);
            let _ = write!(out, "INVOKEINTERFACE {owner}.{name}{desc}");
        }
        Op::InvokeCtor(idx) => {
            let (owner, name, desc) = unit.ref_parts(idx);
            let _ = write!(out, "NEW {owner}\nINVOKESPECIAL {owner}.{name}{desc}");
        }
        Op::Pop => out.push_str("POP"),
        Op::Return(kind) => {
            let _ = write!(out, "{}RETURN", kind.prefix());
        }
        Op::ReturnVoid => out.push_str("RETURN"),
        Op::DynAdd => out.push_str("DYNADD"),
        Op::DynSub => out.push_str("DYNSUB"),
        Op::DynMul => out.push_str("DYNMUL"),
        Op::DynDiv => out.push_str("DYNDIV"),
        Op::DynRem => out.push_str("DYNREM"),
        Op::DynNeg => out.push_str("DYNNEG"),
        Op::DynNot => out.push_str("DYNNOT"),
        Op::DynBitNot => out.push_str("DYNBITNOT"),
        Op::DynBitAnd => out.push_str("DYNBITAND"),
        Op::DynBitOr => out.push_str("DYNBITOR"),
        Op::DynBitXor => out.push_str("DYNBITXOR"),
        Op::DynShl => out.push_str("DYNSHL"),
        Op::DynShr => out.push_str("DYNSHR"),
        Op::DynUshr => out.push_str("DYNUSHR"),
        Op::DynCmp(cmp) => {
            let _ = write!(out, "DYNCMP_{}", cmp.suffix());
        }
        Op::DynGetField(idx) => {
            let _ = write!(out, "DYNGETFIELD {}", unit.string(idx));
        }
        Op::DynSetField(idx) => {
            let _ = write!(out, "DYNSETFIELD {}", unit.string(idx));
        }
        Op::DynIndex => out.push_str("DYNINDEX"),
        Op::DynIndexSet => out.push_str("DYNINDEXSET"),
        Op::DynInvoke(idx, argc) => {
            let _ = write!(out, "DYNINVOKE {}/{argc}", unit.string(idx));
        }
        Op::DynInvokeStatic(idx, argc) => {
            let (owner, name, _) = unit.ref_parts(idx);
            let _ = write!(out, "DYNINVOKESTATIC {owner}.{name}/{argc}");
        }
        Op::DynNew(idx, argc) => {
            let _ = write!(out, "DYNNEW {}/{argc}", unit.string(idx));
        }
        Op::DynCast(idx) => {
            let _ = write!(out, "DYNCAST {}", unit.string(idx));
        }
    }
}

// ─── Murmur3-F (x64 128-bit, seed 0) ─────────────────────────────────────

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
const fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[inline]
fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    let mut v = 0u64;
    let mut i = 0;
    while i < 8 && offset + i < bytes.len() {
        v |= (bytes[offset + i] as u64) << (8 * i);
        i += 1;
    }
    v
}

/// Murmur3-F: the 128-bit x64 variant, seed 0.
///
/// The 16-byte digest is the big-endian concatenation of the two 64-bit
/// state halves.
pub fn murmur3_f(bytes: &[u8]) -> [u8; 16] {
    let mut h1: u64 = 0;
    let mut h2: u64 = 0;
    let block_count = bytes.len() / 16;

    for block in 0..block_count {
        let mut k1 = read_u64_le(bytes, block * 16);
        let mut k2 = read_u64_le(bytes, block * 16 + 8);

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = &bytes[block_count * 16..];
    if !tail.is_empty() {
        let mut k1 = read_u64_le(tail, 0);
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;

        if tail.len() > 8 {
            let mut k2 = read_u64_le(tail, 8);
            k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
            h2 ^= k2;
        }
    }

    h1 ^= bytes.len() as u64;
    h2 ^= bytes.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    let mut digest = [0u8; 16];
    digest[..8].copy_from_slice(&h1.to_be_bytes());
    digest[8..].copy_from_slice(&h2.to_be_bytes());
    digest
}

/// Digest of a normalized method string.
pub fn content_digest(normalized: &str) -> [u8; 16] {
    murmur3_f(normalized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Cmp, CodeBuilder, NumKind, Op, UnitBuilder};
    use ruse_ast::ValueKind;

    fn sample_unit(class_name: &str, slot: u16) -> CodeUnit {
        let mut builder = UnitBuilder::new(class_name);
        let c50 = builder.const_int(50);
        let get = builder.method_ref(
            "java.util.Map",
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        );

        let mut code = CodeBuilder::new();
        let done = code.new_label();
        code.emit(Op::Load(ValueKind::Reference, 1));
        code.emit(Op::Const(c50));
        code.emit(Op::InvokeInterface(get));
        code.jump_if(Cmp::Eq, done);
        code.emit(Op::Add(NumKind::Int));
        code.bind(done);
        code.emit(Op::Return(ValueKind::Reference));

        builder.add_method(
            "eval",
            "(Ljava/util/Map;)Ljava/lang/Object;",
            slot,
            code.finish().unwrap(),
        );
        builder.into_unit()
    }

    #[test]
    fn rendering_follows_line_grammar() {
        let unit = sample_unit("A", 2);
        let text = normalized_method_text(&unit, "eval").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "ALOAD 1",
                "const 50",
                "INVOKEINTERFACE java.util.Map.get(Ljava/lang/Object;)Ljava/lang/Object;",
                "jump IFEQ",
                "IADD",
                "ARETURN",
            ]
        );
    }

    #[test]
    fn rendering_ignores_unit_name() {
        // Same instructions, different class names → same normalized text
        let a = normalized_method_text(&sample_unit("A", 2), "eval").unwrap();
        let b = normalized_method_text(&sample_unit("B", 2), "eval").unwrap();
        assert_eq!(a, b);
        assert_eq!(content_digest(&a), content_digest(&b));
    }

    #[test]
    fn missing_method_yields_none() {
        let unit = sample_unit("A", 2);
        assert!(normalized_method_text(&unit, "missing").is_none());
    }

    #[test]
    fn murmur_empty_input_is_zero() {
        // With seed 0 and no input every mixing step is the identity
        assert_eq!(murmur3_f(b""), [0u8; 16]);
    }

    #[test]
    fn murmur_is_deterministic_and_discriminating() {
        let a = murmur3_f(b"ILOAD 2\nICONST 50\n");
        let b = murmur3_f(b"ILOAD 2\nICONST 50\n");
        let c = murmur3_f(b"ILOAD 2\nICONST 51\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn murmur_block_boundaries() {
        // Cross the 16-byte block boundary and the 8-byte tail split
        let inputs: Vec<Vec<u8>> = (0..40usize).map(|n| vec![0xAB; n]).collect();
        let digests: Vec<_> = inputs.iter().map(|v| murmur3_f(v)).collect();
        for (i, a) in digests.iter().enumerate() {
            for (j, b) in digests.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "collision between lengths {i} and {j}");
                }
            }
        }
    }

    #[test]
    fn digest_layout_is_big_endian_halves() {
        let digest = murmur3_f(b"x");
        let h1 = u64::from_be_bytes(digest[..8].try_into().unwrap());
        let h2 = u64::from_be_bytes(digest[8..].try_into().unwrap());
        assert_ne!(h1, 0);
        assert_ne!(h2, 0);
    }
}
