use tracing::trace;

use crate::{
    assembler::{Context, InstructionRecord},
    error::{AsmError, ErrorKind},
    memory::{to_word, MemoryWord, WordKind, BASE_ADDRESS, WORD_MASK},
    operand::Operand,
    span::Span,
    symbol::{SymbolKind, SymbolTable},
};

const REG_SRC_SHIFT: u16 = 4;

/// Words an instruction needs after its base word.
pub fn extra_words(src: Option<&Operand>, dst: Option<&Operand>) -> u16 {
    let words = |op: Option<&Operand>| match op {
        None => 0,
        Some(Operand::Indexed { .. }) => 2,
        Some(_) => 1,
    };
    match (src, dst) {
        (Some(Operand::Register(_)), Some(Operand::Register(_))) => 1,
        _ => words(src) + words(dst),
    }
}

/// Symbols an instruction refers to, with the offset of their word from the base word.
pub fn symbol_refs(record: &InstructionRecord) -> Vec<(&str, u16)> {
    let mut refs = Vec::new();
    let mut offset = 1;
    for op in [&record.src, &record.dst].into_iter().flatten() {
        if let Some(name) = op.symbol() {
            refs.push((name, offset));
        }
        offset += extra_words(Some(op), None);
    }
    refs
}

/// Insert the operand words of every instruction and move everything behind them.
///
/// Returns how many words were added. Unknown symbols are reported and encoded as 0.
pub fn expand(ctx: &mut Context) -> Result<u16, AsmError> {
    let sizes: Vec<u16> = ctx
        .instructions
        .iter()
        .map(|rec| extra_words(rec.src.as_ref(), rec.dst.as_ref()))
        .collect();
    let extra: u16 = sizes.iter().sum();

    // Final address of every base word, plus one past the last
    let mut finals = Vec::with_capacity(sizes.len() + 1);
    let mut next = BASE_ADDRESS;
    for size in &sizes {
        finals.push(next);
        next += 1 + size;
    }
    finals.push(next);

    for sym in ctx.symbols.all_mut().filter(|sym| !sym.is_external) {
        match sym.kind {
            SymbolKind::Data => sym.address += extra,
            SymbolKind::Code => {
                let idx = usize::from(sym.address.saturating_sub(BASE_ADDRESS)).min(sizes.len());
                sym.address = finals[idx];
            }
        }
    }
    ctx.memory.relocate_data(extra);

    let mut code = Vec::with_capacity(ctx.memory.code().len() + usize::from(extra));
    let mut undefined = Vec::new();
    for (rec, base_word) in ctx.instructions.iter().zip(ctx.memory.code()) {
        push_words(&mut code, rec, base_word.value, &ctx.symbols, &mut undefined);
    }
    for (rec, address) in ctx.instructions.iter_mut().zip(&finals) {
        rec.address = *address;
    }
    ctx.diagnostics.extend(undefined);

    trace!(extra, words = code.len(), "expanded operand words");
    ctx.memory.replace_code(code).map_err(AsmError::unplaced)?;
    Ok(extra)
}

fn push_words(
    code: &mut Vec<MemoryWord>,
    rec: &InstructionRecord,
    base_word: u16,
    symbols: &SymbolTable,
    undefined: &mut Vec<AsmError>,
) {
    let mut push = |value: u16| {
        code.push(MemoryWord {
            address: BASE_ADDRESS + code.len() as u16,
            value: value & WORD_MASK,
            kind: WordKind::Code,
        });
    };
    push(base_word);

    if let (Some(Operand::Register(src)), Some(Operand::Register(dst))) = (&rec.src, &rec.dst) {
        push(src.num() << REG_SRC_SHIFT | dst.num());
        return;
    }

    for (op, span) in [(&rec.src, rec.src_span), (&rec.dst, rec.dst_span)] {
        let Some(op) = op else {
            continue;
        };
        match op {
            Operand::Immediate(value) => push(to_word(*value)),
            Operand::Register(reg) => push(reg.num()),
            Operand::Direct(name) => push(resolve(symbols, name, rec, span, undefined)),
            Operand::Indexed { label, index } => {
                push(resolve(symbols, label, rec, span, undefined));
                push(index.num());
            }
        }
    }
}

fn resolve(
    symbols: &SymbolTable,
    name: &str,
    rec: &InstructionRecord,
    span: Option<Span>,
    undefined: &mut Vec<AsmError>,
) -> u16 {
    match symbols.find(name) {
        // Filled in by the linker
        Ok(sym) if sym.is_external => 0,
        Ok(sym) => sym.address,
        Err(_) => {
            let kind = ErrorKind::UndefinedSymbol {
                name: name.to_string(),
            };
            undefined.push(match span {
                Some(span) => AsmError::new(kind, rec.line, span),
                None => AsmError::unplaced(kind),
            });
            0
        }
    }
}
