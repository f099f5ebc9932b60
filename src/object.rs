use std::fmt::Write;

use crate::{
    assembler::Context,
    encoder::decode,
    fixup::symbol_refs,
    memory::{from_word, Encoding, WordKind},
    symbol::SymbolKind,
};

/// Text of the `.ob`, `.ent` and `.ext` files. Empty strings mean the file is not written.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct ObjectArtifacts {
    pub object: String,
    pub entries: String,
    pub externals: String,
}

/// Render a finished run. Returns `None` if the run recorded any error.
pub fn serialize(ctx: &Context, encoding: Encoding) -> Option<ObjectArtifacts> {
    if ctx.has_errors() {
        return None;
    }
    Some(ObjectArtifacts {
        object: object(ctx, encoding),
        entries: entries(ctx),
        externals: externals(ctx),
    })
}

fn object(ctx: &Context, encoding: Encoding) -> String {
    let mut out = format!("{} {}\n", ctx.memory.code().len(), ctx.memory.data().len());
    for word in ctx.memory.iter() {
        let _ = writeln!(out, "{:03} {}", word.address, encoding.encode(word.value));
    }
    out
}

fn entries(ctx: &Context) -> String {
    let mut out = String::new();
    for sym in ctx.symbols.all().filter(|sym| sym.is_entry && !sym.is_external) {
        let _ = writeln!(out, "{} {:03}", sym.name, sym.address);
    }
    out
}

fn externals(ctx: &Context) -> String {
    let mut out = String::new();
    for rec in &ctx.instructions {
        for (name, offset) in symbol_refs(rec) {
            if matches!(ctx.symbols.find(name), Ok(sym) if sym.is_external) {
                let _ = writeln!(out, "{} {:03}", name, rec.address + offset);
            }
        }
    }
    out
}

/// Read back an `.ent` file as `(name, address)` pairs. `None` on a malformed line.
pub fn parse_entries(text: &str) -> Option<Vec<(String, u16)>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, addr) = line.trim().split_once(' ')?;
            Some((name.to_string(), addr.trim().parse().ok()?))
        })
        .collect()
}

/// Human readable listing of the memory image and symbol table, for `--dump`.
pub fn dump(ctx: &Context) -> String {
    let mut out = String::from("Memory:\n");
    let mut records = ctx.instructions.iter().peekable();
    for word in ctx.memory.iter() {
        let _ = write!(out, "  {:03}  {:010b}  ", word.address, word.value);
        match word.kind {
            WordKind::Code => match records.next_if(|rec| rec.address == word.address) {
                Some(rec) => {
                    let (opcode, src, dst) = decode(word.value);
                    let _ = writeln!(
                        out,
                        "{:<24} ; {} src={src:?} dst={dst:?}",
                        rec.source_text,
                        opcode.mnemonic()
                    );
                }
                None => {
                    let _ = writeln!(out, "{:<24} ; operand", "");
                }
            },
            WordKind::Data => {
                let _ = writeln!(out, "{:<24} ; data", from_word(word.value));
            }
        }
    }

    out.push_str("Symbols:\n");
    for sym in ctx.symbols.all() {
        let kind = match sym.kind {
            SymbolKind::Code => "code",
            SymbolKind::Data => "data",
        };
        let mut flags = Vec::new();
        if sym.is_external {
            flags.push("extern");
        }
        if sym.is_entry {
            flags.push("entry");
        }
        let _ = writeln!(
            out,
            "  {:<31} {:03} {kind} {}",
            sym.name,
            sym.address,
            flags.join(",")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::decode_base4;

    fn artifacts(src: &str, encoding: Encoding) -> ObjectArtifacts {
        let mut ctx = Context::new();
        ctx.assemble(src);
        serialize(&ctx, encoding).expect("run should succeed")
    }

    #[test]
    fn object_listing() {
        let obj = artifacts("MAIN: prn #-1\nstop\nV: .data 5, -5\n", Encoding::Base4).object;
        let lines: Vec<&str> = obj.lines().collect();
        assert_eq!(lines[0], "3 2");
        assert_eq!(lines.len(), 6);
        let addrs: Vec<&str> = lines[1..].iter().map(|l| &l[..3]).collect();
        assert_eq!(addrs, vec!["100", "101", "102", "103", "104"]);
        // prn (13) with an immediate source
        assert_eq!(lines[1], "100 aaadb");
        assert_eq!(lines[2], "101 ddddd");
        assert_eq!(decode_base4(&lines[4][4..]), Some(5));
        assert_eq!(from_word(decode_base4(&lines[5][4..]).unwrap()), -5);
    }

    #[test]
    fn single_register_listing() {
        // inc (7), register mode in the source bits
        let obj = artifacts("inc r1\n", Encoding::Base4).object;
        assert_eq!(obj, "2 0\n100 aadbd\n101 aaaab\n");
    }

    #[test]
    fn decimal_listing() {
        let obj = artifacts("stop\n.data -1\n", Encoding::Decimal).object;
        assert_eq!(obj, "1 1\n100 15\n101 1023\n");
    }

    #[test]
    fn entries_round_trip() {
        let src = "\
.entry LOOP
MAIN: mov r1, r2
LOOP: jmp MAIN
V:    .data 7
.entry V
";
        let mut ctx = Context::new();
        ctx.assemble(src);
        let ent = serialize(&ctx, Encoding::Base4).unwrap().entries;
        assert_eq!(ent, "LOOP 102\nV 104\n");

        let parsed = parse_entries(&ent).unwrap();
        let expected: Vec<(String, u16)> = ctx
            .symbols
            .all()
            .filter(|sym| sym.is_entry && !sym.is_external)
            .map(|sym| (sym.name.clone(), sym.address))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn external_use_sites() {
        let src = "\
.extern X
.extern Y
mov X[r1], Y
jsr X
stop
";
        let out = artifacts(src, Encoding::Base4);
        assert_eq!(out.externals, "X 101\nY 103\nX 105\n");
        assert_eq!(out.entries, "");
    }

    #[test]
    fn unused_extern_has_no_use_site() {
        assert_eq!(artifacts(".extern X\nstop\n", Encoding::Base4).externals, "");
    }

    #[test]
    fn errors_suppress_artifacts() {
        let mut ctx = Context::new();
        ctx.assemble(".entry A\nstop\n");
        assert!(serialize(&ctx, Encoding::Base4).is_none());
    }

    #[test]
    fn warnings_do_not_suppress_artifacts() {
        let mut ctx = Context::new();
        ctx.assemble("L: .extern X\nstop\n");
        assert!(serialize(&ctx, Encoding::Base4).is_some());
    }

    #[test]
    fn malformed_entries() {
        assert_eq!(parse_entries("A 100\nB\n"), None);
        assert_eq!(parse_entries(""), Some(vec![]));
    }

    #[test]
    fn dump_lists_everything() {
        let mut ctx = Context::new();
        ctx.assemble("MAIN: add #5, r2\nV: .data -3\n.entry MAIN\n");
        let text = dump(&ctx);
        assert!(text.contains("add #5, r2"));
        assert!(text.contains("; operand"));
        assert!(text.contains("-3"));
        assert!(text.contains("MAIN"));
        assert!(text.contains("100 code entry"));
        assert!(text.contains("103 data"));
    }
}
