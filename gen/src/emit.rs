//! Emits the Rust source for one generated ISA: the typed instruction enum,
//! the trie-driven decoder, the assembler and the asm-template printer.

use std::io::{self, Write};

use crate::{
    descriptor::{InstructionDescriptor, IsaDescriptor, OperandDescriptor},
    trie::ByteTrie,
    EmitOptions, Isa,
};

#[derive(Debug)]
pub enum EmitError {
    Io(io::Error),
    /// The asm template names an operand the instruction does not have.
    Template { mnemonic: String, operand: String },
}

impl From<io::Error> for EmitError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

pub fn generate<W: Write>(
    isa: &Isa,
    descriptor: &IsaDescriptor,
    selected: &[usize],
    trie: &ByteTrie<usize>,
    opts: &EmitOptions,
    out: &mut W,
) -> Result<(), EmitError> {
    let emitter = Emitter {
        isa,
        descriptor,
        selected,
        trie,
        opts,
    };
    emitter.generate(out)
}

struct Emitter<'a> {
    isa: &'a Isa,
    descriptor: &'a IsaDescriptor,
    selected: &'a [usize],
    trie: &'a ByteTrie<usize>,
    opts: &'a EmitOptions,
}

impl Emitter<'_> {
    fn generate<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        writeln!(
            out,
            "// Generated by tgdis-gen for the {} ISA. Do not edit.",
            self.isa.name()
        )?;
        writeln!(out)?;
        writeln!(
            out,
            "pub const INSN_WIDTH: usize = {};",
            self.isa.width_bytes()
        )?;

        self.gen_enum(out)?;
        self.gen_mnemonic(out)?;
        self.gen_tables(out)?;
        self.gen_decoders(out)?;
        self.gen_disassemble(out)?;
        self.gen_assemble(out)?;
        self.gen_display(out)?;
        Ok(())
    }

    fn instructions(&self) -> impl Iterator<Item = &InstructionDescriptor> {
        self.selected
            .iter()
            .map(|index| &self.descriptor.instructions[*index])
    }

    fn target_type(&self, op: &OperandDescriptor) -> &str {
        self.isa
            .payload(&op.ty)
            .map(|payload| payload.target_type())
            .unwrap_or("u64")
    }

    fn gen_enum<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        writeln!(out)?;
        writeln!(out, "#[derive(Copy, Clone, Debug, PartialEq, Eq)]")?;
        writeln!(out, "pub enum {} {{", self.opts.type_name)?;
        for insn in self.instructions() {
            let variant = variant_name(&insn.mnemonic);
            if insn.operands().next().is_none() {
                writeln!(out, "    {variant},")?;
                continue;
            }
            write!(out, "    {variant} {{ ")?;
            for (i, op) in insn.operands().enumerate() {
                if i != 0 {
                    write!(out, ", ")?;
                }
                write!(out, "{}: {}", field_name(&op.name), self.target_type(op))?;
            }
            writeln!(out, " }},")?;
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn gen_mnemonic<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let ty = self.opts.type_name;
        writeln!(out)?;
        writeln!(out, "impl {ty} {{")?;
        writeln!(out, "    pub fn mnemonic(&self) -> &'static str {{")?;
        writeln!(out, "        match self {{")?;
        for insn in self.instructions() {
            let variant = variant_name(&insn.mnemonic);
            let fields = if insn.operands().next().is_none() {
                ""
            } else {
                " { .. }"
            };
            writeln!(
                out,
                "            Self::{variant}{fields} => \"{}\",",
                mnemonic_string(&insn.mnemonic)
            )?;
        }
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn gen_tables<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let entries = self.trie.entries();
        writeln!(out)?;
        writeln!(out, "static TRIE_ENTRIES: [i32; {}] = [", entries.len())?;
        for block in entries.chunks(16) {
            write!(out, "   ")?;
            for entry in block {
                if *entry == tgdis_core::decode::NO_MATCH {
                    write!(out, " i32::MIN,")?;
                } else {
                    write!(out, " {entry},")?;
                }
            }
            writeln!(out)?;
        }
        writeln!(out, "];")?;

        writeln!(out)?;
        writeln!(
            out,
            "const DECODE_TABLE: tgdis_core::decode::DecodeTable<'static> ="
        )?;
        writeln!(
            out,
            "    tgdis_core::decode::DecodeTable::new(&TRIE_ENTRIES, {}, {});",
            self.trie.start(),
            self.isa.width_bytes()
        )?;

        writeln!(out)?;
        writeln!(
            out,
            "static DECODERS: [fn(u64) -> {}; {}] = [",
            self.opts.type_name,
            self.trie.payloads().len()
        )?;
        for payload in self.trie.payloads() {
            let insn = &self.descriptor.instructions[*payload];
            writeln!(out, "    decode_{},", fn_name(&insn.mnemonic))?;
        }
        writeln!(out, "];")?;
        Ok(())
    }

    fn gen_decoders<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let width = self.isa.width_bits();
        for insn in self.instructions() {
            let variant = variant_name(&insn.mnemonic);
            let name = fn_name(&insn.mnemonic);
            writeln!(out)?;
            if insn.operands().next().is_none() {
                writeln!(
                    out,
                    "fn decode_{name}(_word: u64) -> {} {{",
                    self.opts.type_name
                )?;
                writeln!(out, "    {}::{variant}", self.opts.type_name)?;
                writeln!(out, "}}")?;
                continue;
            }
            writeln!(out, "fn decode_{name}(word: u64) -> {} {{", self.opts.type_name)?;
            for op in insn.operands() {
                let field = format!(
                    "tgdis_core::bits::field_from_word(word, {width}, &{})",
                    chunk_slice(op)
                );
                let value = match self.isa.payload(&op.ty).and_then(|p| p.decode_fn()) {
                    Some(wrap) => format!("{wrap}({field})"),
                    None => format!("{field} as {}", self.target_type(op)),
                };
                writeln!(out, "    let {} = {value};", field_name(&op.name))?;
            }
            write!(out, "    {}::{variant} {{ ", self.opts.type_name)?;
            for (i, op) in insn.operands().enumerate() {
                if i != 0 {
                    write!(out, ", ")?;
                }
                write!(out, "{}", field_name(&op.name))?;
            }
            writeln!(out, " }}")?;
            writeln!(out, "}}")?;
        }
        Ok(())
    }

    fn gen_disassemble<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let ty = self.opts.type_name;
        writeln!(out)?;
        writeln!(
            out,
            "/// Decodes at most one instruction from the head of `bytes`."
        )?;
        writeln!(
            out,
            "pub fn disassemble_instruction(bytes: &[u8]) -> (usize, Option<{ty}>) {{"
        )?;
        writeln!(out, "    let (len, payload) = DECODE_TABLE.lookup(bytes);")?;
        writeln!(out, "    match payload {{")?;
        writeln!(out, "        Some(payload) => {{")?;
        writeln!(out, "            let mut raw = [0; INSN_WIDTH];")?;
        writeln!(
            out,
            "            raw.copy_from_slice(&bytes[..INSN_WIDTH]);"
        )?;
        writeln!(
            out,
            "            let word = {}(raw) as u64;",
            self.isa.word_codec_ref().from_expr()
        )?;
        writeln!(out, "            (len, Some(DECODERS[payload](word)))")?;
        writeln!(out, "        }}")?;
        writeln!(out, "        None => (len, None),")?;
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn gen_assemble<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let ty = self.opts.type_name;
        let width = self.isa.width_bits();
        writeln!(out)?;
        writeln!(out, "/// Encodes an instruction value; operand values wider")?;
        writeln!(out, "/// than their encoded fields are truncated.")?;
        writeln!(
            out,
            "pub fn assemble_instruction(insn: &{ty}) -> [u8; INSN_WIDTH] {{"
        )?;
        writeln!(out, "    let word: u64 = match insn {{")?;
        for insn in self.instructions() {
            let variant = variant_name(&insn.mnemonic);
            let base = insn.base_word();
            if insn.operands().next().is_none() {
                writeln!(out, "        {ty}::{variant} => {base:#x},")?;
                continue;
            }
            write!(out, "        {ty}::{variant} {{ ")?;
            for (i, op) in insn.operands().enumerate() {
                if i != 0 {
                    write!(out, ", ")?;
                }
                write!(out, "{}", field_name(&op.name))?;
            }
            writeln!(out, " }} => {{")?;
            writeln!(out, "            let mut word = {base:#x};")?;
            for op in insn.operands() {
                let name = field_name(&op.name);
                let value = match self.isa.payload(&op.ty).and_then(|p| p.encode_fn()) {
                    Some(unwrap) => format!("{unwrap}(*{name})"),
                    None => format!("*{name} as u64"),
                };
                writeln!(
                    out,
                    "            tgdis_core::bits::field_into_word(&mut word, {width}, {value}, &{});",
                    chunk_slice(op)
                )?;
            }
            writeln!(out, "            word")?;
            writeln!(out, "        }}")?;
        }
        writeln!(out, "    }};")?;
        writeln!(
            out,
            "    {}(word as {})",
            self.isa.word_codec_ref().to_expr(),
            self.opts.insn_type
        )?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn gen_display<W: Write>(&self, out: &mut W) -> Result<(), EmitError> {
        let ty = self.opts.type_name;
        writeln!(out)?;
        writeln!(out, "impl core::fmt::Display for {ty} {{")?;
        writeln!(
            out,
            "    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {{"
        )?;
        writeln!(out, "        match self {{")?;
        for insn in self.instructions() {
            let variant = variant_name(&insn.mnemonic);
            let (pieces, args) = self.template(insn)?;
            if insn.operands().next().is_none() || args.is_empty() {
                // all-literal template, printed verbatim
                let plain: String = pieces
                    .iter()
                    .map(|piece| match piece {
                        Piece::Text(text) => escape_str(text),
                        Piece::Hole(_) => String::new(),
                    })
                    .collect();
                let fields = if insn.operands().next().is_none() {
                    ""
                } else {
                    " { .. }"
                };
                writeln!(
                    out,
                    "            {ty}::{variant}{fields} => fmt.write_str(\"{plain}\"),"
                )?;
                continue;
            }
            let format: String = pieces
                .iter()
                .map(|piece| match piece {
                    Piece::Text(text) => escape_braces(&escape_str(text)),
                    Piece::Hole(index) => format!("{{{index}}}"),
                })
                .collect();
            write!(out, "            {ty}::{variant} {{ ")?;
            for arg in &args {
                write!(out, "{arg}, ")?;
            }
            write!(out, ".. }} => ")?;
            write!(out, "write!(fmt, \"{format}\"")?;
            for arg in &args {
                write!(out, ", {arg}")?;
            }
            writeln!(out, "),")?;
        }
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    /// Splits the asm template into literal text and operand holes;
    /// `$name` placeholders index into the returned argument list.
    fn template(
        &self,
        insn: &InstructionDescriptor,
    ) -> Result<(Vec<Piece>, Vec<String>), EmitError> {
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut args: Vec<String> = Vec::new();
        let mut chars = insn.asm_string.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '$' {
                text.push(ch);
                continue;
            }
            let mut name = String::new();
            while let Some(ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || *ch == '_' {
                    name.push(*ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                text.push('$');
                continue;
            }
            let op = insn.operands().find(|op| &*op.name == name);
            match op {
                Some(op) => {
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    let arg = field_name(&op.name);
                    let index = match args.iter().position(|a| *a == arg) {
                        Some(index) => index,
                        None => {
                            args.push(arg);
                            args.len() - 1
                        }
                    };
                    pieces.push(Piece::Hole(index));
                }
                None => {
                    return Err(EmitError::Template {
                        mnemonic: insn.mnemonic.to_string(),
                        operand: name,
                    })
                }
            }
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok((pieces, args))
    }
}

enum Piece {
    Text(String),
    Hole(usize),
}

/// CamelCase variant name from an `UPPER_SNAKE` mnemonic.
fn variant_name(mnemonic: &str) -> String {
    let mut out = String::new();
    for part in mnemonic.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(|c| c.to_lowercase()));
        }
    }
    out
}

fn fn_name(mnemonic: &str) -> String {
    mnemonic.to_lowercase()
}

/// Printed mnemonic: lower case, `_` separators become dots.
fn mnemonic_string(mnemonic: &str) -> String {
    mnemonic
        .chars()
        .map(|c| match c {
            '_' => '.',
            _ => c.to_ascii_lowercase(),
        })
        .collect()
}

const KEYWORDS: &[&str] = &["as", "fn", "if", "in", "mod", "ref", "use"];

fn field_name(operand: &str) -> String {
    let name = operand.to_lowercase();
    if KEYWORDS.contains(&name.as_str()) {
        format!("{name}_")
    } else {
        name
    }
}

fn chunk_slice(op: &OperandDescriptor) -> String {
    let mut out = String::from("[");
    for (i, chunk) in op.chunks.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(&format!(
            "tgdis_core::bits::BitChunk::new({}, {}, {})",
            chunk.word_pos(),
            chunk.op_pos(),
            chunk.len()
        ));
    }
    out.push(']');
    out
}

/// String-literal escaping for emitted source.
fn escape_str(text: &str) -> String {
    text.chars().flat_map(char::escape_default).collect()
}

/// Doubles braces so literal text survives a `write!` format string.
fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}
