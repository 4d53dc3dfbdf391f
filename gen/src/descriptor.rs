//! Lowers parsed records into the canonical instruction descriptors used by
//! the trie builder and the emitter.

use std::{collections::HashMap, fmt};

use tgdis_core::bits::BitChunk;

use crate::{
    tablegen::{BitsElem, DagItem, Decl, DeclItem, Def, Records, Sym},
    Isa,
};

/// One position of an instruction pattern, most significant bit first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bit {
    Zero,
    One,
    Any,
}

impl Bit {
    pub const fn is_fixed(&self) -> bool {
        !matches!(self, Bit::Any)
    }
}

/// Renders a pattern as `0`/`1`/`.` per bit, for diagnostics.
pub fn pattern_string(mask: &[Bit]) -> String {
    mask.iter()
        .map(|bit| match bit {
            Bit::Zero => '0',
            Bit::One => '1',
            Bit::Any => '.',
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct OperandDescriptor {
    pub name: Sym,
    /// Operand-type string from the operand list DAG (e.g. `GPR`).
    pub ty: Sym,
    pub chunks: Vec<BitChunk>,
}

#[derive(Clone, Debug)]
pub struct InstructionDescriptor {
    pub mnemonic: Sym,
    /// Logical-order pattern, bit 0 = MSB of the instruction word.
    pub raw_mask: Vec<Bit>,
    /// Byte-stream-order pattern after the word codec permutation.
    pub mask: Vec<Bit>,
    pub output_ops: Vec<OperandDescriptor>,
    pub input_ops: Vec<OperandDescriptor>,
    pub namespace: String,
    pub decoder_namespace: String,
    pub asm_string: String,
    pub is_pseudo: bool,
}

impl InstructionDescriptor {
    /// Canonical operand order: outputs then inputs, declaration order.
    pub fn operands(&self) -> impl Iterator<Item = &OperandDescriptor> {
        self.output_ops.iter().chain(self.input_ops.iter())
    }

    /// The instruction word with fixed bits at their required values and
    /// all other bits zero.
    pub fn base_word(&self) -> u64 {
        let width = self.raw_mask.len() as u32;
        let mut word = 0;
        for (i, bit) in self.raw_mask.iter().enumerate() {
            if let Bit::One = bit {
                word |= 1 << (width - 1 - i as u32);
            }
        }
        word
    }

    /// Fixed-bit mask of the logical word.
    pub fn required_word(&self) -> u64 {
        let width = self.raw_mask.len() as u32;
        let mut word = 0;
        for (i, bit) in self.raw_mask.iter().enumerate() {
            if bit.is_fixed() {
                word |= 1 << (width - 1 - i as u32);
            }
        }
        word
    }

    /// Stream-order `(required, value)` byte masks for the trie builder.
    pub fn stream_masks(&self) -> (Vec<u8>, Vec<u8>) {
        let len = self.mask.len() / 8;
        let mut required = vec![0u8; len];
        let mut value = vec![0u8; len];
        for (i, bit) in self.mask.iter().enumerate() {
            let mask = 0x80 >> (i % 8);
            match bit {
                Bit::Zero => required[i / 8] |= mask,
                Bit::One => {
                    required[i / 8] |= mask;
                    value[i / 8] |= mask;
                }
                Bit::Any => {}
            }
        }
        (required, value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandErrorKind {
    /// Operand is listed but no `Inst` bit refers to it.
    NoBits,
    /// Two `Inst` positions claim the same operand bit.
    Overlap,
    /// `Inst` refers to a field that is not in any operand list.
    NotListed,
    /// The def has no `Inst` bit vector of the configured width.
    MissingInst,
}

#[derive(Clone, Debug)]
pub struct OperandError {
    pub mnemonic: Sym,
    pub operand: Sym,
    pub kind: OperandErrorKind,
}

impl fmt::Display for OperandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mnemonic = &self.mnemonic;
        let operand = &self.operand;
        match self.kind {
            OperandErrorKind::NoBits => {
                write!(fmt, "{mnemonic}: operand \"{operand}\" has no encoding bits")
            }
            OperandErrorKind::Overlap => write!(
                fmt,
                "{mnemonic}: operand \"{operand}\" bits are encoded more than once"
            ),
            OperandErrorKind::NotListed => write!(
                fmt,
                "{mnemonic}: encoding field \"{operand}\" is not a declared operand"
            ),
            OperandErrorKind::MissingInst => {
                write!(fmt, "{mnemonic}: missing or malformed \"Inst\" field")
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IsaDescriptor {
    pub instructions: Vec<InstructionDescriptor>,
    pub register_classes: Vec<Sym>,
    pub registers: Vec<Sym>,
    /// Distinct operand-type strings, in order of first appearance.
    pub operand_types: Vec<Sym>,
    /// Non-fatal operand-mapping failures, surfaced as warnings.
    pub errors: Vec<OperandError>,
}

pub(crate) fn build(isa: &Isa, records: &Records) -> IsaDescriptor {
    let mut descriptor = IsaDescriptor::default();

    for def in &records.defs {
        if def.has_superclass("Register") {
            descriptor.registers.push(def.name.clone());
        }
        if def.has_superclass("RegisterClass") {
            descriptor.register_classes.push(def.name.clone());
        }
        if !isa.accepts(def) {
            continue;
        }
        let insn = instruction(isa, def, &mut descriptor.errors);
        for op in insn.operands() {
            if !descriptor.operand_types.contains(&op.ty) {
                descriptor.operand_types.push(op.ty.clone());
            }
        }
        descriptor.instructions.push(insn);
    }

    descriptor
}

/// Resolved meaning of one `Inst` position.
#[derive(Clone)]
enum InstBit {
    Fixed(bool),
    Free,
    Field(Sym, u32),
}

fn instruction(isa: &Isa, def: &Def, errors: &mut Vec<OperandError>) -> InstructionDescriptor {
    let width = isa.width_bits() as usize;
    let is_pseudo = def.bit("isPseudo");

    let bits = resolve_inst_bits(def, width);
    if bits.is_none() && !is_pseudo {
        errors.push(OperandError {
            mnemonic: def.name.clone(),
            operand: "Inst".into(),
            kind: OperandErrorKind::MissingInst,
        });
    }
    let bits = bits.unwrap_or_else(|| vec![InstBit::Free; width]);

    let raw_mask: Vec<Bit> = bits
        .iter()
        .map(|bit| match bit {
            InstBit::Fixed(false) => Bit::Zero,
            InstBit::Fixed(true) => Bit::One,
            _ => Bit::Any,
        })
        .collect();
    let mask = stream_mask(&raw_mask, isa);

    let mut output_ops = operand_list(def.dag_value("OutOperandList"));
    let mut input_ops = operand_list(def.dag_value("InOperandList"));

    let chunks = scan_chunks(&bits);
    let listed: Vec<&Sym> = output_ops
        .iter()
        .chain(input_ops.iter())
        .map(|(name, _)| name)
        .collect();
    for name in chunks.keys() {
        if !listed.iter().any(|l| *l == name) {
            errors.push(OperandError {
                mnemonic: def.name.clone(),
                operand: name.clone(),
                kind: OperandErrorKind::NotListed,
            });
        }
    }

    let mut assign = |ops: &mut Vec<(Sym, Sym)>| -> Vec<OperandDescriptor> {
        ops.drain(..)
            .map(|(name, ty)| {
                let chunks = match chunks.get(&name) {
                    Some(chunks) => match check_coverage(chunks) {
                        Ok(()) => chunks.clone(),
                        Err(kind) => {
                            errors.push(OperandError {
                                mnemonic: def.name.clone(),
                                operand: name.clone(),
                                kind,
                            });
                            Vec::new()
                        }
                    },
                    None => {
                        errors.push(OperandError {
                            mnemonic: def.name.clone(),
                            operand: name.clone(),
                            kind: OperandErrorKind::NoBits,
                        });
                        Vec::new()
                    }
                };
                OperandDescriptor { name, ty, chunks }
            })
            .collect()
    };

    let output_ops = assign(&mut output_ops);
    let input_ops = assign(&mut input_ops);

    InstructionDescriptor {
        mnemonic: def.name.clone(),
        raw_mask,
        mask,
        output_ops,
        input_ops,
        namespace: def.str_value("Namespace").unwrap_or("").to_owned(),
        decoder_namespace: def.str_value("DecoderNamespace").unwrap_or("").to_owned(),
        asm_string: def.str_value("AsmString").unwrap_or("").to_owned(),
        is_pseudo,
    }
}

/// Resolves the `Inst` bit vector against sibling declarations of the def.
///
/// A reference whose sibling carries a concrete bit becomes fixed; anything
/// else stays a named operand field (or a plain don't-care).
fn resolve_inst_bits(def: &Def, width: usize) -> Option<Vec<InstBit>> {
    let elems = def.bits_value("Inst")?;
    if elems.len() != width {
        return None;
    }
    let resolved = elems
        .iter()
        .map(|elem| match elem {
            BitsElem::Bit(b) => InstBit::Fixed(*b),
            BitsElem::Unset => InstBit::Free,
            BitsElem::Ref(name) => resolve_ref(def.decl(name), name, 0),
            BitsElem::RefBit(name, idx) => resolve_ref(def.decl(name), name, *idx),
        })
        .collect();
    Some(resolved)
}

fn resolve_ref(sibling: Option<&Decl>, name: &Sym, idx: u32) -> InstBit {
    match sibling.map(|decl| &decl.value) {
        Some(DeclItem::Bit(b)) if idx == 0 => InstBit::Fixed(*b),
        Some(DeclItem::Bits(elems)) => {
            // sibling vectors are listed MSB first
            let pos = elems.len().checked_sub(1 + idx as usize);
            match pos.and_then(|pos| elems.get(pos)) {
                Some(BitsElem::Bit(b)) => InstBit::Fixed(*b),
                _ => InstBit::Field(name.clone(), idx),
            }
        }
        _ => InstBit::Field(name.clone(), idx),
    }
}

/// Coalesces field references into per-operand chunk lists.
///
/// A run extends while consecutive instruction bits carry consecutive
/// operand bits (descending toward the operand LSB). Split fields produce
/// several chunks, ordered by instruction position.
fn scan_chunks(bits: &[InstBit]) -> HashMap<Sym, Vec<BitChunk>> {
    let mut chunks: HashMap<Sym, Vec<BitChunk>> = HashMap::new();
    let mut run: Option<(Sym, usize, u32)> = None; // (name, start, last idx)

    for (pos, bit) in bits.iter().enumerate() {
        let field = match bit {
            InstBit::Field(name, idx) => Some((name, *idx)),
            _ => None,
        };
        let extends = match (&run, &field) {
            (Some((name, _, last)), Some((next, idx))) => {
                *name == **next && *last > 0 && *idx == *last - 1
            }
            _ => false,
        };
        if extends {
            if let Some((_, _, last)) = &mut run {
                *last -= 1;
            }
        } else {
            flush_run(&mut chunks, &mut run, pos);
            if let Some((name, idx)) = field {
                run = Some((name.clone(), pos, idx));
            }
        }
    }
    flush_run(&mut chunks, &mut run, bits.len());
    chunks
}

fn flush_run(
    chunks: &mut HashMap<Sym, Vec<BitChunk>>,
    run: &mut Option<(Sym, usize, u32)>,
    end: usize,
) {
    if let Some((name, start, last)) = run.take() {
        let len = (end - start) as u8;
        chunks
            .entry(name)
            .or_default()
            .push(BitChunk::new(start as u8, last as u8, len));
    }
}

/// Every operand bit must be covered at most once.
fn check_coverage(chunks: &[BitChunk]) -> Result<(), OperandErrorKind> {
    let mut seen = 0u64;
    for chunk in chunks {
        for bit in chunk.op_pos()..chunk.op_pos() + chunk.len() {
            let mask = 1 << bit;
            if seen & mask != 0 {
                return Err(OperandErrorKind::Overlap);
            }
            seen |= mask;
        }
    }
    Ok(())
}

fn operand_list(dag: Option<&DagItem>) -> Vec<(Sym, Sym)> {
    let mut ops = Vec::new();
    if let Some(dag) = dag {
        for arg in &dag.args {
            if let (Some(ty), Some(name)) = (arg.type_name(), &arg.name) {
                ops.push((name.clone(), ty.clone()));
            }
        }
    }
    ops
}

/// Permutes a logical-order pattern into byte-stream order through the
/// word codec.
fn stream_mask(raw: &[Bit], isa: &Isa) -> Vec<Bit> {
    let width = raw.len() as u32;
    let bytes = raw.len() / 8;
    let mut required = 0u64;
    let mut value = 0u64;
    for (i, bit) in raw.iter().enumerate() {
        let mask = 1 << (width - 1 - i as u32);
        match bit {
            Bit::Zero => required |= mask,
            Bit::One => {
                required |= mask;
                value |= mask;
            }
            Bit::Any => {}
        }
    }

    let codec = isa.word_codec_ref();
    let mut required_bytes = vec![0; bytes];
    let mut value_bytes = vec![0; bytes];
    codec.word_to_bytes(required, &mut required_bytes);
    codec.word_to_bytes(value, &mut value_bytes);

    let mut mask = Vec::with_capacity(raw.len());
    for i in 0..raw.len() {
        let bit = 0x80 >> (i % 8);
        let byte = i / 8;
        mask.push(if required_bytes[byte] & bit != 0 {
            if value_bytes[byte] & bit != 0 {
                Bit::One
            } else {
                Bit::Zero
            }
        } else {
            Bit::Any
        });
    }
    mask
}
