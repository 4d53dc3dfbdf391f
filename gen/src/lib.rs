//! Build-time generator: consumes an LLVM TableGen textual dump and emits a
//! specialized disassembler, assembler and printer for the described ISA.

pub mod descriptor;
pub mod emit;
pub mod tablegen;
pub mod trie;

use std::{
    fmt,
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use crate::{
    descriptor::IsaDescriptor,
    emit::EmitError,
    tablegen::{Def, ParseError, Parser, Records},
    trie::{AmbiguityError, ByteTrie, TriePattern},
};

#[derive(Debug)]
pub enum ErrorKind {
    SourceFile(io::Error),
    OutputDir(io::Error),
    OutputFile(io::Error),
    Parse(ParseError),
    Conflict(AmbiguityError),
    Template { mnemonic: String, operand: String },
    Generate(io::Error),
}

#[derive(Debug)]
pub struct Error {
    path: PathBuf,
    kind: ErrorKind,
}

impl Error {
    fn new<S: Into<PathBuf>>(path: S, kind: ErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use ErrorKind as E;

        let path = self.path.display();
        match &self.kind {
            E::SourceFile(error) => {
                write!(fmt, "failed to read source file \"{path}\", {error}")
            }
            E::OutputDir(error) => {
                write!(fmt, "failed to create output directory \"{path}\", {error}")
            }
            E::OutputFile(error) => {
                write!(fmt, "failed to create output file \"{path}\", {error}")
            }
            E::Parse(error) => write!(fmt, "failed to parse \"{path}\", {error}"),
            E::Conflict(error) => {
                write!(fmt, "failed to build decoder for \"{path}\", {error}")
            }
            E::Template { mnemonic, operand } => write!(
                fmt,
                "invalid asm template for {mnemonic}, unknown operand \"${operand}\""
            ),
            E::Generate(error) => {
                write!(fmt, "failed to generate output file \"{path}\", {error}")
            }
        }
    }
}

fn create_file(path: &Path) -> Result<File, Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| Error::new(parent, ErrorKind::OutputDir(error)))?;
    }
    File::create(path).map_err(|error| Error::new(path, ErrorKind::OutputFile(error)))
}

/// Endian adapters between the byte stream and the logical instruction
/// word (bit 0 = MSB).
///
/// The two closures are used at build time to permute trie patterns; the
/// expressions name the equivalent callables in generated code. The pair
/// must compose to the identity on the instruction width.
#[derive(Clone)]
pub struct WordCodec {
    from_bytes: fn(&[u8]) -> u64,
    to_bytes: fn(u64, &mut [u8]),
    from_expr: String,
    to_expr: String,
}

impl WordCodec {
    pub fn big_endian(insn_type: &str) -> Self {
        Self {
            from_bytes: be_word_from_bytes,
            to_bytes: be_word_to_bytes,
            from_expr: format!("{insn_type}::from_be_bytes"),
            to_expr: format!("{insn_type}::to_be_bytes"),
        }
    }

    pub fn little_endian(insn_type: &str) -> Self {
        Self {
            from_bytes: le_word_from_bytes,
            to_bytes: le_word_to_bytes,
            from_expr: format!("{insn_type}::from_le_bytes"),
            to_expr: format!("{insn_type}::to_le_bytes"),
        }
    }

    /// Arbitrary bit permutation, e.g. half-word swapped streams.
    ///
    /// `from_expr`/`to_expr` name functions visible to the generated code
    /// with the same signatures as `<int>::from_be_bytes`/`to_be_bytes`.
    pub fn custom(
        from_bytes: fn(&[u8]) -> u64,
        to_bytes: fn(u64, &mut [u8]),
        from_expr: impl Into<String>,
        to_expr: impl Into<String>,
    ) -> Self {
        Self {
            from_bytes,
            to_bytes,
            from_expr: from_expr.into(),
            to_expr: to_expr.into(),
        }
    }

    pub fn word_from_bytes(&self, bytes: &[u8]) -> u64 {
        (self.from_bytes)(bytes)
    }

    pub fn word_to_bytes(&self, word: u64, out: &mut [u8]) {
        (self.to_bytes)(word, out)
    }

    pub(crate) fn from_expr(&self) -> &str {
        &self.from_expr
    }

    pub(crate) fn to_expr(&self) -> &str {
        &self.to_expr
    }
}

fn be_word_from_bytes(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |word, byte| (word << 8) | *byte as u64)
}

fn be_word_to_bytes(word: u64, out: &mut [u8]) {
    let len = out.len();
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (word >> ((len - 1 - i) * 8)) as u8;
    }
}

fn le_word_from_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0, |word, byte| (word << 8) | *byte as u64)
}

fn le_word_to_bytes(word: u64, out: &mut [u8]) {
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (word >> (i * 8)) as u8;
    }
}

/// Decoder/encoder adapters for one operand-type string.
///
/// `decode_with` wraps the raw field into the payload type; `encode_with`
/// projects it back to a `u64`. Both default to plain integer casts and
/// must be bijective over the covered bit range.
#[derive(Clone, Debug)]
pub struct OperandPayload {
    name: String,
    target_type: String,
    decode_with: Option<String>,
    encode_with: Option<String>,
}

impl OperandPayload {
    pub fn new(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            decode_with: None,
            encode_with: None,
        }
    }

    pub fn decode_with(mut self, function: impl Into<String>) -> Self {
        self.decode_with = Some(function.into());
        self
    }

    pub fn encode_with(mut self, function: impl Into<String>) -> Self {
        self.encode_with = Some(function.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub(crate) fn decode_fn(&self) -> Option<&str> {
        self.decode_with.as_deref()
    }

    pub(crate) fn encode_fn(&self) -> Option<&str> {
        self.encode_with.as_deref()
    }
}

#[derive(Clone)]
pub struct EmitOptions {
    /// Name of the generated instruction enum.
    pub type_name: &'static str,
    /// Integer type holding one instruction word.
    pub insn_type: &'static str,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            type_name: "Instruction",
            insn_type: "u32",
        }
    }
}

struct EmitTask {
    source: PathBuf,
    output: PathBuf,
    opts: EmitOptions,
}

fn any_def(_: &Def) -> bool {
    true
}

/// One ISA configuration, consumed from a build script.
pub struct Isa {
    name: String,
    width_bits: u32,
    filter_class: String,
    filter: fn(&Def) -> bool,
    codec: WordCodec,
    payloads: Vec<OperandPayload>,
    skip_conflicts: bool,
    tasks: Vec<EmitTask>,
}

impl Isa {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width_bits: 32,
            filter_class: "Instruction".into(),
            filter: any_def,
            codec: WordCodec::big_endian("u32"),
            payloads: Vec::new(),
            skip_conflicts: false,
            tasks: Vec::new(),
        }
    }

    /// Fixed instruction width in bits; a multiple of 8, at most 64.
    pub fn width(mut self, bits: u32) -> Self {
        assert!(bits != 0 && bits % 8 == 0 && bits <= 64);
        self.width_bits = bits;
        self
    }

    pub fn word_codec(mut self, codec: WordCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Superclass name selecting instruction defs [default: `Instruction`].
    pub fn filter_class(mut self, class: impl Into<String>) -> Self {
        self.filter_class = class.into();
        self
    }

    /// Extra predicate over defs already matching the filter class.
    pub fn filter(mut self, filter: fn(&Def) -> bool) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn accepts(&self, def: &Def) -> bool {
        def.has_superclass(&self.filter_class) && (self.filter)(def)
    }

    pub fn operand_type(mut self, payload: OperandPayload) -> Self {
        self.payloads.push(payload);
        self
    }

    /// Drop all but the first of each conflicting pattern group instead of
    /// failing the build.
    pub fn skip_conflicts(mut self, enabled: bool) -> Self {
        self.skip_conflicts = enabled;
        self
    }

    /// Queues one source dump for code generation into `OUT_DIR/output`.
    pub fn emit(
        mut self,
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        opts: EmitOptions,
    ) -> Self {
        self.tasks.push(EmitTask {
            source: source.as_ref().into(),
            output: output.as_ref().into(),
            opts,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width_bits(&self) -> u32 {
        self.width_bits
    }

    pub fn width_bytes(&self) -> usize {
        self.width_bits as usize / 8
    }

    pub fn word_codec_ref(&self) -> &WordCodec {
        &self.codec
    }

    pub fn payload(&self, ty: &str) -> Option<&OperandPayload> {
        self.payloads.iter().find(|p| p.name == ty)
    }

    /// Lowers parsed records into the descriptor for this configuration.
    pub fn descriptor(&self, records: &Records) -> IsaDescriptor {
        descriptor::build(self, records)
    }

    /// Builds the decode trie over the given instruction indices.
    ///
    /// Conflicts are either fatal or, with [`Isa::skip_conflicts`], resolved
    /// by dropping every pattern after the first of each group; dropped
    /// mnemonics are reported through `warn`.
    pub fn build_trie(
        &self,
        descriptor: &IsaDescriptor,
        selected: &mut Vec<usize>,
        mut warn: impl FnMut(&str),
    ) -> Result<ByteTrie<usize>, AmbiguityError> {
        loop {
            let patterns = selected
                .iter()
                .map(|index| {
                    let insn = &descriptor.instructions[*index];
                    let (required, value) = insn.stream_masks();
                    TriePattern::new(insn.mnemonic.to_string(), required, value, *index)
                })
                .collect();
            match ByteTrie::build(self.width_bytes(), patterns) {
                Ok(trie) => return Ok(trie),
                Err(error) if self.skip_conflicts => {
                    for group in &error.conflicts {
                        for tag in &group[1..] {
                            warn(&format!(
                                "skipping ambiguous encoding {tag}, conflicts with {}",
                                group[0]
                            ));
                            selected.retain(|index| {
                                &*descriptor.instructions[*index].mnemonic != tag.as_str()
                            });
                        }
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Runs every queued emit task. Must be called from a build script.
    pub fn generate(self) -> Result<(), Error> {
        let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());

        for task in &self.tasks {
            let source = &task.source;
            println!("cargo:rerun-if-changed={}", source.display());

            let src = fs::read_to_string(source)
                .map_err(|error| Error::new(source, ErrorKind::SourceFile(error)))?;
            let records = Parser::new(&src)
                .parse()
                .map_err(|error| Error::new(source, ErrorKind::Parse(error)))?;

            let descriptor = self.descriptor(&records);
            for error in &descriptor.errors {
                println!("cargo:warning={error}");
            }

            let mut selected: Vec<usize> = descriptor
                .instructions
                .iter()
                .enumerate()
                .filter(|(_, insn)| !insn.is_pseudo)
                .map(|(index, _)| index)
                .collect();
            let trie = self
                .build_trie(&descriptor, &mut selected, |message| {
                    println!("cargo:warning={message}");
                })
                .map_err(|error| Error::new(source, ErrorKind::Conflict(error)))?;

            let path = out_dir.join(&task.output);
            let mut out = create_file(&path).map(BufWriter::new)?;
            emit::generate(&self, &descriptor, &selected, &trie, &task.opts, &mut out).map_err(
                |error| match error {
                    EmitError::Io(error) => Error::new(&path, ErrorKind::Generate(error)),
                    EmitError::Template { mnemonic, operand } => {
                        Error::new(&path, ErrorKind::Template { mnemonic, operand })
                    }
                },
            )?;
        }

        Ok(())
    }
}
