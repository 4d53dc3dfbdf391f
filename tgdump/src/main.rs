#[macro_use]
extern crate log;

mod cli;

use std::{fs, process};

use tgdis_core::printer::FormatterFn;
use tgdis_gen::{descriptor::pattern_string, tablegen::Parser, Isa, WordCodec};

use crate::cli::Endian;

fn main() {
    env_logger::init();
    let cli = cli::parse_cli();

    let src = match fs::read_to_string(&cli.path) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("error: failed to read \"{}\", {err}", cli.path);
            process::exit(1);
        }
    };
    let records = match Parser::new(&src).parse() {
        Ok(records) => records,
        Err(err) => {
            eprintln!("error: {}:{err}", cli.path);
            process::exit(1);
        }
    };

    let insn_type = match cli.width {
        0..=8 => "u8",
        9..=16 => "u16",
        17..=32 => "u32",
        _ => "u64",
    };
    let codec = match cli.endian {
        Endian::Big => WordCodec::big_endian(insn_type),
        Endian::Little => WordCodec::little_endian(insn_type),
    };
    let isa = Isa::new("dump")
        .width(cli.width)
        .word_codec(codec)
        .filter_class(cli.class.as_str())
        .skip_conflicts(cli.skip_conflicts);

    let descriptor = isa.descriptor(&records);
    for error in &descriptor.errors {
        warn!("{error}");
    }

    println!(
        "{}: {} instructions, {} register classes, {} registers, {} operand types",
        cli.path,
        descriptor.instructions.len(),
        descriptor.register_classes.len(),
        descriptor.registers.len(),
        descriptor.operand_types.len(),
    );

    for insn in &descriptor.instructions {
        let pseudo = if insn.is_pseudo { "  (pseudo)" } else { "" };
        println!();
        println!(
            "{:<12} {}{pseudo}",
            insn.mnemonic,
            pattern_string(&insn.mask)
        );
        for op in insn.operands() {
            let chunks = FormatterFn(|fmt| {
                if op.chunks.is_empty() {
                    return fmt.write_str("(unresolved)");
                }
                for (i, chunk) in op.chunks.iter().enumerate() {
                    if i != 0 {
                        fmt.write_str(", ")?;
                    }
                    write!(
                        fmt,
                        "bits {}..{} -> {}",
                        chunk.word_pos(),
                        chunk.word_pos() + chunk.len() - 1,
                        chunk.op_pos()
                    )?;
                }
                Ok(())
            });
            println!("    {:<10} {:<8} {chunks}", op.name, op.ty);
        }
    }

    let mut selected: Vec<usize> = descriptor
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, insn)| !insn.is_pseudo)
        .map(|(index, _)| index)
        .collect();
    match isa.build_trie(&descriptor, &mut selected, |message| warn!("{message}")) {
        Ok(trie) => {
            println!();
            println!(
                "decode table: {} patterns, {} payloads, {} entries, root at {}",
                selected.len(),
                trie.payloads().len(),
                trie.size(),
                trie.start(),
            );
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}
