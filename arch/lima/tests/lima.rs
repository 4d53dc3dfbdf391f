use tgdis_core::{bytes::Bytes, error::NeedMore};
use tgdis_lima::{
    assemble_instruction, disassemble_instruction, Instruction, Reg, INSN_WIDTH,
};

struct Test<'a> {
    line: usize,
    bytes: Vec<u8>,
    asm: &'a str,
}

/// Parses `bytes  asm` lines; `#` starts a comment.
fn parse_tests(src: &str) -> Vec<Test> {
    let mut tests = Vec::new();
    for (index, line) in src.lines().enumerate() {
        let line = line.split('#').next().unwrap().trim();
        if line.is_empty() {
            continue;
        }
        let mut bytes = Vec::new();
        let mut rest = line;
        while let Some(token) = rest.split_whitespace().next() {
            if token.len() != 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
                break;
            }
            bytes.push(u8::from_str_radix(token, 16).unwrap());
            rest = rest.trim_start().strip_prefix(token).unwrap();
        }
        let asm = rest.trim();
        assert!(
            !bytes.is_empty() && !asm.is_empty(),
            "malformed test line {}",
            index + 1
        );
        tests.push(Test {
            line: index + 1,
            bytes,
            asm,
        });
    }
    tests
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn decode_file() {
    for test in parse_tests(include_str!("lima.test")) {
        let (len, insn) = disassemble_instruction(&test.bytes);
        let insn = match insn {
            Some(insn) => insn,
            None => panic!("failed to decode, lima.test:{}", test.line),
        };
        assert_eq!(len, test.bytes.len(), "lima.test:{}", test.line);
        assert_eq!(
            normalize(&insn.to_string()),
            normalize(test.asm),
            "lima.test:{}",
            test.line
        );

        // the decoded value survives a re-encode
        let bytes = assemble_instruction(&insn);
        assert_eq!(
            disassemble_instruction(&bytes),
            (INSN_WIDTH, Some(insn)),
            "lima.test:{}",
            test.line
        );
    }
}

#[test]
fn round_trip_all_variants() {
    let samples = [
        Instruction::Nop,
        Instruction::Halt,
        Instruction::Add {
            rd: Reg(1),
            rs: Reg(2),
            rt: Reg(3),
        },
        Instruction::Add {
            rd: Reg(15),
            rs: Reg(0),
            rt: Reg(7),
        },
        Instruction::Jmp { target: 0 },
        Instruction::Jmp { target: 0x00ff_ffff },
        Instruction::Mov {
            rd: Reg(2),
            imm: 0x1234,
        },
        Instruction::Mov {
            rd: Reg(0),
            imm: u16::MAX,
        },
        Instruction::Tstb { rd: Reg(0b10110) },
        Instruction::Tstb { rd: Reg(31) },
    ];
    for insn in samples {
        let bytes = assemble_instruction(&insn);
        assert_eq!(disassemble_instruction(&bytes), (INSN_WIDTH, Some(insn)));
    }
}

#[test]
fn assemble_matches_expected_bytes() {
    let bytes = assemble_instruction(&Instruction::Mov {
        rd: Reg(2),
        imm: 0x1234,
    });
    assert_eq!(bytes, [0x82, 0x00, 0x12, 0x34]);

    let bytes = assemble_instruction(&Instruction::Halt);
    assert_eq!(bytes, [0x60, 0x00, 0x00, 0x00]);

    // split field: low three bits land in bits 4..6, high two in 20..21
    let bytes = assemble_instruction(&Instruction::Tstb { rd: Reg(0b10110) });
    assert_eq!(bytes, [0x9c, 0x00, 0x08, 0x00]);
}

#[test]
fn no_match_reports_partial_consumption() {
    assert_eq!(disassemble_instruction(&[0x61, 0x00, 0x00, 0x00]), (1, None));
    assert_eq!(disassemble_instruction(&[0xff, 0xff, 0xff, 0xff]), (1, None));
    assert_eq!(disassemble_instruction(&[]), (0, None));
    // short input is not a failure, just incomplete
    assert_eq!(disassemble_instruction(&[0x82, 0x00]), (2, None));
}

#[test]
fn dont_care_bits_are_ignored_on_decode() {
    let (len, insn) = disassemble_instruction(&[0x60, 0xab, 0xcd, 0xef]);
    assert_eq!((len, insn), (4, Some(Instruction::Halt)));
    // re-encoding produces the canonical form
    assert_eq!(
        assemble_instruction(&Instruction::Halt),
        [0x60, 0x00, 0x00, 0x00]
    );
}

#[test]
fn fixed_bits_are_stable_under_operands() {
    for rd in [0u16, 5, 15] {
        for imm in [0u16, 0x1234, u16::MAX] {
            let bytes = assemble_instruction(&Instruction::Mov { rd: Reg(rd), imm });
            assert_eq!(bytes[0] & 0xf0, 0x80);
            assert_eq!(bytes[1], 0x00);
        }
    }
}

#[test]
fn operands_are_isolated() {
    let a = assemble_instruction(&Instruction::Mov {
        rd: Reg(3),
        imm: 0x0000,
    });
    let b = assemble_instruction(&Instruction::Mov {
        rd: Reg(3),
        imm: 0xbeef,
    });
    // imm only lives in the low half-word
    assert_eq!(a[..2], b[..2]);

    let c = assemble_instruction(&Instruction::Mov {
        rd: Reg(9),
        imm: 0x0000,
    });
    assert_eq!(a[1..], c[1..]);
}

#[test]
fn wide_operand_values_are_truncated() {
    let bytes = assemble_instruction(&Instruction::Mov {
        rd: Reg(0x12),
        imm: 0,
    });
    let canonical = assemble_instruction(&Instruction::Mov {
        rd: Reg(0x2),
        imm: 0,
    });
    assert_eq!(bytes, canonical);

    let (_, insn) = disassemble_instruction(&bytes);
    assert_eq!(
        insn,
        Some(Instruction::Mov {
            rd: Reg(0x2),
            imm: 0
        })
    );
}

#[test]
fn display_and_mnemonic() {
    let insn = Instruction::Add {
        rd: Reg(1),
        rs: Reg(2),
        rt: Reg(3),
    };
    assert_eq!(insn.to_string(), "add r1, r2, r3");
    assert_eq!(insn.mnemonic(), "add");
    assert_eq!(Instruction::Halt.mnemonic(), "halt");
}

#[test]
fn streaming_decode() {
    let insns = [
        Instruction::Mov {
            rd: Reg(1),
            imm: 7,
        },
        Instruction::Add {
            rd: Reg(1),
            rs: Reg(1),
            rt: Reg(2),
        },
        Instruction::Halt,
    ];
    let mut stream = Vec::new();
    for insn in &insns {
        stream.extend_from_slice(&assemble_instruction(insn));
    }

    let mut bytes = Bytes::new(&stream);
    let mut seen = Vec::new();
    while !bytes.is_empty() {
        let (len, insn) = disassemble_instruction(bytes.tail());
        let insn = insn.expect("valid stream");
        let raw = bytes.read(len).expect("stream holds a full instruction");
        assert_eq!(raw, assemble_instruction(&insn));
        seen.push(insn);
    }
    assert_eq!(seen, insns);

    // the exhausted cursor reports the missing byte count
    assert_eq!(bytes.read(1), Err(NeedMore(1)));
}
