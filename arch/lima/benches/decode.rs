use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use tgdis_lima::{assemble_instruction, disassemble_instruction, Instruction, Reg};

fn code_buffer() -> Vec<u8> {
    let insns = [
        Instruction::Nop,
        Instruction::Add {
            rd: Reg(1),
            rs: Reg(2),
            rt: Reg(3),
        },
        Instruction::Mov {
            rd: Reg(7),
            imm: 0x1234,
        },
        Instruction::Jmp { target: 0x4000 },
        Instruction::Tstb { rd: Reg(22) },
        Instruction::Halt,
    ];

    let mut code = Vec::new();
    for _ in 0..1024 {
        for insn in &insns {
            code.extend_from_slice(&assemble_instruction(insn));
        }
    }
    code
}

fn lima_bench(c: &mut Criterion) {
    let code = code_buffer();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(code.len() as u64));
    group.bench_function("lima", |b| {
        b.iter(|| {
            let mut offset = 0;
            let mut count = 0;
            while offset < code.len() {
                match disassemble_instruction(&code[offset..]) {
                    (len, Some(_)) => {
                        count += 1;
                        offset += len;
                    }
                    _ => panic!(),
                }
            }
            count
        })
    });
    group.finish();
}

criterion_group!(benches, lima_bench);
criterion_main!(benches);
