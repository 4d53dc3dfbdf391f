use tgdis_gen::{EmitOptions, Isa, OperandPayload, WordCodec};

fn main() {
    let isa = Isa::new("lima")
        .width(32)
        .word_codec(WordCodec::big_endian("u32"))
        .operand_type(
            OperandPayload::new("GPR", "Reg")
                .decode_with("reg")
                .encode_with("reg_bits"),
        )
        .operand_type(OperandPayload::new("imm16", "u16"))
        .operand_type(OperandPayload::new("imm24", "u32"))
        .emit("lima.td", "generated.rs", EmitOptions::default());

    if let Err(err) = isa.generate() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
