use std::{fmt, str::FromStr};

use bpaf::*;

#[derive(Copy, Clone, Debug)]
pub enum Endian {
    Big,
    Little,
}

impl fmt::Display for Endian {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Endian::Big => "big",
            Endian::Little => "little",
        };
        fmt.write_str(s)
    }
}

impl FromStr for Endian {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "big" | "be" => Ok(Endian::Big),
            "little" | "le" => Ok(Endian::Little),
            _ => Err("invalid byte order"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cli {
    pub width: u32,
    pub endian: Endian,
    pub class: String,
    pub skip_conflicts: bool,
    pub path: String,
}

pub fn parse_cli() -> Cli {
    let width = short('w')
        .long("width")
        .help("Instruction width in bits [default: 32]")
        .argument::<u32>("BITS")
        .guard(
            |bits| *bits != 0 && *bits % 8 == 0 && *bits <= 64,
            "width must be a non-zero multiple of 8, at most 64",
        )
        .fallback(32);

    let endian = short('e')
        .long("endian")
        .help("Instruction word byte order [default: big, valid: big, little]")
        .argument::<Endian>("ORDER")
        .fallback(Endian::Big);

    let class = short('c')
        .long("class")
        .help("Superclass selecting instruction defs [default: Instruction]")
        .argument::<String>("NAME")
        .fallback("Instruction".to_owned());

    let skip_conflicts = long("skip-conflicts")
        .help("Drop conflicting encodings instead of failing")
        .switch();

    let path = positional::<String>("FILE").help("TableGen dump to inspect");

    construct!(Cli {
        width,
        endian,
        class,
        skip_conflicts,
        path,
    })
    .to_options()
    .version(env!("CARGO_PKG_VERSION"))
    .descr("Print instruction encodings and decoder statistics for a TableGen dump")
    .fallback_to_usage()
    .run()
}
