//! Front end for LLVM TableGen textual dumps.
//!
//! Only the record subset needed to reconstruct instruction encodings is
//! understood: classes, defs, typed declarations, bit vectors, DAG operand
//! lists and string/int literals. DAG semantics are not evaluated.

mod ast;
mod intern;
mod lexer;
mod parser;

pub use self::ast::{
    BitsElem, Class, ClassParam, DagArg, DagItem, DagValue, Decl, DeclItem, DeclType, Def, Expr,
    Records, Sym,
};
pub use self::intern::Interner;
pub use self::lexer::{Lexer, Token, TokenKind};
pub use self::parser::{ParseError, Parser};
