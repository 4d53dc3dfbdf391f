use std::fmt;

use super::{
    ast::{
        BitsElem, Class, ClassParam, DagArg, DagItem, DagValue, Decl, DeclItem, DeclType, Def,
        Expr, Records,
    },
    intern::Interner,
    lexer::{parse_int, Lexer, Token, TokenKind},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(super) fn new(line: usize, column: usize, message: String) -> Self {
        Self {
            line,
            column,
            message,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Recursive-descent parser over one dump.
///
/// Parsing is fatal: the first malformed record aborts with the offending
/// position. No partial AST is returned.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    interner: Interner,
    peeked: Option<Token>,
}

impl<'src> Parser<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            lexer: Lexer::new(src),
            interner: Interner::new(),
            peeked: None,
        }
    }

    pub fn parse(mut self) -> Result<Records, ParseError> {
        self.header("Classes")?;
        let mut records = Records::default();
        while self.at_keyword("class")? {
            records.classes.push(self.class()?);
        }
        self.header("Defs")?;
        while self.at_keyword("def")? {
            records.defs.push(self.def()?);
        }
        let token = self.bump()?;
        if token.kind != TokenKind::Eof {
            return Err(unexpected(&token, "end of input"));
        }
        Ok(records)
    }

    fn header(&mut self, word: &str) -> Result<(), ParseError> {
        self.expect(TokenKind::Dashes)?;
        let token = self.expect(TokenKind::Ident)?;
        if token.text != word {
            return Err(unexpected(&token, &format!("\"{word}\" header")));
        }
        self.expect(TokenKind::Dashes)?;
        Ok(())
    }

    fn class(&mut self) -> Result<Class, ParseError> {
        self.expect(TokenKind::Ident)?; // class
        let name = self.ident()?;
        let mut params = Vec::new();
        if self.eat(TokenKind::LAngle)? {
            loop {
                params.push(self.class_param()?);
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RAngle)?;
        }
        let (superclasses, decls) = self.record_body()?;
        Ok(Class {
            name,
            params,
            superclasses,
            decls,
        })
    }

    fn class_param(&mut self) -> Result<ClassParam, ParseError> {
        let ty = self.decl_type()?;
        let name = self.ident()?;
        let default = if self.eat(TokenKind::Eq)? {
            Some(self.decl_item(&ty)?)
        } else {
            None
        };
        Ok(ClassParam { ty, name, default })
    }

    fn def(&mut self) -> Result<Def, ParseError> {
        self.expect(TokenKind::Ident)?; // def
        let name = self.ident()?;
        let (superclasses, decls) = self.record_body()?;
        Ok(Def {
            name,
            superclasses,
            decls,
        })
    }

    fn record_body(&mut self) -> Result<(Vec<super::Sym>, Vec<Decl>), ParseError> {
        self.expect(TokenKind::LBrace)?;
        let superclasses = match self.take_comment()? {
            Some(text) => text
                .split_whitespace()
                .map(|s| self.interner.intern(s))
                .collect(),
            None => Vec::new(),
        };
        let mut decls = Vec::new();
        while self.peek_kind()? != TokenKind::RBrace {
            decls.push(self.decl()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok((superclasses, decls))
    }

    fn decl(&mut self) -> Result<Decl, ParseError> {
        let ty = self.decl_type()?;
        let name = self.ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.decl_item(&ty)?;
        self.expect(TokenKind::Semi)?;
        Ok(Decl { ty, name, value })
    }

    fn decl_type(&mut self) -> Result<DeclType, ParseError> {
        let token = self.expect(TokenKind::Ident)?;
        let ty = match token.text.as_str() {
            "bit" => DeclType::Bit,
            "bits" => DeclType::Bits(self.bits_width()?),
            "field" => {
                let token = self.expect(TokenKind::Ident)?;
                if token.text != "bits" {
                    return Err(unexpected(&token, "\"bits\""));
                }
                DeclType::FieldBits(self.bits_width()?)
            }
            "string" => DeclType::Str,
            "int" => DeclType::Int,
            "dag" => DeclType::Dag,
            "code" => DeclType::Code,
            "list" => {
                self.expect(TokenKind::LAngle)?;
                let inner = self.decl_type()?;
                self.expect(TokenKind::RAngle)?;
                DeclType::List(Box::new(inner))
            }
            _ => DeclType::Class(self.interner.intern(&token.text)),
        };
        Ok(ty)
    }

    fn bits_width(&mut self) -> Result<u32, ParseError> {
        self.expect(TokenKind::LAngle)?;
        let token = self.expect(TokenKind::Int)?;
        let width = parse_int(&token.text)
            .filter(|n| (1..=64).contains(n))
            .ok_or_else(|| unexpected(&token, "bit width in 1..=64"))?;
        self.expect(TokenKind::RAngle)?;
        Ok(width as u32)
    }

    fn decl_item(&mut self, ty: &DeclType) -> Result<DeclItem, ParseError> {
        match self.peek_kind()? {
            TokenKind::Question => {
                self.bump()?;
                Ok(DeclItem::Unset)
            }
            TokenKind::Int => {
                let token = self.bump()?;
                let value = parse_int(&token.text)
                    .ok_or_else(|| unexpected(&token, "integer literal"))?;
                match ty {
                    DeclType::Bit => match value {
                        0 => Ok(DeclItem::Bit(false)),
                        1 => Ok(DeclItem::Bit(true)),
                        _ => Err(unexpected(&token, "bit literal 0 or 1")),
                    },
                    _ => Ok(DeclItem::Int(value)),
                }
            }
            TokenKind::Str => {
                let token = self.bump()?;
                Ok(DeclItem::Str(self.interner.intern(&token.text)))
            }
            TokenKind::LBrace => self.bits_item(),
            TokenKind::LBracket => self.list_item(ty),
            TokenKind::LParen => Ok(DeclItem::Dag(self.dag_item()?)),
            TokenKind::BangOp => {
                let token = self.bump()?;
                let name = self.interner.intern(&token.text);
                self.expect(TokenKind::LParen)?;
                let args = self.item_args(TokenKind::RParen)?;
                Ok(DeclItem::Expr(Expr::Bang(name, args)))
            }
            TokenKind::Ident => {
                let name = self.ident()?;
                match self.peek_kind()? {
                    TokenKind::LAngle => {
                        self.bump()?;
                        let args = self.item_args(TokenKind::RAngle)?;
                        Ok(DeclItem::Expr(Expr::Call(name, args)))
                    }
                    TokenKind::LParen => {
                        self.bump()?;
                        let args = self.item_args(TokenKind::RParen)?;
                        Ok(DeclItem::Expr(Expr::Call(name, args)))
                    }
                    _ => Ok(DeclItem::Ref(name)),
                }
            }
            _ => {
                let token = self.bump()?;
                Err(unexpected(&token, "declaration value"))
            }
        }
    }

    /// `{ 0, 1, ?, rd{3}, rd }` — most significant element first.
    fn bits_item(&mut self) -> Result<DeclItem, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut elems = Vec::new();
        if self.peek_kind()? != TokenKind::RBrace {
            loop {
                elems.push(self.bits_elem()?);
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(DeclItem::Bits(elems))
    }

    fn bits_elem(&mut self) -> Result<BitsElem, ParseError> {
        match self.peek_kind()? {
            TokenKind::Question => {
                self.bump()?;
                Ok(BitsElem::Unset)
            }
            TokenKind::Int => {
                let token = self.bump()?;
                match token.text.as_str() {
                    "0" => Ok(BitsElem::Bit(false)),
                    "1" => Ok(BitsElem::Bit(true)),
                    _ => Err(unexpected(&token, "bit element 0 or 1")),
                }
            }
            TokenKind::Ident => {
                let name = self.ident()?;
                if self.eat(TokenKind::LBrace)? {
                    let token = self.expect(TokenKind::Int)?;
                    let index = parse_int(&token.text)
                        .filter(|n| (0..64).contains(n))
                        .ok_or_else(|| unexpected(&token, "bit index"))?;
                    self.expect(TokenKind::RBrace)?;
                    Ok(BitsElem::RefBit(name, index as u32))
                } else {
                    Ok(BitsElem::Ref(name))
                }
            }
            _ => {
                let token = self.bump()?;
                Err(unexpected(&token, "bit vector element"))
            }
        }
    }

    fn list_item(&mut self, ty: &DeclType) -> Result<DeclItem, ParseError> {
        self.expect(TokenKind::LBracket)?;
        let elem_ty = match ty {
            DeclType::List(inner) => (**inner).clone(),
            _ => DeclType::Int,
        };
        let mut items = Vec::new();
        if self.peek_kind()? != TokenKind::RBracket {
            loop {
                items.push(self.decl_item(&elem_ty)?);
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(DeclItem::List(items))
    }

    fn item_args(&mut self, close: TokenKind) -> Result<Vec<DeclItem>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind()? != close {
            loop {
                args.push(self.decl_item(&DeclType::Int)?);
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(close)?;
        Ok(args)
    }

    fn dag_item(&mut self) -> Result<DagItem, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut dag = DagItem::default();
        if self.peek_kind()? == TokenKind::Ident {
            dag.op = Some(self.ident()?);
        }
        while self.peek_kind()? != TokenKind::RParen {
            dag.args.push(self.dag_arg()?);
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(dag)
    }

    fn dag_arg(&mut self) -> Result<DagArg, ParseError> {
        let value = match self.peek_kind()? {
            TokenKind::Var => None,
            TokenKind::Ident => Some(DagValue::Ref(self.ident()?)),
            TokenKind::LParen => Some(DagValue::Dag(self.dag_item()?)),
            _ => Some(DagValue::Item(Box::new(
                self.decl_item(&DeclType::Int)?,
            ))),
        };
        let name = match self.peek_kind()? {
            TokenKind::Colon => {
                self.bump()?;
                let token = self.expect(TokenKind::Var)?;
                Some(self.interner.intern(&token.text))
            }
            TokenKind::Var => {
                let token = self.bump()?;
                Some(self.interner.intern(&token.text))
            }
            _ => None,
        };
        Ok(DagArg { value, name })
    }

    fn ident(&mut self) -> Result<super::Sym, ParseError> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(self.interner.intern(&token.text))
    }

    fn fill(&mut self) -> Result<(), ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(())
    }

    fn skip_comments(&mut self) -> Result<(), ParseError> {
        loop {
            self.fill()?;
            match &self.peeked {
                Some(token) if token.kind == TokenKind::Comment => self.peeked = None,
                _ => return Ok(()),
            }
        }
    }

    fn peek_kind(&mut self) -> Result<TokenKind, ParseError> {
        self.skip_comments()?;
        Ok(self.peeked.as_ref().map(|t| t.kind).unwrap())
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        self.skip_comments()?;
        Ok(self.peeked.take().unwrap())
    }

    /// The raw metadata comment right after `{`, if present.
    fn take_comment(&mut self) -> Result<Option<String>, ParseError> {
        self.fill()?;
        match &self.peeked {
            Some(token) if token.kind == TokenKind::Comment => {
                Ok(self.peeked.take().map(|t| t.text))
            }
            _ => Ok(None),
        }
    }

    fn at_keyword(&mut self, word: &str) -> Result<bool, ParseError> {
        self.skip_comments()?;
        Ok(self
            .peeked
            .as_ref()
            .is_some_and(|t| t.kind == TokenKind::Ident && t.text == word))
    }

    fn eat(&mut self, kind: TokenKind) -> Result<bool, ParseError> {
        if self.peek_kind()? == kind {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.bump()?;
        if token.kind != kind {
            return Err(unexpected(&token, &kind.to_string()));
        }
        Ok(token)
    }
}

fn unexpected(token: &Token, expected: &str) -> ParseError {
    let found = match token.kind {
        TokenKind::Ident | TokenKind::Int => format!("\"{}\"", token.text),
        _ => token.kind.to_string(),
    };
    ParseError::new(
        token.line,
        token.column,
        format!("expected {expected}, found {found}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"
------------- Classes -------------
class Instruction {
  field bits<32> Inst = { ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? };
  string Namespace = "";
  string AsmString = "";
  dag OutOperandList = (outs);
  dag InOperandList = (ins);
  bit isPseudo = 0;
  int Size = 0;
}
class DemoInst<bits<4> op, string asm = ""> {
  // Instruction
  bits<4> opcode = { ?, ?, ?, ? };
  string AsmString = asm;
}
------------- Defs -------------
def MOV {
  // Instruction DemoInst
  field bits<32> Inst = { 1, 0, 0, 0, rd{3}, rd{2}, rd{1}, rd{0}, 0, 0, 0, 0, 0, 0, 0, 0, imm{15}, imm{14}, imm{13}, imm{12}, imm{11}, imm{10}, imm{9}, imm{8}, imm{7}, imm{6}, imm{5}, imm{4}, imm{3}, imm{2}, imm{1}, imm{0} };
  bits<4> rd = { ?, ?, ?, ? };
  bits<16> imm = { ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? };
  string Namespace = "Demo";
  string AsmString = "mov $rd, #$imm";
  dag OutOperandList = (outs GPR:$rd);
  dag InOperandList = (ins imm16:$imm);
  bit isPseudo = 0;
  int Size = 4;
  list<string> Predicates = ["HasBase"];
}
"#;

    #[test]
    fn parses_classes_and_defs() {
        let records = Parser::new(DUMP).parse().unwrap();
        assert_eq!(records.classes.len(), 2);
        assert_eq!(records.defs.len(), 1);

        let class = records.class("DemoInst").unwrap();
        assert_eq!(class.params.len(), 2);
        assert_eq!(class.params[0].ty, DeclType::Bits(4));
        assert_eq!(&*class.params[1].name, "asm");
        assert!(class.params[1].default.is_some());
        assert!(class.has_superclass("Instruction"));

        let def = records.def("MOV").unwrap();
        assert!(def.has_superclass("DemoInst"));
        assert!(!def.bit("isPseudo"));
        assert_eq!(def.str_value("Namespace"), Some("Demo"));
        assert_eq!(def.int_value("Size"), Some(4));
    }

    #[test]
    fn bit_vector_elements() {
        let records = Parser::new(DUMP).parse().unwrap();
        let def = records.def("MOV").unwrap();
        let inst = def.bits_value("Inst").unwrap();
        assert_eq!(inst.len(), 32);
        assert_eq!(inst[0], BitsElem::Bit(true));
        assert_eq!(inst[4], BitsElem::RefBit("rd".into(), 3));
        assert_eq!(inst[31], BitsElem::RefBit("imm".into(), 0));
    }

    #[test]
    fn operand_list_dags() {
        let records = Parser::new(DUMP).parse().unwrap();
        let def = records.def("MOV").unwrap();
        let outs = def.dag_value("OutOperandList").unwrap();
        assert_eq!(outs.op.as_deref(), Some("outs"));
        assert_eq!(outs.args.len(), 1);
        assert_eq!(outs.args[0].type_name().map(|s| &**s), Some("GPR"));
        assert_eq!(outs.args[0].name.as_deref(), Some("rd"));

        let ins = def.dag_value("InOperandList").unwrap();
        assert_eq!(ins.args[0].type_name().map(|s| &**s), Some("imm16"));
    }

    #[test]
    fn interning_is_invisible() {
        let first = Parser::new(DUMP).parse().unwrap();
        let second = Parser::new(DUMP).parse().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn multiline_string_then_def() {
        let src = r#"
------------- Classes -------------
------------- Defs -------------
def DOC {
  string Doc = "
line one
line two
";
}
def NEXT {
  int Size = 4;
}
"#;
        let records = Parser::new(src).parse().unwrap();
        assert_eq!(records.defs.len(), 2);
        assert_eq!(
            records.def("DOC").unwrap().str_value("Doc"),
            Some("line one\nline two")
        );
    }

    #[test]
    fn bang_and_call_expressions() {
        let src = r#"
------------- Classes -------------
------------- Defs -------------
def E {
  int V = !add(1, 2);
  string S = Mangle<"x">;
  list<int> L = [1, 2, 3];
}
"#;
        let records = Parser::new(src).parse().unwrap();
        let def = records.def("E").unwrap();
        match &def.decl("V").unwrap().value {
            DeclItem::Expr(Expr::Bang(name, args)) => {
                assert_eq!(&**name, "add");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected value {other:?}"),
        }
        match &def.decl("S").unwrap().value {
            DeclItem::Expr(Expr::Call(name, args)) => {
                assert_eq!(&**name, "Mangle");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(
            def.decl("L").unwrap().value,
            DeclItem::List(vec![
                DeclItem::Int(1),
                DeclItem::Int(2),
                DeclItem::Int(3)
            ])
        );
    }

    #[test]
    fn reports_error_position() {
        let src = "------------- Classes -------------\n------------- Defs -------------\ndef BAD {\n  int Size 4;\n}\n";
        let err = Parser::new(src).parse().unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("expected \"=\""));
    }

    #[test]
    fn missing_header_is_fatal() {
        let err = Parser::new("class Foo {}").parse().unwrap_err();
        assert_eq!(err.line, 1);
    }
}
