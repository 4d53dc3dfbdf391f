use std::rc::Rc;

/// Interned identifier or string literal.
pub type Sym = Rc<str>;

/// Parsed dump: classes followed by defs, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Records {
    pub classes: Vec<Class>,
    pub defs: Vec<Def>,
}

impl Records {
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| &*c.name == name)
    }

    pub fn def(&self, name: &str) -> Option<&Def> {
        self.defs.iter().find(|d| &*d.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    pub name: Sym,
    pub params: Vec<ClassParam>,
    pub superclasses: Vec<Sym>,
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassParam {
    pub ty: DeclType,
    pub name: Sym,
    pub default: Option<DeclItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Def {
    pub name: Sym,
    pub superclasses: Vec<Sym>,
    pub decls: Vec<Decl>,
}

macro_rules! impl_decl_lookup {
    ($($ty:ty),+) => {
        $(
            impl $ty {
                pub fn decl(&self, name: &str) -> Option<&Decl> {
                    self.decls.iter().find(|d| &*d.name == name)
                }

                pub fn has_superclass(&self, name: &str) -> bool {
                    self.superclasses.iter().any(|s| &**s == name)
                }
            }
        )+
    };
}

impl_decl_lookup!(Class, Def);

impl Def {
    /// Value of a `bit` declaration; unset and missing read as `false`.
    pub fn bit(&self, name: &str) -> bool {
        match self.decl(name).map(|d| &d.value) {
            Some(DeclItem::Bit(b)) => *b,
            Some(DeclItem::Int(i)) => *i != 0,
            _ => false,
        }
    }

    pub fn str_value(&self, name: &str) -> Option<&str> {
        match self.decl(name).map(|d| &d.value) {
            Some(DeclItem::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int_value(&self, name: &str) -> Option<i64> {
        match self.decl(name).map(|d| &d.value) {
            Some(DeclItem::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn dag_value(&self, name: &str) -> Option<&DagItem> {
        match self.decl(name).map(|d| &d.value) {
            Some(DeclItem::Dag(dag)) => Some(dag),
            _ => None,
        }
    }

    pub fn bits_value(&self, name: &str) -> Option<&[BitsElem]> {
        match self.decl(name).map(|d| &d.value) {
            Some(DeclItem::Bits(elems)) => Some(elems),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub ty: DeclType,
    pub name: Sym,
    pub value: DeclItem,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclType {
    Bit,
    Bits(u32),
    /// `field bits<N>`; field declarations feed the encoding scan.
    FieldBits(u32),
    Str,
    Int,
    Dag,
    Code,
    List(Box<DeclType>),
    Class(Sym),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclItem {
    /// The unknown marker `?`.
    Unset,
    Bit(bool),
    Int(i64),
    Str(Sym),
    Bits(Vec<BitsElem>),
    List(Vec<DeclItem>),
    Dag(DagItem),
    Ref(Sym),
    Expr(Expr),
}

/// One element of a brace-enclosed bit vector, most significant first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BitsElem {
    Bit(bool),
    Unset,
    /// Bare reference to a one-bit sibling declaration or operand.
    Ref(Sym),
    /// `name{idx}`: bit `idx` of a sibling declaration or operand.
    RefBit(Sym, u32),
}

/// A DAG value, kept structural only; operators are not evaluated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DagItem {
    pub op: Option<Sym>,
    pub args: Vec<DagArg>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DagArg {
    pub value: Option<DagValue>,
    /// The `$name` binding, without the dollar.
    pub name: Option<Sym>,
}

impl DagArg {
    /// The referenced type name, for `Type:$name` operand entries.
    pub fn type_name(&self) -> Option<&Sym> {
        match &self.value {
            Some(DagValue::Ref(sym)) => Some(sym),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DagValue {
    Ref(Sym),
    Dag(DagItem),
    Item(Box<DeclItem>),
}

/// General expressions are carried opaquely; only their shape is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// `!op(arg, ...)`
    Bang(Sym, Vec<DeclItem>),
    /// `Name<targ, ...>` or `Name(arg, ...)` style calls
    Call(Sym, Vec<DeclItem>),
}
