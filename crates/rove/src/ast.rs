//! The AST the interpreter consumes and its opaque IR form.
//!
//! The parser is an external collaborator: the interpreter receives trees that
//! are already built. A tree node carries its grammar production ([`AstKind`]),
//! an ordered list of children, and for leaves the literal token text. The
//! evaluator dispatches on the production with an exhaustive match.
//!
//! Ability bodies are stored inside entities in an opaque [`Ir`] form; the
//! round-trip through [`ast_to_ir`] / [`ir_to_ast`] is identity-preserving.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Grammar production names.
///
/// Display/FromStr render the production in snake_case, matching the names
/// used in diagnostics ("cannot execute statement of type `spawn`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum AstKind {
    // statements
    CodeBlock,
    NodeCtxBlock,
    IfStmt,
    ElifStmt,
    ElseStmt,
    ForStmt,
    WhileStmt,
    ReportAction,
    HasStmt,
    HasAssign,
    CanStmt,
    EventClause,
    PresetInOut,

    // expression precedence ladder
    Expression,
    Assignment,
    CopyAssign,
    IncAssign,
    Connect,
    Logical,
    Compare,
    CmpOp,
    Arithmetic,
    Term,
    Factor,
    Power,
    FuncCall,
    ParenCall,
    AbilityCall,
    Atom,
    FuncBuiltIn,
    Index,
    ListVal,
    DictVal,
    KvPair,
    ExprList,
    DottedName,
    NameList,

    // graph sublanguage
    NodeEdgeRef,
    NodeRef,
    WalkerRef,
    GraphRef,
    EdgeTo,
    EdgeFrom,
    EdgeAny,
    Spawn,
    NodeSpawn,
    WalkerSpawn,
    GraphSpawn,
    SpawnCtx,
    FilterCtx,
    SpawnAssign,
    FilterCompare,

    // leaves with token text
    Name,
    Int,
    Float,
    Str,
    Bool,

    // marker leaves
    Private,
    Anchor,
    Not,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    AddEq,
    SubEq,
    MulEq,
    DivEq,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLte,
    CmpGte,
    CmpIn,
    CmpNin,
    Break,
    Continue,
    Skip,
    Entry,
    Exit,
    Activity,
    Deref,
    Length,
    Keys,
    Edge,
    Node,
    Context,
    Info,
    Details,
    Destroy,
}

/// A node in the abstract syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ast {
    pub kind: AstKind,
    pub kids: Vec<Ast>,
    /// Literal token text, present on leaves only.
    text: Option<String>,
}

impl Ast {
    /// An interior node with children.
    pub fn node(kind: AstKind, kids: Vec<Ast>) -> Self {
        Self { kind, kids, text: None }
    }

    /// A leaf carrying token text (`Name`, `Int`, `Float`, `Str`, `Bool`).
    pub fn leaf(kind: AstKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            kids: vec![],
            text: Some(text.into()),
        }
    }

    /// A childless, textless marker leaf (keywords and operators).
    pub fn marker(kind: AstKind) -> Self {
        Self {
            kind,
            kids: vec![],
            text: None,
        }
    }

    /// The token text of a leaf; empty for interior and marker nodes.
    pub fn token_text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Assembles a `dotted_name` production back into `a.b.c` form.
    pub fn dotted_text(&self) -> String {
        let mut out = String::new();
        for kid in &self.kids {
            if kid.kind == AstKind::Name {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(kid.token_text());
            }
        }
        out
    }

    /// Collects a `name_list` production into its name strings.
    pub fn name_list(&self) -> Vec<String> {
        self.kids
            .iter()
            .filter(|k| k.kind == AstKind::Name)
            .map(|k| k.token_text().to_owned())
            .collect()
    }
}

/// Opaque intermediate representation of an AST subtree.
///
/// This is the storage form for ability bodies and preset fragments held
/// inside entities. The encoding is postcard; callers treat it as a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ir(Vec<u8>);

/// Encodes an AST subtree into its opaque IR form.
pub fn ast_to_ir(ast: &Ast) -> Ir {
    Ir(postcard::to_allocvec(ast).expect("AST serialization should not fail"))
}

/// Decodes an IR blob back into the AST it was built from.
///
/// # Panics
/// Panics if the blob was not produced by [`ast_to_ir`], which should not
/// happen for well-formed entities.
pub fn ir_to_ast(ir: &Ir) -> Ast {
    postcard::from_bytes(&ir.0).expect("IR deserialization should not fail")
}
