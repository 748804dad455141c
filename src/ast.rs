//! The CHTL abstract syntax tree.
//!
//! One flat tagged enum (`AstNode`) with per-kind payload structs, per
//! Design Note 9: the original's `std::shared_ptr<Base>` + `dynamic_cast`
//! hierarchy (`examples/original_source/CHTL/include/CHTL/Parser/Parser.h`)
//! becomes a sum type here so every visitor is an exhaustive match and no
//! node is shared by pointer — templates/customs/origins are referenced by
//! name through the [`crate::global_map::GlobalMap`] instead.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum TemplateCategory {
    Style,
    Element,
    Var,
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Style => write!(f, "@Style"),
            Self::Element => write!(f, "@Element"),
            Self::Var => write!(f, "@Var"),
        }
    }
}

impl TemplateCategory {
    pub fn from_type_identifier(s: &str) -> Option<Self> {
        match s {
            "@Style" => Some(Self::Style),
            "@Element" => Some(Self::Element),
            "@Var" => Some(Self::Var),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum InsertPosition {
    Before,
    After,
    Replace,
    AtTop,
    AtBottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ImportCategory {
    Custom,
    Template,
    Origin,
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramNode {
    pub use_html5: bool,
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    pub key: String,
    pub value: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub is_generator: bool,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRuleNode {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineStyleRuleNode {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorBlockNode {
    pub selector: String,
    pub rules: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleNode {
    pub rules: Vec<AstNode>, // StyleRuleNode | InlineStyleRuleNode | SelectorBlockNode | TemplateUsageNode(@Style)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub raw_body: String,
    pub is_global: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeNode>,
    pub style: Option<StyleNode>,
    pub script: Option<ScriptNode>,
    pub children: Vec<AstNode>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginNode {
    pub origin_type: String,
    pub name: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginUsageNode {
    pub origin_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinitionNode {
    pub category: TemplateCategory,
    pub name: String,
    pub body: Vec<AstNode>,
    pub var_bindings: Vec<(String, String)>,
    pub inherits: Vec<InheritNode>,
    pub is_custom: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateUsageNode {
    pub category: TemplateCategory,
    pub name: String,
    pub overrides: Vec<AstNode>, // DeleteNode | InsertNode | AttributeNode | nested usage
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InheritNode {
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteNode {
    pub target: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertNode {
    pub position: InsertPosition,
    pub target: String,
    pub payload: Vec<AstNode>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarUsageNode {
    pub group: String,
    pub key: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportNode {
    pub category: ImportCategory,
    pub specific_type: Option<String>,
    pub item_name: Option<String>,
    pub alias: Option<String>,
    pub path: String,
    pub except: Vec<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceNode {
    pub name: String,
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigNode {
    pub settings: Vec<(String, String)>,
    pub name_block: Vec<(String, String)>,
    pub origin_type_block: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Element(Box<ElementNode>),
    Attribute(AttributeNode),
    Text(TextNode),
    Comment(CommentNode),
    Style(StyleNode),
    StyleRule(StyleRuleNode),
    InlineStyleRule(InlineStyleRuleNode),
    SelectorBlock(Box<SelectorBlockNode>),
    Script(ScriptNode),
    Origin(OriginNode),
    OriginUsage(OriginUsageNode),
    TemplateDefinition(Box<TemplateDefinitionNode>),
    TemplateUsage(Box<TemplateUsageNode>),
    Inherit(InheritNode),
    Delete(DeleteNode),
    Insert(Box<InsertNode>),
    VarUsage(VarUsageNode),
    Import(ImportNode),
    Namespace(Box<NamespaceNode>),
    Config(ConfigNode),
}

impl AstNode {
    pub fn line(&self) -> u32 {
        match self {
            AstNode::Element(n) => n.line,
            AstNode::Attribute(n) => n.line,
            AstNode::Script(n) => n.line,
            AstNode::TemplateDefinition(n) => n.line,
            AstNode::TemplateUsage(n) => n.line,
            AstNode::Inherit(n) => n.line,
            AstNode::Delete(n) => n.line,
            AstNode::Insert(n) => n.line,
            AstNode::VarUsage(n) => n.line,
            AstNode::Import(n) => n.line,
            _ => 0,
        }
    }

    /// True if this node or any descendant is a usage/inherit node that the
    /// resolver must still rewrite (spec §8 "No leftover usages").
    pub fn contains_unresolved(&self) -> bool {
        match self {
            AstNode::TemplateUsage(_) | AstNode::VarUsage(_) | AstNode::Inherit(_) => true,
            AstNode::Element(e) => {
                e.children.iter().any(AstNode::contains_unresolved)
                    || e.style.as_ref().is_some_and(|s| s.rules.iter().any(AstNode::contains_unresolved))
            }
            AstNode::Namespace(n) => n.children.iter().any(AstNode::contains_unresolved),
            AstNode::SelectorBlock(b) => b.rules.iter().any(AstNode::contains_unresolved),
            AstNode::Style(s) => s.rules.iter().any(AstNode::contains_unresolved),
            _ => false,
        }
    }
}
