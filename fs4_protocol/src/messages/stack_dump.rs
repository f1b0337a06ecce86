//! Query stack dumps: the serialized form of a query term tree.
//!
//! Items are written in prefix order. Operators carry their arity and are
//! followed by their children; the dump as a whole is preceded by the total
//! number of items, which the decoder uses as a budget.
//!
//! Trees are walked with an explicit work stack in both directions, so the
//! nesting a peer can send is bounded by [`MAX_STACK_DEPTH`] and not by the
//! thread's stack.

use std::slice;

use crate::{
    errors::{ProtocolError, Result},
    types::{wire_count, WireReader, WireWriter},
};

/// Deepest tree, counted in levels, that is encoded or decoded. A lone term
/// is one level deep.
pub const MAX_STACK_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemCode {
    Or = 0,
    And = 1,
    Not = 2,
    Rank = 3,
    Term = 4,
    Phrase = 6,
}

impl ItemCode {
    fn from_u32(value: u32) -> Result<ItemCode> {
        let code = match value {
            0 => ItemCode::Or,
            1 => ItemCode::And,
            2 => ItemCode::Not,
            3 => ItemCode::Rank,
            4 => ItemCode::Term,
            6 => ItemCode::Phrase,
            _ => {
                return Err(ProtocolError::StackCorrupt(format!(
                    "unknown item code {value}"
                )))
            }
        };

        Ok(code)
    }
}

/// A node of a parsed query.
#[derive(Debug, Clone, PartialEq)]
pub enum TermNode {
    Or(Vec<TermNode>),
    And(Vec<TermNode>),
    /// The first child is the positive operand, the rest are negated.
    Not(Vec<TermNode>),
    /// The first child decides the match, the rest only contribute to rank.
    Rank(Vec<TermNode>),
    Phrase {
        index: String,
        children: Vec<TermNode>,
    },
    Term {
        index: String,
        term: String,
    },
}

impl TermNode {
    pub fn term(index: &str, term: &str) -> Self {
        TermNode::Term {
            index: index.to_string(),
            term: term.to_string(),
        }
    }

    pub fn phrase(index: &str, children: Vec<TermNode>) -> Self {
        TermNode::Phrase {
            index: index.to_string(),
            children,
        }
    }

    pub fn children(&self) -> &[TermNode] {
        match self {
            TermNode::Or(children)
            | TermNode::And(children)
            | TermNode::Not(children)
            | TermNode::Rank(children)
            | TermNode::Phrase { children, .. } => children,
            TermNode::Term { .. } => &[],
        }
    }

    /// Number of stack items this node occupies, children included.
    pub fn item_count(&self) -> usize {
        PreOrder::new(slice::from_ref(self)).count()
    }

    /// Number of levels from this node down to its deepest term.
    pub fn depth(&self) -> usize {
        PreOrder::new(slice::from_ref(self))
            .map(|(depth, _)| depth)
            .max()
            .unwrap_or(0)
    }

    fn code(&self) -> ItemCode {
        match self {
            TermNode::Or(_) => ItemCode::Or,
            TermNode::And(_) => ItemCode::And,
            TermNode::Not(_) => ItemCode::Not,
            TermNode::Rank(_) => ItemCode::Rank,
            TermNode::Phrase { .. } => ItemCode::Phrase,
            TermNode::Term { .. } => ItemCode::Term,
        }
    }

    /// Writes this item alone; its children follow it in prefix order.
    ///
    /// ```md
    /// OR | AND | NOT | RANK:  code (4), arity (4)
    /// PHRASE:                 code (4), index (str), arity (4)
    /// TERM:                   code (4), index (str), term (str)
    /// ```
    fn write_item(&self, wire: &mut WireWriter) -> Result<()> {
        wire.write_u32(self.code() as u32);

        match self {
            TermNode::Term { index, term } => {
                wire.write_string(index)?;
                wire.write_string(term)?;
                return Ok(());
            }
            TermNode::Phrase { index, .. } => wire.write_string(index)?,
            _ => {}
        }

        wire.write_u32(wire_count(self.children().len(), "stack item arity")?);
        Ok(())
    }
}

/// Prefix-order walk yielding each node with its level, roots being level 1.
struct PreOrder<'a> {
    pending: Vec<slice::Iter<'a, TermNode>>,
}

impl<'a> PreOrder<'a> {
    fn new(roots: &'a [TermNode]) -> Self {
        Self {
            pending: vec![roots.iter()],
        }
    }
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = (usize, &'a TermNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let siblings = self.pending.last_mut()?;
            match siblings.next() {
                Some(node) => {
                    let depth = self.pending.len();
                    self.pending.push(node.children().iter());
                    return Some((depth, node));
                }
                None => {
                    self.pending.pop();
                }
            }
        }
    }
}

#[derive(Debug)]
enum Operator {
    Or,
    And,
    Not,
    Rank,
    Phrase(String),
}

/// An operator whose children are still being read.
#[derive(Debug)]
struct OpenItem {
    operator: Operator,
    remaining: u32,
    children: Vec<TermNode>,
}

impl OpenItem {
    fn close(self) -> TermNode {
        match self.operator {
            Operator::Or => TermNode::Or(self.children),
            Operator::And => TermNode::And(self.children),
            Operator::Not => TermNode::Not(self.children),
            Operator::Rank => TermNode::Rank(self.children),
            Operator::Phrase(index) => TermNode::Phrase {
                index,
                children: self.children,
            },
        }
    }
}

/// A serialized query: one or more root nodes in prefix order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StackDump {
    pub roots: Vec<TermNode>,
}

impl StackDump {
    pub fn new(root: TermNode) -> Self {
        Self { roots: vec![root] }
    }

    pub fn item_count(&self) -> usize {
        PreOrder::new(&self.roots).count()
    }

    /// Levels of the deepest root, 0 for an empty dump.
    pub fn depth(&self) -> usize {
        PreOrder::new(&self.roots)
            .map(|(depth, _)| depth)
            .max()
            .unwrap_or(0)
    }

    fn write_items(&self, wire: &mut WireWriter) -> Result<()> {
        let depth = self.depth();
        if depth > MAX_STACK_DEPTH {
            return Err(ProtocolError::ContractViolation(format!(
                "stack dump is {depth} levels deep, at most {MAX_STACK_DEPTH} are allowed"
            )));
        }

        for (_, node) in PreOrder::new(&self.roots) {
            node.write_item(wire)?;
        }
        Ok(())
    }

    /// Reads items until exactly `item_count` have been consumed.
    fn read_items(wire: &mut WireReader<'_>, item_count: u32) -> Result<StackDump> {
        let mut budget = item_count;
        let mut roots = Vec::new();
        let mut open: Vec<OpenItem> = Vec::new();

        loop {
            if matches!(open.last(), Some(item) if item.remaining == 0) {
                if let Some(item) = open.pop() {
                    Self::attach(&mut open, &mut roots, item.close());
                }
                continue;
            }
            if open.is_empty() && budget == 0 {
                break;
            }

            if budget == 0 {
                return Err(ProtocolError::StackCorrupt(
                    "more stack items than declared".to_string(),
                ));
            }
            if open.len() >= MAX_STACK_DEPTH {
                return Err(ProtocolError::StackCorrupt(format!(
                    "items nested deeper than {MAX_STACK_DEPTH} levels"
                )));
            }
            budget -= 1;

            let operator = match ItemCode::from_u32(wire.read_u32()?)? {
                ItemCode::Term => {
                    let term = TermNode::Term {
                        index: wire.read_string("index name")?,
                        term: wire.read_string("term")?,
                    };
                    Self::attach(&mut open, &mut roots, term);
                    continue;
                }
                ItemCode::Phrase => Operator::Phrase(wire.read_string("index name")?),
                ItemCode::Or => Operator::Or,
                ItemCode::And => Operator::And,
                ItemCode::Not => Operator::Not,
                ItemCode::Rank => Operator::Rank,
            };

            let arity = wire.read_u32()?;
            if arity > budget {
                return Err(ProtocolError::StackCorrupt(format!(
                    "arity {arity} exceeds the {budget} remaining stack items"
                )));
            }

            open.push(OpenItem {
                operator,
                remaining: arity,
                children: Vec::new(),
            });
        }

        Ok(StackDump { roots })
    }

    fn attach(open: &mut [OpenItem], roots: &mut Vec<TermNode>, node: TermNode) {
        match open.last_mut() {
            Some(parent) => {
                parent.children.push(node);
                parent.remaining -= 1;
            }
            None => roots.push(node),
        }
    }

    /// ```md
    /// numStackItems (4), items...
    /// ```
    /// The form used by query packets.
    pub fn write_counted(&self, wire: &mut WireWriter) -> Result<()> {
        wire.write_u32(wire_count(self.item_count(), "stack item count")?);
        self.write_items(wire)
    }

    /// Running out of bytes while items are still owed means the declared
    /// count is larger than the tree.
    pub fn read_counted(wire: &mut WireReader<'_>) -> Result<StackDump> {
        let item_count = wire.read_u32()?;
        Self::read_items(wire, item_count).map_err(|error| match error {
            ProtocolError::BufferTooShort { .. } => ProtocolError::StackCorrupt(format!(
                "{item_count} declared stack items run past the end of the body"
            )),
            other => other,
        })
    }

    /// ```md
    /// numStackItems (4), stackDumpLen (4), items...
    /// ```
    /// The form used by getdocsums packets. The items must fill exactly
    /// `stackDumpLen` bytes.
    pub fn write_delimited(&self, wire: &mut WireWriter) -> Result<()> {
        let mut items = WireWriter::new(wire.byte_order());
        self.write_items(&mut items)?;
        let items = items.into_bytes();

        wire.write_u32(wire_count(self.item_count(), "stack item count")?);
        wire.write_blob(&items)
    }

    pub fn read_delimited(wire: &mut WireReader<'_>) -> Result<StackDump> {
        let item_count = wire.read_u32()?;
        let bytes = wire.read_blob()?;

        let mut items = WireReader::new(&bytes, wire.byte_order());
        let dump = Self::read_items(&mut items, item_count).map_err(|error| match error {
            ProtocolError::BufferTooShort { .. } => ProtocolError::StackCorrupt(format!(
                "{item_count} items do not fit in {} bytes",
                bytes.len()
            )),
            other => other,
        })?;

        if items.remaining() > 0 {
            return Err(ProtocolError::StackCorrupt(format!(
                "{} bytes left after {item_count} stack items",
                items.remaining()
            )));
        }

        Ok(dump)
    }
}
