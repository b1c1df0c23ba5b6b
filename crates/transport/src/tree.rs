//! Live state trees
//!
//! A state dump is streamed depth first: every node is announced with a begin
//! marker carrying its name and value, followed by its children, followed by
//! an end marker. Nothing on the wire says how many children a node has, so
//! the reader rebuilds the tree purely from the markers.
//!
//! The sending side never needs an owned tree. It walks anything that
//! implements [`StateCursor`]; [`StateNode`] implements it as well so owned
//! trees can be sent back out (for example from a test double).

use std::io::{Read, Write};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::codec::{
    put_binary, put_code, put_signed, put_string, recv_binary, recv_code, recv_signed,
    recv_string,
};
use crate::message::code::{RESP_STATE_NODE_BEGIN, RESP_STATE_NODE_END};
use crate::{CodecError, CorrelationId};

/// Length marking a value that could not be read
pub const INVALID_LENGTH: i32 = -2;

/// Raw typed value of a state node
///
/// `length` is the element count reported by the state walker; the bytes are
/// in the traced host's native layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateValue {
    pub type_name: String,
    pub length: i32,
    pub data: Vec<u8>,
}

impl StateValue {
    pub fn new(type_name: impl Into<String>, length: i32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            type_name: type_name.into(),
            length,
            data: data.into(),
        }
    }

    /// A value whose query raised an API error
    pub fn invalid() -> Self {
        Self {
            type_name: String::new(),
            length: INVALID_LENGTH,
            data: Vec::new(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.length == INVALID_LENGTH
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNode {
    pub name: String,
    pub numeric_name: u32,
    pub enum_name: u32,
    pub value: StateValue,
    pub children: Vec<StateNode>,
}

impl StateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: StateValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_numeric_name(mut self, numeric_name: u32) -> Self {
        self.numeric_name = numeric_name;
        self
    }

    pub fn with_enum_name(mut self, enum_name: u32) -> Self {
        self.enum_name = enum_name;
        self
    }

    pub fn with_child(mut self, child: StateNode) -> Self {
        self.children.push(child);
        self
    }

    /// Look up a descendant by a dotted path such as `"GL_TEXTURE0.GL_TEXTURE_2D"`
    ///
    /// Node names may themselves contain dots, so each step matches a child
    /// whose whole name is a prefix of the remaining path.
    pub fn find(&self, path: &str) -> Option<&StateNode> {
        if path.is_empty() {
            return Some(self);
        }
        self.children.iter().find_map(|child| {
            let rest = path.strip_prefix(child.name.as_str())?;
            if rest.is_empty() {
                Some(child)
            } else {
                child.find(rest.strip_prefix('.')?)
            }
        })
    }

    pub fn find_child_numeric(&self, numeric_name: u32) -> Option<&StateNode> {
        self.children
            .iter()
            .find(|child| child.numeric_name == numeric_name)
    }

    pub fn find_child_enum(&self, enum_name: u32) -> Option<&StateNode> {
        self.children
            .iter()
            .find(|child| child.enum_name == enum_name)
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(StateNode::node_count).sum::<usize>()
    }
}

/// Identity of a node as it appears in the begin marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeHeader {
    pub name: String,
    pub numeric_name: u32,
    pub enum_name: u32,
}

/// A position in a state tree that can be streamed without materialising it
pub trait StateCursor {
    fn header(&self) -> NodeHeader;

    /// The node's value; [`StateValue::invalid`] if it cannot be read
    fn value(&self) -> StateValue;

    fn children(&self) -> Vec<Box<dyn StateCursor + '_>>;
}

impl StateCursor for StateNode {
    fn header(&self) -> NodeHeader {
        NodeHeader {
            name: self.name.clone(),
            numeric_name: self.numeric_name,
            enum_name: self.enum_name,
        }
    }

    fn value(&self) -> StateValue {
        self.value.clone()
    }

    fn children(&self) -> Vec<Box<dyn StateCursor + '_>> {
        self.children
            .iter()
            .map(|child| Box::new(child) as Box<dyn StateCursor + '_>)
            .collect()
    }
}

impl<T: StateCursor + ?Sized> StateCursor for &T {
    fn header(&self) -> NodeHeader {
        (**self).header()
    }

    fn value(&self) -> StateValue {
        (**self).value()
    }

    fn children(&self) -> Vec<Box<dyn StateCursor + '_>> {
        (**self).children()
    }
}

/// Stream a subtree, returning the number of nodes written
///
/// Each marker is written as soon as it is encoded; the caller is responsible
/// for flushing once the whole tree has gone out.
pub fn write_tree<W: Write + ?Sized>(
    writer: &mut W,
    id: CorrelationId,
    node: &dyn StateCursor,
) -> Result<usize, CodecError> {
    let header = node.header();
    let value = node.value();

    let mut buf = BytesMut::new();
    put_code(&mut buf, RESP_STATE_NODE_BEGIN);
    put_code(&mut buf, id);
    put_string(&mut buf, &header.name)?;
    put_code(&mut buf, header.numeric_name);
    put_code(&mut buf, header.enum_name);
    put_string(&mut buf, &value.type_name)?;
    put_signed(&mut buf, value.length);
    put_binary(&mut buf, &value.data)?;
    writer.write_all(&buf)?;

    let mut count = 1;
    for child in node.children() {
        count += write_tree(writer, id, child.as_ref())?;
    }

    buf.clear();
    put_code(&mut buf, RESP_STATE_NODE_END);
    put_code(&mut buf, id);
    writer.write_all(&buf)?;

    Ok(count)
}

/// Rebuild a node whose begin code and id have already been consumed
pub(crate) fn recv_node_body<R: Read + ?Sized>(reader: &mut R) -> Result<StateNode, CodecError> {
    let name = recv_string(reader)?;
    let numeric_name = recv_code(reader)?;
    let enum_name = recv_code(reader)?;
    let type_name = recv_string(reader)?;
    let length = recv_signed(reader)?;
    let data = recv_binary(reader)?;

    let mut children = Vec::new();
    loop {
        match recv_code(reader)? {
            RESP_STATE_NODE_BEGIN => {
                let _id = recv_code(reader)?;
                children.push(recv_node_body(reader)?);
            }
            RESP_STATE_NODE_END => {
                let _id = recv_code(reader)?;
                break;
            }
            other => return Err(CodecError::UnexpectedTreeCode(other)),
        }
    }

    Ok(StateNode {
        name,
        numeric_name,
        enum_name,
        value: StateValue {
            type_name,
            length,
            data,
        },
        children,
    })
}
