use super::*;
use crate::metadata::OpDescriptor;
use std::sync::Arc;

/// A tensor as seen from a node: optionally named after the operator parameter it feeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Port {
    pub parameter: Option<String>,
    /// None for an optional input that was left out.
    pub tensor: Option<TensorId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, new)]
pub struct OutletId {
    pub node: NodeId,
    pub slot: usize,
}

impl fmt::Display for OutletId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.slot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, new)]
pub struct InletId {
    pub node: NodeId,
    pub slot: usize,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub op_type: String,
    pub domain: Option<String>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub attributes: Vec<Attribute>,
    pub control_inputs: Vec<NodeId>,
    /// Shared operator schema. None when the registry does not know the operator.
    pub descriptor: Option<Arc<OpDescriptor>>,
}

impl Node {
    pub fn new(id: NodeId, op_type: String) -> Node {
        Node {
            id,
            name: None,
            op_type,
            domain: None,
            inputs: vec![],
            outputs: vec![],
            attributes: vec![],
            control_inputs: vec![],
            descriptor: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn visible_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.visible)
    }

    pub fn category(&self) -> Option<&str> {
        self.descriptor.as_ref().and_then(|d| d.category.as_deref())
    }

    pub fn input_tensors(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.inputs.iter().filter_map(|p| p.tensor)
    }

    pub fn output_tensors(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.outputs.iter().filter_map(|p| p.tensor)
    }

    /// Graphs referenced by this node's attributes, in attribute order.
    pub fn subgraphs(&self) -> impl Iterator<Item = GraphId> + '_ {
        self.attributes.iter().flat_map(|a| a.value.graphs())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} \"{}\" ({})", self.id, name, self.op_type),
            None => write!(f, "{} ({})", self.id, self.op_type),
        }
    }
}
