//! The unified graph model.
//!
//! A [`Model`] owns an arena of [`Graph`]s. Graph 0 is the main graph. Nested graphs (loop
//! bodies, branches, sub-blocks) are other arena entries, referenced by [`GraphId`] from
//! node attributes and by their `parent` link.
use crate::errors::{LucidError, LucidResult};
use crate::format::Format;
use std::fmt;

mod attr;
mod graph;
mod node;
mod tensor;

pub use self::attr::{AttrValue, Attribute, TensorValue};
pub use self::graph::Graph;
pub use self::node::{InletId, Node, OutletId, Port};
pub use self::tensor::{Tensor, TensorKind};

macro_rules! id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

id!(GraphId, "");
id!(NodeId, "node #");
id!(TensorId, "tensor #");

/// A decoded model. Immutable once built.
#[derive(Clone, Debug)]
pub struct Model {
    pub(crate) format: Format,
    pub(crate) producer: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) properties: Vec<(String, String)>,
    pub(crate) graphs: Vec<Graph>,
}

impl Model {
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn producer(&self) -> Option<&str> {
        self.producer.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Free-form metadata, in file order.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    pub fn main(&self) -> &Graph {
        &self.graphs[0]
    }

    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id.0)
    }

    /// Checks that every id stored anywhere in the model resolves.
    pub fn check_integrity(&self) -> LucidResult<()> {
        if self.graphs.is_empty() {
            return Err(LucidError::integrity(GraphId(0), "main graph", "model has no graph"));
        }
        for (ix, graph) in self.graphs.iter().enumerate() {
            self.check_graph(GraphId(ix), graph)?;
        }
        Ok(())
    }

    fn is_ancestor(&self, ancestor: GraphId, mut of: GraphId) -> bool {
        for _ in 0..self.graphs.len() {
            match self.graph(of).and_then(|g| g.parent()) {
                Some(p) if p == ancestor => return true,
                Some(p) => of = p,
                None => return false,
            }
        }
        false
    }

    fn check_graph(&self, id: GraphId, graph: &Graph) -> LucidResult<()> {
        let err = |reference: String, reason: &str| Err(LucidError::integrity(id, reference, reason));
        if graph.id() != id {
            return err(format!("graph {}", graph.id()), "graph stored at the wrong arena position");
        }
        if let Some(parent) = graph.parent() {
            if self.graph(parent).is_none() {
                return err(format!("parent graph {parent}"), "no such graph");
            }
            if parent == id || self.is_ancestor(id, parent) {
                return err(format!("parent graph {parent}"), "cyclic graph nesting");
            }
        }
        let nodes = graph.nodes();
        let tensors = graph.tensors();
        let mut names = std::collections::HashSet::new();
        for (ix, tensor) in tensors.iter().enumerate() {
            if tensor.id != TensorId(ix) {
                return err(tensor.id.to_string(), "tensor stored at the wrong position");
            }
            if !names.insert(tensor.name.as_str()) {
                return err(format!("tensor {:?}", tensor.name), "duplicate tensor name");
            }
            if let Some(outlet) = tensor.producer {
                let port = nodes.get(outlet.node.0).and_then(|n| n.outputs.get(outlet.slot));
                if port.and_then(|p| p.tensor) != Some(tensor.id) {
                    return err(format!("producer {outlet} of {}", tensor.id), "producer does not output this tensor");
                }
            }
            if let TensorKind::Captured { graph: outer, tensor: outer_tensor } = tensor.kind {
                if !self.is_ancestor(outer, id) {
                    return err(format!("captured graph {outer}"), "not an enclosing graph");
                }
                if self.graph(outer).and_then(|g| g.tensor(outer_tensor)).is_none() {
                    return err(format!("captured {outer_tensor} of graph {outer}"), "no such tensor");
                }
            }
        }
        for (ix, node) in nodes.iter().enumerate() {
            if node.id != NodeId(ix) {
                return err(node.id.to_string(), "node stored at the wrong position");
            }
            for port in node.inputs.iter() {
                if let Some(t) = port.tensor {
                    if graph.tensor(t).is_none() {
                        return err(format!("input {t} of {}", node.id), "no such tensor");
                    }
                }
            }
            for (slot, port) in node.outputs.iter().enumerate() {
                if let Some(t) = port.tensor {
                    let producer = graph.tensor(t).and_then(|t| t.producer);
                    if producer != Some(OutletId::new(node.id, slot)) {
                        return err(format!("output {t} of {}", node.id), "tensor does not name this node as producer");
                    }
                }
            }
            for control in node.control_inputs.iter() {
                if graph.node(*control).is_none() {
                    return err(format!("control input {control} of {}", node.id), "no such node");
                }
            }
            for sub in node.subgraphs() {
                if self.graph(sub).is_none() {
                    return err(format!("graph {sub} in {}", node.id), "no such graph");
                }
            }
        }
        for t in graph.inputs().iter().chain(graph.outputs().iter()) {
            if graph.tensor(*t).is_none() {
                return err(t.to_string(), "graph boundary references a missing tensor");
            }
        }
        Ok(())
    }
}
