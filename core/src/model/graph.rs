use super::*;
use std::collections::BTreeMap;

/// One graph of a model: nodes and the tensors flowing between them.
///
/// Every order (nodes, tensors, inputs, outputs) follows declaration order in the source
/// file.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) id: GraphId,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<GraphId>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) tensors: Vec<Tensor>,
    pub(crate) inputs: Vec<TensorId>,
    pub(crate) outputs: Vec<TensorId>,
}

impl Graph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The enclosing graph, for graphs that can see outer values.
    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id.0)
    }

    pub fn tensor_by_name(&self, name: &str) -> Option<&Tensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// First node carrying `name`. Node names are not required to be unique.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name.as_deref() == Some(name))
    }

    /// Initializers, in declaration order.
    pub fn initializers(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter().filter(|t| t.kind == TensorKind::Initializer)
    }

    /// Input ports reading `tensor`, in node order.
    pub fn consumers(&self, tensor: TensorId) -> Vec<InletId> {
        self.nodes
            .iter()
            .flat_map(|n| {
                n.inputs
                    .iter()
                    .enumerate()
                    .filter(move |(_, p)| p.tensor == Some(tensor))
                    .map(move |(slot, _)| InletId::new(n.id, slot))
            })
            .collect()
    }

    /// Graphs referenced by a node's attributes.
    pub fn subgraphs(&self, node: NodeId) -> Vec<GraphId> {
        self.node(node).map(|n| n.subgraphs().collect()).unwrap_or_default()
    }

    /// Number of nodes per operator type.
    pub fn operator_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.op_type.as_str()).or_default() += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut g = Graph::default();
        for (ix, name) in ["x", "y", "z"].iter().enumerate() {
            g.tensors.push(Tensor::new(TensorId(ix), name.to_string(), TensorKind::Intermediate));
        }
        for (ix, op) in ["Relu", "Add", "Relu"].iter().enumerate() {
            let mut n = Node::new(NodeId(ix), op.to_string());
            n.name = Some(format!("n{ix}"));
            n.inputs.push(Port { parameter: None, tensor: Some(TensorId(0)) });
            g.nodes.push(n);
        }
        g.nodes[1].inputs.push(Port { parameter: None, tensor: Some(TensorId(0)) });
        g.nodes[1].attributes.push(Attribute {
            name: "body".into(),
            value: AttrValue::Graphs(vec![GraphId(1), GraphId(2)]),
            visible: true,
        });
        g
    }

    #[test]
    fn lookups() {
        let g = sample();
        assert_eq!(g.tensor_by_name("y").map(|t| t.id), Some(TensorId(1)));
        assert_eq!(g.node_by_name("n2").map(|n| n.id), Some(NodeId(2)));
        assert!(g.node_by_name("nope").is_none());
    }

    #[test]
    fn consumers_in_order() {
        let g = sample();
        assert_eq!(
            g.consumers(TensorId(0)),
            vec![
                InletId::new(NodeId(0), 0),
                InletId::new(NodeId(1), 0),
                InletId::new(NodeId(1), 1),
                InletId::new(NodeId(2), 0)
            ]
        );
        assert!(g.consumers(TensorId(2)).is_empty());
    }

    #[test]
    fn subgraphs_and_counts() {
        let g = sample();
        assert_eq!(g.subgraphs(NodeId(1)), vec![GraphId(1), GraphId(2)]);
        assert!(g.subgraphs(NodeId(7)).is_empty());
        let counts = g.operator_counts();
        assert_eq!(counts.get("Relu"), Some(&2));
        assert_eq!(counts.get("Add"), Some(&1));
    }
}
