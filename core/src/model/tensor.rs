use super::*;
use lucid_data::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorKind {
    Input,
    /// Constant data owned by the graph (weights, biases, lookup tables).
    Initializer,
    Intermediate,
    /// An outer graph's tensor, seen from a nested graph.
    Captured { graph: GraphId, tensor: TensorId },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub id: TensorId,
    /// Unique within the graph.
    pub name: String,
    pub datum_type: Option<DatumType>,
    pub shape: Option<Shape>,
    pub storage: Option<Storage>,
    pub quantization: Option<Quantization>,
    pub kind: TensorKind,
    pub producer: Option<OutletId>,
}

impl Tensor {
    pub fn new(id: TensorId, name: String, kind: TensorKind) -> Tensor {
        Tensor {
            id,
            name,
            datum_type: None,
            shape: None,
            storage: None,
            quantization: None,
            kind,
            producer: None,
        }
    }

    pub fn is_initializer(&self) -> bool {
        self.kind == TensorKind::Initializer
    }

    /// `float32[1,3,224,224]`, with `?` for whatever is unknown.
    pub fn type_string(&self) -> String {
        let dt = self.datum_type.map(|dt| dt.to_string()).unwrap_or_else(|| "?".into());
        match &self.shape {
            Some(shape) => format!("{dt}{shape}"),
            None => dt,
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.type_string())
    }
}
