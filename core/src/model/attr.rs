use super::*;
use itertools::Itertools;
use lucid_data::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// An enumeration value and its symbolic name.
    Enum { value: i64, name: String },
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
    Bools(Vec<bool>),
    DataType(DatumType),
    Shape(Shape),
    /// Constant data carried by the attribute itself.
    Tensor(Box<TensorValue>),
    Graph(GraphId),
    Graphs(Vec<GraphId>),
    /// A reference to a function or library graph by name.
    Function(String),
}

impl AttrValue {
    pub fn graphs(&self) -> Vec<GraphId> {
        match self {
            AttrValue::Graph(g) => vec![*g],
            AttrValue::Graphs(gs) => gs.clone(),
            _ => vec![],
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) | AttrValue::Enum { value: i, .. } => Some(*i),
            AttrValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) | AttrValue::Function(s) | AttrValue::Enum { name: s, .. } => {
                Some(s)
            }
            _ => None,
        }
    }

    /// Whether the value equals a schema default given as JSON.
    pub fn matches_default(&self, default: &serde_json::Value) -> bool {
        use serde_json::Value;
        fn float_eq(a: f64, b: &Value) -> bool {
            // most sources store single precision
            b.as_f64().is_some_and(|b| a == b || a as f32 == b as f32)
        }
        match (self, default) {
            (AttrValue::Int(i), Value::Number(n)) => n.as_i64() == Some(*i) || n.as_f64() == Some(*i as f64),
            (AttrValue::Int(i), Value::Bool(b)) => (*i != 0) == *b,
            (AttrValue::Float(f), d @ Value::Number(_)) => float_eq(*f, d),
            (AttrValue::Bool(b), Value::Bool(d)) => b == d,
            (AttrValue::Bool(b), Value::Number(n)) => n.as_i64() == Some(*b as i64),
            (AttrValue::String(s), Value::String(d)) => s == d,
            (AttrValue::Enum { value, name }, Value::String(d)) => name == d || value.to_string() == *d,
            (AttrValue::Enum { value, .. }, Value::Number(n)) => n.as_i64() == Some(*value),
            (AttrValue::DataType(dt), Value::String(d)) => DatumType::from_name(d) == Some(*dt),
            (AttrValue::Ints(v), Value::Array(d)) => {
                v.len() == d.len() && v.iter().zip(d).all(|(a, b)| b.as_i64() == Some(*a))
            }
            (AttrValue::Floats(v), Value::Array(d)) => {
                v.len() == d.len() && v.iter().zip(d).all(|(a, b)| float_eq(*a, b))
            }
            (AttrValue::Strings(v), Value::Array(d)) => {
                v.len() == d.len() && v.iter().zip(d).all(|(a, b)| b.as_str() == Some(a.as_str()))
            }
            (AttrValue::Bools(v), Value::Array(d)) => {
                v.len() == d.len() && v.iter().zip(d).all(|(a, b)| b.as_bool() == Some(*a))
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::String(s) => write!(f, "{s:?}"),
            AttrValue::Enum { name, .. } => write!(f, "{name}"),
            AttrValue::Ints(v) => write!(f, "[{}]", v.iter().join(", ")),
            AttrValue::Floats(v) => write!(f, "[{}]", v.iter().join(", ")),
            AttrValue::Strings(v) => write!(f, "[{}]", v.iter().map(|s| format!("{s:?}")).join(", ")),
            AttrValue::Bools(v) => write!(f, "[{}]", v.iter().join(", ")),
            AttrValue::DataType(dt) => write!(f, "{dt}"),
            AttrValue::Shape(s) => write!(f, "{s}"),
            AttrValue::Tensor(t) => write!(f, "{t}"),
            AttrValue::Graph(g) => write!(f, "graph {g}"),
            AttrValue::Graphs(gs) => write!(f, "graphs [{}]", gs.iter().join(", ")),
            AttrValue::Function(name) => write!(f, "{name}()"),
        }
    }
}

/// Constant tensor held by an attribute rather than by the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TensorValue {
    pub name: Option<String>,
    pub datum_type: Option<DatumType>,
    pub shape: Option<Shape>,
    pub storage: Option<Storage>,
}

impl fmt::Display for TensorValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.datum_type {
            Some(dt) => write!(f, "{dt}")?,
            None => write!(f, "?")?,
        }
        if let Some(shape) = &self.shape {
            write!(f, "{shape}")?;
        }
        let rendered =
            self.datum_type.zip(self.storage.as_ref()).and_then(|(dt, s)| s.render(dt, 8));
        if let Some(values) = rendered {
            write!(f, " {values}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
    /// False for attributes a viewer should not show by default.
    pub visible: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        assert!(AttrValue::Int(1).matches_default(&json!(1)));
        assert!(!AttrValue::Int(2).matches_default(&json!(1)));
        assert!(AttrValue::Float(0.0001f32 as f64).matches_default(&json!(0.0001)));
        assert!(AttrValue::Bool(false).matches_default(&json!(false)));
        assert!(AttrValue::Ints(vec![1, 1]).matches_default(&json!([1, 1])));
        assert!(!AttrValue::Ints(vec![1, 1, 1]).matches_default(&json!([1, 1])));
        assert!(AttrValue::Enum { value: 0, name: "NONE".into() }.matches_default(&json!("NONE")));
        assert!(AttrValue::String("NCHW".into()).matches_default(&json!("NCHW")));
        assert!(!AttrValue::String("1".into()).matches_default(&json!(1)));
    }

    #[test]
    fn display() {
        assert_eq!(AttrValue::Ints(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(AttrValue::Enum { value: 1, name: "VALID".into() }.to_string(), "VALID");
        assert_eq!(AttrValue::Graphs(vec![GraphId(1), GraphId(2)]).to_string(), "graphs [1, 2]");
    }
}
