//! The IR document as typed structs, read from the XML element tree.
use crate::xml::{self, Element};
use lucid_core::internal::*;

/// IR versions lucid reads.
pub const IR_VERSIONS: std::ops::RangeInclusive<u32> = 2..=11;

#[derive(Clone, Debug, PartialEq)]
pub struct Net {
    pub name: Option<String>,
    pub version: u32,
    pub body: Body,
    /// `<meta_data>` and `<rt_info>` entries, nested keys joined with dots.
    pub properties: Vec<(String, String)>,
}

/// Layers and the edges between them: the whole net, or a loop body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    pub layers: Vec<Layer>,
    pub edges: Vec<Edge>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub layer_type: String,
    /// Operation set, `opset1` and up. Absent before IR v10.
    pub version: Option<String>,
    pub precision: Option<String>,
    pub data: Vec<(String, String)>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub blobs: Vec<Blob>,
    pub body: Option<Body>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Port {
    pub id: String,
    pub precision: Option<String>,
    pub names: Option<String>,
    pub dims: Vec<String>,
}

/// A slice of the weights file.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub name: String,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub precision: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from_layer: String,
    pub from_port: String,
    pub to_layer: String,
    pub to_port: String,
}

fn required<'e>(element: &'e Element, attribute: &str) -> DecodeResult<&'e str> {
    element
        .attribute(attribute)
        .ok_or_else(|| DecodeError::missing(crate::OPENVINO, format!("{attribute} of <{}>", element.name)))
}

fn parse_port(port: &Element) -> DecodeResult<Port> {
    Ok(Port {
        id: required(port, "id")?.to_string(),
        precision: port.attribute("precision").or(port.attribute("element_type")).map(String::from),
        names: port.attribute("names").map(String::from),
        dims: port.children_named("dim").map(|d| d.text.trim().to_string()).collect(),
    })
}

fn parse_ports(layer: &Element, section: &str) -> DecodeResult<Vec<Port>> {
    match layer.child(section) {
        Some(ports) => ports.children_named("port").map(parse_port).collect(),
        None => Ok(vec![]),
    }
}

fn parse_blob(blob: &Element) -> DecodeResult<Blob> {
    let number = |attribute: &str| -> DecodeResult<Option<u64>> {
        blob.attribute(attribute)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| {
                    DecodeError::malformed(crate::OPENVINO, format!("blob {} {attribute} is {v:?}", blob.name))
                })
            })
            .transpose()
    };
    Ok(Blob {
        name: blob.name.clone(),
        offset: number("offset")?,
        size: number("size")?,
        precision: blob.attribute("precision").map(String::from),
    })
}

fn parse_layer(layer: &Element) -> DecodeResult<Layer> {
    let id = required(layer, "id")?.to_string();
    // IR v2 writes per-type attribute sections such as <convolution_data>
    let data = layer
        .children
        .iter()
        .find(|c| c.name == "data" || c.name.ends_with("_data"))
        .map(|d| d.attributes.clone())
        .unwrap_or_default();
    let blobs = match layer.child("blobs") {
        Some(blobs) => blobs.children.iter().map(parse_blob).collect::<DecodeResult<_>>()?,
        None => vec![],
    };
    let body = layer.child("body").map(parse_body).transpose()?;
    Ok(Layer {
        name: layer.attribute("name").unwrap_or(&id).to_string(),
        layer_type: required(layer, "type")?.to_string(),
        version: layer.attribute("version").map(String::from),
        precision: layer.attribute("precision").map(String::from),
        data,
        inputs: parse_ports(layer, "input")?,
        outputs: parse_ports(layer, "output")?,
        blobs,
        body,
        id,
    })
}

fn parse_edge(edge: &Element) -> DecodeResult<Edge> {
    Ok(Edge {
        from_layer: required(edge, "from-layer")?.to_string(),
        from_port: required(edge, "from-port")?.to_string(),
        to_layer: required(edge, "to-layer")?.to_string(),
        to_port: required(edge, "to-port")?.to_string(),
    })
}

fn parse_body(body: &Element) -> DecodeResult<Body> {
    let layers = body.child("layers").ok_or_else(|| DecodeError::missing(crate::OPENVINO, "<layers>"))?;
    let layers = layers.children_named("layer").map(parse_layer).collect::<DecodeResult<_>>()?;
    let edges = match body.child("edges") {
        Some(edges) => edges.children_named("edge").map(parse_edge).collect::<DecodeResult<_>>()?,
        None => vec![],
    };
    Ok(Body { layers, edges })
}

fn collect_properties(element: &Element, prefix: &str, into: &mut Vec<(String, String)>) {
    for child in &element.children {
        // IR v11 writes <attribute name=".." value=".."/> inside some sections
        let key = child.attribute("name").filter(|_| child.name == "attribute").unwrap_or(&child.name);
        let key = if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") };
        if let Some(value) = child.attribute("value") {
            into.push((key.clone(), value.to_string()));
        }
        collect_properties(child, &key, into);
    }
}

impl Net {
    pub fn parse(doc: &str) -> DecodeResult<Net> {
        let root = xml::parse_document(doc)?;
        if root.name != "net" {
            return Err(DecodeError::new(
                crate::OPENVINO,
                DecodeErrorKind::MalformedHeader,
                format!("root element is <{}>, not <net>", root.name),
            ));
        }
        let version = required(&root, "version")?;
        let version = version.trim().parse::<u32>().map_err(|_| {
            DecodeError::malformed(crate::OPENVINO, format!("net version {version:?} is not a number"))
        })?;
        if !IR_VERSIONS.contains(&version) {
            return Err(DecodeError::unsupported_version(crate::OPENVINO, version));
        }
        let mut properties = vec![];
        for section in ["meta_data", "rt_info"] {
            if let Some(element) = root.child(section) {
                collect_properties(element, "", &mut properties);
            }
        }
        Ok(Net { name: root.attribute("name").map(String::from), version, body: parse_body(&root)?, properties })
    }
}
