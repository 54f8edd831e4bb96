//! Operator descriptors, loaded once per format from JSON tables.
//!
//! A table is a JSON array of operator entries, either flat
//! (`{"name": "Conv", "category": "Layer", "attributes": [...]}`) or with the schema nested
//! under a `schema` key. Unknown keys are ignored.
use crate::format::Format;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttributeSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub datum_type: Option<String>,
    pub default: Option<serde_json::Value>,
    pub visible: Option<bool>,
    pub description: Option<String>,
    /// Names of enumeration values, indexed by value.
    pub values: Option<Vec<String>>,
    /// Field index in a flatbuffer option or descriptor table.
    pub field: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub datum_type: Option<String>,
    pub description: Option<String>,
    /// `optional` or `variadic`.
    pub option: Option<String>,
}

impl PortSchema {
    pub fn is_variadic(&self) -> bool {
        self.option.as_deref() == Some("variadic")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpDescriptor {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub attributes: Vec<AttributeSchema>,
    pub inputs: Vec<PortSchema>,
    pub outputs: Vec<PortSchema>,
}

impl OpDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes decoded from flatbuffer tables, in field order.
    pub fn flat_fields(&self) -> impl Iterator<Item = (usize, &AttributeSchema)> {
        self.attributes.iter().filter_map(|a| Some((a.field?, a)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Entry {
    Wrapped { name: String, schema: OpDescriptor },
    Flat(OpDescriptor),
}

impl Entry {
    fn into_descriptor(self) -> OpDescriptor {
        match self {
            Entry::Wrapped { name, schema } => OpDescriptor { name, ..schema },
            Entry::Flat(op) => op,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Lookup {
    Known(Arc<OpDescriptor>),
    Unknown,
}

impl Lookup {
    pub fn descriptor(&self) -> Option<&Arc<OpDescriptor>> {
        match self {
            Lookup::Known(d) => Some(d),
            Lookup::Unknown => None,
        }
    }
}

/// The operator table of one format.
#[derive(Clone, Debug)]
pub struct FormatMetadata {
    pub format: Format,
    ops: HashMap<String, Arc<OpDescriptor>>,
}

impl FormatMetadata {
    pub fn empty(format: Format) -> FormatMetadata {
        FormatMetadata { format, ops: HashMap::new() }
    }

    pub fn parse(format: Format, json: &str) -> serde_json::Result<FormatMetadata> {
        let entries: Vec<Entry> = serde_json::from_str(json)?;
        let mut ops = HashMap::new();
        for entry in entries {
            let op = entry.into_descriptor();
            // first entry wins, later ones are version variants
            ops.entry(op.name.clone()).or_insert_with(|| Arc::new(op));
        }
        Ok(FormatMetadata { format, ops })
    }

    pub fn lookup(&self, op_type: &str) -> Lookup {
        match self.ops.get(op_type) {
            Some(op) => Lookup::Known(op.clone()),
            None => Lookup::Unknown,
        }
    }

    pub fn get(&self, op_type: &str) -> Option<&OpDescriptor> {
        self.ops.get(op_type).map(|op| &**op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Where metadata tables come from.
pub trait MetadataSource: Send + Sync {
    /// The JSON table for `format`, or None if there is none.
    fn load(&self, format: Format) -> anyhow::Result<Option<Cow<'static, str>>>;
}

/// Tables compiled into the decoder crates.
#[derive(Clone, Debug, Default)]
pub struct Bundled(HashMap<Format, &'static str>);

impl Bundled {
    pub fn with(mut self, format: Format, json: &'static str) -> Bundled {
        self.0.insert(format, json);
        self
    }
}

impl MetadataSource for Bundled {
    fn load(&self, format: Format) -> anyhow::Result<Option<Cow<'static, str>>> {
        Ok(self.0.get(&format).map(|json| Cow::Borrowed(*json)))
    }
}

/// Per-format operator tables, each loaded on first use and read-only afterwards.
pub struct MetadataRegistry {
    source: Box<dyn MetadataSource>,
    tables: HashMap<Format, OnceLock<Arc<FormatMetadata>>>,
}

impl MetadataRegistry {
    pub fn new(
        source: impl MetadataSource + 'static,
        formats: impl IntoIterator<Item = Format>,
    ) -> MetadataRegistry {
        let tables = formats.into_iter().map(|f| (f, OnceLock::new())).collect();
        MetadataRegistry { source: Box::new(source), tables }
    }

    pub fn for_format(&self, format: Format) -> Arc<FormatMetadata> {
        match self.tables.get(&format) {
            Some(cell) => cell.get_or_init(|| Arc::new(self.load(format))).clone(),
            None => {
                debug!("No metadata registered for {format}");
                Arc::new(FormatMetadata::empty(format))
            }
        }
    }

    pub fn lookup(&self, format: Format, op_type: &str) -> Lookup {
        self.for_format(format).lookup(op_type)
    }

    fn load(&self, format: Format) -> FormatMetadata {
        match self.source.load(format) {
            Ok(Some(json)) => match FormatMetadata::parse(format, &json) {
                Ok(table) => {
                    debug!("Loaded {} operator descriptors for {format}", table.len());
                    table
                }
                Err(e) => {
                    warn!("Malformed {format} metadata, continuing without: {e}");
                    FormatMetadata::empty(format)
                }
            },
            Ok(None) => {
                debug!("No metadata table for {format}");
                FormatMetadata::empty(format)
            }
            Err(e) => {
                warn!("Failed to load {format} metadata, continuing without: {e:#}");
                FormatMetadata::empty(format)
            }
        }
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry").field("formats", &self.tables.keys().collect::<Vec<_>>()).finish()
    }
}
