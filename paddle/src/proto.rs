//! PaddlePaddle `framework.proto` messages, as prost structs.
//!
//! The schema is proto2: required fields are always written, so they are declared
//! `required` here to encode the same bytes as Paddle does. Only the fields lucid reads are
//! declared. The builder helpers at the bottom make test programs easy to write.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProgramDesc {
    #[prost(message, repeated, tag = "1")]
    pub blocks: Vec<BlockDesc>,
    #[prost(message, optional, tag = "4")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(int64, optional, tag = "1")]
    pub version: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockDesc {
    #[prost(int32, required, tag = "1")]
    pub idx: i32,
    #[prost(int32, required, tag = "2")]
    pub parent_idx: i32,
    #[prost(message, repeated, tag = "3")]
    pub vars: Vec<VarDesc>,
    #[prost(message, repeated, tag = "4")]
    pub ops: Vec<OpDesc>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VarDesc {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, required, tag = "2")]
    pub r#type: VarType,
    #[prost(bool, optional, tag = "3")]
    pub persistable: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VarType {
    #[prost(enumeration = "var_type::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub selected_rows: Option<TensorDesc>,
    #[prost(message, optional, tag = "3")]
    pub lod_tensor: Option<LoDTensorDesc>,
    #[prost(message, optional, tag = "4")]
    pub tensor_array: Option<LoDTensorDesc>,
}

pub mod var_type {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Bool = 0,
        Int16 = 1,
        Int32 = 2,
        Int64 = 3,
        Fp16 = 4,
        Fp32 = 5,
        Fp64 = 6,
        LodTensor = 7,
        SelectedRows = 8,
        FeedMinibatch = 9,
        FetchList = 10,
        StepScopes = 11,
        LodRankTable = 12,
        LodTensorArray = 13,
        PlaceList = 14,
        Reader = 15,
        Raw = 17,
        Tuple = 18,
        SizeT = 19,
        Uint8 = 20,
        Int8 = 21,
        Bf16 = 22,
        Complex64 = 23,
        Complex128 = 24,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TensorDesc {
    #[prost(enumeration = "var_type::Type", required, tag = "1")]
    pub data_type: i32,
    #[prost(int64, repeated, packed = "false", tag = "2")]
    pub dims: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoDTensorDesc {
    #[prost(message, required, tag = "1")]
    pub tensor: TensorDesc,
    #[prost(int32, optional, tag = "2")]
    pub lod_level: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpDesc {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<op_desc::Var>,
    #[prost(message, repeated, tag = "2")]
    pub outputs: Vec<op_desc::Var>,
    #[prost(string, required, tag = "3")]
    pub r#type: String,
    #[prost(message, repeated, tag = "4")]
    pub attrs: Vec<op_desc::Attr>,
}

pub mod op_desc {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Var {
        #[prost(string, required, tag = "1")]
        pub parameter: String,
        #[prost(string, repeated, tag = "2")]
        pub arguments: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Attr {
        #[prost(string, required, tag = "1")]
        pub name: String,
        #[prost(enumeration = "super::AttrType", required, tag = "2")]
        pub r#type: i32,
        #[prost(int32, optional, tag = "3")]
        pub i: Option<i32>,
        #[prost(float, optional, tag = "4")]
        pub f: Option<f32>,
        #[prost(string, optional, tag = "5")]
        pub s: Option<String>,
        #[prost(int32, repeated, packed = "false", tag = "6")]
        pub ints: Vec<i32>,
        #[prost(float, repeated, packed = "false", tag = "7")]
        pub floats: Vec<f32>,
        #[prost(string, repeated, tag = "8")]
        pub strings: Vec<String>,
        #[prost(bool, optional, tag = "10")]
        pub b: Option<bool>,
        #[prost(bool, repeated, packed = "false", tag = "11")]
        pub bools: Vec<bool>,
        #[prost(int32, optional, tag = "12")]
        pub block_idx: Option<i32>,
        #[prost(int64, optional, tag = "13")]
        pub l: Option<i64>,
        #[prost(int32, repeated, packed = "false", tag = "14")]
        pub blocks_idx: Vec<i32>,
        #[prost(int64, repeated, packed = "false", tag = "15")]
        pub longs: Vec<i64>,
        #[prost(double, repeated, packed = "false", tag = "16")]
        pub float64s: Vec<f64>,
        #[prost(string, optional, tag = "17")]
        pub var_name: Option<String>,
        #[prost(string, repeated, tag = "18")]
        pub vars_name: Vec<String>,
        #[prost(double, optional, tag = "19")]
        pub float64: Option<f64>,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AttrType {
    Int = 0,
    Float = 1,
    String = 2,
    Ints = 3,
    Floats = 4,
    Strings = 5,
    Boolean = 6,
    Booleans = 7,
    Block = 8,
    Long = 9,
    Blocks = 10,
    Longs = 11,
    Float64s = 12,
    Var = 13,
    Vars = 14,
    Float64 = 15,
}

pub fn program() -> ProgramDesc {
    ProgramDesc::default()
}

pub fn block(idx: i32, parent_idx: i32) -> BlockDesc {
    BlockDesc { idx, parent_idx, ..BlockDesc::default() }
}

pub fn op(op_type: &str) -> OpDesc {
    OpDesc { r#type: op_type.to_string(), ..OpDesc::default() }
}

impl ProgramDesc {
    pub fn block(mut self, b: BlockDesc) -> Self {
        self.blocks.push(b);
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(Version { version: Some(version) });
        self
    }
}

impl BlockDesc {
    pub fn var(mut self, v: VarDesc) -> Self {
        self.vars.push(v);
        self
    }

    pub fn op(mut self, o: OpDesc) -> Self {
        self.ops.push(o);
        self
    }
}

impl VarDesc {
    pub fn tensor(name: &str, data_type: var_type::Type, dims: &[i64]) -> VarDesc {
        let tensor = TensorDesc { data_type: data_type as i32, dims: dims.to_vec() };
        VarDesc {
            name: name.to_string(),
            r#type: VarType {
                r#type: var_type::Type::LodTensor as i32,
                lod_tensor: Some(LoDTensorDesc { tensor, lod_level: None }),
                ..VarType::default()
            },
            persistable: None,
        }
    }

    pub fn special(name: &str, var_type: var_type::Type) -> VarDesc {
        VarDesc {
            name: name.to_string(),
            r#type: VarType { r#type: var_type as i32, ..VarType::default() },
            persistable: Some(true),
        }
    }
}

/// Builder for `VarDesc::persistable`; a trait because prost derives a same-named getter.
pub trait VarDescBuilder {
    fn persistable(self) -> VarDesc;
}

impl VarDescBuilder for VarDesc {
    fn persistable(self) -> VarDesc {
        VarDesc { persistable: Some(true), ..self }
    }
}

impl OpDesc {
    pub fn input(mut self, parameter: &str, arguments: &[&str]) -> Self {
        self.inputs.push(op_desc::Var::new(parameter, arguments));
        self
    }

    pub fn output(mut self, parameter: &str, arguments: &[&str]) -> Self {
        self.outputs.push(op_desc::Var::new(parameter, arguments));
        self
    }

    pub fn attr(mut self, attr: op_desc::Attr) -> Self {
        self.attrs.push(attr);
        self
    }
}

impl op_desc::Var {
    pub fn new(parameter: &str, arguments: &[&str]) -> op_desc::Var {
        op_desc::Var {
            parameter: parameter.to_string(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl op_desc::Attr {
    fn of(name: &str, attr_type: AttrType) -> op_desc::Attr {
        op_desc::Attr { name: name.to_string(), r#type: attr_type as i32, ..op_desc::Attr::default() }
    }

    pub fn int(name: &str, i: i32) -> op_desc::Attr {
        op_desc::Attr { i: Some(i), ..Self::of(name, AttrType::Int) }
    }

    pub fn float(name: &str, f: f32) -> op_desc::Attr {
        op_desc::Attr { f: Some(f), ..Self::of(name, AttrType::Float) }
    }

    pub fn string(name: &str, s: &str) -> op_desc::Attr {
        op_desc::Attr { s: Some(s.to_string()), ..Self::of(name, AttrType::String) }
    }

    pub fn ints(name: &str, ints: &[i32]) -> op_desc::Attr {
        op_desc::Attr { ints: ints.to_vec(), ..Self::of(name, AttrType::Ints) }
    }

    pub fn boolean(name: &str, b: bool) -> op_desc::Attr {
        op_desc::Attr { b: Some(b), ..Self::of(name, AttrType::Boolean) }
    }

    pub fn block(name: &str, block_idx: i32) -> op_desc::Attr {
        op_desc::Attr { block_idx: Some(block_idx), ..Self::of(name, AttrType::Block) }
    }
}
