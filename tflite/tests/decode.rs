use flatbuffers::{FlatBufferBuilder, WIPOffset};
use lucid_core::internal::*;
use lucid_core::sniff::sniff;
use lucid_tflite::*;
use proptest::prelude::*;

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("LUCID_LOG").is_test(true).try_init();
}

#[derive(Clone, Copy, Debug)]
enum Field {
    I8(usize, i8),
    I32(usize, i32),
    F32(usize, f32),
}

#[derive(Clone, Debug, Default)]
struct TensorDef {
    name: &'static str,
    shape: Vec<i32>,
    ty: i8,
    buffer: u32,
    scale: Vec<f32>,
    zero_point: Vec<i64>,
    axis: i32,
}

fn tensor(name: &'static str, shape: &[i32]) -> TensorDef {
    TensorDef { name, shape: shape.to_vec(), ..TensorDef::default() }
}

#[derive(Clone, Debug, Default)]
struct OpDef {
    opcode: u32,
    inputs: Vec<i32>,
    outputs: Vec<i32>,
    options: Option<(u8, Vec<Field>)>,
    custom: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
struct SubgraphDef {
    name: Option<&'static str>,
    tensors: Vec<TensorDef>,
    inputs: Vec<i32>,
    outputs: Vec<i32>,
    ops: Vec<OpDef>,
}

#[derive(Clone, Debug)]
struct ModelDef {
    identifier: &'static str,
    version: u32,
    description: Option<&'static str>,
    /// (deprecated_builtin_code, builtin_code, custom_code)
    codes: Vec<(i8, i32, Option<&'static str>)>,
    subgraphs: Vec<SubgraphDef>,
    buffers: Vec<Vec<u8>>,
    metadata: Vec<(&'static str, u32)>,
}

impl Default for ModelDef {
    fn default() -> ModelDef {
        ModelDef {
            identifier: "TFL3",
            version: 3,
            description: Some("MLIR Converted."),
            codes: vec![],
            subgraphs: vec![],
            buffers: vec![vec![]],
            metadata: vec![],
        }
    }
}

impl ModelDef {
    fn finish(&self) -> Vec<u8> {
        let mut b = FlatBufferBuilder::new();
        let mut buffers = vec![];
        for data in &self.buffers {
            let data = (!data.is_empty()).then(|| b.create_vector(data));
            let t = b.start_table();
            if let Some(data) = data {
                b.push_slot_always::<WIPOffset<_>>(voffset(0), data);
            }
            buffers.push(b.end_table(t));
        }
        let buffers = b.create_vector(&buffers);

        let mut codes = vec![];
        for (deprecated, builtin, custom) in &self.codes {
            let custom = custom.map(|c| b.create_string(c));
            let t = b.start_table();
            b.push_slot::<i8>(voffset(0), *deprecated, 0);
            if let Some(custom) = custom {
                b.push_slot_always::<WIPOffset<_>>(voffset(1), custom);
            }
            b.push_slot::<i32>(voffset(3), *builtin, 0);
            codes.push(b.end_table(t));
        }
        let codes = b.create_vector(&codes);

        let mut subgraphs = vec![];
        for sub in &self.subgraphs {
            let mut tensors = vec![];
            for t in &sub.tensors {
                let name = b.create_string(t.name);
                let shape = b.create_vector(&t.shape);
                let quant = if t.scale.is_empty() {
                    None
                } else {
                    let scale = b.create_vector(&t.scale);
                    let zero_point = b.create_vector(&t.zero_point);
                    let q = b.start_table();
                    b.push_slot_always::<WIPOffset<_>>(voffset(2), scale);
                    b.push_slot_always::<WIPOffset<_>>(voffset(3), zero_point);
                    b.push_slot::<i32>(voffset(6), t.axis, 0);
                    Some(b.end_table(q))
                };
                let start = b.start_table();
                b.push_slot_always::<WIPOffset<_>>(voffset(0), shape);
                b.push_slot::<i8>(voffset(1), t.ty, 0);
                b.push_slot::<u32>(voffset(2), t.buffer, 0);
                b.push_slot_always::<WIPOffset<_>>(voffset(3), name);
                if let Some(q) = quant {
                    b.push_slot_always::<WIPOffset<_>>(voffset(4), q);
                }
                tensors.push(b.end_table(start));
            }
            let tensors = b.create_vector(&tensors);
            let mut ops = vec![];
            for op in &sub.ops {
                let inputs = b.create_vector(&op.inputs);
                let outputs = b.create_vector(&op.outputs);
                let custom = op.custom.as_ref().map(|c| b.create_vector(c));
                let options = op.options.as_ref().map(|(tag, fields)| {
                    let t = b.start_table();
                    for field in fields {
                        match *field {
                            Field::I8(ix, v) => b.push_slot_always::<i8>(voffset(ix), v),
                            Field::I32(ix, v) => b.push_slot_always::<i32>(voffset(ix), v),
                            Field::F32(ix, v) => b.push_slot_always::<f32>(voffset(ix), v),
                        }
                    }
                    (*tag, b.end_table(t))
                });
                let start = b.start_table();
                b.push_slot::<u32>(voffset(0), op.opcode, 0);
                b.push_slot_always::<WIPOffset<_>>(voffset(1), inputs);
                b.push_slot_always::<WIPOffset<_>>(voffset(2), outputs);
                if let Some((tag, options)) = options {
                    b.push_slot::<u8>(voffset(3), tag, 0);
                    b.push_slot_always::<WIPOffset<_>>(voffset(4), options);
                }
                if let Some(custom) = custom {
                    b.push_slot_always::<WIPOffset<_>>(voffset(5), custom);
                }
                ops.push(b.end_table(start));
            }
            let ops = b.create_vector(&ops);
            let inputs = b.create_vector(&sub.inputs);
            let outputs = b.create_vector(&sub.outputs);
            let name = sub.name.map(|n| b.create_string(n));
            let start = b.start_table();
            b.push_slot_always::<WIPOffset<_>>(voffset(0), tensors);
            b.push_slot_always::<WIPOffset<_>>(voffset(1), inputs);
            b.push_slot_always::<WIPOffset<_>>(voffset(2), outputs);
            b.push_slot_always::<WIPOffset<_>>(voffset(3), ops);
            if let Some(name) = name {
                b.push_slot_always::<WIPOffset<_>>(voffset(4), name);
            }
            subgraphs.push(b.end_table(start));
        }
        let subgraphs = b.create_vector(&subgraphs);

        let mut metadata = vec![];
        for (name, buffer) in &self.metadata {
            let name = b.create_string(name);
            let t = b.start_table();
            b.push_slot_always::<WIPOffset<_>>(voffset(0), name);
            b.push_slot::<u32>(voffset(1), *buffer, 0);
            metadata.push(b.end_table(t));
        }
        let metadata = b.create_vector(&metadata);
        let description = self.description.map(|d| b.create_string(d));

        let root = b.start_table();
        b.push_slot::<u32>(voffset(0), self.version, 0);
        b.push_slot_always::<WIPOffset<_>>(voffset(1), codes);
        b.push_slot_always::<WIPOffset<_>>(voffset(2), subgraphs);
        if let Some(description) = description {
            b.push_slot_always::<WIPOffset<_>>(voffset(3), description);
        }
        b.push_slot_always::<WIPOffset<_>>(voffset(4), buffers);
        b.push_slot_always::<WIPOffset<_>>(voffset(6), metadata);
        let root = b.end_table(root);
        b.finish(root, Some(self.identifier));
        b.finished_data().to_vec()
    }
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// input -> Conv2D(weights, bias) -> conv
fn conv_model() -> ModelDef {
    let mut weights = tensor("weights", &[2, 1, 1, 3]);
    weights.buffer = 1;
    let mut bias = tensor("bias", &[2]);
    bias.buffer = 2;
    ModelDef {
        codes: vec![(3, 0, None)],
        subgraphs: vec![SubgraphDef {
            name: Some("main"),
            tensors: vec![tensor("input", &[1, 4, 4, 3]), weights, bias, tensor("conv", &[1, 4, 4, 2])],
            inputs: vec![0],
            outputs: vec![3],
            ops: vec![OpDef {
                opcode: 0,
                inputs: vec![0, 1, 2],
                outputs: vec![3],
                options: Some((1, vec![Field::I8(0, 1), Field::I32(1, 2), Field::I32(2, 2), Field::I8(3, 1)])),
                custom: None,
            }],
        }],
        buffers: vec![vec![], f32_bytes(&[0.5; 6]), f32_bytes(&[0.0, 1.0])],
        ..ModelDef::default()
    }
}

fn decode(bytes: Vec<u8>) -> LucidResult<Model> {
    decode_with(bytes, &Cancel::default())
}

fn decode_with(bytes: Vec<u8>, cancel: &Cancel) -> LucidResult<Model> {
    setup_test_logger();
    let tfl = tflite();
    tfl.model_for_bytes(&Bytes::from(bytes), &tfl.metadata(), &Options::default(), cancel)
}

#[test]
fn conv_with_options() {
    let model = decode(conv_model().finish()).unwrap();
    assert_eq!(model.format(), TFLITE);
    assert_eq!(model.version(), Some("TensorFlow Lite v3"));
    assert_eq!(model.description(), Some("MLIR Converted."));
    let g = model.main();
    assert_eq!(g.name(), Some("main"));
    assert_eq!(g.nodes().len(), 1);
    let conv = &g.nodes()[0];
    assert_eq!(conv.op_type, "Conv2D");
    assert_eq!(conv.category(), Some("Layer"));
    let params = conv.inputs.iter().map(|p| p.parameter.as_deref()).collect::<Vec<_>>();
    assert_eq!(params, vec![Some("input"), Some("filter"), Some("bias")]);

    assert_eq!(conv.attribute("padding"), Some(&AttrValue::Enum { value: 1, name: "VALID".into() }));
    assert_eq!(conv.attribute("stride_w"), Some(&AttrValue::Int(2)));
    assert_eq!(
        conv.attribute("fused_activation_function"),
        Some(&AttrValue::Enum { value: 1, name: "RELU".into() })
    );
    assert_eq!(conv.attribute("dilation_h_factor"), Some(&AttrValue::Int(1)));
    let visible = conv.visible_attributes().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(visible, vec!["padding", "stride_w", "stride_h", "fused_activation_function"]);

    let weights = g.tensor_by_name("weights").unwrap();
    assert!(weights.is_initializer());
    assert_eq!(weights.type_string(), "float32[2,1,1,3]");
    assert_eq!(weights.storage.as_ref().and_then(|s| s.values::<f32>(10)), Some(vec![0.5; 6]));
    let input = g.tensor_by_name("input").unwrap();
    assert!(input.storage.is_none());
    assert_eq!(g.inputs(), &[input.id]);
    assert_eq!(g.outputs(), &[g.tensor_by_name("conv").unwrap().id]);
    model.check_integrity().unwrap();
}

#[test]
fn quantized_tensors() {
    let mut m = conv_model();
    let sub = &mut m.subgraphs[0];
    sub.tensors[0].ty = 3;
    sub.tensors[0].scale = vec![0.5];
    sub.tensors[0].zero_point = vec![128];
    sub.tensors[1].ty = 9;
    sub.tensors[1].scale = vec![0.1, 0.2];
    sub.tensors[1].zero_point = vec![0, 0];
    sub.tensors[1].axis = 0;
    sub.tensors[3].ty = 3;
    let model = decode(m.finish()).unwrap();
    let g = model.main();
    let input = g.tensor_by_name("input").unwrap();
    assert_eq!(input.datum_type, Some(DatumType::U8));
    assert_eq!(input.quantization, Some(Quantization::per_tensor(0.5, 128)));
    let weights = g.tensor_by_name("weights").unwrap();
    assert_eq!(weights.datum_type, Some(DatumType::I8));
    let q = weights.quantization.as_ref().unwrap();
    assert_eq!(q.scale, vec![0.1, 0.2]);
    assert_eq!(q.axis, Some(0));
    assert!(g.tensor_by_name("conv").unwrap().quantization.is_none());
}

fn while_model(cond: i32, body: i32) -> ModelDef {
    let passthrough = |name: &'static str| SubgraphDef {
        name: Some(name),
        tensors: vec![tensor("i", &[]), tensor("o", &[])],
        inputs: vec![0],
        outputs: vec![1],
        ops: vec![OpDef { opcode: 1, inputs: vec![0], outputs: vec![1], ..OpDef::default() }],
    };
    ModelDef {
        codes: vec![(119, 119, None), (19, 0, None)],
        subgraphs: vec![
            SubgraphDef {
                name: Some("main"),
                tensors: vec![tensor("x", &[]), tensor("y", &[])],
                inputs: vec![0],
                outputs: vec![1],
                ops: vec![OpDef {
                    opcode: 0,
                    inputs: vec![0],
                    outputs: vec![1],
                    options: Some((93, vec![Field::I32(0, cond), Field::I32(1, body)])),
                    custom: None,
                }],
            },
            passthrough("cond"),
            passthrough("body"),
        ],
        ..ModelDef::default()
    }
}

#[test]
fn while_refers_to_subgraphs() {
    let model = decode(while_model(1, 2).finish()).unwrap();
    assert_eq!(model.graphs().len(), 3);
    let w = &model.main().nodes()[0];
    assert_eq!(w.op_type, "While");
    assert_eq!(w.attribute("cond_subgraph"), Some(&AttrValue::Graph(GraphId(1))));
    assert_eq!(w.attribute("body_subgraph"), Some(&AttrValue::Graph(GraphId(2))));
    assert_eq!(w.subgraphs().collect::<Vec<_>>(), vec![GraphId(1), GraphId(2)]);
    assert_eq!(model.graph(GraphId(2)).unwrap().name(), Some("body"));
    assert_eq!(model.graph(GraphId(1)).unwrap().nodes()[0].op_type, "Relu");
    model.check_integrity().unwrap();
}

#[test]
fn dangling_subgraph_reference() {
    match decode(while_model(1, 7).finish()) {
        Err(LucidError::Decode(e)) => assert_eq!(e.kind, DecodeErrorKind::Malformed),
        other => panic!("{other:?}"),
    }
}

#[test]
fn custom_operator() {
    let model = ModelDef {
        codes: vec![(32, 32, Some("TFLite_Detection_PostProcess"))],
        subgraphs: vec![SubgraphDef {
            tensors: vec![tensor("boxes", &[1, 10, 4]), tensor("detections", &[1, 10, 4])],
            inputs: vec![0],
            outputs: vec![1],
            ops: vec![OpDef { inputs: vec![0], outputs: vec![1], custom: Some(vec![1, 2, 3]), ..OpDef::default() }],
            ..SubgraphDef::default()
        }],
        ..ModelDef::default()
    };
    let model = decode(model.finish()).unwrap();
    let op = &model.main().nodes()[0];
    assert_eq!(op.op_type, "TFLite_Detection_PostProcess");
    assert!(op.descriptor.is_none());
    match op.attribute("custom_options") {
        Some(AttrValue::Tensor(t)) => {
            assert_eq!(t.datum_type, Some(DatumType::U8));
            assert_eq!(t.storage.as_ref().and_then(|s| s.values::<u8>(10)), Some(vec![1, 2, 3]));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn builtin_code_supersedes_deprecated_one() {
    let mut m = conv_model();
    m.codes = vec![(127, 3, None)];
    let model = decode(m.finish()).unwrap();
    assert_eq!(model.main().nodes()[0].op_type, "Conv2D");
}

#[test]
fn optional_inputs_are_absent() {
    let mut m = conv_model();
    m.subgraphs[0].ops[0].inputs = vec![0, 1, -1];
    let model = decode(m.finish()).unwrap();
    let conv = &model.main().nodes()[0];
    assert_eq!(conv.inputs.len(), 3);
    assert_eq!(conv.inputs[2].tensor, None);
}

#[test]
fn repeated_tensor_names_stay_distinct() {
    let mut m = conv_model();
    m.subgraphs[0].tensors[3].name = "input";
    let model = decode(m.finish()).unwrap();
    let g = model.main();
    assert_eq!(g.tensors().len(), 4);
    assert_ne!(g.inputs(), g.outputs());
}

#[test]
fn metadata_becomes_properties() {
    let mut m = conv_model();
    m.buffers.push(b"1.14.0\0\0".to_vec());
    m.metadata = vec![("min_runtime_version", 3)];
    let model = decode(m.finish()).unwrap();
    assert_eq!(model.property("min_runtime_version"), Some("1.14.0"));
}

#[test]
fn newer_schema_is_unsupported() {
    let m = ModelDef { version: 4, ..conv_model() };
    let err = decode(m.finish()).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.format(), Some(TFLITE));
}

#[test]
fn wrong_identifier() {
    let m = ModelDef { identifier: "TFL2", ..conv_model() };
    match decode(m.finish()) {
        Err(LucidError::Decode(e)) => assert_eq!(e.kind, DecodeErrorKind::MalformedHeader),
        other => panic!("{other:?}"),
    }
}

#[test]
fn missing_subgraphs() {
    let m = ModelDef { subgraphs: vec![], ..conv_model() };
    match decode(m.finish()) {
        Err(LucidError::Decode(e)) => assert_eq!(e.kind, DecodeErrorKind::MissingField),
        other => panic!("{other:?}"),
    }
}

#[test]
fn sniffed_as_tflite() {
    let bytes = conv_model().finish();
    let claims = [*Tflite.claim()];
    assert_eq!(sniff(&claims, &bytes, Some("model.bin"), 4096).unwrap(), TFLITE);
}

#[test]
fn cancelled() {
    let cancel = Cancel::new();
    cancel.cancel();
    assert_eq!(decode_with(conv_model().finish(), &cancel).unwrap_err(), LucidError::Cancelled);
}

proptest! {
    #[test]
    fn truncation_never_panics(cut in 0usize..2048) {
        let bytes = conv_model().finish();
        let len = bytes.len();
        let cut = cut.min(len);
        let result = decode(bytes[..cut].to_vec());
        match result {
            Err(LucidError::Decode(e)) if cut >= 8 && cut < len => {
                prop_assert_eq!(e.kind, DecodeErrorKind::Truncated);
            }
            Err(LucidError::Decode(_)) => {
                prop_assert!(cut < len);
            }
            other => {
                prop_assert!(cut == len && other.is_ok(), "{:?}", other.err());
            }
        }
    }

    #[test]
    fn corruption_never_panics(flips in proptest::collection::vec((any::<usize>(), any::<u8>()), 1..8)) {
        let mut bytes = conv_model().finish();
        let len = bytes.len();
        for (pos, value) in flips {
            bytes[pos % len] = value;
        }
        let _ = decode(bytes);
    }
}
