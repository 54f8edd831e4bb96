use lucid_core::internal::*;
use lucid_core::sniff::sniff;
use lucid_paddle::proto::op_desc::Attr;
use lucid_paddle::proto::var_type::Type;
use lucid_paddle::proto::*;
use lucid_paddle::*;
use proptest::prelude::*;
use prost::Message;

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("LUCID_LOG").is_test(true).try_init();
}

fn feed(name: &str, col: i32) -> OpDesc {
    op("feed").input("X", &["feed"]).output("Out", &[name]).attr(Attr::int("col", col))
}

fn fetch(name: &str, col: i32) -> OpDesc {
    op("fetch").input("X", &[name]).output("Out", &["fetch"]).attr(Attr::int("col", col))
}

/// image -> conv2d -> relu -> scale (in place) -> pool2d
fn conv_program() -> ProgramDesc {
    let main = block(0, -1)
        .var(VarDesc::special("feed", Type::FeedMinibatch))
        .var(VarDesc::special("fetch", Type::FetchList))
        .var(VarDesc::tensor("image", Type::Fp32, &[-1, 3, 8, 8]))
        .var(VarDesc::tensor("conv_w", Type::Fp32, &[2, 3, 3, 3]).persistable())
        .var(VarDesc::tensor("conv_out", Type::Fp32, &[-1, 2, 8, 8]))
        .var(VarDesc::tensor("relu_out", Type::Fp32, &[-1, 2, 8, 8]))
        .var(VarDesc::tensor("pool_out", Type::Fp32, &[-1, 2, 4, 4]))
        .op(feed("image", 0))
        .op(op("conv2d")
            .input("Filter", &["conv_w"])
            .input("Input", &["image"])
            .output("Output", &["conv_out"])
            .attr(Attr::ints("strides", &[1, 1]))
            .attr(Attr::ints("paddings", &[1, 1]))
            .attr(Attr::int("groups", 1))
            .attr(Attr::string("data_format", "NCHW"))
            .attr(Attr::boolean("use_cudnn", true)))
        .op(op("relu").input("X", &["conv_out"]).output("Out", &["relu_out"]))
        .op(op("scale")
            .input("X", &["relu_out"])
            .output("Out", &["relu_out"])
            .attr(Attr::float("scale", 2.0)))
        .op(op("pool2d")
            .input("X", &["relu_out"])
            .output("Out", &["pool_out"])
            .attr(Attr::string("pooling_type", "max"))
            .attr(Attr::ints("ksize", &[2, 2])))
        .op(fetch("pool_out", 0));
    program().version(2_004_001).block(main)
}

/// x -> while(sub_block: x = x + one) -> x
fn while_program(sub_block: i32) -> ProgramDesc {
    let main = block(0, -1)
        .var(VarDesc::tensor("x", Type::Fp32, &[4]))
        .var(VarDesc::tensor("one", Type::Fp32, &[1]).persistable())
        .var(VarDesc::tensor("cond", Type::Bool, &[1]))
        .op(feed("x", 0))
        .op(op("while")
            .input("X", &["x", "one"])
            .input("Condition", &["cond"])
            .output("Out", &["x"])
            .attr(Attr::block("sub_block", sub_block)))
        .op(fetch("x", 0));
    let body = block(1, 0).op(op("elementwise_add").input("X", &["x"]).input("Y", &["one"]).output("Out", &["x"]));
    program().block(main).block(body)
}

fn decode(bytes: Vec<u8>) -> LucidResult<Model> {
    decode_with(bytes, &Cancel::default())
}

fn decode_with(bytes: Vec<u8>, cancel: &Cancel) -> LucidResult<Model> {
    setup_test_logger();
    let p = paddle();
    p.model_for_bytes(&Bytes::from(bytes), &p.metadata(), &Options::default(), cancel)
}

#[test]
fn conv_pool() {
    let model = decode(conv_program().encode_to_vec()).unwrap();
    assert_eq!(model.format(), PADDLE);
    assert_eq!(model.version(), Some("PaddlePaddle v2.4.1"));
    let g = model.main();
    let ops = g.nodes().iter().map(|n| n.op_type.as_str()).collect::<Vec<_>>();
    assert_eq!(ops, vec!["conv2d", "relu", "scale", "pool2d"]);

    let image = g.tensor_by_name("image").unwrap();
    assert_eq!(g.inputs(), &[image.id]);
    assert_eq!(image.type_string(), "float32[?,3,8,8]");
    assert_eq!(g.outputs(), &[g.tensor_by_name("pool_out").unwrap().id]);
    assert!(g.tensor_by_name("feed").is_none());

    let conv = &g.nodes()[0];
    let params = conv.inputs.iter().map(|p| p.parameter.as_deref()).collect::<Vec<_>>();
    assert_eq!(params, vec![Some("Input"), Some("Filter")]);
    let weights = g.tensor_by_name("conv_w").unwrap();
    assert!(weights.is_initializer());
    assert!(matches!(&weights.storage, Some(Storage::External { location, .. }) if location == "conv_w"));
    assert_eq!(conv.category(), Some("Layer"));
    let visible = conv.visible_attributes().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(visible, vec!["paddings"]);
    assert_eq!(conv.attribute("use_cudnn"), Some(&AttrValue::Bool(true)));

    let pool = &g.nodes()[3];
    assert_eq!(pool.attribute("pooling_type"), Some(&AttrValue::Enum { value: 0, name: "max".into() }));
    model.check_integrity().unwrap();
}

#[test]
fn in_place_writes_get_fresh_tensors() {
    let model = decode(conv_program().encode_to_vec()).unwrap();
    let g = model.main();
    let (relu, scale, pool) = (&g.nodes()[1], &g.nodes()[2], &g.nodes()[3]);
    assert_eq!(scale.inputs[0].tensor, relu.outputs[0].tensor);
    assert_ne!(scale.outputs[0].tensor, relu.outputs[0].tensor);
    assert_eq!(pool.inputs[0].tensor, scale.outputs[0].tensor);
    let rewritten = g.tensor(scale.outputs[0].tensor.unwrap()).unwrap();
    assert_eq!(rewritten.name, "relu_out_1");
    assert_eq!(rewritten.type_string(), "float32[?,2,8,8]");
}

#[test]
fn feeds_follow_columns() {
    let main = block(0, -1)
        .var(VarDesc::tensor("a", Type::Fp32, &[1]))
        .var(VarDesc::tensor("b", Type::Fp32, &[1]))
        .op(feed("a", 1))
        .op(feed("b", 0))
        .op(op("elementwise_add").input("X", &["a"]).input("Y", &["b"]).output("Out", &["c"]))
        .op(fetch("c", 0));
    let model = decode(program().block(main).encode_to_vec()).unwrap();
    let g = model.main();
    let names = g.inputs().iter().map(|t| g.tensor(*t).unwrap().name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn while_body_is_a_nested_block() {
    let model = decode(while_program(1).encode_to_vec()).unwrap();
    assert_eq!(model.graphs().len(), 2);
    let main = model.main();
    let while_op = &main.nodes()[0];
    assert_eq!(while_op.subgraphs().collect::<Vec<_>>(), vec![GraphId(1)]);
    assert_eq!(while_op.inputs[0].parameter.as_deref(), Some("X"));

    let body = model.graph(GraphId(1)).unwrap();
    assert_eq!(body.parent(), Some(GraphId(0)));
    assert_eq!(body.name(), Some("block_1"));
    let one = body.tensor_by_name("one").unwrap();
    assert!(matches!(one.kind, TensorKind::Captured { graph: GraphId(0), .. }));
    model.check_integrity().unwrap();
}

#[test]
fn dangling_block_reference() {
    let err = decode(while_program(5).encode_to_vec()).unwrap_err();
    assert!(matches!(err, LucidError::GraphIntegrity { .. }), "{err:?}");
}

#[test]
fn empty_program() {
    match decode(program().encode_to_vec()) {
        Err(LucidError::Decode(e)) => assert_eq!(e.kind, DecodeErrorKind::MissingField),
        other => panic!("{other:?}"),
    }
}

#[test]
fn not_a_protobuf() {
    assert!(matches!(decode(vec![0x0a, 0xff, 0xff, 0xff]), Err(LucidError::Decode(_))));
}

#[test]
fn cancelled() {
    let cancel = Cancel::new();
    cancel.cancel();
    let err = decode_with(conv_program().encode_to_vec(), &cancel).unwrap_err();
    assert!(matches!(err, LucidError::Cancelled), "{err:?}");
}

#[test]
fn sniffed_as_paddle() {
    let bytes = conv_program().encode_to_vec();
    let claims = [*Paddle.claim()];
    assert_eq!(sniff(&claims, &bytes, None, 4096).unwrap(), PADDLE);
    assert_eq!(sniff(&claims, b"????", Some("models/__model__"), 4096).unwrap(), PADDLE);
    assert_eq!(sniff(&claims, b"????", Some("inference.pdmodel"), 4096).unwrap(), PADDLE);
}

proptest! {
    #[test]
    fn truncation_never_panics(cut in 0usize..1024) {
        let bytes = conv_program().encode_to_vec();
        let cut = cut.min(bytes.len());
        let _ = decode(bytes[..cut].to_vec());
    }
}
