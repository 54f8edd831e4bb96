//! The trait every format decoder implements.
use crate::cancel::Cancel;
use crate::errors::LucidResult;
use crate::format::Format;
use crate::metadata::FormatMetadata;
use crate::model::Model;
use crate::options::Options;
use crate::raw::RawModel;
use crate::sniff::Claim;
use bytes::Bytes;
use std::fmt::Debug;
use std::io::Read;
use std::path::Path;

/// What a proto model may look at while lowering itself to a [`RawModel`].
#[derive(Clone, Copy, Debug, new)]
pub struct LowerContext<'a> {
    pub metadata: &'a FormatMetadata,
    pub options: &'a Options,
    pub cancel: &'a Cancel,
}

/// A parsed, format-specific model, before lowering.
pub trait ProtoModel: Debug + Send + Sync {
    fn lower(&self, ctx: &LowerContext) -> LucidResult<RawModel>;
}

/// A model format: how to recognize it, parse it and lower it.
pub trait Framework: Send + Sync {
    type ProtoModel: ProtoModel;

    fn format(&self) -> Format {
        self.claim().format
    }

    /// Magic bytes and file names this format is recognized by.
    fn claim(&self) -> &'static Claim;

    /// Operator metadata JSON shipped with the decoder.
    fn bundled_metadata(&self) -> Option<&'static str> {
        None
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, options: &Options) -> LucidResult<Self::ProtoModel>;

    fn proto_model_for_read(&self, r: &mut dyn Read, options: &Options) -> LucidResult<Self::ProtoModel> {
        let mut v = vec![];
        r.read_to_end(&mut v)?;
        self.proto_model_for_bytes(&Bytes::from(v), options)
    }

    fn model_for_proto_model(
        &self,
        proto: &Self::ProtoModel,
        metadata: &FormatMetadata,
        options: &Options,
        cancel: &Cancel,
    ) -> LucidResult<Model> {
        cancel.check()?;
        let raw = proto.lower(&LowerContext::new(metadata, options, cancel))?;
        crate::builder::build(raw, metadata, options, cancel)
    }

    fn model_for_bytes(
        &self,
        bytes: &Bytes,
        metadata: &FormatMetadata,
        options: &Options,
        cancel: &Cancel,
    ) -> LucidResult<Model> {
        cancel.check()?;
        let proto = self.proto_model_for_bytes(bytes, options)?;
        debug!("Parsed {} proto model ({} bytes)", self.format(), bytes.len());
        self.model_for_proto_model(&proto, metadata, options, cancel)
    }

    fn model_for_path(
        &self,
        path: impl AsRef<Path>,
        metadata: &FormatMetadata,
        options: &Options,
    ) -> LucidResult<Model>
    where
        Self: Sized,
    {
        let mut f = std::fs::File::open(path.as_ref())?;
        let proto = self.proto_model_for_read(&mut f, options)?;
        self.model_for_proto_model(&proto, metadata, options, &Cancel::default())
    }
}

/// Object-safe view of a [`Framework`], for registries holding decoders of several formats.
pub trait Decoder: Send + Sync {
    fn sniff_claim(&self) -> &'static Claim;

    fn metadata_table(&self) -> Option<&'static str>;

    fn decode(
        &self,
        bytes: &Bytes,
        metadata: &FormatMetadata,
        options: &Options,
        cancel: &Cancel,
    ) -> LucidResult<Model>;
}

impl<F: Framework> Decoder for F {
    fn sniff_claim(&self) -> &'static Claim {
        self.claim()
    }

    fn metadata_table(&self) -> Option<&'static str> {
        self.bundled_metadata()
    }

    fn decode(
        &self,
        bytes: &Bytes,
        metadata: &FormatMetadata,
        options: &Options,
        cancel: &Cancel,
    ) -> LucidResult<Model> {
        self.model_for_bytes(bytes, metadata, options, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LucidError;
    use crate::raw::*;
    use crate::sniff::{Signature, Token};

    const FMT: Format = Format::new("toy", "Toy");
    static CLAIM: Claim = Claim {
        format: FMT,
        signatures: &[Signature::At { offset: 0, tokens: &[Token::Byte(b'T'), Token::Byte(b'O')] }],
        extensions: &["toy"],
        filenames: &[],
    };

    /// One node per byte after the magic.
    #[derive(Debug)]
    struct ToyProto(Vec<u8>);

    impl ProtoModel for ToyProto {
        fn lower(&self, ctx: &LowerContext) -> LucidResult<RawModel> {
            let mut graph = RawGraph::default();
            let mut prev = ValueRef::named("in");
            graph.inputs.push(prev.clone());
            for (ix, b) in self.0.iter().enumerate() {
                ctx.cancel.check()?;
                let out = ValueRef::named(format!("v{ix}"));
                graph.nodes.push(RawNode {
                    op_type: format!("Op{b}"),
                    inputs: vec![RawPort::of(prev)],
                    outputs: vec![RawPort::of(out.clone())],
                    ..RawNode::default()
                });
                prev = out;
            }
            graph.outputs.push(prev);
            Ok(RawModel { graphs: vec![graph], ..RawModel::new(FMT) })
        }
    }

    struct Toy;

    impl Framework for Toy {
        type ProtoModel = ToyProto;

        fn claim(&self) -> &'static Claim {
            &CLAIM
        }

        fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<ToyProto> {
            match bytes.strip_prefix(b"TO") {
                Some(rest) => Ok(ToyProto(rest.to_vec())),
                None => Err(crate::errors::DecodeError::missing(FMT, "magic").into()),
            }
        }
    }

    #[test]
    fn decode_through_trait_object() {
        let decoders: Vec<Box<dyn Decoder>> = vec![Box::new(Toy)];
        let metadata = FormatMetadata::empty(FMT);
        let model = decoders[0]
            .decode(&Bytes::from_static(b"TO\x01\x02"), &metadata, &Options::default(), &Cancel::default())
            .unwrap();
        assert_eq!(model.format(), FMT);
        assert_eq!(model.main().nodes().len(), 2);
        assert_eq!(decoders[0].sniff_claim().format, FMT);
        assert!(decoders[0].metadata_table().is_none());
    }

    #[test]
    fn read_and_cancel() {
        let metadata = FormatMetadata::empty(FMT);
        let proto = Toy.proto_model_for_read(&mut &b"TO\x05"[..], &Options::default()).unwrap();
        assert_eq!(proto.0, vec![5]);
        let cancel = Cancel::new();
        cancel.cancel();
        let err = Toy.model_for_proto_model(&proto, &metadata, &Options::default(), &cancel).unwrap_err();
        assert_eq!(err, LucidError::Cancelled);
        assert!(Toy.model_for_bytes(&Bytes::from_static(b"XX"), &metadata, &Options::default(), &Cancel::new()).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let metadata = FormatMetadata::empty(FMT);
        let err = Toy.model_for_path("/nonexistent/model.toy", &metadata, &Options::default()).unwrap_err();
        match err {
            LucidError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected an io error, got {other:?}"),
        }
    }

    #[test]
    fn failing_reader_is_an_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let err = Toy.proto_model_for_read(&mut Broken, &Options::default()).unwrap_err();
        assert!(matches!(err, LucidError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset));
    }
}
