//! FlatBuffers table access for decoders that walk a schema by vtable slot.
//!
//! [`FlatBuffer::root`] runs the `flatbuffers` verifier over the format's root table type
//! before anything is read. Tables reached from there are read with
//! `flatbuffers::Table::get`, each slot being verified as the type it is read as, so option
//! and descriptor tables laid out by operator metadata get the same checks as the rest.
use crate::errors::{DecodeError, DecodeErrorKind, DecodeResult};
use crate::format::Format;
use crate::metadata::OpDescriptor;
use crate::raw::{RawAttr, RawAttribute};
use flatbuffers::{
    Follow, ForwardsUOffset, InvalidFlatbuffer, SimpleToVerifyInSlice, VOffsetT, Vector, Verifiable,
    Verifier, VerifierOptions,
};
use lucid_data::prelude::Datum;

/// Vtable offset of the field with schema index `index`.
pub const fn voffset(index: usize) -> VOffsetT {
    (4 + 2 * index) as VOffsetT
}

/// A table of unknown layout: only its vtable is verified.
pub struct AnyTable;

impl Verifiable for AnyTable {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?.finish();
        Ok(())
    }
}

/// An inline struct of `N` bytes.
pub struct InlineStruct<const N: usize>;

impl<const N: usize> Verifiable for InlineStruct<N> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.in_buffer::<[u8; N]>(pos)
    }
}

/// Follows to where a value lives rather than to the value.
struct Position;

impl<'a> Follow<'a> for Position {
    type Inner = usize;

    unsafe fn follow(_buf: &'a [u8], loc: usize) -> usize {
        loc
    }
}

/// Strings are read by length, so their terminator is not required.
fn verifier_options() -> VerifierOptions {
    VerifierOptions { ignore_missing_null_terminator: true, ..VerifierOptions::default() }
}

#[derive(Clone, Copy)]
pub struct FlatBuffer<'a> {
    buf: &'a [u8],
    format: Format,
}

impl<'a> FlatBuffer<'a> {
    pub fn new(buf: &'a [u8], format: Format) -> FlatBuffer<'a> {
        FlatBuffer { buf, format }
    }

    /// The four byte file identifier following the root offset.
    pub fn identifier(&self) -> Option<&'a [u8]> {
        self.buf.get(4..8)
    }

    /// Verifies the whole buffer against the root table type `R`.
    pub fn root<R: Verifiable>(&self) -> DecodeResult<Table<'a>> {
        if self.buf.len() < 8 {
            return Err(DecodeError::new(
                self.format,
                DecodeErrorKind::MalformedHeader,
                format!("{} bytes is too short for a flatbuffer header", self.buf.len()),
            ));
        }
        let opts = verifier_options();
        let mut verifier = Verifier::new(&opts, self.buf);
        <ForwardsUOffset<R>>::run_verifier(&mut verifier, 0).map_err(|e| self.invalid(e))?;
        // SAFETY: the root offset was verified above
        let loc = unsafe { <ForwardsUOffset<Position>>::follow(self.buf, 0) };
        Ok(Table { fb: *self, loc })
    }

    fn invalid(&self, e: InvalidFlatbuffer) -> DecodeError {
        let kind = match e {
            InvalidFlatbuffer::RangeOutOfBounds { .. } | InvalidFlatbuffer::SignedOffsetOutOfBounds { .. } => {
                DecodeErrorKind::Truncated
            }
            _ => DecodeErrorKind::Malformed,
        };
        DecodeError::new(self.format, kind, e.to_string())
    }

    fn verify_field<V: Verifiable>(&self, table: usize, vo: VOffsetT) -> DecodeResult<()> {
        let opts = verifier_options();
        let mut verifier = Verifier::new(&opts, self.buf);
        verifier
            .visit_table(table)
            .and_then(|t| t.visit_field::<V>("field", vo, false))
            .map(|t| {
                t.finish();
            })
            .map_err(|e| self.invalid(e))
    }
}

/// A verified table.
#[derive(Clone, Copy)]
pub struct Table<'a> {
    fb: FlatBuffer<'a>,
    loc: usize,
}

impl<'a> Table<'a> {
    /// Verifies slot `vo` as a `V`, then reads it as an `F` of the same layout.
    fn read<V: Verifiable, F: Follow<'a> + 'a>(&self, vo: VOffsetT) -> DecodeResult<Option<F::Inner>> {
        self.fb.verify_field::<V>(self.loc, vo)?;
        // SAFETY: the table and the slot were verified just above
        Ok(unsafe { flatbuffers::Table::new(self.fb.buf, self.loc).get::<F>(vo, None) })
    }

    fn child(&self, loc: usize) -> Table<'a> {
        Table { fb: self.fb, loc }
    }

    pub fn scalar<T>(&self, vo: VOffsetT, default: T) -> DecodeResult<T>
    where
        T: Follow<'a, Inner = T> + Verifiable + 'a,
    {
        Ok(self.read::<T, T>(vo)?.unwrap_or(default))
    }

    /// Scalar that is absent rather than defaulted when missing.
    pub fn opt_scalar<T>(&self, vo: VOffsetT) -> DecodeResult<Option<T>>
    where
        T: Follow<'a, Inner = T> + Verifiable + 'a,
    {
        self.read::<T, T>(vo)
    }

    pub fn str(&self, vo: VOffsetT) -> DecodeResult<Option<&'a str>> {
        self.read::<ForwardsUOffset<&str>, ForwardsUOffset<&'a str>>(vo)
    }

    pub fn table(&self, vo: VOffsetT) -> DecodeResult<Option<Table<'a>>> {
        Ok(self.read::<ForwardsUOffset<AnyTable>, ForwardsUOffset<Position>>(vo)?.map(|loc| self.child(loc)))
    }

    /// A vector of scalars.
    pub fn scalars<T>(&self, vo: VOffsetT) -> DecodeResult<Option<Vec<T>>>
    where
        T: Follow<'a, Inner = T> + SimpleToVerifyInSlice + 'a,
    {
        let v = self.read::<ForwardsUOffset<Vector<'a, T>>, ForwardsUOffset<Vector<'a, T>>>(vo)?;
        Ok(v.map(|v| v.iter().collect()))
    }

    /// The little-endian element bytes of a vector of `T`.
    pub fn vector_bytes<T>(&self, vo: VOffsetT) -> DecodeResult<Option<&'a [u8]>>
    where
        T: Follow<'a> + SimpleToVerifyInSlice + 'a,
    {
        let v = self.read::<ForwardsUOffset<Vector<'a, T>>, ForwardsUOffset<Vector<'a, T>>>(vo)?;
        Ok(v.map(|v| v.bytes()))
    }

    pub fn tables(&self, vo: VOffsetT) -> DecodeResult<Option<Vec<Table<'a>>>> {
        let v = self.read::<
            ForwardsUOffset<Vector<'a, ForwardsUOffset<AnyTable>>>,
            ForwardsUOffset<Vector<'a, ForwardsUOffset<Position>>>,
        >(vo)?;
        Ok(v.map(|v| v.iter().map(|loc| self.child(loc)).collect()))
    }

    pub fn strs(&self, vo: VOffsetT) -> DecodeResult<Option<Vec<&'a str>>> {
        let v = self.read::<
            ForwardsUOffset<Vector<'a, ForwardsUOffset<&str>>>,
            ForwardsUOffset<Vector<'a, ForwardsUOffset<&'a str>>>,
        >(vo)?;
        Ok(v.map(|v| v.iter().collect()))
    }

    /// Inline struct bytes.
    pub fn struct_bytes<const N: usize>(&self, vo: VOffsetT) -> DecodeResult<Option<&'a [u8]>> {
        Ok(self.read::<InlineStruct<N>, Position>(vo)?.and_then(|pos| self.fb.buf.get(pos..pos + N)))
    }

    /// A union: its type tag at `type_vo` and its table at `value_vo`.
    pub fn union(&self, type_vo: VOffsetT, value_vo: VOffsetT) -> DecodeResult<Option<(u8, Table<'a>)>> {
        let tag = self.scalar::<u8>(type_vo, 0)?;
        if tag == 0 {
            return Ok(None);
        }
        Ok(self.table(value_vo)?.map(|t| (tag, t)))
    }
}

/// Little-endian field of an inline struct.
pub fn struct_field<T: Datum>(bytes: &[u8], offset: usize) -> Option<T> {
    bytes.get(offset..offset + std::mem::size_of::<T>()).map(T::read_le)
}

fn ints<T: Into<i64>>(v: Vec<T>) -> RawAttr {
    RawAttr::Ints(v.into_iter().map(Into::into).collect())
}

/// Reads the fields of an options table the way an operator schema lays them out.
///
/// Fields are found by their `field` index. Absent scalars take the schema default, or zero.
pub fn schema_attributes(table: &Table, descriptor: &OpDescriptor) -> DecodeResult<Vec<RawAttribute>> {
    let mut attributes = vec![];
    for (field, schema) in descriptor.flat_fields() {
        let vo = voffset(field);
        let ty = schema.datum_type.as_deref().unwrap_or("");
        let default = schema.default.as_ref().and_then(|d| d.as_f64().or(d.as_bool().map(|b| b as u8 as f64)));
        let default = default.unwrap_or(0.0);
        let value = match ty {
            "boolean" => RawAttr::Bool(table.scalar::<u8>(vo, default as u8)? != 0),
            "int8" => RawAttr::Int(table.scalar::<i8>(vo, default as i8)? as i64),
            "uint8" => RawAttr::Int(table.scalar::<u8>(vo, default as u8)? as i64),
            "int16" => RawAttr::Int(table.scalar::<i16>(vo, default as i16)? as i64),
            "uint16" => RawAttr::Int(table.scalar::<u16>(vo, default as u16)? as i64),
            "int32" => RawAttr::Int(table.scalar::<i32>(vo, default as i32)? as i64),
            "uint32" => RawAttr::Int(table.scalar::<u32>(vo, default as u32)? as i64),
            "int64" => RawAttr::Int(table.scalar::<i64>(vo, default as i64)?),
            "uint64" => RawAttr::Int(table.scalar::<u64>(vo, default as u64)? as i64),
            "float32" => RawAttr::Float(table.scalar::<f32>(vo, default as f32)? as f64),
            "float64" => RawAttr::Float(table.scalar::<f64>(vo, default)?),
            "string" => match table.str(vo)? {
                Some(s) => RawAttr::String(s.to_string()),
                None => continue,
            },
            list if list.ends_with("[]") => {
                let value = match &list[..list.len() - 2] {
                    "boolean" => table.scalars::<u8>(vo)?.map(|v| RawAttr::Bools(v.into_iter().map(|b| b != 0).collect())),
                    "int8" => table.scalars::<i8>(vo)?.map(ints),
                    "uint8" => table.scalars::<u8>(vo)?.map(ints),
                    "int16" => table.scalars::<i16>(vo)?.map(ints),
                    "int32" => table.scalars::<i32>(vo)?.map(ints),
                    "uint32" => table.scalars::<u32>(vo)?.map(ints),
                    "int64" => table.scalars::<i64>(vo)?.map(RawAttr::Ints),
                    "float32" => {
                        table.scalars::<f32>(vo)?.map(|v| RawAttr::Floats(v.into_iter().map(f64::from).collect()))
                    }
                    "float64" => table.scalars::<f64>(vo)?.map(RawAttr::Floats),
                    "string" => table.strs(vo)?.map(|v| RawAttr::Strings(v.into_iter().map(String::from).collect())),
                    _ => None,
                };
                match value {
                    Some(value) => value,
                    None => continue,
                }
            }
            other => {
                trace!("Skipping field {} of unhandled type {other:?}", schema.name);
                continue;
            }
        };
        attributes.push(RawAttribute::new(schema.name.clone(), value));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatbuffers::{FlatBufferBuilder, WIPOffset};

    const FMT: Format = Format::new("flat", "Flat");

    fn sample() -> Vec<u8> {
        let mut b = FlatBufferBuilder::new();
        let name = b.create_string("conv");
        let dims = b.create_vector(&[1i32, 3, 224, 224]);
        let child_name = b.create_string("child");
        let child = b.start_table();
        b.push_slot_always::<WIPOffset<_>>(voffset(0), child_name);
        let child = b.end_table(child);
        let children = b.create_vector(&[child, child]);
        let root = b.start_table();
        b.push_slot::<i32>(voffset(0), 7, 0);
        b.push_slot_always::<WIPOffset<_>>(voffset(1), name);
        b.push_slot_always::<WIPOffset<_>>(voffset(2), dims);
        b.push_slot_always::<WIPOffset<_>>(voffset(3), children);
        b.push_slot::<f32>(voffset(4), 0.5, 0.0);
        b.push_slot::<u64>(voffset(5), (2u64 << 32) | 9, 0);
        let root = b.end_table(root);
        b.finish(root, Some("TEST"));
        b.finished_data().to_vec()
    }

    /// Root of `sample`, with its fields typed.
    struct Sample;

    impl Verifiable for Sample {
        fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
            v.visit_table(pos)?
                .visit_field::<i32>("code", voffset(0), false)?
                .visit_field::<ForwardsUOffset<&str>>("name", voffset(1), true)?
                .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("dims", voffset(2), false)?
                .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<AnyTable>>>>("children", voffset(3), false)?
                .visit_field::<f32>("ratio", voffset(4), false)?
                .finish();
            Ok(())
        }
    }

    #[test]
    fn reads_fields() {
        let buf = sample();
        let fb = FlatBuffer::new(&buf, FMT);
        assert_eq!(fb.identifier(), Some(&b"TEST"[..]));
        let root = fb.root::<Sample>().unwrap();
        assert_eq!(root.scalar::<i32>(voffset(0), 0).unwrap(), 7);
        assert_eq!(root.str(voffset(1)).unwrap(), Some("conv"));
        assert_eq!(root.scalars::<i32>(voffset(2)).unwrap(), Some(vec![1, 3, 224, 224]));
        assert_eq!(root.vector_bytes::<i32>(voffset(2)).unwrap().map(|b| b.len()), Some(16));
        let children = root.tables(voffset(3)).unwrap().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].str(voffset(0)).unwrap(), Some("child"));
        assert_eq!(root.scalar::<f32>(voffset(4), 0.0).unwrap(), 0.5);
        let pair = root.struct_bytes::<8>(voffset(5)).unwrap().unwrap();
        assert_eq!(struct_field::<u32>(pair, 0), Some(9));
        assert_eq!(struct_field::<u32>(pair, 4), Some(2));
    }

    #[test]
    fn absent_fields_default() {
        let buf = sample();
        let root = FlatBuffer::new(&buf, FMT).root::<AnyTable>().unwrap();
        assert_eq!(root.scalar::<i32>(voffset(12), 42).unwrap(), 42);
        assert_eq!(root.opt_scalar::<i32>(voffset(12)).unwrap(), None);
        assert_eq!(root.str(voffset(12)).unwrap(), None);
        assert_eq!(root.tables(voffset(12)).unwrap().map(|t| t.len()), None);
        assert!(root.union(voffset(12), voffset(13)).unwrap().is_none());
    }

    #[test]
    fn slots_are_verified_as_read() {
        let mut b = FlatBufferBuilder::new();
        let root = b.start_table();
        b.push_slot_always::<u32>(voffset(0), 1_000_000);
        let root = b.end_table(root);
        b.finish(root, None);
        let buf = b.finished_data().to_vec();
        let root = FlatBuffer::new(&buf, FMT).root::<AnyTable>().unwrap();
        assert_eq!(root.scalar::<u32>(voffset(0), 0).unwrap(), 1_000_000);
        // the same slot followed as an offset points past the end
        let err = root.str(voffset(0)).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Truncated);
        assert!(root.tables(voffset(0)).is_err());
    }

    #[test]
    fn root_schema_is_verified() {
        let mut b = FlatBufferBuilder::new();
        let root = b.start_table();
        b.push_slot::<i32>(voffset(0), 7, 0);
        let root = b.end_table(root);
        b.finish(root, Some("TEST"));
        let buf = b.finished_data().to_vec();
        assert!(FlatBuffer::new(&buf, FMT).root::<AnyTable>().is_ok());
        let err = FlatBuffer::new(&buf, FMT).root::<Sample>().err().unwrap();
        assert_eq!(err.kind, DecodeErrorKind::Malformed);
    }

    #[test]
    fn truncation_never_panics() {
        let buf = sample();
        for len in 0..buf.len() {
            let fb = FlatBuffer::new(&buf[..len], FMT);
            let walk = || -> DecodeResult<()> {
                let root = fb.root::<Sample>()?;
                root.str(voffset(1))?;
                for t in root.tables(voffset(3))?.unwrap_or_default() {
                    t.str(voffset(0))?;
                }
                root.scalars::<i32>(voffset(2))?;
                Ok(())
            };
            if let Err(e) = walk() {
                assert_ne!(e.kind, DecodeErrorKind::MissingField);
            }
        }
        let err = FlatBuffer::new(&buf[..6], FMT).root::<AnyTable>().err().unwrap();
        assert_eq!(err.kind, DecodeErrorKind::MalformedHeader);
    }

    #[test]
    fn options_through_schema() {
        let op: OpDescriptor = serde_json::from_str(
            r#"{ "name": "Conv", "attributes": [
                { "name": "code", "type": "int32", "field": 0 },
                { "name": "label", "type": "string", "field": 1 },
                { "name": "dims", "type": "int32[]", "field": 2 },
                { "name": "dilation", "type": "int32", "field": 6, "default": 1 },
                { "name": "unplaced", "type": "int32" } ] }"#,
        )
        .unwrap();
        let buf = sample();
        let root = FlatBuffer::new(&buf, FMT).root::<AnyTable>().unwrap();
        let attrs = schema_attributes(&root, &op).unwrap();
        assert_eq!(
            attrs,
            vec![
                RawAttribute::new("code", RawAttr::Int(7)),
                RawAttribute::new("label", RawAttr::String("conv".into())),
                RawAttribute::new("dims", RawAttr::Ints(vec![1, 3, 224, 224])),
                RawAttribute::new("dilation", RawAttr::Int(1)),
            ]
        );
    }
}
