use crate::pb::tensor_proto::{DataLocation, DataType};
use crate::pb::tensor_shape_proto::dimension;
use crate::pb::*;
use byteorder::{ByteOrder, LittleEndian};
use lucid_core::internal::*;

pub fn datum_type(t: i32) -> Option<DatumType> {
    let dt = match DataType::from_i32(t)? {
        DataType::Bool => DatumType::Bool,
        DataType::Uint8 => DatumType::U8,
        DataType::Uint16 => DatumType::U16,
        DataType::Uint32 => DatumType::U32,
        DataType::Uint64 => DatumType::U64,
        DataType::Int4 => DatumType::I4,
        DataType::Int8 => DatumType::I8,
        DataType::Int16 => DatumType::I16,
        DataType::Int32 => DatumType::I32,
        DataType::Int64 => DatumType::I64,
        DataType::Float16 => DatumType::F16,
        DataType::Bfloat16 => DatumType::BF16,
        DataType::Float => DatumType::F32,
        DataType::Double => DatumType::F64,
        DataType::Complex64 => DatumType::C64,
        DataType::Complex128 => DatumType::C128,
        DataType::String => DatumType::String,
        _ => return None,
    };
    Some(dt)
}

pub fn shape(proto: &TensorShapeProto) -> Shape {
    proto
        .dim
        .iter()
        .map(|d| match &d.value {
            Some(dimension::Value::DimValue(v)) => Dim::from_signed(*v),
            Some(dimension::Value::DimParam(p)) if !p.is_empty() => Dim::sym(p),
            _ => Dim::Unknown,
        })
        .collect()
}

/// Element type and shape of a value. Sequences and optionals report their element.
pub fn type_and_shape(t: &TypeProto) -> (Option<DatumType>, Option<Shape>) {
    use crate::pb::type_proto::Value;
    match &t.value {
        Some(Value::TensorType(t)) | Some(Value::SparseTensorType(t)) => {
            (datum_type(t.elem_type), t.shape.as_ref().map(shape))
        }
        Some(Value::SequenceType(w)) | Some(Value::OptionalType(w)) => {
            w.elem_type.as_deref().map(type_and_shape).unwrap_or((None, None))
        }
        None => (None, None),
    }
}

pub fn value_info(info: &ValueInfoProto) -> RawValue {
    let (datum_type, shape) = info.r#type.as_ref().map(type_and_shape).unwrap_or((None, None));
    RawValue { datum_type, shape, ..RawValue::named(&info.name) }
}

fn external(t: &TensorProto) -> DecodeResult<Storage> {
    let entry = |key: &str| t.external_data.iter().find(|e| e.key == key).map(|e| e.value.as_str());
    let number = |key: &str| -> DecodeResult<Option<u64>> {
        entry(key)
            .map(|v| {
                v.parse().map_err(|_| {
                    DecodeError::malformed(crate::ONNX, format!("external data {key} {v:?} of {:?}", t.name))
                })
            })
            .transpose()
    };
    let location = entry("location")
        .ok_or_else(|| DecodeError::missing(crate::ONNX, format!("external data location of {:?}", t.name)))?;
    Ok(Storage::External { location: location.to_string(), offset: number("offset")?, length: number("length")? })
}

/// Typed `*_data` fields, packed the way `raw_data` would hold them.
fn packed(t: &TensorProto, dt: DatumType) -> Option<Storage> {
    let bytes: Vec<u8> = match dt {
        DatumType::String => {
            return Some(Storage::Strings(t.string_data.iter().map(|s| Blob(s.clone())).collect()));
        }
        DatumType::F32 | DatumType::C64 => {
            let mut v = vec![0; 4 * t.float_data.len()];
            LittleEndian::write_f32_into(&t.float_data, &mut v);
            v
        }
        DatumType::F64 | DatumType::C128 => {
            let mut v = vec![0; 8 * t.double_data.len()];
            LittleEndian::write_f64_into(&t.double_data, &mut v);
            v
        }
        DatumType::I64 => {
            let mut v = vec![0; 8 * t.int64_data.len()];
            LittleEndian::write_i64_into(&t.int64_data, &mut v);
            v
        }
        DatumType::U64 => {
            let mut v = vec![0; 8 * t.uint64_data.len()];
            LittleEndian::write_u64_into(&t.uint64_data, &mut v);
            v
        }
        DatumType::U32 => {
            let narrowed = t.uint64_data.iter().map(|x| *x as u32).collect::<Vec<_>>();
            let mut v = vec![0; 4 * narrowed.len()];
            LittleEndian::write_u32_into(&narrowed, &mut v);
            v
        }
        DatumType::I32 => {
            let mut v = vec![0; 4 * t.int32_data.len()];
            LittleEndian::write_i32_into(&t.int32_data, &mut v);
            v
        }
        DatumType::F16 | DatumType::BF16 | DatumType::U16 | DatumType::I16 => {
            let narrowed = t.int32_data.iter().map(|x| *x as u16).collect::<Vec<_>>();
            let mut v = vec![0; 2 * narrowed.len()];
            LittleEndian::write_u16_into(&narrowed, &mut v);
            v
        }
        DatumType::Bool | DatumType::U8 | DatumType::I8 | DatumType::I4 => {
            t.int32_data.iter().map(|x| *x as u8).collect()
        }
        _ => return None,
    };
    if bytes.is_empty() { None } else { Some(Storage::raw(bytes)) }
}

/// Declares a tensor proto as a value: type, shape and storage.
pub fn raw_value(t: &TensorProto) -> DecodeResult<RawValue> {
    let datum_type = datum_type(t.data_type);
    let storage = if t.data_location == Some(DataLocation::External as i32) {
        Some(external(t)?)
    } else if !t.raw_data.is_empty() {
        Some(Storage::Raw(t.raw_data.clone()))
    } else {
        datum_type.and_then(|dt| packed(t, dt))
    };
    let name = (!t.name.is_empty()).then(|| t.name.clone());
    Ok(RawValue {
        name,
        datum_type,
        shape: Some(Shape::from_signed(t.dims.iter().copied())),
        // an initializer without data still is one
        storage: storage.or_else(|| Some(Storage::raw(Bytes::new()))),
        quantization: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_fields_become_little_endian() {
        let t = TensorProto {
            dims: vec![2],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, -2.5],
            name: "w".into(),
            ..TensorProto::default()
        };
        let v = raw_value(&t).unwrap();
        assert_eq!(v.name.as_deref(), Some("w"));
        assert_eq!(v.datum_type, Some(DatumType::F32));
        assert_eq!(v.storage.unwrap().values::<f32>(10), Some(vec![1.0, -2.5]));
    }

    #[test]
    fn narrow_types_from_int32_data() {
        let t = TensorProto {
            dims: vec![3],
            data_type: DataType::Int8 as i32,
            int32_data: vec![-1, 0, 7],
            ..TensorProto::default()
        };
        let v = raw_value(&t).unwrap();
        assert_eq!(v.storage.unwrap().values::<i8>(10), Some(vec![-1, 0, 7]));
    }

    #[test]
    fn raw_data_is_shared() {
        let data = Bytes::from_static(&[1, 0, 0, 0, 2, 0, 0, 0]);
        let t = TensorProto {
            dims: vec![2],
            data_type: DataType::Int32 as i32,
            raw_data: data.clone(),
            ..TensorProto::default()
        };
        let storage = raw_value(&t).unwrap().storage.unwrap();
        assert_eq!(storage.as_bytes().map(|b| b.as_ptr()), Some(data.as_ptr()));
    }

    #[test]
    fn external_data() {
        let entry = |k: &str, v: &str| StringStringEntryProto { key: k.into(), value: v.into() };
        let mut t = TensorProto {
            data_type: DataType::Float as i32,
            data_location: Some(DataLocation::External as i32),
            external_data: vec![entry("location", "weights.bin"), entry("offset", "128")],
            ..TensorProto::default()
        };
        assert_eq!(
            raw_value(&t).unwrap().storage,
            Some(Storage::External { location: "weights.bin".into(), offset: Some(128), length: None })
        );
        t.external_data[1].value = "lots".into();
        assert!(raw_value(&t).is_err());
    }

    #[test]
    fn symbolic_dims() {
        let proto = TensorShapeProto {
            dim: vec![
                tensor_shape_proto::Dimension { value: Some(dimension::Value::DimParam("N".into())), ..Default::default() },
                tensor_shape_proto::Dimension { value: Some(dimension::Value::DimValue(3)), ..Default::default() },
                tensor_shape_proto::Dimension::default(),
            ],
        };
        assert_eq!(shape(&proto).to_string(), "[N,3,?]");
    }
}
