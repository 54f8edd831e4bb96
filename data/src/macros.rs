#[macro_export]
macro_rules! tvec {
    // count helper: transform any expression into 1
    (@one $x:expr) => (1usize);
    ($elem:expr; $n:expr) => ({
        $crate::TVec::from_elem($elem, $n)
    });
    ($($x:expr),*$(,)*) => ({
        let count = 0usize $(+ tvec!(@one $x))*;
        #[allow(unused_mut)]
        let mut vec = $crate::TVec::new();
        if count <= vec.inline_size() {
            $(vec.push($x);)*
            vec
        } else {
            $crate::TVec::from_vec(vec![$($x,)*])
        }
    });
}

/// Calls a generic function with the rust type matching a plain-old-data `DatumType`.
///
/// Evaluates to `None` for types without a fixed-size little-endian encoding.
#[macro_export]
macro_rules! dispatch_copy {
    ($($path:ident)::* ($dt:expr) ($($args:expr),*)) => { {
        use $crate::prelude::DatumType;
        match $dt {
            DatumType::Bool => Some($($path)::*::<bool>($($args),*)),
            DatumType::U8   => Some($($path)::*::<u8>($($args),*)),
            DatumType::U16  => Some($($path)::*::<u16>($($args),*)),
            DatumType::U32  => Some($($path)::*::<u32>($($args),*)),
            DatumType::U64  => Some($($path)::*::<u64>($($args),*)),
            DatumType::I8   => Some($($path)::*::<i8>($($args),*)),
            DatumType::I16  => Some($($path)::*::<i16>($($args),*)),
            DatumType::I32  => Some($($path)::*::<i32>($($args),*)),
            DatumType::I64  => Some($($path)::*::<i64>($($args),*)),
            DatumType::F16  => Some($($path)::*::<$crate::f16>($($args),*)),
            DatumType::F32  => Some($($path)::*::<f32>($($args),*)),
            DatumType::F64  => Some($($path)::*::<f64>($($args),*)),
            _ => None,
        }
    } }
}
