//! Lowering of type expressions to native descriptors.

use std::ffi::{c_int, c_long};
use std::mem::size_of;

use crate::native::{CValue, NativeType};
use crate::tests::natural_space;

#[test]
fn primitives_get_host_widths() {
    let mut space = natural_space();

    let int = space.gettype("int").unwrap();
    assert_eq!(
        int.kind(),
        NativeType::Int {
            bits: (size_of::<c_int>() * 8) as u8,
            signed: true,
        }
    );

    let ulong = space.gettype("unsigned long").unwrap();
    assert_eq!(
        ulong.kind(),
        NativeType::Int {
            bits: (size_of::<c_long>() * 8) as u8,
            signed: false,
        }
    );

    let size_t = space.gettype("size_t").unwrap();
    assert_eq!(
        size_t.kind(),
        NativeType::Int {
            bits: (size_of::<usize>() * 8) as u8,
            signed: false,
        }
    );

    assert_eq!(
        space.gettype("double").unwrap().kind(),
        NativeType::Float { bytes: 8 }
    );
}

#[test]
fn unknown_type_names_are_rejected() {
    let mut space = natural_space();
    assert!(space.gettype("frobnicator_t").is_err());
}

#[test]
fn const_pointee_makes_a_read_only_pointer() {
    let mut space = natural_space();

    let plain = space.gettype("char *").unwrap();
    let frozen = space.gettype("const char *").unwrap();
    assert_ne!(plain, frozen);

    let NativeType::ArrayPtr { elem, read_only } = plain.kind() else {
        panic!("expected an array pointer, got {:?}", plain.kind());
    };
    assert!(!read_only);
    assert!(matches!(elem.kind(), NativeType::Int { bits: 8, .. }));

    let NativeType::ArrayPtr { read_only, .. } = frozen.kind() else {
        panic!("expected an array pointer, got {:?}", frozen.kind());
    };
    assert!(read_only);
}

#[test]
fn void_pointer_is_generic() {
    let mut space = natural_space();
    assert_eq!(space.gettype("void *").unwrap().kind(), NativeType::VoidPtr);
}

#[test]
fn fixed_arrays_keep_their_length() {
    let mut space = natural_space();
    let ty = space.gettype("int[8]").unwrap();
    let NativeType::FixedArray { elem, len } = ty.kind() else {
        panic!("expected a fixed array, got {:?}", ty.kind());
    };
    assert_eq!(len, 8);
    assert!(matches!(elem.kind(), NativeType::Int { signed: true, .. }));

    // A pointer to a fixed array is an exact pointer, not an array pointer.
    let ptr = space.gettype("int(*)[8]").unwrap();
    assert!(matches!(ptr.kind(), NativeType::Ptr(t) if t == ty));
}

#[test]
fn function_pointers_lower_to_signatures() {
    let mut space = natural_space();
    let ty = space.gettype("int (*)(const char *, long)").unwrap();
    let NativeType::Ptr(func) = ty.kind() else {
        panic!("expected a pointer, got {:?}", ty.kind());
    };
    let NativeType::Func { args, result } = func.kind() else {
        panic!("expected a signature, got {:?}", func.kind());
    };
    assert_eq!(args.len(), 2);
    assert!(matches!(args[0].kind(), NativeType::ArrayPtr { read_only: true, .. }));
    assert!(matches!(result.kind(), NativeType::Int { signed: true, .. }));
}

#[test]
fn file_is_an_opaque_stream() {
    let mut space = natural_space();
    let ty = space.gettype("FILE *").unwrap();
    let NativeType::Ptr(stream) = ty.kind() else {
        panic!("expected a pointer, got {:?}", ty.kind());
    };
    assert_eq!(stream.kind(), NativeType::FileStream);
}

#[test]
fn io_file_alias_reaches_the_same_stream() {
    let mut space = natural_space();
    space
        .parse_source("typedef struct _IO_FILE FILE;")
        .unwrap();
    let ty = space.gettype("FILE *").unwrap();
    assert!(matches!(
        ty.kind(),
        NativeType::Ptr(t) if t.kind() == NativeType::FileStream
    ));
}

#[test]
fn gettype_memoizes_on_the_expression_text() {
    let mut space = natural_space();
    let a = space.gettype("const char *").unwrap();
    let b = space.gettype("const char *").unwrap();
    assert_eq!(a, b);

    let stats = space.stats();
    assert_eq!(stats.type_parses, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[test]
fn cast_behaves_like_a_c_cast() {
    let mut space = natural_space();
    assert_eq!(
        space.cast("unsigned char", CValue::Int(-1)).unwrap(),
        CValue::UInt(255)
    );
    assert_eq!(
        space.cast("signed char", CValue::UInt(0x1ff)).unwrap(),
        CValue::Int(-1)
    );
    assert_eq!(
        space.cast("double", CValue::Int(2)).unwrap(),
        CValue::Float(2.0)
    );
    assert_eq!(
        space.cast("char *", CValue::UInt(0x1000)).unwrap(),
        CValue::Ptr(0x1000)
    );
}

#[test]
fn variadic_function_pointers_are_rejected() {
    let mut space = natural_space();
    let err = space
        .parse_source("typedef int (*logger_fn)(const char *, ...);")
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Lower(crate::lower::LowerError::VariadicFunctionPointer)
    ));
}
