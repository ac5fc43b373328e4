//! Property tests for C integer conversions.

use cwasm_driver::Compiler;
use cwasm_wasm::{HostImports, Instance};
use proptest::prelude::*;

fn instance() -> Instance {
    let source = "
        int to_uchar(int x) { unsigned char c = x; return c; }
        int to_schar(int x) { signed char c = x; return c; }
        int to_ushort(int x) { unsigned short s = x; return s; }
        int to_short(int x) { short s = x; return s; }
        int udiv(int a, int b) { return (unsigned int)a / (unsigned int)b; }
        int shift(int a) { return a >> 3; }";
    let module = Compiler::new()
        .compile_snippet(source)
        .expect("conversion functions should compile");
    module
        .instantiate(HostImports::new())
        .expect("conversion functions should instantiate")
}

#[test]
fn test_reference_conversions() {
    let mut instance = instance();
    assert_eq!(instance.invoke_i32("to_uchar", &[12345]), Ok(57));
    assert_eq!(instance.invoke_i32("to_schar", &[12345]), Ok(57));
    assert_eq!(instance.invoke_i32("to_uchar", &[-12345]), Ok(199));
}

proptest! {
    #[test]
    fn test_narrowing_matches_rust_casts(x in any::<i32>(), d in 1..i32::MAX) {
        let mut instance = instance();
        prop_assert_eq!(instance.invoke_i32("to_uchar", &[x]), Ok(x as u8 as i32));
        prop_assert_eq!(instance.invoke_i32("to_schar", &[x]), Ok(x as i8 as i32));
        prop_assert_eq!(instance.invoke_i32("to_ushort", &[x]), Ok(x as u16 as i32));
        prop_assert_eq!(instance.invoke_i32("to_short", &[x]), Ok(x as i16 as i32));
        prop_assert_eq!(instance.invoke_i32("udiv", &[x, d]), Ok((x as u32 / d as u32) as i32));
        prop_assert_eq!(instance.invoke_i32("shift", &[x]), Ok(x >> 3));
    }
}
