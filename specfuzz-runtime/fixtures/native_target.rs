//! A small native target, compiled by `build.rs` for the loader tests.
//!
//! Built once as-is and once with `--cfg headerless`, which leaves out the target header.

#![allow(non_upper_case_globals)]

use std::ffi::CStr;
use std::os::raw::c_char;

macro_rules! interface {
    ($text:expr) => {
        #[no_mangle]
        pub static specfuzz_interface: [u8; $text.len()] = *$text;
        #[no_mangle]
        pub static specfuzz_interface_len: usize = $text.len();
    };
}

#[cfg(not(headerless))]
interface!(
    b"target \"fixture\" class 3 type 4 version 2.0;
      scale(int32, double)->double;
      name_length(string)->uint64;"
);

#[cfg(headerless)]
interface!(b"scale(int32, double)->double;");

#[no_mangle]
pub extern "C" fn scale(factor: i32, x: f64) -> f64 {
    f64::from(factor) * x
}

#[no_mangle]
pub extern "C" fn name_length(name: *const c_char) -> u64 {
    if name.is_null() {
        return 0;
    }
    unsafe { CStr::from_ptr(name) }.to_bytes().len() as u64
}
