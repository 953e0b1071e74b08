use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    // TODO: the fixtures are only needed for tests, but Cargo doesn't
    // currently let you specify different build.rs options for tests:
    // <https://github.com/rust-lang/cargo/issues/1581>
    println!("cargo:rerun-if-changed=fixtures/native_target.rs");
    let native = env::var("CARGO_CFG_TARGET_ARCH").map_or(false, |arch| arch == "x86_64")
        && env::var("CARGO_CFG_TARGET_FAMILY").map_or(false, |family| family == "unix");
    if !native {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_owned());
    let target = env::var("TARGET").unwrap();
    let source = manifest_dir.join("fixtures").join("native_target.rs");

    for &(name, cfg) in &[
        ("native_target", None),
        ("headerless_target", Some("headerless")),
    ] {
        let output = out_dir.join(format!("lib{}.so", name));
        let mut cmd = Command::new(&rustc);
        cmd.args(&["--edition", "2018", "--crate-type", "cdylib"])
            .args(&["--crate-name", name, "--target", &target])
            .arg("-o")
            .arg(&output);
        if let Some(cfg) = cfg {
            cmd.args(&["--cfg", cfg]);
        }
        let status = cmd.arg(&source).status().expect("run rustc");
        assert!(status.success(), "building fixture `{}` failed", name);
        println!(
            "cargo:rustc-env=SPECFUZZ_{}={}",
            name.to_uppercase(),
            output.display()
        );
    }
}
