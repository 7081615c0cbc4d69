// The ISPC kernels bundled by `intel_tex_2` contain C++ objects; link the
// C++ runtime so the binaries resolve `__gxx_personality_v0`.
fn main() {
    let target = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target == "linux" {
        println!("cargo:rustc-link-lib=stdc++");
    }
}
