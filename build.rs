fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rustc-link-arg=-Tdefmt.x");
    // Only the on-target test binaries carry the embedded-test runtime
    println!("cargo:rustc-link-arg-tests=-Tembedded-test.x");
}
