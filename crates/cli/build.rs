fn main() {
    let optional = [("pdfium", cfg!(feature = "pdfium")), ("ocr", cfg!(feature = "ocr"))];
    let mut enabled = vec!["text-layer"];
    enabled.extend(optional.iter().filter(|(_, on)| *on).map(|(name, _)| *name));
    println!("cargo:rustc-env=FINQA_FEATURES={}", enabled.join(", "));
    println!("cargo:rerun-if-changed=build.rs");
}
