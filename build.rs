fn main() {
    // Declared so `cfg(desktop)`/`cfg(mobile)` stay valid when the Tauri build step is skipped.
    println!("cargo:rustc-check-cfg=cfg(desktop)");
    println!("cargo:rustc-check-cfg=cfg(mobile)");

    // Only the `app` feature links the Tauri runtime; the engine itself builds without it.
    if std::env::var_os("CARGO_FEATURE_APP").is_some() {
        tauri_build::build()
    }
}
