// build.rs

fn main() {
    // --- Link against X11 and Xft ---
    // pkg-config is the standard way to find linking information on
    // Unix-like systems; fall back to bare linker flags when it is not
    // available or the .pc files are missing.
    let libraries = ["x11", "xft"];

    let mut pkg_config_success = true;

    for lib in &libraries {
        if pkg_config::probe_library(lib).is_err() {
            eprintln!(
                "pkg-config failed for library '{}'. Falling back to manual linking.",
                lib
            );
            pkg_config_success = false;
            break;
        }
    }

    if !pkg_config_success {
        println!("cargo:rustc-link-lib=X11");
        println!("cargo:rustc-link-lib=Xft");
        println!("cargo:rustc-link-search=/usr/lib");
        eprintln!("Manual linking flags applied. Ensure X11 and Xft development libraries are installed.");
    }

    // The external Hugo engine library, only when the adapter is enabled.
    if std::env::var_os("CARGO_FEATURE_HUGO_ENGINE").is_some() {
        println!("cargo:rustc-link-lib=hugo");
    }
}
