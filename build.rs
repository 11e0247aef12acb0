use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Pure-Rust builds (simulated bus, embedded-hal adapter) need no native libraries
    if env::var_os("CARGO_FEATURE_FTDI").is_none() {
        return;
    }

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let project_root = PathBuf::from(&manifest_dir);

    // The FTDI driver bundles live next to the crate
    let shared_root = project_root.parent().unwrap_or(&project_root);

    // Path to MPSSE DLL (Win32/32-bit)
    let mpsse_lib_path = shared_root.join("FTDI MPSSE").join("build").join("Win32").join("DLL");

    // Path to D2XX DLL
    let d2xx_lib_path = shared_root.join("FTDI-D2XX-Drivers-Win-2.12.36.20U").join("x86");

    println!("cargo:rustc-link-search=native={}", mpsse_lib_path.display());
    println!("cargo:rustc-link-search=native={}", d2xx_lib_path.display());

    // libmpsse.dll depends on FTD2XX.dll, which is loaded at runtime
    println!("cargo:rustc-link-lib=dylib=libmpsse");

    println!("cargo:rerun-if-changed=../FTDI MPSSE/build/Win32/DLL/libmpsse.dll");
    println!("cargo:rerun-if-changed=../FTDI-D2XX-Drivers-Win-2.12.36.20U/x86/FTD2XX.dll");

    // Copy runtime DLLs next to the executables
    if let Ok(profile) = env::var("PROFILE") {
        let target_dir = project_root
            .join("target")
            .join("i686-pc-windows-msvc")
            .join(&profile);

        // Only copy if target directory exists (i.e., during actual build, not just script check)
        if target_dir.exists() {
            let mpsse_dll_src = mpsse_lib_path.join("libmpsse.dll");
            let d2xx_dll_src = d2xx_lib_path.join("FTD2XX.dll");

            let _ = fs::copy(&mpsse_dll_src, target_dir.join("libmpsse.dll"));
            let _ = fs::copy(&d2xx_dll_src, target_dir.join("FTD2XX.dll"));

            println!("cargo:warning=Copied runtime DLLs to {}", target_dir.display());
        }
    }
}
