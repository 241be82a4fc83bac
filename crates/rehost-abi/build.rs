use std::env;
use std::process::Command;

fn main() {
    // Modules and the host must agree on the compiler that laid out `dyn Capability`.
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());

    let version = match Command::new(&rustc).arg("--version").output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            println!(
                "cargo:warning=`{rustc} --version` exited with {}",
                output.status
            );
            "unknown".to_string()
        }
        Err(e) => {
            println!("cargo:warning=failed to run `{rustc} --version`: {e}");
            "unknown".to_string()
        }
    };

    println!("cargo:rustc-env=REHOST_RUSTC_VERSION={version}");
    println!("cargo:rerun-if-env-changed=RUSTC");
}
