use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

// HAZQUEUE_SCAN_K_PER_256 lets downstream crates retune the scan-threshold
// ratio K (retire_set_len > K * registry_len triggers a scan) without
// patching this crate. K is expressed as a fraction with denominator 256 so
// the whole thing stays integer arithmetic at the call site; 1088/256 is
// approximately 4.25, the ratio used by the reference design.
fn main() {
    println!("cargo:rerun-if-env-changed=HAZQUEUE_SCAN_K_PER_256");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    let k: u32 = option_env!("HAZQUEUE_SCAN_K_PER_256")
        .map_or(Ok(1088), str::parse)
        .expect("failed to parse env variable HAZQUEUE_SCAN_K_PER_256");

    if k == 0 {
        panic!("invalid HAZQUEUE_SCAN_K_PER_256 value (0)");
    }

    write!(&mut file, "pub const SCAN_THRESHOLD_K_PER_256: u32 = {};", k)
        .expect("could not write to file");
}
