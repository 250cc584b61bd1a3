use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;

// cli.rs only depends on clap + clap_complete, so it can be compiled into
// the build script as-is.
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .expect("OUT_DIR not set by Cargo")
        .into();
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("failed to create man output directory");

    render_pages(&cli::Cli::command(), "pixelpi", &man_dir);
}

/// One page per command: `pixelpi.1`, `pixelpi-ap.1`, `pixelpi-ap-enable.1`, ...
fn render_pages(cmd: &clap::Command, page: &str, dir: &Path) {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd.clone().name(page.to_owned()))
        .render(&mut buf)
        .unwrap_or_else(|e| panic!("failed to render man page `{page}`: {e}"));
    let path = dir.join(format!("{page}.1"));
    fs::write(&path, buf).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        render_pages(sub, &format!("{page}-{}", sub.get_name()), dir);
    }
}
