//! benchrun init command implementation
//!
//! Writes a default `benchrun.toml`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(Serialize)]
struct InitReport {
    config: PathBuf,
    created: bool,
    overwritten: bool,
}

pub fn run(target: &Path, force: bool, output: OutputOptions) -> Result<()> {
    let existed = target.exists();
    if !existed || force {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Config::default().save(target)?;
    }

    let report = InitReport {
        config: target.to_path_buf(),
        created: !existed,
        overwritten: existed && force,
    };

    let header = match (existed, force) {
        (false, _) => "benchrun init: wrote default config",
        (true, true) => "benchrun init: overwrote config with defaults",
        (true, false) => "benchrun init: config already exists, nothing to do",
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("config", target.display());
    human.push_next_step("set [agent].program in the config");
    human.push_next_step("benchrun run --tasks <tasks.jsonl>");

    emit_success(output, "init", &report, Some(&human))
}
