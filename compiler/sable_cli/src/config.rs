//! Project configuration (`sable.toml`)
//!
//! Optional presets for the build; command-line flags always win.

use anyhow::{Context, Result};
use sable_driver::{CompileOptions, OptLevel, OutputFormat, Target};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub target: String,
    pub optimization: String,
    pub load_address: u16,
    pub output_format: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: "c64".to_string(),
            optimization: "O1".to_string(),
            load_address: 0x0801,
            output_format: "prg".to_string(),
        }
    }
}

impl ProjectConfig {
    /// Load `sable.toml` from `dir` if it exists.
    pub fn load(dir: &Path) -> Result<Option<ProjectConfig>> {
        let path = dir.join("sable.toml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ProjectConfig = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(config))
    }

    /// Seed compile options from the config; unrecognized values fall back
    /// to the defaults.
    pub fn to_options(&self) -> CompileOptions {
        CompileOptions {
            // Only one target is implemented; the field is kept for when
            // the other 65xx machines land.
            target: Target::C64,
            optimization: parse_opt_level(&self.build.optimization).unwrap_or_default(),
            load_address: self.build.load_address,
            output_format: parse_output_format(&self.build.output_format).unwrap_or_default(),
            ..CompileOptions::default()
        }
    }
}

pub fn parse_opt_level(text: &str) -> Option<OptLevel> {
    let level = match text {
        "O0" | "0" => OptLevel::O0,
        "O1" | "1" => OptLevel::O1,
        "O2" | "2" => OptLevel::O2,
        "O3" | "3" => OptLevel::O3,
        "Os" | "s" => OptLevel::Os,
        "Oz" | "z" => OptLevel::Oz,
        _ => return None,
    };
    Some(level)
}

pub fn parse_output_format(text: &str) -> Option<OutputFormat> {
    let format = match text {
        "asm" => OutputFormat::Asm,
        "prg" => OutputFormat::Prg,
        "both" => OutputFormat::Both,
        _ => return None,
    };
    Some(format)
}
