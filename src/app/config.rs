use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

use crate::app::engine::EngineKind;

/// On-disk configuration, validated by [`Config::load`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_src")]
    pub default_src: PathBuf,
    #[serde(default = "default_dest")]
    pub default_dest: PathBuf,
    /// Whether disabled items still pass their destination on to descendants.
    #[serde(default = "default_true")]
    pub anchor_disabled: bool,
    /// Glob patterns matched against every path segment.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Item {
    pub src: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    /// Executable to run instead of the engine's usual program name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    vec!["node_modules".to_string()]
}

fn default_src() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join("workspace")
}

fn default_dest() -> PathBuf {
    let user = env::var("USER").unwrap_or_else(|_| "user".to_string());
    PathBuf::from(format!("/mnt/c/Users/{}/OneDrive/workspace", user))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_src: default_src(),
            default_dest: default_dest(),
            anchor_disabled: true,
            exclude: default_exclude(),
            engine: EngineConfig::default(),
            items: Vec::new(),
        }
    }
}

/// `$WSYNC_CONFIG_PATH` is handled by clap; this is the fallback location.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("wsync").join("config.toml"))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "Config file {} not found. Run 'wsync init' to create one.",
                path.display()
            );
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Expands `~`, checks the roots are absolute and rejects ambiguous items.
    pub fn validate(&mut self) -> Result<()> {
        self.default_src = normalize(&expand_tilde(&self.default_src));
        self.default_dest = normalize(&expand_tilde(&self.default_dest));

        if !self.default_src.is_absolute() {
            bail!("default_src must be absolute: {}", self.default_src.display());
        }
        if !self.default_dest.is_absolute() {
            bail!("default_dest must be absolute: {}", self.default_dest.display());
        }

        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("Invalid exclude pattern: {}", pattern))?;
        }

        let mut seen = HashSet::new();
        for item in &mut self.items {
            item.src = normalize(&expand_tilde(&item.src));
            if item.src.as_os_str().is_empty() {
                bail!("Item with an empty src");
            }
            if item.src.components().any(|c| c == Component::ParentDir) {
                bail!("Item src may not contain '..': {}", item.src.display());
            }
            if !seen.insert(self.default_src.join(&item.src)) {
                bail!("Item {} is declared more than once", item.src.display());
            }
            item.dest = item.dest.as_deref().map(|d| normalize(&expand_tilde(d)));
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config at {}", path.display()))
    }

    /// Asks for both roots, keeping the current value on an empty answer.
    pub fn prompt_roots<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<()> {
        self.default_src = prompt_path(input, output, "source directory", &self.default_src)?;
        self.default_dest = prompt_path(input, output, "destination directory", &self.default_dest)?;
        self.validate()
    }
}

fn prompt_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    current: &Path,
) -> Result<PathBuf> {
    write!(output, "[+] Enter the {} [{}]: ", label, current.display())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer).context("Failed to read answer")?;
    let answer = answer.trim();

    if answer.is_empty() {
        Ok(current.to_path_buf())
    } else {
        Ok(PathBuf::from(answer))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Lexical cleanup: drops `.` segments and trailing separators.
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| *c != Component::CurDir)
        .collect()
}
