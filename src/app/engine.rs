use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::app::config::EngineConfig;
use crate::app::models::ResolvedTask;

/// The external tool that does the actual copying.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Two-way sync.
    #[default]
    Unison,
    /// One-way mirror from the Linux side.
    Rsync,
    /// One-way mirror through `robocopy.exe` on the Windows side.
    Robocopy,
}

impl EngineKind {
    pub fn program(self) -> &'static str {
        match self {
            EngineKind::Unison => "unison",
            EngineKind::Rsync => "rsync",
            EngineKind::Robocopy => "robocopy.exe",
        }
    }

    fn probe_arg(self) -> &'static str {
        match self {
            EngineKind::Unison => "-version",
            EngineKind::Rsync => "--version",
            EngineKind::Robocopy => "/?",
        }
    }

    /// Robocopy reports "copied something" with codes 1..=7.
    pub fn is_success(self, code: i32) -> bool {
        match self {
            EngineKind::Robocopy => (0..8).contains(&code),
            EngineKind::Unison | EngineKind::Rsync => code == 0,
        }
    }

    pub fn install_hint(self) -> &'static str {
        match self {
            EngineKind::Unison => "install it with your package manager, e.g. 'sudo apt install unison'",
            EngineKind::Rsync => "install it with your package manager, e.g. 'sudo apt install rsync'",
            EngineKind::Robocopy => "robocopy.exe ships with Windows; check that Windows interop is enabled in WSL",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Unison => "unison",
            EngineKind::Rsync => "rsync",
            EngineKind::Robocopy => "robocopy",
        })
    }
}

/// A program and its arguments, ready to spawn or print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// POSIX shell quoting, only where needed.
fn quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', "'\\''")))
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub kind: EngineKind,
    program: PathBuf,
    extra_args: Vec<String>,
    /// WSL distribution name, used to reach Linux paths from robocopy.
    distro: Option<String>,
}

impl Engine {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            kind: config.kind,
            program: config
                .program
                .clone()
                .unwrap_or_else(|| PathBuf::from(config.kind.program())),
            extra_args: config.extra_args.clone(),
            distro: env::var("WSL_DISTRO_NAME").ok(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the program can be spawned at all.
    pub fn probe(&self) -> bool {
        Command::new(&self.program)
            .arg(self.kind.probe_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    pub fn command(&self, task: &ResolvedTask, exclude: &[String], verbose: bool) -> CommandLine {
        let args = match self.kind {
            EngineKind::Unison => self.unison_args(task, exclude, verbose),
            EngineKind::Rsync => self.rsync_args(task, exclude, verbose),
            EngineKind::Robocopy => self.robocopy_args(task, exclude, verbose),
        };
        CommandLine {
            program: self.program.clone(),
            args,
        }
    }

    fn unison_args(&self, task: &ResolvedTask, exclude: &[String], verbose: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-auto", "-batch", "-confirmbigdel=false"]
            .iter()
            .map(OsString::from)
            .collect();
        if !verbose {
            args.push("-silent".into());
        }

        let archive_files = ".unison*".to_string();
        for pattern in exclude.iter().chain(std::iter::once(&archive_files)) {
            args.push("-ignore".into());
            args.push(format!("Name {}", pattern).into());
        }
        for skip in &task.skip {
            // Unison path patterns have no escape syntax.
            warn_if_wildcard(skip);
            args.push("-ignore".into());
            args.push(prefixed("Path ", skip));
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(task.source.clone().into_os_string());
        args.push(task.destination.clone().into_os_string());
        args
    }

    fn rsync_args(&self, task: &ResolvedTask, exclude: &[String], verbose: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-a".into(), "--delete".into()];
        if verbose {
            args.push("-v".into());
            args.push("--info=progress2".into());
        } else {
            args.push("-q".into());
        }

        for pattern in exclude {
            args.push(format!("--exclude={}", pattern).into());
        }
        for skip in &task.skip {
            // Leading slash anchors the pattern at the transfer root.
            args.push(format!("--exclude=/{}/", rsync_escape(&skip.to_string_lossy())).into());
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(with_trailing_slash(&task.source));
        args.push(with_trailing_slash(&task.destination));
        args
    }

    fn robocopy_args(&self, task: &ResolvedTask, exclude: &[String], verbose: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.windows_path(&task.source),
            self.windows_path(&task.destination),
        ];
        args.extend(["/MIR", "/R:1", "/W:1"].iter().map(OsString::from));
        if !verbose {
            args.extend(["/NP", "/NFL", "/NDL"].iter().map(OsString::from));
        }

        if !exclude.is_empty() {
            args.push("/XF".into());
            args.extend(exclude.iter().map(OsString::from));
        }
        if !exclude.is_empty() || !task.skip.is_empty() {
            args.push("/XD".into());
            args.extend(exclude.iter().map(OsString::from));
            args.extend(task.skip.iter().map(|skip| {
                warn_if_wildcard(skip);
                self.windows_path(&task.source.join(skip))
            }));
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// `/mnt/c/Users` becomes `C:\Users`; other paths go through the
    /// `\\wsl.localhost` share when the distribution is known.
    fn windows_path(&self, path: &Path) -> OsString {
        let text = path.to_string_lossy();

        if let Some(rest) = text.strip_prefix("/mnt/") {
            let (drive, tail) = rest.split_once('/').unwrap_or((rest, ""));
            if drive.len() == 1 && drive.chars().all(|c| c.is_ascii_alphabetic()) {
                return format!("{}:\\{}", drive.to_ascii_uppercase(), tail.replace('/', "\\")).into();
            }
        }

        match &self.distro {
            Some(distro) if path.is_absolute() => {
                format!("\\\\wsl.localhost\\{}{}", distro, text.replace('/', "\\")).into()
            }
            _ => path.as_os_str().to_os_string(),
        }
    }
}

fn prefixed(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}

const WILDCARDS: &[char] = &['*', '?', '[', '{'];

fn warn_if_wildcard(skip: &Path) {
    if skip.to_string_lossy().contains(WILDCARDS) {
        log::warn!(
            "Skipped folder {} contains wildcard characters and may hide more than itself",
            skip.display()
        );
    }
}

/// rsync only treats `\` as an escape once the pattern has a wildcard.
fn rsync_escape(path: &str) -> String {
    if !path.contains(['*', '?', '[']) {
        return path.to_string();
    }
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '*' | '?' | '[' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_os_string();
    if !arg.to_string_lossy().ends_with('/') {
        arg.push(OsStr::new("/"));
    }
    arg
}
