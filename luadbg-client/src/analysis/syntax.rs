//! Syntax checking through an external compiler such as `luac -p`

use std::path::{Path, PathBuf};
use std::process::Command;

use super::pool::FileTask;

/// One `file:line: message` report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub message: String,
}

pub struct SyntaxCheckTask {
    program: String,
    args: Vec<String>,
}

impl SyntaxCheckTask {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Name the checker prefixes its messages with, e.g. `luac: `
    fn prefix(&self) -> String {
        let name = Path::new(&self.program)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone());
        format!("{}: ", name)
    }
}

impl FileTask for SyntaxCheckTask {
    type Output = Vec<Diagnostic>;

    fn run(&self, path: &Path) -> Result<Vec<Diagnostic>, String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.program, e))?;

        if output.status.success() {
            return Ok(Vec::new());
        }

        let prefix = self.prefix();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics: Vec<Diagnostic> = stderr
            .lines()
            .map(|line| line.strip_prefix(prefix.as_str()).unwrap_or(line))
            .filter_map(parse_diagnostic)
            .collect();

        if diagnostics.is_empty() {
            Err(format!(
                "{} exited with {} without a diagnostic: {}",
                self.program,
                output.status,
                stderr.trim()
            ))
        } else {
            Ok(diagnostics)
        }
    }
}

/// Parse `file:line: message`. The file part may itself contain `:`.
pub fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    for (colon, _) in line.match_indices(':') {
        let rest = &line[colon + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || colon == 0 {
            continue;
        }
        let Some(message) = rest[digits..].strip_prefix(':') else {
            continue;
        };
        let line_no = rest[..digits].parse().ok()?;
        return Some(Diagnostic {
            file: PathBuf::from(&line[..colon]),
            line: line_no,
            message: message.trim().to_string(),
        });
    }
    None
}
