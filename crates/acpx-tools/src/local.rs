//! Local executor: filesystem and shell operations.
//!
//! Handles the fixed local tool set against the real filesystem/process
//! boundary. Every underlying failure (missing file, permission, bad
//! input) is caught here and reported as an error result; nothing raises
//! past the chain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::{ExecutionResult, ToolError, ToolExecutor};

/// Tool names served by [`LocalExecutor`].
pub const LOCAL_TOOL_NAMES: &[&str] = &[
    "bash", "read", "write", "edit", "grep", "ls", "mkdir", "rm", "stat", "glob",
];

const DEFAULT_BASH_TIMEOUT_MS: u64 = 120_000;
const MAX_GREP_MATCHES: usize = 200;

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditInput {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Debug, Deserialize)]
struct GrepInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    case_insensitive: bool,
}

#[derive(Debug, Deserialize)]
struct PathInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct LsInput {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RmInput {
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct GlobInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

/// Executor for the built-in local tool set.
pub struct LocalExecutor {
    root: PathBuf,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Resolve relative paths against this directory instead of the
    /// process working directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn parse_input<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
        serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidInput {
            message: e.to_string(),
        })
    }

    async fn bash(&self, args: &Value) -> Result<String, ToolError> {
        let input: BashInput = Self::parse_input(args)?;
        let timeout = Duration::from_millis(input.timeout_ms.unwrap_or(DEFAULT_BASH_TIMEOUT_MS));

        let run = Command::new("bash")
            .arg("-c")
            .arg(&input.command)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| ToolError::ExecutionFailed {
                message: format!("command timed out after {}ms", timeout.as_millis()),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to spawn bash: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let mut text = stdout.into_owned();
            if !stderr.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(stderr.trim_end());
            }
            Ok(text)
        } else {
            Err(ToolError::ExecutionFailed {
                message: format!(
                    "command exited with {}: {}",
                    output.status,
                    if stderr.is_empty() { stdout } else { stderr }.trim_end()
                ),
            })
        }
    }

    async fn read(&self, args: &Value) -> Result<String, ToolError> {
        let input: ReadInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to read {}: {e}", path.display()),
            })?;

        // Whole-file reads must round-trip byte-for-byte.
        if input.offset.is_none() && input.limit.is_none() {
            return Ok(content);
        }

        let offset = input.offset.unwrap_or(0);
        let limit = input.limit.unwrap_or(usize::MAX);
        let selected: Vec<&str> = content.lines().skip(offset).take(limit).collect();
        Ok(selected.join("\n"))
    }

    async fn write(&self, args: &Value) -> Result<String, ToolError> {
        let input: WriteInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    message: format!("failed to create parent directories: {e}"),
                })?;
        }

        fs::write(&path, &input.content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to write {}: {e}", path.display()),
            })?;

        Ok(format!(
            "Wrote {} bytes to {}",
            input.content.len(),
            path.display()
        ))
    }

    async fn edit(&self, args: &Value) -> Result<String, ToolError> {
        let input: EditInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to read {}: {e}", path.display()),
            })?;

        let count = content.matches(&input.old_string).count();
        if count == 0 {
            return Err(ToolError::ExecutionFailed {
                message: "old_string was not found in the file; it must match exactly".to_string(),
            });
        }
        if count > 1 && !input.replace_all {
            return Err(ToolError::ExecutionFailed {
                message: format!(
                    "old_string appears {count} times; make it more specific or set replace_all"
                ),
            });
        }

        let new_content = if input.replace_all {
            content.replace(&input.old_string, &input.new_string)
        } else {
            content.replacen(&input.old_string, &input.new_string, 1)
        };

        fs::write(&path, &new_content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to write {}: {e}", path.display()),
            })?;

        let replaced = if input.replace_all { count } else { 1 };
        Ok(format!(
            "Made {} replacement(s) in {}",
            replaced,
            path.display()
        ))
    }

    async fn grep(&self, args: &Value) -> Result<String, ToolError> {
        let input: GrepInput = Self::parse_input(args)?;
        let regex = RegexBuilder::new(&input.pattern)
            .case_insensitive(input.case_insensitive)
            .build()
            .map_err(|e| ToolError::InvalidInput {
                message: format!("invalid pattern: {e}"),
            })?;

        let base = self.resolve(input.path.as_deref().unwrap_or("."));
        let mut matches: Vec<String> = Vec::new();

        let files: Vec<PathBuf> = if base.is_file() {
            vec![base.clone()]
        } else if base.is_dir() {
            WalkDir::new(&base)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect()
        } else {
            return Err(ToolError::ExecutionFailed {
                message: format!("no such file or directory: {}", base.display()),
            });
        };

        'outer: for file in files {
            // Binary or unreadable files are skipped, not errors.
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}:{}", file.display(), idx + 1, line));
                    if matches.len() >= MAX_GREP_MATCHES {
                        break 'outer;
                    }
                }
            }
        }

        if matches.is_empty() {
            Ok("No matches found".to_string())
        } else {
            Ok(matches.join("\n"))
        }
    }

    async fn ls(&self, args: &Value) -> Result<String, ToolError> {
        let input: LsInput = Self::parse_input(args)?;
        let dir = self.resolve(input.path.as_deref().unwrap_or("."));

        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to list {}: {e}", dir.display()),
            })?;

        let mut entries: Vec<String> = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to list {}: {e}", dir.display()),
            })?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        Ok(entries.join("\n"))
    }

    async fn mkdir(&self, args: &Value) -> Result<String, ToolError> {
        let input: PathInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to create {}: {e}", path.display()),
            })?;
        Ok(format!("Created directory {}", path.display()))
    }

    async fn rm(&self, args: &Value) -> Result<String, ToolError> {
        let input: RmInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to stat {}: {e}", path.display()),
            })?;

        if meta.is_dir() {
            if !input.recursive {
                return Err(ToolError::InvalidInput {
                    message: format!(
                        "{} is a directory; set recursive to remove it",
                        path.display()
                    ),
                });
            }
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    message: format!("failed to remove {}: {e}", path.display()),
                })?;
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    message: format!("failed to remove {}: {e}", path.display()),
                })?;
        }
        Ok(format!("Removed {}", path.display()))
    }

    async fn stat(&self, args: &Value) -> Result<String, ToolError> {
        let input: PathInput = Self::parse_input(args)?;
        let path = self.resolve(&input.path);

        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                message: format!("failed to stat {}: {e}", path.display()),
            })?;

        let kind = if meta.is_dir() {
            "directory"
        } else if meta.is_symlink() {
            "symlink"
        } else {
            "file"
        };
        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(format!(
            "{}: {} ({} bytes, modified {})",
            path.display(),
            kind,
            meta.len(),
            modified
        ))
    }

    async fn glob(&self, args: &Value) -> Result<String, ToolError> {
        let input: GlobInput = Self::parse_input(args)?;
        let base = self.resolve(input.path.as_deref().unwrap_or("."));
        let full_pattern = base.join(&input.pattern);
        let pattern_str = full_pattern.to_string_lossy();

        let paths = glob::glob(&pattern_str).map_err(|e| ToolError::InvalidInput {
            message: format!("invalid glob pattern: {e}"),
        })?;

        let mut found: Vec<String> = paths
            .filter_map(|p| p.ok())
            .map(|p| p.display().to_string())
            .collect();
        found.sort();

        if found.is_empty() {
            Ok("No files matched".to_string())
        } else {
            Ok(found.join("\n"))
        }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for LocalExecutor {
    fn can_execute(&self, tool_id: &str) -> bool {
        LOCAL_TOOL_NAMES.contains(&tool_id)
    }

    async fn execute(&self, tool_id: &str, args: &Value) -> ExecutionResult {
        let outcome = match tool_id {
            "bash" => self.bash(args).await,
            "read" => self.read(args).await,
            "write" => self.write(args).await,
            "edit" => self.edit(args).await,
            "grep" => self.grep(args).await,
            "ls" => self.ls(args).await,
            "mkdir" => self.mkdir(args).await,
            "rm" => self.rm(args).await,
            "stat" => self.stat(args).await,
            "glob" => self.glob(args).await,
            other => Err(ToolError::NotFound {
                name: other.to_string(),
            }),
        };

        match outcome {
            Ok(output) => ExecutionResult::success(output),
            Err(err) => err.into(),
        }
    }
}
