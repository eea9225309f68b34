//! 文件模式工具：项目沙箱 ProjectFs，以及基于它的 read_file / read_files / project_tree
//!
//! 所有路径经 resolve 校验必须在项目根目录下（禁止 ../ 逃逸）；`.env` 等敏感文件一律拒绝读取。

use std::path::{Path, PathBuf};

use glob::Pattern;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::core::AgentError;
use crate::tools::schema::args_schema;
use crate::tools::LocalTool;

const TRUNCATED_MARKER: &str = "\n...[truncated]";

/// 项目沙箱：绑定根目录，负责路径校验、敏感文件过滤与项目树生成
#[derive(Debug, Clone)]
pub struct ProjectFs {
    root_dir: PathBuf,
    excluded_suffixes: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    max_file_chars: usize,
}

impl ProjectFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self {
            root_dir,
            excluded_suffixes: vec![".env".to_string()],
            ignore_patterns: Vec::new(),
            max_file_chars: 20_000,
        }
    }

    pub fn with_excluded_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.excluded_suffixes = suffixes;
        self
    }

    /// 项目树忽略规则（glob，匹配文件/目录名）；非法规则记录 warn 后跳过
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Self {
        self.ignore_patterns = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pat) => Some(pat),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "invalid ignore pattern skipped");
                    None
                }
            })
            .collect();
        self
    }

    pub fn with_max_file_chars(mut self, max_file_chars: usize) -> Self {
        self.max_file_chars = max_file_chars;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 是否为敏感文件（如 .env）；首尾空白不影响判断
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.trim();
        self.excluded_suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }

    /// 解析后的真实路径是否指向敏感文件（覆盖符号链接）
    fn is_excluded_target(&self, resolved: &Path) -> bool {
        resolved
            .file_name()
            .map(|n| self.is_excluded(&n.to_string_lossy()))
            .unwrap_or(false)
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore_patterns.iter().any(|p| p.matches(name))
    }

    /// 检查路径是否在沙箱内；接受相对路径或根目录下的绝对路径
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let trimmed = path.trim().trim_start_matches("./");
        let candidate = Path::new(trimmed);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::Io(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        if self.is_excluded(path) {
            return Err(AgentError::Io(format!("Access to {} is not allowed", path)));
        }
        let resolved = self.resolve(path)?;
        if self.is_excluded_target(&resolved) {
            return Err(AgentError::Io(format!("Access to {} is not allowed", path)));
        }
        let content = std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::Io(format!("Read failed for {}: {}", path, e)))?;
        if content.chars().count() > self.max_file_chars {
            let head: String = content.chars().take(self.max_file_chars).collect();
            Ok(head + TRUNCATED_MARKER)
        } else {
            Ok(content)
        }
    }

    /// 拼接多个文件的内容；单个文件失败时在其位置写入错误说明，不影响其它文件
    pub fn concat_files(&self, paths: &[String]) -> String {
        paths
            .iter()
            .filter(|p| !self.is_excluded(p))
            .map(|p| match self.read_file(p) {
                Ok(content) => format!("--- File: {} ---\n{}\n", p, content),
                Err(e) => format!("--- File: {} ---\n[{}]\n", p, e),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 缩进形式的项目树；目录以 `/` 结尾，隐藏项与忽略项不列出
    pub fn project_tree(&self) -> String {
        let root_name = self
            .root_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root_dir.display().to_string());
        let mut lines = vec![format!("{}/", root_name)];
        let walker = WalkDir::new(&self.root_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && !self.is_ignored(&name)
            });
        for entry in walker.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_excluded(&name) {
                continue;
            }
            let indent = "  ".repeat(entry.depth());
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            lines.push(format!("{}{}{}", indent, name, suffix));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// 相对项目根目录的文件路径
    path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFilesArgs {
    /// 相对项目根目录的文件路径列表
    file_paths: Vec<String>,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, String> {
    serde_json::from_value(args.clone()).map_err(|e| format!("Invalid arguments: {}", e))
}

/// 读取单个文件
pub struct ReadFileTool {
    fs: ProjectFs,
}

impl ReadFileTool {
    pub fn new(fs: ProjectFs) -> Self {
        Self { fs }
    }
}

impl LocalTool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read one file of the project. Args: {\"path\": \"file path relative to the project root\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFileArgs>()
    }

    fn invoke(&self, args: &Value) -> Result<String, String> {
        let args: ReadFileArgs = parse_args(args)?;
        tracing::info!(path = %args.path, "read_file tool execute");
        self.fs.read_file(&args.path).map_err(|e| e.to_string())
    }
}

/// 读取并拼接多个文件
pub struct ReadFilesTool {
    fs: ProjectFs,
}

impl ReadFilesTool {
    pub fn new(fs: ProjectFs) -> Self {
        Self { fs }
    }
}

impl LocalTool for ReadFilesTool {
    fn name(&self) -> &str {
        "read_files"
    }

    fn description(&self) -> &str {
        "Read several project files at once, concatenated with headers. Args: {\"file_paths\": [\"a.rs\", \"b.rs\"]}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFilesArgs>()
    }

    fn invoke(&self, args: &Value) -> Result<String, String> {
        let args: ReadFilesArgs = parse_args(args)?;
        tracing::info!(count = args.file_paths.len(), "read_files tool execute");
        Ok(self.fs.concat_files(&args.file_paths))
    }
}

/// 列出项目结构
pub struct ProjectTreeTool {
    fs: ProjectFs,
}

impl ProjectTreeTool {
    pub fn new(fs: ProjectFs) -> Self {
        Self { fs }
    }
}

impl LocalTool for ProjectTreeTool {
    fn name(&self) -> &str {
        "project_tree"
    }

    fn description(&self) -> &str {
        "List the project directory tree. Args: {}"
    }

    fn invoke(&self, _args: &Value) -> Result<String, String> {
        Ok(self.fs.project_tree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::write(dir.path().join("config.yaml"), "version: 1.0.0\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(dir.path().join("prod.env"), "SECRET=2\n").unwrap();
        dir
    }

    #[test]
    fn test_resolve_blocks_escape() {
        let dir = project();
        let fs = ProjectFs::new(dir.path());
        assert!(fs.resolve("src/main.rs").is_ok());
        assert!(fs.resolve("./config.yaml").is_ok());
        assert!(matches!(
            fs.resolve("../../../etc/passwd"),
            Err(AgentError::PathEscape(_)) | Err(AgentError::Io(_))
        ));
        assert!(fs.resolve("/etc/hostname").is_err());
    }

    #[test]
    fn test_env_files_are_refused() {
        let dir = project();
        let fs = ProjectFs::new(dir.path());
        assert!(fs.read_file("prod.env").is_err());
        let joined = fs.concat_files(&["config.yaml".to_string(), "prod.env".to_string()]);
        assert!(joined.contains("version: 1.0.0"));
        assert!(!joined.contains("SECRET"));
    }

    #[test]
    fn test_padded_env_path_is_refused() {
        let dir = project();
        let fs = ProjectFs::new(dir.path());
        assert!(fs.read_file("prod.env ").is_err());
        assert!(fs.read_file(" ./prod.env\n").is_err());
        let joined = fs.concat_files(&["prod.env ".to_string()]);
        assert!(!joined.contains("SECRET"));

        let out = ReadFileTool::new(fs).invoke(&serde_json::json!({"path": "prod.env "}));
        assert!(out.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_env_is_refused() {
        let dir = project();
        std::os::unix::fs::symlink(dir.path().join("prod.env"), dir.path().join("notes.txt"))
            .unwrap();
        let fs = ProjectFs::new(dir.path());
        let err = fs.read_file("notes.txt").unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        let joined = fs.concat_files(&["notes.txt".to_string()]);
        assert!(!joined.contains("SECRET"));
    }

    #[test]
    fn test_read_file_truncates() {
        let dir = project();
        let fs = ProjectFs::new(dir.path()).with_max_file_chars(4);
        assert_eq!(fs.read_file("config.yaml").unwrap(), format!("vers{}", TRUNCATED_MARKER));
    }

    #[test]
    fn test_project_tree_skips_hidden_ignored_and_excluded() {
        let dir = project();
        let fs = ProjectFs::new(dir.path()).with_ignore_patterns(&["target".to_string()]);
        let tree = fs.project_tree();
        assert!(tree.contains("  src/"));
        assert!(tree.contains("    main.rs"));
        assert!(tree.contains("  config.yaml"));
        assert!(!tree.contains("target"));
        assert!(!tree.contains(".env"));
        assert!(!tree.contains("prod.env"));
    }

    #[tokio::test]
    async fn test_tools_through_local_source() {
        use crate::tools::{LocalTools, ToolSource};

        let dir = project();
        let fs = ProjectFs::new(dir.path());
        let tools = LocalTools::new()
            .with(ReadFileTool::new(fs.clone()))
            .unwrap()
            .with(ReadFilesTool::new(fs.clone()))
            .unwrap()
            .with(ProjectTreeTool::new(fs))
            .unwrap();

        let out = tools
            .invoke("read_file", serde_json::json!({"path": "config.yaml"}))
            .await
            .unwrap();
        assert_eq!(out, "version: 1.0.0\n");

        let out = tools
            .invoke("read_file", serde_json::json!({"file": "config.yaml"}))
            .await
            .unwrap();
        assert!(out.starts_with("Error: Invalid arguments"));

        let out = tools
            .invoke(
                "read_files",
                serde_json::json!({"file_paths": ["config.yaml", "src/main.rs"]}),
            )
            .await
            .unwrap();
        assert!(out.contains("--- File: src/main.rs ---"));
    }
}
