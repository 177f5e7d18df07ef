//! Project context consulted by the decomposer's templates

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_path: PathBuf,
    pub language: String,
    pub framework: Option<String>,
    pub build_tool: Option<String>,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            language: "kotlin".to_string(),
            framework: None,
            build_tool: None,
        }
    }
}

impl ProjectContext {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_build_tool(mut self, build_tool: impl Into<String>) -> Self {
        self.build_tool = Some(build_tool.into());
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    /// Infer language, build tool, and framework from marker files.
    /// Unknown layouts keep the Kotlin default with no build tool.
    pub fn detect(path: &Path) -> Self {
        let mut ctx = Self::new(path);
        let has = |name: &str| path.join(name).exists();
        let read = |name: &str| std::fs::read_to_string(path.join(name)).unwrap_or_default();

        if has("build.gradle.kts") || has("build.gradle") {
            ctx.build_tool = Some("gradle".into());
            let script = if has("build.gradle.kts") {
                read("build.gradle.kts")
            } else {
                read("build.gradle")
            };
            ctx.language = if script.contains("kotlin") || has("build.gradle.kts") {
                "kotlin".into()
            } else {
                "java".into()
            };
            if script.contains("springframework") {
                ctx.framework = Some("spring".into());
            }
        } else if has("pom.xml") {
            ctx.build_tool = Some("maven".into());
            let pom = read("pom.xml");
            ctx.language = if pom.contains("kotlin") {
                "kotlin".into()
            } else {
                "java".into()
            };
            if pom.contains("springframework") {
                ctx.framework = Some("spring".into());
            }
        } else if has("Cargo.toml") {
            ctx.build_tool = Some("cargo".into());
            ctx.language = "rust".into();
        } else if has("package.json") {
            ctx.build_tool = Some("npm".into());
            ctx.language = if has("tsconfig.json") {
                "typescript".into()
            } else {
                "javascript".into()
            };
        }

        tracing::debug!(
            path = %path.display(),
            language = %ctx.language,
            build_tool = ?ctx.build_tool,
            "Detected project context"
        );
        ctx
    }

    pub fn is_java(&self) -> bool {
        self.language.eq_ignore_ascii_case("java")
    }

    /// Gradle and Maven keep sources under `src/main/<language>`
    pub fn uses_standard_layout(&self) -> bool {
        matches!(self.build_tool.as_deref(), Some("gradle") | Some("maven"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ProjectContext::detect(dir.path());
        assert_eq!(ctx.language, "kotlin");
        assert_eq!(ctx.build_tool, None);
        assert!(!ctx.uses_standard_layout());
    }

    #[test]
    fn detects_gradle_kotlin_spring() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("build.gradle.kts"),
            "plugins { id(\"org.springframework.boot\") }",
        )
        .unwrap();
        let ctx = ProjectContext::detect(dir.path());
        assert_eq!(ctx.build_tool.as_deref(), Some("gradle"));
        assert_eq!(ctx.language, "kotlin");
        assert_eq!(ctx.framework.as_deref(), Some("spring"));
        assert!(ctx.uses_standard_layout());
    }

    #[test]
    fn detects_maven_java() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pom.xml"), "<project></project>").unwrap();
        let ctx = ProjectContext::detect(dir.path());
        assert!(ctx.is_java());
        assert_eq!(ctx.build_tool.as_deref(), Some("maven"));
    }

    #[test]
    fn detects_cargo_and_npm() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(ProjectContext::detect(dir.path()).language, "rust");

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        assert_eq!(ProjectContext::detect(dir.path()).language, "typescript");
    }
}
