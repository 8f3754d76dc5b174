//! Serializable locators that let a worker re-locate the pipeline it executes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a pipeline definition can be loaded from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// A function in an importable module
    Module { module_name: String, fn_name: String },
    /// A function in a source file
    File { path: PathBuf, fn_name: String },
    /// A repository description document
    RepositoryYaml { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionTargetHandle {
    pipeline_name: String,
    target: ExecutionTarget,
}

impl ExecutionTargetHandle {
    pub fn new(pipeline_name: impl Into<String>, target: ExecutionTarget) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            target,
        }
    }

    pub fn for_module(
        pipeline_name: impl Into<String>,
        module_name: impl Into<String>,
        fn_name: impl Into<String>,
    ) -> Self {
        Self::new(
            pipeline_name,
            ExecutionTarget::Module {
                module_name: module_name.into(),
                fn_name: fn_name.into(),
            },
        )
    }

    pub fn for_file(
        pipeline_name: impl Into<String>,
        path: impl Into<PathBuf>,
        fn_name: impl Into<String>,
    ) -> Self {
        Self::new(
            pipeline_name,
            ExecutionTarget::File {
                path: path.into(),
                fn_name: fn_name.into(),
            },
        )
    }

    pub fn for_repository_yaml(pipeline_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(
            pipeline_name,
            ExecutionTarget::RepositoryYaml { path: path.into() },
        )
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn target(&self) -> &ExecutionTarget {
        &self.target
    }
}

impl fmt::Display for ExecutionTargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ExecutionTarget::Module {
                module_name,
                fn_name,
            } => write!(f, "{} ({module_name}::{fn_name})", self.pipeline_name),
            ExecutionTarget::File { path, fn_name } => {
                write!(f, "{} ({}::{fn_name})", self.pipeline_name, path.display())
            }
            ExecutionTarget::RepositoryYaml { path } => {
                write!(f, "{} ({})", self.pipeline_name, path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_serializes_with_target_kind() {
        let handle = ExecutionTargetHandle::for_file("etl", "/repo/etl.py", "define_etl");
        let value = serde_json::to_value(&handle).unwrap();

        assert_eq!(value["target"]["kind"], "file");
        assert_eq!(
            serde_json::from_value::<ExecutionTargetHandle>(value).unwrap(),
            handle
        );
        assert_eq!(handle.to_string(), "etl (/repo/etl.py::define_etl)");
    }
}
