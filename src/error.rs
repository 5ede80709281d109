use std::path::PathBuf;

use thiserror::Error;

use crate::datatypes::{ElementId, NodeId};

pub type Result<T> = std::result::Result<T, HeatError>;

#[derive(Debug, Error)]
pub enum HeatError {
    #[error("unable to open {path}: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed mesh (line {line}): {message}")]
    MalformedMesh { line: usize, message: String },

    #[error("malformed boundary file (line {line}): {message}")]
    MalformedBoundary { line: usize, message: String },

    #[error("invalid boundary specification: {0}")]
    InvalidBoundarySpec(String),

    #[error("element {} with nodes {nodes:?} is degenerate: jacobian is zero", .element.index())]
    DegenerateElement {
        element: ElementId,
        nodes: [NodeId; 3],
    },

    #[error("reduced system of size {size} is singular; check that every interior node belongs to an element")]
    SingularSystem { size: usize },

    #[error("input error: {0}")]
    Input(String),

    #[error("post processor error: {0}")]
    PostProcessor(String),
}

impl HeatError {
    pub(crate) fn mesh(line: usize, message: impl Into<String>) -> Self {
        HeatError::MalformedMesh {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn boundary(line: usize, message: impl Into<String>) -> Self {
        HeatError::MalformedBoundary {
            line,
            message: message.into(),
        }
    }
}
