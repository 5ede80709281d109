//! Steady-state 2D heat diffusion on linear triangle meshes.
//!
//! The pipeline reads a Gmsh mesh and a boundary file, assembles the global
//! stiffness matrix and load vector, eliminates the prescribed boundary nodes
//! and solves the remaining system for the interior temperatures.

pub mod boundary;
pub mod datatypes;
pub mod error;
pub mod input;
pub mod mesher;
pub mod post_processor;
pub mod solver;

pub use boundary::{BoundaryCondition, Classification};
pub use datatypes::{
    Element, ElementId, ElementKind, Mesh, ModelMetadata, Node, NodeId, SourceTerm, Vertex,
};
pub use error::{HeatError, Result};
