//! Finite element assembly for 2D structural analysis: plane stress and
//! plane strain continua, Mindlin plates (single layer and laminated) and
//! geometric stiffness, with boundary enforcement, a conjugate gradient
//! solve and averaged nodal stress recovery.

pub mod analysis;
pub mod assembly;
pub mod boundary;
pub mod datatypes;
pub mod error;
pub mod input;
pub mod kernel;
pub mod load;
pub mod material;
pub mod mesher;
pub mod post_processor;
pub mod quadrature;
pub mod shape;
pub mod solver;
pub mod strain;
pub mod stress;
