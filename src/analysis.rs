//! End-to-end static analysis of a structured rectangular mesh.

use std::collections::BTreeMap;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use tracing::{info, warn};

use crate::{
    assembly::{
        assemble_quads_mindlin_plate, assemble_quads_mindlin_plate_laminated,
        assemble_quads_stress_strain, assemble_triangles_stress_strain, AssemblyOptions,
    },
    boundary::{apply_initial_values, Enforcement, SystemMatrix},
    datatypes::{Dof, Element, StressField, Vertex},
    error::{LaminaError, Result},
    input::{AnalysisKind, LoadKind, MaterialSpec, ModelMetadata},
    load::{edge_force, nodal_force, volume_force, NodalLoad},
    mesher::{rectangular_quads, rectangular_triangles},
    shape::{ElementShape, Quad4, Tri3},
    solver::conjugate_gradient,
    stress::{plane_stresses, plate_stresses},
};

/// Nodal output of a solved analysis
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub analysis: AnalysisKind,
    pub nodes: Vec<Vertex>,
    /// Solved DOFs, `freedom` consecutive values per node
    pub displacement: DVector<f64>,
    /// Averaged nodal stresses; laminated plates report displacements only
    pub stresses: Option<StressField>,
}

impl AnalysisResult {
    /// Values of one displacement component at every node
    pub fn component(&self, component: usize) -> DVector<f64> {
        let freedom = self.analysis.freedom();
        DVector::from_fn(self.nodes.len(), |node, _| {
            self.displacement[Dof { node, component }.global(freedom)]
        })
    }
}

fn material_of(metadata: &ModelMetadata) -> Result<MaterialSpec> {
    match metadata.material {
        Some(material) => Ok(material),
        None => Err(LaminaError::Input(format!(
            "{:?} analysis requires a material section",
            metadata.analysis
        ))),
    }
}

/// Collects prescribed `(position, value)` pairs from the boundary rules.
/// Later rules override earlier ones on shared DOFs.
fn collect_constraints(metadata: &ModelMetadata, nodes: &[Vertex]) -> Vec<(usize, f64)> {
    let freedom = metadata.analysis.freedom();
    let mut constraints: BTreeMap<usize, f64> = BTreeMap::new();

    for rule in &metadata.boundary_conditions {
        let mut matched = 0;
        for (node, vertex) in nodes.iter().enumerate() {
            if !rule.region.contains(vertex) {
                continue;
            }
            matched += 1;
            for &(component, value) in &rule.targets {
                constraints.insert(Dof { node, component }.global(freedom), value);
            }
        }
        if matched == 0 {
            warn!("boundary rule '{}' matches no nodes", rule.name);
        }
    }

    constraints.into_iter().collect()
}

/// Sums the load vectors of every load rule
///
/// # Arguments
/// * `metadata` - The analysis definition
/// * `nodes` - The node set
/// * `elements` - Quads or triangles
/// * `volume_thickness` - Multiplies volume loads; plates take loads per
///   unit area and pass 1
fn collect_loads<S: ElementShape<N>, const N: usize>(
    metadata: &ModelMetadata,
    nodes: &[Vertex],
    elements: &[Element<N>],
    volume_thickness: f64,
) -> Result<DVector<f64>> {
    let freedom = metadata.analysis.freedom();
    let mut force = DVector::zeros(nodes.len() * freedom);

    for rule in &metadata.loads {
        let in_region = |at: &Vertex| {
            if rule.region.contains(at) {
                rule.values.clone()
            } else {
                vec![0.0; freedom]
            }
        };

        force += match rule.kind {
            LoadKind::Volume => volume_force::<S, N, _>(
                nodes,
                elements,
                volume_thickness,
                freedom,
                in_region,
                metadata.gauss_order,
            )?,
            LoadKind::Traction => {
                edge_force(nodes, elements, freedom, in_region, metadata.gauss_order.min(4))?
            }
            LoadKind::Nodal => {
                let loads: Vec<NodalLoad> = nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, vertex)| rule.region.contains(vertex))
                    .flat_map(|(node, _)| {
                        rule.values
                            .iter()
                            .enumerate()
                            .filter(|(_, value)| **value != 0.0)
                            .map(move |(component, &value)| NodalLoad {
                                dof: Dof { node, component },
                                value,
                            })
                    })
                    .collect();
                nodal_force(nodes.len(), freedom, &loads)?
            }
        };
    }

    Ok(force)
}

/// Constrains and solves an assembled system
fn solve_system(
    metadata: &ModelMetadata,
    nodes: &[Vertex],
    stiffness: CsrMatrix<f64>,
    mut force: DVector<f64>,
) -> Result<DVector<f64>> {
    let constraints = collect_constraints(metadata, nodes);
    if constraints.is_empty() {
        warn!("no boundary conditions applied, the stiffness matrix is singular");
    }
    info!("constraining {} DOFs", constraints.len());

    let mut matrix = SystemMatrix::from(stiffness);
    apply_initial_values(&mut matrix, &mut force, &constraints, Enforcement::Symmetric)?;

    conjugate_gradient(&matrix.into_csr()?, &force, &metadata.solver)
}

/// Runs a full analysis: mesh, assemble, load, constrain, solve, recover
///
/// # Arguments
/// * `metadata` - The parsed analysis definition
///
/// # Returns
/// Nodal displacements, and averaged nodal stresses where the analysis
/// supports them
pub fn run(metadata: &ModelMetadata) -> Result<AnalysisResult> {
    let mesh = &metadata.mesh;
    let options = AssemblyOptions {
        gauss_order: metadata.gauss_order,
        kappa: metadata.kappa,
    };

    let (nodes, displacement, stresses) = match metadata.analysis {
        AnalysisKind::PlaneQuads => {
            let (nodes, elements) = rectangular_quads(
                mesh.x_count, mesh.y_count, mesh.x_origin, mesh.y_origin, mesh.width, mesh.height,
            );
            let elasticity = material_of(metadata)?.elasticity();
            let stiffness = assemble_quads_stress_strain(
                &nodes,
                &elements,
                metadata.thickness,
                &elasticity,
                metadata.gauss_order,
            )?;
            let force = collect_loads::<Quad4, 4>(metadata, &nodes, &elements, metadata.thickness)?;
            let displacement = solve_system(metadata, &nodes, stiffness, force)?;
            let stresses =
                plane_stresses::<Quad4, 4>(&nodes, &elements, &elasticity, &displacement)?;
            (nodes, displacement, Some(stresses))
        }
        AnalysisKind::PlaneTriangles => {
            let (nodes, elements) = rectangular_triangles(
                mesh.x_count, mesh.y_count, mesh.x_origin, mesh.y_origin, mesh.width, mesh.height,
            );
            let elasticity = material_of(metadata)?.elasticity();
            let stiffness = assemble_triangles_stress_strain(
                &nodes,
                &elements,
                &elasticity,
                metadata.gauss_order,
            )?;
            let force = collect_loads::<Tri3, 3>(metadata, &nodes, &elements, 1.0)?;
            let displacement = solve_system(metadata, &nodes, stiffness, force)?;
            let stresses =
                plane_stresses::<Tri3, 3>(&nodes, &elements, &elasticity, &displacement)?;
            (nodes, displacement, Some(stresses))
        }
        AnalysisKind::MindlinPlate => {
            let (nodes, elements) = rectangular_quads(
                mesh.x_count, mesh.y_count, mesh.x_origin, mesh.y_origin, mesh.width, mesh.height,
            );
            let elasticity = material_of(metadata)?.elasticity();
            let stiffness = assemble_quads_mindlin_plate(
                &nodes,
                &elements,
                metadata.thickness,
                &elasticity,
                options,
            )?;
            let force = collect_loads::<Quad4, 4>(metadata, &nodes, &elements, 1.0)?;
            let displacement = solve_system(metadata, &nodes, stiffness, force)?;
            let stresses = plate_stresses::<Quad4, 4>(
                &nodes,
                &elements,
                &elasticity,
                &displacement,
                metadata.fiber_z,
            )?;
            (nodes, displacement, Some(stresses))
        }
        AnalysisKind::LaminatedPlate => {
            let laminate = match &metadata.laminate {
                Some(laminate) => laminate,
                None => {
                    return Err(LaminaError::Input(
                        "Laminated analysis requires a layers section".to_owned(),
                    ))
                }
            };
            let (nodes, elements) = rectangular_quads(
                mesh.x_count, mesh.y_count, mesh.x_origin, mesh.y_origin, mesh.width, mesh.height,
            );
            let stiffness =
                assemble_quads_mindlin_plate_laminated(&nodes, &elements, laminate, options)?;
            let force = collect_loads::<Quad4, 4>(metadata, &nodes, &elements, 1.0)?;
            let displacement = solve_system(metadata, &nodes, stiffness, force)?;
            (nodes, displacement, None)
        }
    };

    let freedom = metadata.analysis.freedom();
    for (component, name) in metadata.analysis.components().iter().enumerate() {
        let values = displacement.iter().skip(component).step_by(freedom);
        let (min, max) = values.fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        info!("{min:e} <= {name} <= {max:e}");
    }

    Ok(AnalysisResult {
        analysis: metadata.analysis,
        nodes,
        displacement,
        stresses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::parse_input;
    use approx::assert_relative_eq;

    #[test]
    fn constraints_follow_rule_order() {
        let metadata = parse_input(
            r#"{
                "analysis": "plane_quads",
                "mesh": { "x_count": 3, "y_count": 2, "width": 2.0, "height": 1.0 },
                "material": { "youngs_modulus": 1.0, "poisson_ratio": 0.3 },
                "thickness": 1.0,
                "boundary_conditions": {
                    "left": { "region": { "x_target_max": 0.0 }, "targets": { "u": 0.0, "v": 0.0 } },
                    "corner": { "region": { "x_target_max": 0.0, "y_target_max": 0.0 }, "targets": { "v": 0.5 } }
                }
            }"#,
        )
        .unwrap();
        let (nodes, _) = rectangular_quads(3, 2, 0.0, 0.0, 2.0, 1.0);

        let constraints = collect_constraints(&metadata, &nodes);
        // Nodes 0 and 3 sit on x = 0
        assert_eq!(constraints, vec![(0, 0.0), (1, 0.5), (6, 0.0), (7, 0.0)]);
    }

    #[test]
    fn nodal_loads_land_on_region_nodes() {
        let metadata = parse_input(
            r#"{
                "analysis": "mindlin_plate",
                "mesh": { "x_count": 3, "y_count": 3, "width": 1.0, "height": 1.0 },
                "material": { "youngs_modulus": 1.0, "poisson_ratio": 0.3 },
                "thickness": 0.1,
                "loads": {
                    "center": {
                        "kind": "nodal",
                        "region": { "x_target_min": 0.5, "x_target_max": 0.5, "y_target_min": 0.5, "y_target_max": 0.5 },
                        "values": { "w": -2.0 }
                    }
                }
            }"#,
        )
        .unwrap();
        let (nodes, elements) = rectangular_quads(3, 3, 0.0, 0.0, 1.0, 1.0);

        let force = collect_loads::<Quad4, 4>(&metadata, &nodes, &elements, 1.0).unwrap();
        assert_eq!(force[3 * 4], -2.0);
        assert_relative_eq!(force.sum(), -2.0);
    }

    #[test]
    fn component_extracts_strided_values() {
        let result = AnalysisResult {
            analysis: AnalysisKind::PlaneQuads,
            nodes: vec![Vertex::new(0.0, 0.0), Vertex::new(1.0, 0.0)],
            displacement: DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]),
            stresses: None,
        };
        assert_eq!(result.component(1), DVector::from_vec(vec![2.0, 4.0]));
    }
}
