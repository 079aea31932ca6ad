use json::JsonValue;
use tracing::info;

use crate::{
    datatypes::Vertex,
    error::{LaminaError, Result},
    material::{
        plane_strain_isotropic, plane_stress_isotropic, ElasticityMatrix, Laminate, Layer,
        DEFAULT_KAPPA,
    },
    solver::{SolverOptions, DEFAULT_TOLERANCE},
};

/// Absolute slack on region bounds, so grid coordinates produced by floating
/// point stepping still land inside an exactly specified edge
const REGION_TOLERANCE: f64 = 1e-9;

/// The physics model and element family of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    PlaneQuads,
    PlaneTriangles,
    MindlinPlate,
    LaminatedPlate,
}

impl AnalysisKind {
    fn parse(name: &str) -> Result<AnalysisKind> {
        match name {
            "plane_quads" => Ok(AnalysisKind::PlaneQuads),
            "plane_triangles" => Ok(AnalysisKind::PlaneTriangles),
            "mindlin_plate" => Ok(AnalysisKind::MindlinPlate),
            "laminated_plate" => Ok(AnalysisKind::LaminatedPlate),
            other => Err(LaminaError::Input(format!(
                "Unknown analysis '{other}', expected plane_quads, plane_triangles, mindlin_plate or laminated_plate"
            ))),
        }
    }

    /// Names of the nodal degrees of freedom, in DOF order
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            AnalysisKind::PlaneQuads | AnalysisKind::PlaneTriangles => &["u", "v"],
            AnalysisKind::MindlinPlate => &["w", "theta_x", "theta_y"],
            AnalysisKind::LaminatedPlate => &["u", "v", "w", "theta_x", "theta_y"],
        }
    }

    pub fn freedom(&self) -> usize {
        self.components().len()
    }

    /// Quadrature order used when the input does not name one
    pub fn default_gauss_order(&self) -> usize {
        match self {
            AnalysisKind::PlaneQuads | AnalysisKind::PlaneTriangles => 2,
            AnalysisKind::MindlinPlate | AnalysisKind::LaminatedPlate => 3,
        }
    }

    fn component_index(&self, component: &str, context: &str) -> Result<usize> {
        match self.components().iter().position(|c| *c == component) {
            Some(index) => Ok(index),
            None => Err(LaminaError::Input(format!(
                "{context} names component '{component}', expected one of {:?}",
                self.components()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneState {
    PlaneStress,
    PlaneStrain,
}

/// Structured rectangular mesh parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSpec {
    pub x_count: usize,
    pub y_count: usize,
    pub x_origin: f64,
    pub y_origin: f64,
    pub width: f64,
    pub height: f64,
}

/// Isotropic material definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSpec {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub state: PlaneState,
}

impl MaterialSpec {
    pub fn elasticity(&self) -> ElasticityMatrix {
        match self.state {
            PlaneState::PlaneStress => {
                plane_stress_isotropic(self.youngs_modulus, self.poisson_ratio)
            }
            PlaneState::PlaneStrain => {
                plane_strain_isotropic(self.youngs_modulus, self.poisson_ratio)
            }
        }
    }
}

/// An axis-aligned region. Bounds are inclusive and default to unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundaryRegion {
    pub fn unbounded() -> BoundaryRegion {
        BoundaryRegion {
            x_min: f64::MIN,
            x_max: f64::MAX,
            y_min: f64::MIN,
            y_max: f64::MAX,
        }
    }

    pub fn contains(&self, vertex: &Vertex) -> bool {
        vertex.x >= self.x_min - REGION_TOLERANCE
            && vertex.x <= self.x_max + REGION_TOLERANCE
            && vertex.y >= self.y_min - REGION_TOLERANCE
            && vertex.y <= self.y_max + REGION_TOLERANCE
    }
}

/// Prescribed values on every node inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub name: String,
    pub region: BoundaryRegion,
    /// `(component, value)` pairs
    pub targets: Vec<(usize, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Force per unit volume, integrated over elements inside the region
    Volume,
    /// Force per unit length, integrated over boundary edges in the region
    Traction,
    /// Point force on every node inside the region
    Nodal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRule {
    pub name: String,
    pub kind: LoadKind,
    pub region: BoundaryRegion,
    /// One value per component, zero where the input names none
    pub values: Vec<f64>,
}

/// A complete analysis definition
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub analysis: AnalysisKind,
    pub mesh: MeshSpec,
    /// Absent for laminated plates whose layers carry their own moduli
    pub material: Option<MaterialSpec>,
    pub laminate: Option<Laminate>,
    pub thickness: f64,
    pub gauss_order: usize,
    pub kappa: f64,
    pub fiber_z: f64,
    pub boundary_conditions: Vec<BoundaryRule>,
    pub loads: Vec<LoadRule>,
    pub solver: SolverOptions,
}

fn required<'a>(json: &'a JsonValue, field: &str, section: &str) -> Result<&'a JsonValue> {
    if !json.has_key(field) {
        return Err(LaminaError::Input(format!(
            "Input json missing {field} field in {section} section"
        )));
    }
    Ok(&json[field])
}

fn required_f64(json: &JsonValue, field: &str, section: &str) -> Result<f64> {
    match required(json, field, section)?.as_f64() {
        Some(value) => Ok(value),
        None => Err(LaminaError::Input(format!(
            "Bad value for {field} in {section}, expected a number"
        ))),
    }
}

fn required_usize(json: &JsonValue, field: &str, section: &str) -> Result<usize> {
    match required(json, field, section)?.as_usize() {
        Some(value) => Ok(value),
        None => Err(LaminaError::Input(format!(
            "Bad value for {field} in {section}, expected a non-negative integer"
        ))),
    }
}

fn optional_f64(json: &JsonValue, field: &str, section: &str) -> Result<Option<f64>> {
    if !json.has_key(field) {
        return Ok(None);
    }
    required_f64(json, field, section).map(Some)
}

fn optional_usize(json: &JsonValue, field: &str, section: &str) -> Result<Option<usize>> {
    if !json.has_key(field) {
        return Ok(None);
    }
    required_usize(json, field, section).map(Some)
}

fn parse_mesh(json: &JsonValue) -> Result<MeshSpec> {
    let section = required(json, "mesh", "root")?;
    let mesh = MeshSpec {
        x_count: required_usize(section, "x_count", "mesh")?,
        y_count: required_usize(section, "y_count", "mesh")?,
        x_origin: optional_f64(section, "x_origin", "mesh")?.unwrap_or(0.0),
        y_origin: optional_f64(section, "y_origin", "mesh")?.unwrap_or(0.0),
        width: required_f64(section, "width", "mesh")?,
        height: required_f64(section, "height", "mesh")?,
    };

    if mesh.x_count < 2 || mesh.y_count < 2 {
        return Err(LaminaError::Input(format!(
            "Mesh needs at least 2 nodes per direction, got {} x {}",
            mesh.x_count, mesh.y_count
        )));
    }
    if !(mesh.width > 0.0) || !(mesh.height > 0.0) {
        return Err(LaminaError::Input(format!(
            "Mesh extent must be positive, got {} x {}",
            mesh.width, mesh.height
        )));
    }

    Ok(mesh)
}

fn parse_material(json: &JsonValue) -> Result<MaterialSpec> {
    let section = required(json, "material", "root")?;
    let state = match section["state"].as_str() {
        None | Some("plane_stress") => PlaneState::PlaneStress,
        Some("plane_strain") => PlaneState::PlaneStrain,
        Some(other) => {
            return Err(LaminaError::Input(format!(
                "Unknown material state '{other}', expected plane_stress or plane_strain"
            )))
        }
    };

    Ok(MaterialSpec {
        youngs_modulus: required_f64(section, "youngs_modulus", "material")?,
        poisson_ratio: required_f64(section, "poisson_ratio", "material")?,
        state,
    })
}

fn parse_laminate(json: &JsonValue) -> Result<Laminate> {
    let layers_json = required(json, "layers", "root")?;
    if !layers_json.is_array() {
        return Err(LaminaError::Input("Input json layers field must be an array".to_owned()));
    }

    let mut layers = Vec::with_capacity(layers_json.len());
    for (i, layer) in layers_json.members().enumerate() {
        let section = format!("layers[{i}]");
        let thickness = required_f64(layer, "thickness", &section)?;
        let youngs_modulus = required_f64(layer, "youngs_modulus", &section)?;
        let poisson_ratio = required_f64(layer, "poisson_ratio", &section)?;
        layers.push(Layer {
            thickness,
            elasticity: plane_stress_isotropic(youngs_modulus, poisson_ratio),
        });
    }

    Laminate::new(layers)
}

fn parse_region(rule_json: &JsonValue, name: &str) -> Result<BoundaryRegion> {
    if !rule_json.has_key("region") {
        return Err(LaminaError::Input(format!(
            "Rule {name} is missing region field"
        )));
    }
    let region_json = &rule_json["region"];
    let mut region = BoundaryRegion::unbounded();

    if let Some(x_min) = optional_f64(region_json, "x_target_min", name)? {
        region.x_min = x_min;
    }
    if let Some(x_max) = optional_f64(region_json, "x_target_max", name)? {
        region.x_max = x_max;
    }
    if let Some(y_min) = optional_f64(region_json, "y_target_min", name)? {
        region.y_min = y_min;
    }
    if let Some(y_max) = optional_f64(region_json, "y_target_max", name)? {
        region.y_max = y_max;
    }

    if region.x_min > region.x_max {
        return Err(LaminaError::Input(format!(
            "Rule '{name}' has x_target_min greater than x_target_max"
        )));
    }
    if region.y_min > region.y_max {
        return Err(LaminaError::Input(format!(
            "Rule '{name}' has y_target_min greater than y_target_max"
        )));
    }

    Ok(region)
}

/// Reads `{component: value}` pairs of a rule into component indices
fn parse_components(
    object: &JsonValue,
    analysis: AnalysisKind,
    name: &str,
) -> Result<Vec<(usize, f64)>> {
    let context = format!("Rule '{name}'");
    let mut pairs = Vec::new();
    for (component, value) in object.entries() {
        let index = analysis.component_index(component, &context)?;
        let value = match value.as_f64() {
            Some(v) => v,
            None => {
                return Err(LaminaError::Input(format!(
                    "Bad value for {component} in {name}, expected a number"
                )))
            }
        };
        pairs.push((index, value));
    }
    Ok(pairs)
}

fn parse_boundary_conditions(
    json: &JsonValue,
    analysis: AnalysisKind,
) -> Result<Vec<BoundaryRule>> {
    let mut rules = Vec::new();

    for (name, rule_json) in json["boundary_conditions"].entries() {
        let region = parse_region(rule_json, name)?;
        if !rule_json.has_key("targets") {
            return Err(LaminaError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }
        let targets = parse_components(&rule_json["targets"], analysis, name)?;
        if targets.is_empty() {
            return Err(LaminaError::Input(format!(
                "Boundary rule '{name}' prescribes no components"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_owned(),
            region,
            targets,
        });
    }

    Ok(rules)
}

fn parse_loads(json: &JsonValue, analysis: AnalysisKind) -> Result<Vec<LoadRule>> {
    let mut rules = Vec::new();

    for (name, rule_json) in json["loads"].entries() {
        let kind = match rule_json["kind"].as_str() {
            Some("volume") => LoadKind::Volume,
            Some("traction") => LoadKind::Traction,
            Some("nodal") => LoadKind::Nodal,
            Some(other) => {
                return Err(LaminaError::Input(format!(
                    "Load '{name}' has unknown kind '{other}', expected volume, traction or nodal"
                )))
            }
            None => {
                return Err(LaminaError::Input(format!(
                    "Load {name} is missing kind field"
                )))
            }
        };
        let region = if rule_json.has_key("region") {
            parse_region(rule_json, name)?
        } else {
            BoundaryRegion::unbounded()
        };
        if !rule_json.has_key("values") {
            return Err(LaminaError::Input(format!(
                "Load {name} is missing values field"
            )));
        }

        let mut values = vec![0.0; analysis.freedom()];
        for (component, value) in parse_components(&rule_json["values"], analysis, name)? {
            values[component] = value;
        }

        rules.push(LoadRule {
            name: name.to_owned(),
            kind,
            region,
            values,
        });
    }

    Ok(rules)
}

fn parse_solver(json: &JsonValue) -> Result<SolverOptions> {
    let section = &json["solver"];
    Ok(SolverOptions {
        tolerance: optional_f64(section, "tolerance", "solver")?.unwrap_or(DEFAULT_TOLERANCE),
        max_iterations: optional_usize(section, "max_iterations", "solver")?.map(|n| n as u64),
    })
}

/// Parses an analysis definition from JSON text
pub fn parse_input(text: &str) -> Result<ModelMetadata> {
    let input_json = match json::parse(text) {
        Ok(j) => j,
        Err(err) => return Err(LaminaError::Input(format!("Error in input file json: {err}"))),
    };

    let analysis_name = match required(&input_json, "analysis", "root")?.as_str() {
        Some(name) => name,
        None => {
            return Err(LaminaError::Input(
                "Bad value for analysis, expected a string".to_owned(),
            ))
        }
    };
    let analysis = AnalysisKind::parse(analysis_name)?;

    let mesh = parse_mesh(&input_json)?;

    let (material, laminate) = match analysis {
        AnalysisKind::LaminatedPlate => (None, Some(parse_laminate(&input_json)?)),
        _ => (Some(parse_material(&input_json)?), None),
    };

    let thickness = match analysis {
        AnalysisKind::PlaneQuads | AnalysisKind::MindlinPlate => {
            required_f64(&input_json, "thickness", "root")?
        }
        AnalysisKind::PlaneTriangles => 1.0,
        AnalysisKind::LaminatedPlate => laminate
            .as_ref()
            .map(|l| l.total_thickness())
            .unwrap_or(0.0),
    };

    let metadata = ModelMetadata {
        analysis,
        mesh,
        material,
        laminate,
        thickness,
        gauss_order: optional_usize(&input_json, "gauss_order", "root")?
            .unwrap_or_else(|| analysis.default_gauss_order()),
        kappa: optional_f64(&input_json, "kappa", "root")?.unwrap_or(DEFAULT_KAPPA),
        fiber_z: optional_f64(&input_json, "fiber_z", "root")?.unwrap_or(0.0),
        boundary_conditions: parse_boundary_conditions(&input_json, analysis)?,
        loads: parse_loads(&input_json, analysis)?,
        solver: parse_solver(&input_json)?,
    };

    info!(
        "loaded {:?} analysis with {} boundary rules and {} loads",
        metadata.analysis,
        metadata.boundary_conditions.len(),
        metadata.loads.len()
    );

    Ok(metadata)
}

/// Reads and parses the input file
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn load_input_file(input_file: &str) -> Result<ModelMetadata> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(LaminaError::Input(format!(
                "Unable to open input file {input_file}: {err}"
            )))
        }
    };

    parse_input(&file_string)
}
