use std::io::Write;

use tracing::info;

use crate::{
    analysis::AnalysisResult,
    error::{LaminaError, Result},
};

const STRESS_COLUMNS: [&str; 6] = ["sigma_x", "sigma_y", "tau_xy", "tau_xz", "tau_yz", "von_mises"];

/// Writes nodal results as CSV: one row per node with its coordinates,
/// displacement components and, when recovered, the stress components
///
/// # Arguments
/// * `result` - The solved analysis
/// * `output` - Anything implementing Write
pub fn write_csv<W: Write>(result: &AnalysisResult, output: &mut W) -> Result<()> {
    let write_err =
        |err: std::io::Error| LaminaError::PostProcessor(format!("Failed to write csv: {err}"));

    let components = result.analysis.components();
    let freedom = components.len();

    let mut header: Vec<&str> = vec!["x", "y"];
    header.extend_from_slice(components);
    if result.stresses.is_some() {
        header.extend_from_slice(&STRESS_COLUMNS);
    }
    writeln!(output, "{}", header.join(",")).map_err(write_err)?;

    for (node, vertex) in result.nodes.iter().enumerate() {
        let mut row: Vec<String> = vec![vertex.x.to_string(), vertex.y.to_string()];
        row.extend(
            result
                .displacement
                .rows(node * freedom, freedom)
                .iter()
                .map(|u| u.to_string()),
        );
        if let Some(stresses) = &result.stresses {
            row.extend(
                [
                    stresses.sigma_x[node],
                    stresses.sigma_y[node],
                    stresses.tau_xy[node],
                    stresses.tau_xz[node],
                    stresses.tau_yz[node],
                    stresses.von_mises[node],
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }
        writeln!(output, "{}", row.join(",")).map_err(write_err)?;
    }

    Ok(())
}

/// Writes nodal results to a CSV file
///
/// # Arguments
/// * `result` - The solved analysis
/// * `nodes_output` - The filename of the output csv
pub fn csv_output(result: &AnalysisResult, nodes_output: &str) -> Result<()> {
    let file = match std::fs::File::create(nodes_output) {
        Ok(f) => f,
        Err(err) => {
            return Err(LaminaError::PostProcessor(format!(
                "Failed to create {nodes_output}: {err}"
            )));
        }
    };

    let mut writer = std::io::BufWriter::new(file);
    write_csv(result, &mut writer)?;
    if let Err(err) = writer.flush() {
        return Err(LaminaError::PostProcessor(format!(
            "Failed to write {nodes_output}: {err}"
        )));
    }

    info!("wrote {} nodes to {nodes_output}", result.nodes.len());

    Ok(())
}
