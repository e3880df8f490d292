use super::mesh::{Node, StructuredGrid};

/// Regular grid of `nx` x `ny` nodes spanning `origin + [0, width] x [0, height]`.
/// Boundary nodes are tagged "left", "right", "bottom" and "top".
pub fn create_regular_grid(origin: [f64; 2], width: f64, height: f64, nx: usize, ny: usize) -> StructuredGrid {
    let dx = if nx > 1 { width / (nx - 1) as f64 } else { 0.0 };
    let dy = if ny > 1 { height / (ny - 1) as f64 } else { 0.0 };

    let mut nodes = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let mut labels = Vec::new();
            if i == 0 {
                labels.push("left".to_string());
            }
            if i + 1 == nx {
                labels.push("right".to_string());
            }
            if j == 0 {
                labels.push("bottom".to_string());
            }
            if j + 1 == ny {
                labels.push("top".to_string());
            }
            nodes.push(Node {
                id: j * nx + i,
                position: [origin[0] + i as f64 * dx, origin[1] + j as f64 * dy, 0.0],
                labels,
            });
        }
    }

    StructuredGrid { nodes, nx, ny }
}

/// Solid layer below and fluid layer above the line y = 0.
///
/// Both grids carry their own copy of the y = 0 row, tagged "interface".
pub fn create_fsi_strip(
    width: f64,
    solid_height: f64,
    fluid_height: f64,
    nx: usize,
    ny_solid: usize,
    ny_fluid: usize,
) -> (StructuredGrid, StructuredGrid) {
    let mut solid = create_regular_grid([0.0, -solid_height], width, solid_height, nx, ny_solid);
    let mut fluid = create_regular_grid([0.0, 0.0], width, fluid_height, nx, ny_fluid);

    for n in solid.nodes.iter_mut().filter(|n| n.labels.iter().any(|l| l == "top")) {
        n.labels.push("interface".to_string());
    }
    for n in fluid.nodes.iter_mut().filter(|n| n.labels.iter().any(|l| l == "bottom")) {
        n.labels.push("interface".to_string());
    }
    (solid, fluid)
}
