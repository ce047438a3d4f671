//! Basic procedural mesh generation routines.

use super::{BoundaryDescription, ElementDescription, MeshDescription};
use hpfem_quadrature::ReferenceShape;

/// Marker of all elements of generated meshes.
pub const DOMAIN_MARKER: &str = "domain";

/// Boundary markers of generated rectangles, counter-clockwise starting at the bottom side.
pub const RECTANGLE_BOUNDARY_MARKERS: [&str; 4] = ["bottom", "right", "top", "left"];

pub fn create_unit_square_mesh_description(cells_per_dim: usize, shape: ReferenceShape) -> MeshDescription {
    create_rectangular_mesh_description([0.0, 0.0], [1.0, 1.0], [cells_per_dim, cells_per_dim], shape)
}

/// Generates a uniform mesh of the axis-aligned rectangle with corners `min` and `max`.
///
/// With triangles, every cell is split along its diagonal from the lower left to the upper
/// right corner. Boundary edges are tagged with [`RECTANGLE_BOUNDARY_MARKERS`].
pub fn create_rectangular_mesh_description(
    min: [f64; 2],
    max: [f64; 2],
    cells: [usize; 2],
    shape: ReferenceShape,
) -> MeshDescription {
    let [nx, ny] = cells;
    let mut description = MeshDescription {
        vertices: Vec::new(),
        elements: Vec::new(),
        boundaries: Vec::new(),
    };
    if nx == 0 || ny == 0 {
        return description;
    }

    let hx = (max[0] - min[0]) / nx as f64;
    let hy = (max[1] - min[1]) / ny as f64;
    let vertex = |i: usize, j: usize| (nx + 1) * j + i;
    for j in 0..=ny {
        for i in 0..=nx {
            description
                .vertices
                .push([min[0] + i as f64 * hx, min[1] + j as f64 * hy]);
        }
    }

    let element = |vertices: Vec<usize>| ElementDescription {
        vertices,
        marker: DOMAIN_MARKER.to_string(),
    };
    for j in 0..ny {
        for i in 0..nx {
            let (a, b, c, d) = (vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1));
            match shape {
                ReferenceShape::Quadrilateral => description.elements.push(element(vec![a, b, c, d])),
                ReferenceShape::Triangle => {
                    description.elements.push(element(vec![a, b, c]));
                    description.elements.push(element(vec![a, c, d]));
                }
            }
        }
    }

    let boundary = |vertices: [usize; 2], side: usize| BoundaryDescription {
        vertices,
        marker: RECTANGLE_BOUNDARY_MARKERS[side].to_string(),
    };
    for i in 0..nx {
        description.boundaries.push(boundary([vertex(i, 0), vertex(i + 1, 0)], 0));
        description
            .boundaries
            .push(boundary([vertex(i + 1, ny), vertex(i, ny)], 2));
    }
    for j in 0..ny {
        description
            .boundaries
            .push(boundary([vertex(nx, j), vertex(nx, j + 1)], 1));
        description.boundaries.push(boundary([vertex(0, j + 1), vertex(0, j)], 3));
    }
    description
}
