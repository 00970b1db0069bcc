use std::path::Path;

use cad_import::{
    loader::Manager,
    structure::{CADData, IndexData, Node, Point3D, Shape},
};
use log::{debug, error, info};
use nalgebra_glm::{Mat4, Vec3};

use crate::{math::transform_vec3, Error, Mesh, Result};

use super::{io_utils::TriangleIterator, Triangle};

/// Loads all triangles of the given CAD file into a single mesh. The node transformations are
/// applied to the vertices.
///
/// # Arguments
/// * `path` - The path to load the mesh from.
pub fn load_mesh<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let cad_data = load_cad_data(path.as_ref())?;

    let mut mesh = Mesh::default();
    add_cad_data_to_mesh(&mut mesh, &cad_data);

    info!(
        "Loaded mesh {:?} with {} vertices and {} triangles",
        path.as_ref(),
        mesh.vertices.len(),
        mesh.num_triangles()
    );

    Ok(mesh)
}

/// Loads the mesh from the given path and normalizes it into the unit sphere.
///
/// # Arguments
/// * `path` - The path to load the mesh from.
pub fn load_and_normalize_mesh<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let mut mesh = load_mesh(path)?;
    mesh.normalize_to_unit_sphere();

    Ok(mesh)
}

/// Tries to load the cad data from the given path
///
/// # Arguments
/// * `file_path` - The path to load the CAD data from.
fn load_cad_data(file_path: &Path) -> Result<CADData> {
    let manager = Manager::new();

    let mime_types = determine_mime_types(&manager, file_path)?;

    for mime_type in mime_types.iter() {
        if let Some(loader) = manager.get_loader_by_mime_type(mime_type.as_str()) {
            let cad_data = loader
                .read_file(file_path, mime_type)
                .map_err(Error::CadImport)?;

            return Ok(cad_data);
        }
    }

    error!("Cannot find loader for the input file {:?}", file_path);
    Err(Error::NoLoaderFound)
}

/// Tries to find the mime types for the given file based on the file extension.
///
/// # Arguments
/// * `manager` - The loader manager that knows the supported extensions.
/// * `input_file` - The input file whose extension will be used
pub fn determine_mime_types(manager: &Manager, input_file: &Path) -> Result<Vec<String>> {
    match input_file.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => Ok(manager.get_mime_types_for_extension(ext)),
        None => Err(Error::InvalidFileExtension),
    }
}

/// Appends all triangles of the given CAD data to the mesh.
///
/// # Arguments
/// * `mesh` - The mesh to which the triangles will be appended.
/// * `cad_data` - The CAD data to flatten.
pub fn add_cad_data_to_mesh(mesh: &mut Mesh, cad_data: &CADData) {
    let root_node = cad_data.get_root_node();
    let transform = node_transform(root_node).unwrap_or_else(Mat4::identity);

    traverse(mesh, root_node, &transform);
}

/// Returns the local transformation of the given node, if it has one.
fn node_transform(node: &Node) -> Option<Mat4> {
    node.get_transform()
        .map(|t| Mat4::from_column_slice(t.as_slice()))
}

/// Recursively visits the node tree and appends the shapes of every node in world coordinates.
///
/// # Arguments
/// * `mesh` - The mesh to which the triangles will be appended.
/// * `node` - The currently visited node.
/// * `transform` - The accumulated transformation of the visited node.
fn traverse(mesh: &mut Mesh, node: &Node, transform: &Mat4) {
    for shape in node.get_shapes() {
        append_shape(mesh, shape, transform);
    }

    for child in node.get_children().iter() {
        let child_transform = match node_transform(child) {
            Some(t) => transform * t,
            None => *transform,
        };

        traverse(mesh, child, &child_transform);
    }
}

/// Appends the triangle parts of the given shape to the mesh.
///
/// # Arguments
/// * `mesh` - The mesh to which the triangles will be appended.
/// * `shape` - The shape whose parts are appended.
/// * `transform` - The transformation into world coordinates.
fn append_shape(mesh: &mut Mesh, shape: &Shape, transform: &Mat4) {
    for part in shape.get_parts() {
        let in_mesh = part.get_mesh();
        let positions = in_mesh.get_vertices().get_positions().as_slice();
        let in_primitive_data = in_mesh.get_primitives();
        let primitive_type = in_primitive_data.get_primitive_type();

        let appended = match in_primitive_data.get_raw_index_data() {
            IndexData::Indices(indices) => {
                TriangleIterator::new(primitive_type, indices.iter().copied())
                    .map(|triangles| append_triangles(mesh, positions, transform, triangles))
            }
            IndexData::NonIndexed(n) => {
                TriangleIterator::new(primitive_type, 0..(*n as u32))
                    .map(|triangles| append_triangles(mesh, positions, transform, triangles))
            }
        };

        if appended.is_none() {
            debug!("Primitive type {:?} is not triangle", primitive_type);
        }
    }
}

/// Appends the given triangles and their vertices to the mesh.
///
/// # Arguments
/// * `mesh` - The mesh to which the triangles will be appended.
/// * `pos` - The positions of the vertices of the triangles.
/// * `transform` - The transformation into world coordinates.
/// * `triangles` - The triangles to append to the mesh.
fn append_triangles<I>(
    mesh: &mut Mesh,
    pos: &[Point3D],
    transform: &Mat4,
    triangles: TriangleIterator<I>,
) where
    I: Iterator<Item = u32>,
{
    let index_offset = mesh.vertices.len() as u32;

    mesh.vertices.extend(
        pos.iter()
            .map(|p| transform_vec3(transform, &Vec3::from_row_slice(p.0.as_slice()))),
    );

    mesh.indices
        .extend(triangles.map(|t: Triangle| t.add_scalar(index_offset)));
}
