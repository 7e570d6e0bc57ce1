//! glTF 2.0 and GLB import into a node hierarchy.

use super::{AssetError, MeshData, NodeData, ParsedAsset, Topology};
use glam::Mat4;
use std::path::Path;

pub(super) fn parse(path: &Path, bytes: &[u8]) -> Result<ParsedAsset, AssetError> {
    let display = path.display().to_string();
    let gltf = gltf::Gltf::from_slice(bytes).map_err(|err| AssetError::parse(&display, err))?;
    let gltf::Gltf { document, blob } = gltf;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)
        .map_err(|err| AssetError::parse(&display, err))?;

    let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) else {
        return Err(AssetError::parse(&display, "document has no scene"));
    };

    let mut root = NodeData::group(scene.name().unwrap_or("scene"));
    for node in scene.nodes() {
        root.children.push(convert_node(&node, &buffers));
    }
    Ok(ParsedAsset::Scene(root))
}

fn convert_node(node: &gltf::Node<'_>, buffers: &[gltf::buffer::Data]) -> NodeData {
    let mut out = NodeData::group(node.name().unwrap_or_default());
    out.transform = Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let topology = match primitive.mode() {
                gltf::mesh::Mode::Triangles => Topology::Triangles,
                gltf::mesh::Mode::Points => Topology::Points,
                other => {
                    log::debug!("Skipping {:?} primitive in mesh {}", other, mesh.index());
                    continue;
                }
            };
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals = reader
                .read_normals()
                .map(|normals| normals.collect())
                .unwrap_or_default();
            let colors = reader
                .read_colors(0)
                .map(|colors| colors.into_rgba_f32().collect())
                .unwrap_or_default();
            let indices = reader
                .read_indices()
                .map(|indices| indices.into_u32().collect());
            let base_color = primitive
                .material()
                .pbr_metallic_roughness()
                .base_color_factor();

            out.meshes.push(MeshData {
                positions,
                normals,
                colors,
                indices,
                topology,
                base_color,
            });
        }
    }

    for child in node.children() {
        out.children.push(convert_node(&child, buffers));
    }
    out
}
