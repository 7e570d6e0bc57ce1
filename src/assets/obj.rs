use super::{AssetError, MeshData, NodeData, ParsedAsset};

/// Every OBJ object becomes a child node of one group. Material libraries are not resolved.
pub(super) fn parse(path: &str, text: &str) -> Result<ParsedAsset, AssetError> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj_buf(
        &mut std::io::Cursor::new(text.as_bytes()),
        &options,
        |_| Ok((Vec::new(), Default::default())),
    )
    .map_err(|err| AssetError::parse(path, err))?;

    let mut root = NodeData::group("obj");
    for model in models {
        let mesh = model.mesh;
        let positions: Vec<[f32; 3]> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        let normals = if mesh.normals.len() == mesh.positions.len() {
            mesh.normals
                .chunks_exact(3)
                .map(|n| [n[0], n[1], n[2]])
                .collect()
        } else {
            Vec::new()
        };
        let colors = if mesh.vertex_color.len() == mesh.positions.len() {
            mesh.vertex_color
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2], 1.0])
                .collect()
        } else {
            Vec::new()
        };
        let indices = if mesh.indices.is_empty() {
            None
        } else {
            Some(mesh.indices)
        };

        let mut node = NodeData::group(model.name);
        node.meshes.push(MeshData {
            positions,
            normals,
            colors,
            indices,
            ..MeshData::default()
        });
        root.children.push(node);
    }
    Ok(ParsedAsset::Scene(root))
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::assets::ParsedAsset;

    #[test]
    fn quad_is_triangulated() {
        let text = "o quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let ParsedAsset::Scene(root) = parse("quad.obj", text).unwrap() else {
            panic!("Expected a scene");
        };
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "quad");
        let mesh = &root.children[0].meshes[0];
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices.as_ref().map(Vec::len), Some(6));
    }

    #[test]
    fn vertex_colors_are_kept() {
        let text = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n";
        let ParsedAsset::Scene(root) = parse("colored.obj", text).unwrap() else {
            panic!("Expected a scene");
        };
        let mesh = &root.children[0].meshes[0];
        assert_eq!(mesh.colors.len(), 3);
        assert_eq!(mesh.colors[0], [1.0, 0.0, 0.0, 1.0]);
    }
}
