use super::{AssetError, MeshData, ParsedAsset, Topology};

/// Whitespace separated `x y z [r g b]` rows, colors in 0..=255. `#` starts a comment line.
pub(super) fn parse(path: &str, text: &str) -> Result<ParsedAsset, AssetError> {
    let mut mesh = MeshData {
        topology: Topology::Points,
        ..MeshData::default()
    };

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|word| !word.is_empty())
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| AssetError::parse(path, format!("line {}: {}", line_no + 1, err)))?;
        if values.len() < 3 {
            return Err(AssetError::parse(
                path,
                format!("line {}: expected at least 3 values", line_no + 1),
            ));
        }
        mesh.positions.push([values[0], values[1], values[2]]);
        if values.len() >= 6 {
            mesh.colors.push([
                values[3] / 255.0,
                values[4] / 255.0,
                values[5] / 255.0,
                1.0,
            ]);
        }
    }

    if mesh.colors.len() != mesh.positions.len() {
        mesh.colors.clear();
    }
    Ok(ParsedAsset::Geometry(mesh))
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::assets::{AssetError, ParsedAsset, Topology};

    #[test]
    fn points_with_colors() {
        let text = "# scan\n0 0 0 255 0 0\n1.5 2 3 0 0 255\n";
        let ParsedAsset::Geometry(mesh) = parse("scan.xyz", text).unwrap() else {
            panic!("Expected geometry");
        };
        assert_eq!(mesh.topology, Topology::Points);
        assert_eq!(mesh.positions[1], [1.5, 2.0, 3.0]);
        assert_eq!(mesh.colors[1], [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn partial_colors_are_dropped() {
        let ParsedAsset::Geometry(mesh) = parse("scan.xyz", "0 0 0 10 10 10\n1 1 1\n").unwrap()
        else {
            panic!("Expected geometry");
        };
        assert_eq!(mesh.positions.len(), 2);
        assert!(mesh.colors.is_empty());
    }

    #[test]
    fn short_row_is_parse_error() {
        assert!(matches!(parse("bad.xyz", "1 2\n"), Err(AssetError::Parse { .. })));
    }
}
