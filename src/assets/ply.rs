//! Stanford PLY: ascii and both binary encodings. Reads vertex positions, normals and
//! colors, plus `face` lists which are fan-triangulated. Other elements are skipped.

use super::{AssetError, MeshData, ParsedAsset, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Scalar {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Scalar::I8,
            "uchar" | "uint8" => Scalar::U8,
            "short" | "int16" => Scalar::I16,
            "ushort" | "uint16" => Scalar::U16,
            "int" | "int32" => Scalar::I32,
            "uint" | "uint32" => Scalar::U32,
            "float" | "float32" => Scalar::F32,
            "double" | "float64" => Scalar::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Scalar::I8 | Scalar::U8 => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PropertyKind {
    Scalar(Scalar),
    List { count: Scalar, item: Scalar },
}

#[derive(Debug, Clone, PartialEq)]
struct Property {
    name: String,
    kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
    body_offset: usize,
}

fn parse_header(path: &str, bytes: &[u8]) -> Result<Header, AssetError> {
    let mut offset = 0;
    let mut lines = Vec::new();
    loop {
        let Some(end) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            return Err(AssetError::parse(path, "missing end_header"));
        };
        let line = std::str::from_utf8(&bytes[offset..offset + end])
            .map_err(|err| AssetError::parse(path, err))?
            .trim_end_matches('\r')
            .trim();
        offset += end + 1;
        if line == "end_header" {
            break;
        }
        lines.push(line);
    }

    if lines.first() != Some(&"ply") {
        return Err(AssetError::parse(path, "missing ply magic"));
    }

    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();
    for line in &lines[1..] {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["format", name, _version] => {
                encoding = Some(match *name {
                    "ascii" => Encoding::Ascii,
                    "binary_little_endian" => Encoding::LittleEndian,
                    "binary_big_endian" => Encoding::BigEndian,
                    other => {
                        return Err(AssetError::parse(path, format!("unknown encoding {}", other)))
                    }
                });
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| AssetError::parse(path, format!("bad element count {}", count)))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count, item, name] => {
                let (Some(count), Some(item)) = (Scalar::parse(count), Scalar::parse(item)) else {
                    return Err(AssetError::parse(path, format!("bad list property {}", line)));
                };
                push_property(path, &mut elements, name, PropertyKind::List { count, item })?;
            }
            ["property", ty, name] => {
                let Some(ty) = Scalar::parse(ty) else {
                    return Err(AssetError::parse(path, format!("unknown property type {}", ty)));
                };
                push_property(path, &mut elements, name, PropertyKind::Scalar(ty))?;
            }
            ["comment", ..] | ["obj_info", ..] | [] => {}
            _ => return Err(AssetError::parse(path, format!("unexpected header line {:?}", line))),
        }
    }

    let Some(encoding) = encoding else {
        return Err(AssetError::parse(path, "missing format line"));
    };
    Ok(Header {
        encoding,
        elements,
        body_offset: offset,
    })
}

fn push_property(
    path: &str,
    elements: &mut [Element],
    name: &str,
    kind: PropertyKind,
) -> Result<(), AssetError> {
    let Some(element) = elements.last_mut() else {
        return Err(AssetError::parse(path, "property before any element"));
    };
    element.properties.push(Property {
        name: name.to_string(),
        kind,
    });
    Ok(())
}

/// Sequential value reader over the body, whatever its encoding.
struct BodyReader<'a> {
    path: &'a str,
    encoding: Encoding,
    bytes: &'a [u8],
    cursor: usize,
    words: std::str::SplitAsciiWhitespace<'a>,
}

impl<'a> BodyReader<'a> {
    fn new(path: &'a str, encoding: Encoding, bytes: &'a [u8]) -> Result<Self, AssetError> {
        let text = if encoding == Encoding::Ascii {
            std::str::from_utf8(bytes).map_err(|err| AssetError::parse(path, err))?
        } else {
            ""
        };
        Ok(Self {
            path,
            encoding,
            bytes,
            cursor: 0,
            words: text.split_ascii_whitespace(),
        })
    }

    fn read(&mut self, scalar: Scalar) -> Result<f64, AssetError> {
        if self.encoding == Encoding::Ascii {
            let Some(word) = self.words.next() else {
                return Err(AssetError::parse(self.path, "unexpected end of data"));
            };
            return word
                .parse::<f64>()
                .map_err(|_| AssetError::parse(self.path, format!("bad number {:?}", word)));
        }

        let size = scalar.size();
        let Some(raw) = self.bytes.get(self.cursor..self.cursor + size) else {
            return Err(AssetError::parse(self.path, "unexpected end of data"));
        };
        self.cursor += size;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(raw);
        if self.encoding == Encoding::BigEndian {
            buf[..size].reverse();
        }
        Ok(match scalar {
            Scalar::I8 => buf[0] as i8 as f64,
            Scalar::U8 => buf[0] as f64,
            Scalar::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            Scalar::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            Scalar::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Scalar::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Scalar::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Scalar::F64 => f64::from_le_bytes(buf),
        })
    }
}

fn color_scale(scalar: Scalar) -> f32 {
    match scalar {
        Scalar::F32 | Scalar::F64 => 1.0,
        Scalar::U16 | Scalar::I16 => 1.0 / 65535.0,
        _ => 1.0 / 255.0,
    }
}

pub(super) fn parse(path: &str, bytes: &[u8]) -> Result<ParsedAsset, AssetError> {
    let header = parse_header(path, bytes)?;
    let mut reader = BodyReader::new(path, header.encoding, &bytes[header.body_offset..])?;

    let mut mesh = MeshData::default();
    let mut faces: Vec<u32> = Vec::new();
    let mut saw_faces = false;

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => read_vertices(&mut reader, element, &mut mesh)?,
            "face" => {
                saw_faces = true;
                read_faces(&mut reader, element, &mut faces)?;
            }
            _ => skip_element(&mut reader, element)?,
        }
    }

    if saw_faces && !faces.is_empty() {
        mesh.indices = Some(faces);
    } else {
        mesh.topology = Topology::Points;
    }
    Ok(ParsedAsset::Geometry(mesh))
}

fn read_vertices(
    reader: &mut BodyReader<'_>,
    element: &Element,
    mesh: &mut MeshData,
) -> Result<(), AssetError> {
    let slot = |name: &str| element.properties.iter().position(|p| p.name == name);
    let (Some(x), Some(y), Some(z)) = (slot("x"), slot("y"), slot("z")) else {
        return Err(AssetError::parse(reader.path, "vertex element lacks x/y/z"));
    };
    let normal = match (slot("nx"), slot("ny"), slot("nz")) {
        (Some(nx), Some(ny), Some(nz)) => Some([nx, ny, nz]),
        _ => None,
    };
    let color = match (slot("red"), slot("green"), slot("blue")) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };
    let alpha = slot("alpha");

    let mut values = vec![0.0f64; element.properties.len()];
    let mut scales = vec![1.0f32; element.properties.len()];
    for (index, property) in element.properties.iter().enumerate() {
        if let PropertyKind::Scalar(scalar) = property.kind {
            scales[index] = color_scale(scalar);
        }
    }

    for _ in 0..element.count {
        for (index, property) in element.properties.iter().enumerate() {
            values[index] = match &property.kind {
                PropertyKind::Scalar(scalar) => reader.read(*scalar)?,
                PropertyKind::List { count, item } => {
                    let len = reader.read(*count)? as usize;
                    for _ in 0..len {
                        reader.read(*item)?;
                    }
                    0.0
                }
            };
        }
        mesh.positions
            .push([values[x] as f32, values[y] as f32, values[z] as f32]);
        if let Some([nx, ny, nz]) = normal {
            mesh.normals
                .push([values[nx] as f32, values[ny] as f32, values[nz] as f32]);
        }
        if let Some([r, g, b]) = color {
            let a = alpha.map_or(1.0, |a| values[a] as f32 * scales[a]);
            mesh.colors.push([
                values[r] as f32 * scales[r],
                values[g] as f32 * scales[g],
                values[b] as f32 * scales[b],
                a,
            ]);
        }
    }
    Ok(())
}

fn read_faces(
    reader: &mut BodyReader<'_>,
    element: &Element,
    faces: &mut Vec<u32>,
) -> Result<(), AssetError> {
    let list = element.properties.iter().position(|p| {
        matches!(p.kind, PropertyKind::List { .. })
            && (p.name == "vertex_indices" || p.name == "vertex_index")
    });
    let mut polygon = Vec::new();
    for _ in 0..element.count {
        for (index, property) in element.properties.iter().enumerate() {
            match &property.kind {
                PropertyKind::Scalar(scalar) => {
                    reader.read(*scalar)?;
                }
                PropertyKind::List { count, item } => {
                    let len = reader.read(*count)? as usize;
                    polygon.clear();
                    for _ in 0..len {
                        let value = reader.read(*item)?;
                        if value < 0.0 {
                            return Err(AssetError::parse(reader.path, "negative face index"));
                        }
                        polygon.push(value as u32);
                    }
                    if Some(index) == list {
                        for i in 1..polygon.len().saturating_sub(1) {
                            faces.extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn skip_element(reader: &mut BodyReader<'_>, element: &Element) -> Result<(), AssetError> {
    for _ in 0..element.count {
        for property in &element.properties {
            match &property.kind {
                PropertyKind::Scalar(scalar) => {
                    reader.read(*scalar)?;
                }
                PropertyKind::List { count, item } => {
                    let len = reader.read(*count)? as usize;
                    for _ in 0..len {
                        reader.read(*item)?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::assets::{AssetError, ParsedAsset, Topology};

    #[test]
    fn ascii_quad_with_colors() {
        let text = "ply\nformat ascii 1.0\ncomment made by hand\nelement vertex 4\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0 255 0 0\n1 0 0 0 255 0\n1 1 0 0 0 255\n0 1 0 255 255 255\n4 0 1 2 3\n";
        let ParsedAsset::Geometry(mesh) = parse("quad.ply", text.as_bytes()).unwrap() else {
            panic!("Expected geometry");
        };
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices, Some(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(mesh.colors[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(mesh.topology, Topology::Triangles);
    }

    #[test]
    fn binary_big_endian_points() {
        let mut bytes = b"ply\nformat binary_big_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n".to_vec();
        for value in [1.0f32, 2.0, 3.0, -1.0, -2.0, -3.0] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        let ParsedAsset::Geometry(mesh) = parse("cloud.ply", &bytes).unwrap() else {
            panic!("Expected geometry");
        };
        assert_eq!(mesh.positions, vec![[1.0, 2.0, 3.0], [-1.0, -2.0, -3.0]]);
        assert_eq!(mesh.topology, Topology::Points);
        assert!(mesh.indices.is_none());
    }

    #[test]
    fn binary_little_endian_skips_unknown_elements() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 3\nproperty double x\nproperty double y\nproperty double z\nelement edge 1\nproperty int vertex1\nproperty int vertex2\nelement face 1\nproperty list uchar uint vertex_indices\nend_header\n".to_vec();
        for value in [0.0f64, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(3);
        for index in [0u32, 1, 2] {
            bytes.extend_from_slice(&index.to_le_bytes());
        }
        let ParsedAsset::Geometry(mesh) = parse("tri.ply", &bytes).unwrap() else {
            panic!("Expected geometry");
        };
        assert_eq!(mesh.indices, Some(vec![0, 1, 2]));
    }

    #[test]
    fn missing_magic_or_truncated_body_fails() {
        assert!(matches!(
            parse("x.ply", b"plx\nformat ascii 1.0\nend_header\n"),
            Err(AssetError::Parse { .. })
        ));
        let truncated = b"ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n";
        assert!(matches!(
            parse("x.ply", truncated),
            Err(AssetError::Parse { .. })
        ));
    }
}
