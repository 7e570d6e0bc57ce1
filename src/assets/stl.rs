//! Binary and ASCII STL.

use super::{AssetError, MeshData, ParsedAsset};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Normal plus three vertices, as little-endian float bits.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FacetRecord {
    words: [u32; 12],
}

impl FacetRecord {
    fn vector(&self, slot: usize) -> [f32; 3] {
        let base = slot * 3;
        [
            f32::from_bits(u32::from_le(self.words[base])),
            f32::from_bits(u32::from_le(self.words[base + 1])),
            f32::from_bits(u32::from_le(self.words[base + 2])),
        ]
    }
}

pub(super) fn parse(path: &str, bytes: &[u8]) -> Result<ParsedAsset, AssetError> {
    let mesh = if is_binary(bytes) {
        parse_binary(path, bytes)?
    } else {
        parse_ascii(path, bytes)?
    };
    Ok(ParsedAsset::Geometry(mesh))
}

fn binary_facet_count(bytes: &[u8]) -> Option<usize> {
    let count = bytes.get(HEADER_LEN..HEADER_LEN + 4)?;
    Some(u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize)
}

fn is_binary(bytes: &[u8]) -> bool {
    if let Some(count) = binary_facet_count(bytes) {
        if HEADER_LEN + 4 + count * FACET_LEN == bytes.len() {
            return true;
        }
    }
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    !bytes[start..].starts_with(b"solid")
}

fn parse_binary(path: &str, bytes: &[u8]) -> Result<MeshData, AssetError> {
    let Some(count) = binary_facet_count(bytes) else {
        return Err(AssetError::parse(path, "truncated binary STL header"));
    };
    let body = &bytes[HEADER_LEN + 4..];
    if body.len() < count * FACET_LEN {
        return Err(AssetError::parse(
            path,
            format!("binary STL declares {} facets but holds {} bytes", count, body.len()),
        ));
    }

    let mut mesh = MeshData::default();
    mesh.positions.reserve(count * 3);
    mesh.normals.reserve(count * 3);
    for chunk in body.chunks_exact(FACET_LEN).take(count) {
        let facet: FacetRecord = bytemuck::pod_read_unaligned(&chunk[..48]);
        let normal = facet.vector(0);
        for vertex in 1..=3 {
            mesh.positions.push(facet.vector(vertex));
            mesh.normals.push(normal);
        }
    }
    drop_degenerate_normals(&mut mesh);
    Ok(mesh)
}

fn parse_ascii(path: &str, bytes: &[u8]) -> Result<MeshData, AssetError> {
    let text = std::str::from_utf8(bytes).map_err(|err| AssetError::parse(path, err))?;
    let mut mesh = MeshData::default();
    let mut normal = [0.0; 3];
    let mut in_facet = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("facet") => {
                if words.next() == Some("normal") {
                    normal = read_vector(path, line_no, &mut words)?;
                }
                in_facet = 0;
            }
            Some("vertex") => {
                mesh.positions.push(read_vector(path, line_no, &mut words)?);
                mesh.normals.push(normal);
                in_facet += 1;
            }
            Some("endfacet") if in_facet != 3 => {
                return Err(AssetError::parse(
                    path,
                    format!("line {}: facet has {} vertices", line_no + 1, in_facet),
                ));
            }
            _ => {}
        }
    }
    if mesh.positions.len() % 3 != 0 {
        return Err(AssetError::parse(path, "vertex count is not a multiple of three"));
    }
    drop_degenerate_normals(&mut mesh);
    Ok(mesh)
}

fn read_vector<'a>(
    path: &str,
    line_no: usize,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<[f32; 3], AssetError> {
    let mut out = [0.0; 3];
    for value in &mut out {
        let Some(word) = words.next() else {
            return Err(AssetError::parse(path, format!("line {}: expected 3 numbers", line_no + 1)));
        };
        *value = word
            .parse()
            .map_err(|_| AssetError::parse(path, format!("line {}: bad number {:?}", line_no + 1, word)))?;
    }
    Ok(out)
}

/// Many exporters write zero facet normals; let the upload step recompute them.
fn drop_degenerate_normals(mesh: &mut MeshData) {
    if mesh.normals.iter().any(|n| n[0] == 0.0 && n[1] == 0.0 && n[2] == 0.0) {
        mesh.normals.clear();
    }
}
