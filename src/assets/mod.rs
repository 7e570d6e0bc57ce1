mod buffers;
pub mod cache;
mod gltf_scene;
mod obj;
mod ply;
mod stl;
mod xyz;

pub use buffers::{BufferPool, GpuBuffer};
pub use cache::SlotCache;

use glam::{Mat4, Vec3, Vec4};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("unsupported model format: {path}")]
    UnsupportedFormat { path: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

impl AssetError {
    pub(crate) fn parse(path: &str, message: impl std::fmt::Display) -> Self {
        AssetError::Parse {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Model container formats, chosen by file extension (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Gltf,
    Obj,
    Xyz,
    Stl,
    Ply,
}

impl AssetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gltf" | "glb" => Some(AssetFormat::Gltf),
            "obj" => Some(AssetFormat::Obj),
            "xyz" => Some(AssetFormat::Xyz),
            "stl" => Some(AssetFormat::Stl),
            "ply" => Some(AssetFormat::Ply),
            _ => None,
        }
    }

    /// Text formats are read as UTF-8 before being handed to a parser worker.
    pub fn is_text(self) -> bool {
        matches!(self, AssetFormat::Obj | AssetFormat::Xyz)
    }

    /// Container formats parsed in-process because they decode straight to a scene graph.
    pub fn parses_in_process(self) -> bool {
        matches!(self, AssetFormat::Gltf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Points,
}

/// Parser output: plain vertex data, not yet uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Option<Vec<u32>>,
    pub topology: Topology,
    pub base_color: [f32; 4],
}

impl Default for MeshData {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            indices: None,
            topology: Topology::Triangles,
            base_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl MeshData {
    fn validate(&self, path: &str) -> Result<(), AssetError> {
        let count = self.positions.len();
        if !self.normals.is_empty() && self.normals.len() != count {
            return Err(AssetError::parse(path, "normal count does not match vertex count"));
        }
        if !self.colors.is_empty() && self.colors.len() != count {
            return Err(AssetError::parse(path, "color count does not match vertex count"));
        }
        if let Some(indices) = &self.indices {
            if let Some(bad) = indices.iter().find(|index| **index as usize >= count) {
                return Err(AssetError::parse(
                    path,
                    format!("index {} out of range for {} vertices", bad, count),
                ));
            }
        }
        if self.positions.iter().flatten().any(|value| !value.is_finite()) {
            return Err(AssetError::parse(path, "non-finite vertex position"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub name: String,
    pub transform: Mat4,
    pub meshes: Vec<MeshData>,
    pub children: Vec<NodeData>,
}

impl NodeData {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn validate(&self, path: &str) -> Result<(), AssetError> {
        for mesh in &self.meshes {
            mesh.validate(path)?;
        }
        for child in &self.children {
            child.validate(path)?;
        }
        Ok(())
    }
}

/// Intermediate representation a parser worker hands back to the render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAsset {
    Scene(NodeData),
    Geometry(MeshData),
}

impl ParsedAsset {
    fn validate(&self, path: &str) -> Result<(), AssetError> {
        match self {
            ParsedAsset::Scene(node) => node.validate(path),
            ParsedAsset::Geometry(mesh) => mesh.validate(path),
        }
    }
}

/// Renderable mesh backed by a pool allocation.
#[derive(Debug)]
pub struct Mesh {
    buffer: GpuBuffer,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Option<Vec<Vec4>>,
    pub indices: Vec<u32>,
    pub topology: Topology,
    pub base_color: Vec4,
}

impl Mesh {
    fn upload(data: MeshData, pool: &mut BufferPool) -> Self {
        let positions: Vec<Vec3> = data.positions.iter().map(|p| Vec3::from_array(*p)).collect();
        let indices = match data.indices {
            Some(indices) => indices,
            None => (0..positions.len() as u32).collect(),
        };
        let normals = if data.normals.len() == positions.len() {
            data.normals.iter().map(|n| Vec3::from_array(*n)).collect()
        } else if data.topology == Topology::Triangles {
            compute_vertex_normals(&positions, &indices)
        } else {
            Vec::new()
        };
        let colors = if data.colors.len() == positions.len() && !data.colors.is_empty() {
            Some(data.colors.iter().map(|c| Vec4::from_array(*c)).collect::<Vec<_>>())
        } else {
            None
        };

        let bytes = positions.len() * 12
            + normals.len() * 12
            + colors.as_ref().map_or(0, |c| c.len() * 16)
            + indices.len() * 4;
        Self {
            buffer: pool.allocate(bytes),
            positions,
            normals,
            colors,
            indices,
            topology: data.topology,
            base_color: Vec4::from_array(data.base_color),
        }
    }

    fn dispose(self, pool: &mut BufferPool) -> usize {
        pool.release(self.buffer);
        1
    }

    pub fn triangle_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::Points => 0,
        }
    }
}

fn compute_vertex_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Z))
        .collect()
}

#[derive(Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Mat4,
    pub meshes: Vec<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    fn upload(data: NodeData, pool: &mut BufferPool) -> Self {
        Self {
            name: data.name,
            transform: data.transform,
            meshes: data
                .meshes
                .into_iter()
                .map(|mesh| Mesh::upload(mesh, pool))
                .collect(),
            children: data
                .children
                .into_iter()
                .map(|child| SceneNode::upload(child, pool))
                .collect(),
        }
    }

    fn dispose(self, pool: &mut BufferPool) -> usize {
        let mut released = 0;
        for mesh in self.meshes {
            released += mesh.dispose(pool);
        }
        for child in self.children {
            released += child.dispose(pool);
        }
        released
    }

    fn visit<'a>(&'a self, parent: Mat4, f: &mut dyn FnMut(Mat4, &'a Mesh)) {
        let world = parent * self.transform;
        for mesh in &self.meshes {
            f(world, mesh);
        }
        for child in &self.children {
            child.visit(world, f);
        }
    }
}

#[derive(Debug)]
pub enum AssetRoot {
    Scene(SceneNode),
    Geometry(Mesh),
}

/// A loaded model as displayed by one view slot.
#[derive(Debug)]
pub struct Asset {
    id: u64,
    root: AssetRoot,
}

impl Asset {
    pub fn upload(parsed: ParsedAsset, pool: &mut BufferPool) -> Self {
        let root = match parsed {
            ParsedAsset::Scene(node) => AssetRoot::Scene(SceneNode::upload(node, pool)),
            ParsedAsset::Geometry(mesh) => AssetRoot::Geometry(Mesh::upload(mesh, pool)),
        };
        Self {
            id: pool.next_asset_id(),
            root,
        }
    }

    /// Releases every buffer reachable from this asset. Returns the number released.
    pub fn dispose(self, pool: &mut BufferPool) -> usize {
        match self.root {
            AssetRoot::Scene(node) => node.dispose(pool),
            AssetRoot::Geometry(mesh) => mesh.dispose(pool),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn triangle_count(&self) -> usize {
        let mut triangles = 0;
        self.for_each_mesh(|_, mesh| triangles += mesh.triangle_count());
        triangles
    }

    /// Calls `f` with each mesh and its world transform.
    pub fn for_each_mesh<'a>(&'a self, mut f: impl FnMut(Mat4, &'a Mesh)) {
        match &self.root {
            AssetRoot::Scene(node) => node.visit(Mat4::IDENTITY, &mut f),
            AssetRoot::Geometry(mesh) => f(Mat4::IDENTITY, mesh),
        }
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(|_, _| count += 1);
        count
    }
}

/// Result of polling an in-flight load.
#[derive(Debug)]
pub enum LoadPoll {
    Pending,
    Complete(Result<ParsedAsset, AssetError>),
}

enum PendingState {
    Ready(Option<Result<ParsedAsset, AssetError>>),
    Worker(flume::Receiver<Result<ParsedAsset, AssetError>>),
}

/// Completion handle for one load; either already resolved or waiting on a parser worker.
pub struct PendingLoad {
    path: PathBuf,
    state: PendingState,
}

impl std::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            PendingState::Ready(Some(_)) => "ready",
            PendingState::Ready(None) => "taken",
            PendingState::Worker(_) => "worker",
        };
        f.debug_struct("PendingLoad")
            .field("path", &self.path)
            .field("state", &state)
            .finish()
    }
}

impl PendingLoad {
    pub fn ready(path: PathBuf, result: Result<ParsedAsset, AssetError>) -> Self {
        Self {
            path,
            state: PendingState::Ready(Some(result)),
        }
    }

    pub(crate) fn worker(path: PathBuf, receiver: flume::Receiver<Result<ParsedAsset, AssetError>>) -> Self {
        Self {
            path,
            state: PendingState::Worker(receiver),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking; yields `Complete` exactly once.
    pub fn poll(&mut self) -> LoadPoll {
        match &mut self.state {
            PendingState::Ready(result) => match result.take() {
                Some(result) => LoadPoll::Complete(result),
                None => LoadPoll::Pending,
            },
            PendingState::Worker(receiver) => match receiver.try_recv() {
                Ok(result) => {
                    self.state = PendingState::Ready(None);
                    LoadPoll::Complete(result)
                }
                Err(flume::TryRecvError::Empty) => LoadPoll::Pending,
                Err(flume::TryRecvError::Disconnected) => {
                    self.state = PendingState::Ready(None);
                    LoadPoll::Complete(Err(worker_gone(&self.path)))
                }
            },
        }
    }

    /// Blocks until the load resolves.
    pub fn wait(self) -> Result<ParsedAsset, AssetError> {
        match self.state {
            PendingState::Ready(Some(result)) => result,
            PendingState::Ready(None) => Err(AssetError::parse(
                &self.path.display().to_string(),
                "load result was already taken",
            )),
            PendingState::Worker(receiver) => receiver
                .recv()
                .unwrap_or_else(|_| Err(worker_gone(&self.path))),
        }
    }
}

fn worker_gone(path: &Path) -> AssetError {
    AssetError::parse(
        &path.display().to_string(),
        "parser worker exited without a result",
    )
}

/// Anything that can start loading a model for a view slot.
pub trait AssetSource {
    fn submit(&self, slot: usize, path: &Path) -> PendingLoad;
}

enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

/// Extension-dispatching loader. Text and raw binary formats are parsed on a worker thread
/// spawned for that single load.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetLoader;

impl AssetLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self, slot: usize, path: &Path, hint: Option<AssetFormat>) -> PendingLoad {
        let display = path.display().to_string();
        let Some(format) = hint.or_else(|| AssetFormat::from_path(path)) else {
            return PendingLoad::ready(
                path.to_path_buf(),
                Err(AssetError::UnsupportedFormat { path: display }),
            );
        };

        if format.parses_in_process() {
            let result = std::fs::read(path)
                .map_err(|source| AssetError::Io {
                    path: display.clone(),
                    source,
                })
                .and_then(|bytes| gltf_scene::parse(path, &bytes))
                .and_then(|parsed| parsed.validate(&display).map(|_| parsed));
            return PendingLoad::ready(path.to_path_buf(), result);
        }

        let payload = if format.is_text() {
            std::fs::read_to_string(path).map(Payload::Text)
        } else {
            std::fs::read(path).map(Payload::Bytes)
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(source) => {
                return PendingLoad::ready(
                    path.to_path_buf(),
                    Err(AssetError::Io {
                        path: display,
                        source,
                    }),
                );
            }
        };

        let (sender, receiver) = flume::bounded(1);
        let worker_path = display.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("asset-parse-{}", slot))
            .spawn(move || {
                let result = parse_payload(format, &worker_path, payload);
                if sender.send(result).is_err() {
                    log::debug!("Discarding parse result for {}: load superseded", worker_path);
                }
            });
        match spawned {
            Ok(_) => PendingLoad::worker(path.to_path_buf(), receiver),
            Err(source) => PendingLoad::ready(
                path.to_path_buf(),
                Err(AssetError::Io {
                    path: display,
                    source,
                }),
            ),
        }
    }
}

impl AssetSource for AssetLoader {
    fn submit(&self, slot: usize, path: &Path) -> PendingLoad {
        self.load(slot, path, None)
    }
}

fn parse_payload(format: AssetFormat, path: &str, payload: Payload) -> Result<ParsedAsset, AssetError> {
    let parsed = match (format, payload) {
        (AssetFormat::Obj, Payload::Text(text)) => obj::parse(path, &text)?,
        (AssetFormat::Xyz, Payload::Text(text)) => xyz::parse(path, &text)?,
        (AssetFormat::Stl, Payload::Bytes(bytes)) => stl::parse(path, &bytes)?,
        (AssetFormat::Ply, Payload::Bytes(bytes)) => ply::parse(path, &bytes)?,
        (format, _) => {
            return Err(AssetError::parse(
                path,
                format!("{:?} payload delivered in the wrong encoding", format),
            ))
        }
    };
    parsed.validate(path)?;
    Ok(parsed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn scratch_file(tag: &str, contents: &[u8]) -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "candiview_{}_{}_{}",
            std::process::id(),
            nonce,
            tag
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub(crate) fn triangle(z: f32) -> MeshData {
        MeshData {
            positions: vec![[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]],
            indices: Some(vec![0, 1, 2]),
            ..MeshData::default()
        }
    }

    #[test]
    fn format_dispatch_is_case_insensitive() {
        assert_eq!(AssetFormat::from_path(Path::new("a/b.GLB")), Some(AssetFormat::Gltf));
        assert_eq!(AssetFormat::from_path(Path::new("b.Obj")), Some(AssetFormat::Obj));
        assert_eq!(AssetFormat::from_path(Path::new("b.xyz")), Some(AssetFormat::Xyz));
        assert_eq!(AssetFormat::from_path(Path::new("b.STL")), Some(AssetFormat::Stl));
        assert_eq!(AssetFormat::from_path(Path::new("b.ply")), Some(AssetFormat::Ply));
        assert_eq!(AssetFormat::from_path(Path::new("b.fbx")), None);
        assert_eq!(AssetFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn unknown_extension_is_unsupported_format() {
        let result = AssetLoader::new().load(0, Path::new("model.fbx"), None).wait();
        assert!(matches!(result, Err(AssetError::UnsupportedFormat { .. })));
    }

    #[test]
    fn missing_obj_is_io_error() {
        let path = std::env::temp_dir().join("candiview_missing_model_for_tests.obj");
        let result = AssetLoader::new().load(0, &path, None).wait();
        assert!(matches!(result, Err(AssetError::Io { .. })));
    }

    #[test]
    fn obj_is_parsed_on_a_worker() {
        let path = scratch_file(
            "worker.obj",
            b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        );
        let mut pending = AssetLoader::new().load(3, &path, None);
        let parsed = loop {
            match pending.poll() {
                LoadPoll::Pending => std::thread::yield_now(),
                LoadPoll::Complete(result) => break result.unwrap(),
            }
        };
        assert!(matches!(parsed, ParsedAsset::Scene(_)));
        assert!(matches!(pending.poll(), LoadPoll::Pending));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn malformed_payload_is_parse_error() {
        let path = scratch_file("broken.ply", b"ply\nformat ascii 1.0\nelement vertex 2\n");
        let result = AssetLoader::new().load(0, &path, None).wait();
        assert!(matches!(result, Err(AssetError::Parse { .. })));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn format_hint_overrides_extension() {
        let path = scratch_file("points.txt", b"0 0 0\n1 1 1\n");
        let result = AssetLoader::new()
            .load(0, &path, Some(AssetFormat::Xyz))
            .wait()
            .unwrap();
        match result {
            ParsedAsset::Geometry(mesh) => {
                assert_eq!(mesh.positions.len(), 2);
                assert_eq!(mesh.topology, Topology::Points);
            }
            other => panic!("Expected geometry, got {:?}", other),
        }
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn out_of_range_index_fails_validation() {
        let mut mesh = triangle(0.0);
        mesh.indices = Some(vec![0, 1, 7]);
        assert!(ParsedAsset::Geometry(mesh).validate("t").is_err());
    }

    #[test]
    fn upload_and_dispose_release_every_buffer() {
        let mut pool = BufferPool::new();
        let mut root = NodeData::group("root");
        root.meshes.push(triangle(0.0));
        let mut child = NodeData::group("child");
        child.meshes.push(triangle(1.0));
        child.meshes.push(triangle(2.0));
        root.children.push(child);

        let asset = Asset::upload(ParsedAsset::Scene(root), &mut pool);
        assert_eq!(asset.mesh_count(), 3);
        assert_eq!(asset.triangle_count(), 3);
        assert_eq!(pool.live_count(), 3);

        assert_eq!(asset.dispose(&mut pool), 3);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn missing_normals_are_generated() {
        let mut pool = BufferPool::new();
        let asset = Asset::upload(ParsedAsset::Geometry(triangle(0.0)), &mut pool);
        asset.for_each_mesh(|_, mesh| {
            assert_eq!(mesh.normals.len(), 3);
            for normal in &mesh.normals {
                assert!((normal.z - 1.0).abs() < 1e-6);
            }
        });
        asset.dispose(&mut pool);
    }
}
