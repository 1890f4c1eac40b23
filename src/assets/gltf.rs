//! glTF import into a [`WorldSink`]
//!
//! [`load_gltf_async`] parses a document on a background thread and streams
//! its textures, geometry and node hierarchy into the sink while the
//! renderer keeps drawing whatever has been published so far.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use glam::{Quat, Vec2, Vec3};
use gltf_dep::image::Format;
use gltf_dep::mesh::Mode;

use super::{AssetError, Node, Primitive, Texture, Vertex, WorldSink};
use crate::backend::types::TextureSize;

const LOG_TARGET: &str = "assets";

/// What a load appended to the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub textures: usize,
    pub primitives: usize,
    pub nodes: usize,
    /// Primitives left out because they could not be imported
    pub skipped: usize,
}

/// Load a glTF file on a background thread
///
/// Failures are logged on the loader thread and also returned through the
/// join handle. Dropping the handle detaches the load.
pub fn load_gltf_async<S>(
    path: impl Into<PathBuf>,
    sink: Arc<S>,
) -> Result<JoinHandle<Result<LoadSummary, AssetError>>, AssetError>
where
    S: WorldSink + ?Sized + 'static,
{
    let path = path.into();
    let handle = std::thread::Builder::new()
        .name("gltf-loader".to_string())
        .spawn(move || {
            let result = load_gltf(&path, sink.as_ref());
            match &result {
                Ok(summary) => log::info!(
                    target: LOG_TARGET,
                    "loaded {}: {} textures, {} primitives, {} nodes",
                    path.display(),
                    summary.textures,
                    summary.primitives,
                    summary.nodes
                ),
                Err(error) => {
                    log::error!(target: LOG_TARGET, "failed to load {}: {}", path.display(), error)
                }
            }
            result
        })?;
    Ok(handle)
}

/// Load a glTF file on the calling thread
pub fn load_gltf<S: WorldSink + ?Sized>(path: &Path, sink: &S) -> Result<LoadSummary, AssetError> {
    log::info!(target: LOG_TARGET, "loading gltf model {}", path.display());
    let (document, buffers, images) = gltf_dep::import(path)?;
    import_document(&document, &buffers, &images, sink)
}

/// Load a glTF or GLB document held in memory
pub fn load_gltf_slice<S: WorldSink + ?Sized>(
    bytes: &[u8],
    sink: &S,
) -> Result<LoadSummary, AssetError> {
    let (document, buffers, images) = gltf_dep::import_slice(bytes)?;
    import_document(&document, &buffers, &images, sink)
}

fn import_document<S: WorldSink + ?Sized>(
    document: &gltf_dep::Document,
    buffers: &[gltf_dep::buffer::Data],
    images: &[gltf_dep::image::Data],
    sink: &S,
) -> Result<LoadSummary, AssetError> {
    // Node children are offset by `base`, which needs a contiguous range
    let _loading = sink.lock_loader();
    let mut summary = LoadSummary::default();

    let texture_count = document.textures().len() + 1;
    if !sink.reserve_textures(texture_count) {
        return Err(AssetError::Capacity {
            what: "textures",
            count: texture_count,
        });
    }
    let node_count = document.nodes().len();
    if !sink.reserve_nodes(node_count) {
        return Err(AssetError::Capacity {
            what: "nodes",
            count: node_count,
        });
    }

    let placeholder = sink.add_texture(Texture::placeholder())?;
    summary.textures += 1;

    // glTF texture index -> sink texture index
    let mut textures = Vec::with_capacity(document.textures().len());
    for texture in document.textures() {
        let image = texture.source();
        let name = image
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image{}", image.index()));
        let converted = images
            .get(image.index())
            .ok_or_else(|| AssetError::ImageDecode(format!("{name}: missing image data")))
            .and_then(|data| convert_image(&name, data));
        match converted {
            Ok(texture) => {
                textures.push(sink.add_texture(texture)?);
                summary.textures += 1;
            }
            Err(error) => {
                log::warn!(target: LOG_TARGET, "{error}, using placeholder");
                textures.push(placeholder);
            }
        }
    }

    // glTF mesh index -> sink primitive indices
    let mut meshes = Vec::with_capacity(document.meshes().len());
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            match import_primitive(&mesh, &primitive, buffers, &textures, placeholder, sink)? {
                Some(index) => {
                    primitives.push(index);
                    summary.primitives += 1;
                }
                None => summary.skipped += 1,
            }
        }
        meshes.push(primitives);
    }

    let base = sink.next_node_index();
    for node in document.nodes() {
        let (translation, rotation, scale) = node.transform().decomposed();
        sink.add_node(Node {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node{}", node.index())),
            translation: Vec3::from(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from(scale),
            children: node.children().map(|child| base + child.index()).collect(),
            primitives: node
                .mesh()
                .and_then(|mesh| meshes.get(mesh.index()).cloned())
                .unwrap_or_default(),
        })?;
        summary.nodes += 1;
    }

    Ok(summary)
}

/// Import one primitive; `Ok(None)` when it has to be skipped
fn import_primitive<S: WorldSink + ?Sized>(
    mesh: &gltf_dep::Mesh,
    primitive: &gltf_dep::Primitive,
    buffers: &[gltf_dep::buffer::Data],
    textures: &[usize],
    placeholder: usize,
    sink: &S,
) -> Result<Option<usize>, AssetError> {
    if primitive.mode() != Mode::Triangles {
        log::warn!(
            target: LOG_TARGET,
            "{}",
            AssetError::UnsupportedTopology(format!(
                "mesh {} primitive {} uses {:?}",
                mesh.index(),
                primitive.index(),
                primitive.mode()
            ))
        );
        return Ok(None);
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let Some(positions) = reader.read_positions() else {
        log::warn!(
            target: LOG_TARGET,
            "{}, skipping",
            AssetError::MissingPositions {
                mesh: mesh.index(),
                primitive: primitive.index()
            }
        );
        return Ok(None);
    };

    let mut vertices: Vec<Vertex> = positions
        .map(|position| Vertex {
            position: Vec3::from(position),
            ..Default::default()
        })
        .collect();

    let has_normals = match reader.read_normals() {
        Some(normals) => {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = Vec3::from(normal);
            }
            true
        }
        None => false,
    };

    if let Some(uvs) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
            vertex.uv = Vec2::from(uv);
        }
    }

    let (mut vertices, indices) = match reader.read_indices() {
        Some(indices) => (vertices, indices.into_u32().collect()),
        None => deduplicate(vertices),
    };

    if !has_normals {
        compute_normals(&mut vertices, &indices);
    }

    let texture = primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_texture()
        .and_then(|info| textures.get(info.texture().index()).copied())
        .unwrap_or(placeholder);

    let vertices = sink.add_vertex_buffer(vertices)?;
    let indices = sink.add_index_buffer(indices)?;
    let index = sink.add_primitive(Primitive {
        texture,
        vertices,
        indices,
    })?;
    Ok(Some(index))
}

/// Widen decoded image data to RGBA8
fn convert_image(name: &str, data: &gltf_dep::image::Data) -> Result<Texture, AssetError> {
    let size = TextureSize::new(data.width, data.height);
    let pixels = data.pixels.clone();
    let invalid = || AssetError::ImageDecode(format!("{name}: pixel data does not match {size}"));

    let rgba = match data.format {
        Format::R8G8B8A8 => {
            if pixels.len() != size.width as usize * size.height as usize * 4 {
                return Err(invalid());
            }
            pixels
        }
        Format::R8G8B8 => image::RgbImage::from_raw(size.width, size.height, pixels)
            .map(|img| image::DynamicImage::ImageRgb8(img).to_rgba8().into_raw())
            .ok_or_else(invalid)?,
        Format::R8G8 => image::GrayAlphaImage::from_raw(size.width, size.height, pixels)
            .map(|img| image::DynamicImage::ImageLumaA8(img).to_rgba8().into_raw())
            .ok_or_else(invalid)?,
        Format::R8 => image::GrayImage::from_raw(size.width, size.height, pixels)
            .map(|img| image::DynamicImage::ImageLuma8(img).to_rgba8().into_raw())
            .ok_or_else(invalid)?,
        other => {
            return Err(AssetError::ImageDecode(format!(
                "{name}: unsupported format {other:?}"
            )))
        }
    };

    Ok(Texture {
        name: name.to_string(),
        size,
        data: rgba,
    })
}

/// Merge identical vertices of an unindexed triangle list
fn deduplicate(vertices: Vec<Vertex>) -> (Vec<Vertex>, Vec<u32>) {
    let mut unique = Vec::new();
    let mut lookup = HashMap::new();
    let mut indices = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let index = *lookup.entry(vertex.key()).or_insert_with(|| {
            unique.push(vertex);
            (unique.len() - 1) as u32
        });
        indices.push(index);
    }
    (unique, indices)
}

/// Area-weighted vertex normals from triangle faces
fn compute_normals(vertices: &mut [Vertex], indices: &[u32]) {
    for vertex in vertices.iter_mut() {
        vertex.normal = Vec3::ZERO;
    }
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        if a.max(b).max(c) >= vertices.len() {
            continue;
        }
        let p0 = vertices[a].position;
        let normal = (vertices[b].position - p0).cross(vertices[c].position - p0);
        vertices[a].normal += normal;
        vertices[b].normal += normal;
        vertices[c].normal += normal;
    }
    for vertex in vertices.iter_mut() {
        vertex.normal = vertex.normal.normalize_or_zero();
    }
}
