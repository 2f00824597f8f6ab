use gltf::Gltf;
use gltf::mesh::Semantic;
use tracing::debug;

use super::{ContentDecoder, DecodeOutcome, TileContext};
use crate::error::{Result, TilesError};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const B3DM_MAGIC: &[u8; 4] = b"b3dm";
const B3DM_HEADER_LENGTH: usize = 28;

/// Container the glTF was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Glb,
    B3dm,
    GltfJson,
}

/// Parsed glTF tile content. Buffers other than the GLB binary chunk are
/// not fetched.
#[derive(Debug)]
pub struct GltfContent {
    pub format: ContentFormat,
    pub gltf: Gltf,
}

impl GltfContent {
    pub fn mesh_count(&self) -> usize {
        self.gltf.document.meshes().len()
    }

    pub fn primitive_count(&self) -> usize {
        self.gltf
            .document
            .meshes()
            .map(|mesh| mesh.primitives().len())
            .sum()
    }

    /// Vertices over all primitives, from the POSITION accessor counts.
    pub fn vertex_count(&self) -> usize {
        self.gltf
            .document
            .meshes()
            .flat_map(|mesh| mesh.primitives())
            .filter_map(|primitive| primitive.get(&Semantic::Positions))
            .map(|accessor| accessor.count())
            .sum()
    }
}

/// Decodes binary glTF, Batched 3D Model and (for `.gltf` URLs) JSON glTF.
/// Anything else is left for the nested tileset parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct GltfContentDecoder;

fn read_u32(data: &[u8], offset: usize) -> usize {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes) as usize
}

/// Slice out the GLB embedded in a b3dm, skipping the feature and batch tables.
fn b3dm_glb<'a>(url: &str, data: &'a [u8]) -> Result<&'a [u8]> {
    if data.len() < B3DM_HEADER_LENGTH {
        return Err(TilesError::Content(format!(
            "{url}: b3dm shorter than its {B3DM_HEADER_LENGTH}-byte header"
        )));
    }

    let byte_length = read_u32(data, 8).min(data.len());
    let tables: usize = (12..B3DM_HEADER_LENGTH)
        .step_by(4)
        .map(|offset| read_u32(data, offset))
        .sum();
    let glb_start = B3DM_HEADER_LENGTH + tables;

    if glb_start >= byte_length {
        return Err(TilesError::Content(format!(
            "{url}: b3dm tables end at byte {glb_start}, past the {byte_length}-byte tile"
        )));
    }
    Ok(&data[glb_start..byte_length])
}

fn parse(url: &str, format: ContentFormat, data: &[u8]) -> Result<DecodeOutcome> {
    let gltf = Gltf::from_slice(data)
        .map_err(|e| TilesError::Content(format!("{url}: invalid glTF: {e}")))?;
    let content = GltfContent { format, gltf };

    debug!(
        %url,
        ?format,
        meshes = content.mesh_count(),
        vertices = content.vertex_count(),
        "Decoded tile content"
    );
    Ok(DecodeOutcome::Geometry(Box::new(content)))
}

fn is_gltf_json_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".gltf")
}

impl ContentDecoder for GltfContentDecoder {
    fn decode(&self, context: &TileContext, data: &[u8]) -> Result<DecodeOutcome> {
        let url = context.url.as_str();
        match data.get(..4) {
            Some(magic) if magic == GLB_MAGIC => parse(url, ContentFormat::Glb, data),
            Some(magic) if magic == B3DM_MAGIC => {
                parse(url, ContentFormat::B3dm, b3dm_glb(url, data)?)
            }
            _ if is_gltf_json_url(url) => parse(url, ContentFormat::GltfJson, data),
            _ => Ok(DecodeOutcome::Unrecognized),
        }
    }
}

/// Smallest useful GLB: one triangle. Shared by unit tests.
#[cfg(test)]
pub(crate) fn triangle_glb() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let bin: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
    let json = serde_json::json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{ "buffer": 0, "byteLength": bin.len() }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "nodes": [{ "mesh": 0 }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    });

    let mut json = serde_json::to_vec(&json).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}
