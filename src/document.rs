//! Tileset document (`tileset.json`) schema and its conversion into tiles.

use glam::DMat4;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TilesError};
use crate::geometry::{BoundingRegion, BoundingSphere, BoundingVolume, OrientedBoundingBox};
use crate::tile::{Refine, Tile, TileArena, TileId};
use crate::uri;

/// Top-level tileset document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometric_error: Option<f64>,
    pub root: TileJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileset_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileJson {
    pub bounding_volume: BoundingVolumeJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_request_volume: Option<BoundingVolumeJson>,
    pub geometric_error: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine: Option<String>,
    /// Column-major 4x4 matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileJson>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundingVolumeJson {
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub oriented_box: Option<[f64; 12]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<[f64; 6]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Pre-1.0 documents use `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_volume: Option<BoundingVolumeJson>,
}

/// Reply of the asset catalog endpoint lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IonEndpoint {
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl IonEndpoint {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| TilesError::Document(format!("invalid asset endpoint reply: {e}")))
    }

    /// Tileset URL with the access token attached.
    pub fn tileset_url(&self) -> String {
        match &self.access_token {
            Some(token) => uri::add_query(&self.url, "access_token", token),
            None => self.url.clone(),
        }
    }
}

impl TilesetDocument {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| TilesError::Document(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| TilesError::Document(e.to_string()))
    }
}

impl BoundingVolumeJson {
    /// `box` wins over `region`, which wins over `sphere`.
    pub fn to_bounding_volume(&self) -> Result<BoundingVolume> {
        if let Some(values) = &self.oriented_box {
            Ok(OrientedBoundingBox::from_array(values).into())
        } else if let Some(values) = &self.region {
            Ok(BoundingRegion::from_array(values).into())
        } else if let Some(values) = &self.sphere {
            Ok(BoundingSphere::from_array(values).into())
        } else {
            Err(TilesError::Document(
                "bounding volume has no box, region or sphere".into(),
            ))
        }
    }
}

impl ContentJson {
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref().or(self.url.as_deref())
    }
}

fn parse_refine(value: &str) -> Option<Refine> {
    if value.eq_ignore_ascii_case("ADD") {
        Some(Refine::Add)
    } else if value.eq_ignore_ascii_case("REPLACE") {
        Some(Refine::Replace)
    } else {
        None
    }
}

/// A fully validated subtree, ready to be moved into an arena.
#[derive(Debug)]
pub(crate) struct TileBlueprint {
    tile: Tile,
    children: Vec<TileBlueprint>,
}

impl TileBlueprint {
    /// Validate `json` and everything below it. Transforms compose with
    /// `parent_transform`, content URIs resolve against `base_url` and an
    /// unset `refine` inherits `parent_refine`.
    pub(crate) fn build(
        json: &TileJson,
        base_url: &str,
        parent_transform: &DMat4,
        parent_refine: Option<Refine>,
    ) -> Result<Self> {
        let transform = match &json.transform {
            Some(local) => *parent_transform * DMat4::from_cols_array(local),
            None => *parent_transform,
        };

        let refine = match json.refine.as_deref() {
            Some(value) => parse_refine(value).or_else(|| {
                warn!(refine = value, "Unknown refine value, inheriting parent's");
                parent_refine
            }),
            None => parent_refine,
        };

        let bounding_volume = json.bounding_volume.to_bounding_volume()?.transform(&transform);
        let mut tile = Tile::new(bounding_volume, json.geometric_error);
        tile.set_transform(transform);
        tile.set_refine(refine);
        tile.set_viewer_request_volume(
            json.viewer_request_volume
                .as_ref()
                .map(|v| v.to_bounding_volume().map(|bv| bv.transform(&transform)))
                .transpose()?,
        );

        if let Some(content) = &json.content {
            tile.set_content_uri(content.uri().map(|u| uri::resolve(base_url, u)));
            tile.set_content_bounding_volume(
                content
                    .bounding_volume
                    .as_ref()
                    .map(|v| v.to_bounding_volume().map(|bv| bv.transform(&transform)))
                    .transpose()?,
            );
        }

        let children = json
            .children
            .iter()
            .map(|child| Self::build(child, base_url, &transform, refine))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tile, children })
    }

    /// Total number of tiles in the subtree.
    pub(crate) fn len(&self) -> usize {
        1 + self.children.iter().map(TileBlueprint::len).sum::<usize>()
    }

    pub(crate) fn insert_as_root(self, arena: &mut TileArena) -> Result<TileId> {
        let root = arena.push_root(self.tile);
        insert_children(arena, root, self.children)?;
        Ok(root)
    }

    /// Make this subtree the only child of `parent`.
    pub(crate) fn insert_under(self, arena: &mut TileArena, parent: TileId) -> Result<TileId> {
        insert_children(arena, parent, vec![self])?;
        arena
            .children(parent)
            .next()
            .ok_or_else(|| TilesError::Contract(format!("{parent:?} lost its children")))
    }
}

fn insert_children(arena: &mut TileArena, parent: TileId, children: Vec<TileBlueprint>) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    let (tiles, grandchildren): (Vec<Tile>, Vec<Vec<TileBlueprint>>) = children
        .into_iter()
        .map(|blueprint| (blueprint.tile, blueprint.children))
        .unzip();

    arena.create_children(parent, tiles)?;
    let ids: Vec<TileId> = arena.children(parent).collect();
    for (id, grandchildren) in ids.into_iter().zip(grandchildren) {
        insert_children(arena, id, grandchildren)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use serde_json::json;

    use super::*;

    fn sphere(r: f64) -> serde_json::Value {
        json!({ "sphere": [0.0, 0.0, 0.0, r] })
    }

    fn build(document: serde_json::Value, base: &str) -> (TileArena, TileId) {
        let document = TilesetDocument::from_value(document).unwrap();
        let blueprint =
            TileBlueprint::build(&document.root, base, &DMat4::IDENTITY, None).unwrap();
        let mut arena = TileArena::new();
        let root = blueprint.insert_as_root(&mut arena).unwrap();
        (arena, root)
    }

    #[test]
    fn builds_tree_with_resolved_uris() {
        let (arena, root) = build(
            json!({
                "asset": { "version": "1.0" },
                "geometricError": 500.0,
                "root": {
                    "boundingVolume": sphere(100.0),
                    "geometricError": 100.0,
                    "refine": "replace",
                    "content": { "uri": "root.glb" },
                    "children": [
                        {
                            "boundingVolume": sphere(50.0),
                            "geometricError": 10.0,
                            "content": { "url": "a/0.glb" },
                            "children": [
                                { "boundingVolume": sphere(10.0), "geometricError": 0.0 }
                            ]
                        },
                        { "boundingVolume": sphere(50.0), "geometricError": 10.0, "refine": "ADD" }
                    ]
                }
            }),
            "https://example.com/set/tileset.json?token=t",
        );

        assert_eq!(arena.len(), 4);
        let root_tile = arena.tile(root).unwrap();
        assert_eq!(root_tile.refine(), Some(Refine::Replace));
        assert_eq!(
            root_tile.content_uri(),
            Some("https://example.com/set/root.glb?token=t")
        );

        let children: Vec<_> = arena.children(root).collect();
        assert_eq!(children.len(), 2);
        let first = arena.tile(children[0]).unwrap();
        assert_eq!(first.content_uri(), Some("https://example.com/set/a/0.glb?token=t"));
        assert_eq!(first.refine(), Some(Refine::Replace));
        assert_eq!(arena.tile(children[1]).unwrap().refine(), Some(Refine::Add));

        let grandchild = arena.children(children[0]).next().unwrap();
        assert_eq!(arena.tile(grandchild).unwrap().depth(), 2);
        assert_eq!(arena.tile(grandchild).unwrap().refine(), Some(Refine::Replace));
    }

    #[test]
    fn transforms_compose_and_apply_to_volumes() {
        let translate = |x: f64| {
            let mut m = [0.0; 16];
            m[0] = 1.0;
            m[5] = 1.0;
            m[10] = 1.0;
            m[15] = 1.0;
            m[12] = x;
            m
        };
        let (arena, root) = build(
            json!({
                "root": {
                    "boundingVolume": sphere(1.0),
                    "geometricError": 1.0,
                    "transform": translate(10.0),
                    "children": [{
                        "boundingVolume": sphere(1.0),
                        "geometricError": 0.5,
                        "transform": translate(5.0),
                        "viewerRequestVolume": sphere(3.0)
                    }]
                }
            }),
            "tileset.json",
        );

        assert_eq!(arena.tile(root).unwrap().bounding_volume().center(), DVec3::new(10.0, 0.0, 0.0));
        let child = arena.tile(arena.children(root).next().unwrap()).unwrap();
        assert_eq!(child.bounding_volume().center(), DVec3::new(15.0, 0.0, 0.0));
        assert_eq!(child.transform().w_axis.x, 15.0);
        assert!(child.viewer_request_volume().unwrap().contains(DVec3::new(16.0, 0.0, 0.0)));
    }

    #[test]
    fn missing_bounding_volume_kind_is_document_error() {
        let document = TilesetDocument::from_value(json!({
            "root": { "boundingVolume": {}, "geometricError": 1.0 }
        }))
        .unwrap();
        let err = TileBlueprint::build(&document.root, "", &DMat4::IDENTITY, None).unwrap_err();
        assert!(matches!(err, TilesError::Document(_)));
    }

    #[test]
    fn non_object_tile_is_document_error() {
        let err = TilesetDocument::from_slice(br#"{"root": [1, 2]}"#).unwrap_err();
        assert!(matches!(err, TilesError::Document(_)));
        assert!(TilesetDocument::from_slice(b"not json").is_err());
    }

    #[test]
    fn region_and_box_volumes() {
        let bv = BoundingVolumeJson {
            region: Some([0.0, 0.0, 0.001, 0.001, 0.0, 10.0]),
            ..Default::default()
        };
        assert!(matches!(bv.to_bounding_volume().unwrap(), BoundingVolume::Region(_)));

        let bv = BoundingVolumeJson {
            oriented_box: Some([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            sphere: Some([0.0, 0.0, 0.0, 1.0]),
            ..Default::default()
        };
        assert!(matches!(bv.to_bounding_volume().unwrap(), BoundingVolume::OrientedBox(_)));
    }

    #[test]
    fn ion_endpoint_appends_token() {
        let endpoint =
            IonEndpoint::from_slice(br#"{"url":"https://assets.example/1/tileset.json","accessToken":"xyz","type":"3DTILES"}"#)
                .unwrap();
        assert_eq!(
            endpoint.tileset_url(),
            "https://assets.example/1/tileset.json?access_token=xyz"
        );
    }

    #[test]
    fn nested_subtree_inserts_under_parent() {
        let (mut arena, root) = build(
            json!({ "root": { "boundingVolume": sphere(1.0), "geometricError": 9.0 } }),
            "tileset.json",
        );
        let nested = TilesetDocument::from_value(json!({
            "root": {
                "boundingVolume": sphere(1.0),
                "geometricError": 5.0,
                "children": [{ "boundingVolume": sphere(1.0), "geometricError": 1.0 }]
            }
        }))
        .unwrap();
        let blueprint =
            TileBlueprint::build(&nested.root, "sub/tileset.json", &DMat4::IDENTITY, None).unwrap();
        assert_eq!(blueprint.len(), 2);

        let child = blueprint.insert_under(&mut arena, root).unwrap();
        assert_eq!(arena.parent(child), Some(root));
        assert_eq!(arena.children(child).len(), 1);
        assert_eq!(arena.len(), 3);
    }
}
