// src/loader/json_loader.rs
use crate::error::MapError;
use crate::ir_map::*;
use crate::layer::{Cell, FieldType, LayerType};
use crate::tileset::DEFAULT_TILE_SIZE;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Deserialize)]
struct JsonMapHeader {
    #[serde(default)]
    uuid: Option<Uuid>,
    #[serde(default)]
    name: String,
    width: u32,
    height: u32,
    #[serde(default = "default_tile", alias = "tileWidth", alias = "tilewidth")]
    tile_width: u32,
    #[serde(default = "default_tile", alias = "tileHeight", alias = "tileheight")]
    tile_height: u32,
    #[serde(default)]
    spawn: Option<Cell>,
}

#[derive(Deserialize)]
struct JsonLayer {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type", alias = "layerType", alias = "layer_type")]
    kind: Option<String>,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    z: i32,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default)]
    data: Vec<JsonEntry>,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}
fn default_tile() -> u32 {
    DEFAULT_TILE_SIZE
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonEntry {
    Tile {
        x: i64,
        y: i64,
        brush: JsonBrush,
    },
    Field {
        x: i64,
        y: i64,
        #[serde(rename = "fieldType", alias = "field_type")]
        field_type: u8,
    },
}

#[derive(Deserialize)]
struct JsonBrush {
    /// uuid string or tileset name
    #[serde(alias = "tilesetId", alias = "tileset_id")]
    tileset: String,
    #[serde(rename = "tileX", alias = "tile_x")]
    tile_x: u32,
    #[serde(rename = "tileY", alias = "tile_y")]
    tile_y: u32,
}

#[derive(Deserialize)]
struct JsonTileset {
    #[serde(default)]
    uuid: Option<Uuid>,
    name: String,
    #[serde(default, alias = "imageWidth")]
    image_width: u32,
    #[serde(default, alias = "imageHeight")]
    image_height: u32,
    #[serde(default = "default_tile", alias = "tileWidth")]
    tile_width: u32,
    #[serde(default = "default_tile", alias = "tileHeight")]
    tile_height: u32,
    #[serde(default, alias = "imagePath", alias = "image")]
    image_path: String,
    #[serde(default)]
    margin: u32,
    #[serde(default)]
    spacing: u32,
}

/// `{map: {...}, layers, tilesets}`
#[derive(Deserialize)]
struct StandardDoc {
    map: JsonMapHeader,
    #[serde(default)]
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTileset>,
}

/// `{name, width, height, layers, tilesets, ...}`
#[derive(Deserialize)]
struct FlatDoc {
    #[serde(flatten)]
    map: JsonMapHeader,
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTileset>,
}

/// Decodes either JSON export shape into an [`IrMap`].
pub fn decode_json_str(text: &str) -> Result<IrMap, MapError> {
    let root: JsonValue = serde_json::from_str(text)?;
    let obj = root.as_object().ok_or(MapError::UnrecognizedJsonShape)?;

    let (map, layers, tilesets) = if obj.get("map").is_some_and(JsonValue::is_object) {
        let doc: StandardDoc = serde_json::from_value(root)?;
        (doc.map, doc.layers, doc.tilesets)
    } else if ["width", "height", "layers"].iter().all(|k| obj.contains_key(*k)) {
        let doc: FlatDoc = serde_json::from_value(root)?;
        (doc.map, doc.layers, doc.tilesets)
    } else {
        return Err(MapError::UnrecognizedJsonShape);
    };

    let layers = layers
        .into_iter()
        .enumerate()
        .map(|(i, l)| decode_layer(l, i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IrMap {
        uuid: map.uuid,
        name: map.name,
        width: map.width,
        height: map.height,
        tile_w: map.tile_width,
        tile_h: map.tile_height,
        spawn: map.spawn.map(|c| (c.x, c.y)),
        tilesets: tilesets.into_iter().map(decode_tileset).collect(),
        layers,
    })
}

fn decode_layer(l: JsonLayer, index: usize) -> Result<IrLayer, MapError> {
    let name = if l.name.is_empty() {
        format!("layer {index}")
    } else {
        l.name
    };
    let layer_type = match l.kind.as_deref() {
        None | Some("") => LayerType::Floor,
        Some(s) => s.parse()?,
    };

    let mut cells = Vec::new();
    let mut fields = Vec::new();
    for entry in l.data {
        match entry {
            JsonEntry::Tile { x, y, brush } => cells.push(IrCell {
                x,
                y,
                tile: IrTileRef::Local {
                    tileset: brush.tileset,
                    tile_x: brush.tile_x,
                    tile_y: brush.tile_y,
                },
            }),
            JsonEntry::Field { x, y, field_type } => fields.push((x, y, FieldType(field_type))),
        }
    }
    if !cells.is_empty() && !fields.is_empty() {
        return Err(MapError::MixedLayerData(name));
    }

    let kind = if !fields.is_empty() || (cells.is_empty() && layer_type.holds_field_types()) {
        IrLayerKind::FieldTypes(fields)
    } else {
        IrLayerKind::Cells(cells)
    };

    let mut ir = IrLayer::new(name, layer_type, l.z, kind);
    ir.x = l.x;
    ir.y = l.y;
    ir.width = l.width;
    ir.height = l.height;
    ir.visible = l.visible;
    ir.opacity = l.opacity;
    Ok(ir)
}

fn decode_tileset(t: JsonTileset) -> IrTileset {
    // a record without image dimensions is only a name
    if t.image_width == 0 || t.image_height == 0 {
        return IrTileset::Named {
            uuid: t.uuid,
            name: t.name,
            image_hint: (!t.image_path.is_empty()).then_some(t.image_path),
        };
    }
    IrTileset::Record {
        uuid: t.uuid,
        name: t.name,
        image: t.image_path,
        image_w: t.image_width,
        image_h: t.image_height,
        tile_w: t.tile_width,
        tile_h: t.tile_height,
        spacing: t.spacing,
        margin: t.margin,
    }
}
