// src/loader/tmx_loader.rs
use std::collections::HashMap;
use std::str::FromStr;

use macroquad::math::{vec2, Vec2};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MapError;
use crate::ir_map::*;
use crate::layer::LayerType;

/// Attributes of one element, unescaped.
struct Attrs(HashMap<String, String>);

impl Attrs {
    fn read(e: &BytesStart<'_>) -> Result<Self, MapError> {
        let mut out = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(MapError::xml)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(MapError::xml)?.into_owned();
            out.insert(key, value);
        }
        Ok(Attrs(out))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn num<T: FromStr>(&self, element: &str, key: &str) -> Result<Option<T>, MapError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.trim().parse().map(Some).map_err(|_| {
                MapError::Xml(format!("<{element}> attribute {key}=\"{v}\" is not a number"))
            }),
        }
    }
}

struct PendingTileset {
    first_gid: u32,
    name: String,
    tile_w: u32,
    tile_h: u32,
    tilecount: Option<u32>,
    margin: u32,
    spacing: u32,
    image: Option<(String, u32, u32)>,
    // inside a <tile> child
    in_tile: bool,
}

struct PendingLayer {
    name: String,
    layer_type: LayerType,
    width: u32,
    height: u32,
    offset: Vec2,
    visible: bool,
    opacity: f32,
    grid: Option<Vec<u32>>,
}

#[derive(Clone, Copy)]
struct MapHeader {
    width: u32,
    height: u32,
    tile_w: u32,
    tile_h: u32,
}

/// Accumulates TMX elements as the event reader walks the document.
struct TmxBuilder {
    name: String,
    header: Option<MapHeader>,
    tilesets: Vec<IrTileset>,
    tileset: Option<PendingTileset>,
    layers: Vec<IrLayer>,
    layer: Option<PendingLayer>,
    // Some while inside a <data> element
    data: Option<String>,
}

impl TmxBuilder {
    fn header(&self, element: &str) -> Result<MapHeader, MapError> {
        self.header
            .ok_or_else(|| MapError::Xml(format!("<{element}> outside of <map>")))
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), MapError> {
        match e.name().as_ref() {
            b"map" => {
                let a = Attrs::read(e)?;
                if a.get("infinite") == Some("1") {
                    return Err(MapError::UnsupportedFormat(
                        "infinite TMX maps (chunked layer data)".into(),
                    ));
                }
                self.header = Some(MapHeader {
                    width: a.num("map", "width")?.unwrap_or(0),
                    height: a.num("map", "height")?.unwrap_or(0),
                    tile_w: a.num("map", "tilewidth")?.unwrap_or(0),
                    tile_h: a.num("map", "tileheight")?.unwrap_or(0),
                });
            }
            b"tileset" => {
                let header = self.header("tileset")?;
                let a = Attrs::read(e)?;
                if let Some(source) = a.get("source") {
                    return Err(MapError::UnsupportedFormat(format!(
                        "external tileset '{source}', embed it in the map"
                    )));
                }
                self.tileset = Some(PendingTileset {
                    first_gid: a.num("tileset", "firstgid")?.unwrap_or(1),
                    name: a.get("name").unwrap_or_default().to_owned(),
                    tile_w: a.num("tileset", "tilewidth")?.unwrap_or(header.tile_w),
                    tile_h: a.num("tileset", "tileheight")?.unwrap_or(header.tile_h),
                    tilecount: a.num("tileset", "tilecount")?,
                    margin: a.num("tileset", "margin")?.unwrap_or(0),
                    spacing: a.num("tileset", "spacing")?.unwrap_or(0),
                    image: None,
                    in_tile: false,
                });
            }
            b"tile" if self.data.is_none() => {
                if let Some(ts) = self.tileset.as_mut() {
                    ts.in_tile = true;
                }
            }
            b"image" => {
                if let Some(ts) = self.tileset.as_mut() {
                    if ts.in_tile {
                        return Err(MapError::UnsupportedFormat(format!(
                            "image collection tileset '{}', use a single atlas image",
                            ts.name
                        )));
                    }
                    let a = Attrs::read(e)?;
                    ts.image = Some((
                        a.get("source").unwrap_or_default().to_owned(),
                        a.num("image", "width")?.unwrap_or(0),
                        a.num("image", "height")?.unwrap_or(0),
                    ));
                }
            }
            b"layer" => {
                let header = self.header("layer")?;
                let a = Attrs::read(e)?;
                let name = a
                    .get("name")
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("layer {}", self.layers.len()));
                let layer_type = a
                    .get("class")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(LayerType::Floor);
                self.layer = Some(PendingLayer {
                    name,
                    layer_type,
                    width: a.num("layer", "width")?.unwrap_or(header.width),
                    height: a.num("layer", "height")?.unwrap_or(header.height),
                    offset: vec2(
                        a.num("layer", "offsetx")?.unwrap_or(0.0),
                        a.num("layer", "offsety")?.unwrap_or(0.0),
                    ),
                    visible: a.get("visible") != Some("0"),
                    opacity: a.num("layer", "opacity")?.unwrap_or(1.0),
                    grid: None,
                });
            }
            b"property" => {
                if let (Some(layer), None) = (self.layer.as_mut(), self.data.as_ref()) {
                    let a = Attrs::read(e)?;
                    if a.get("name") == Some("type") {
                        match a.get("value").map(str::parse::<LayerType>) {
                            Some(Ok(t)) => layer.layer_type = t,
                            _ => log::debug!(
                                "layer '{}': type property is not a canonical layer type",
                                layer.name
                            ),
                        }
                    }
                }
            }
            b"data" => {
                let Some(layer) = self.layer.as_ref() else {
                    return Ok(());
                };
                let a = Attrs::read(e)?;
                let encoding = a.get("encoding").unwrap_or("xml");
                if let Some(compression) = a.get("compression") {
                    return Err(MapError::UnsupportedEncoding {
                        layer: layer.name.clone(),
                        encoding: format!("{encoding}+{compression}"),
                    });
                }
                if encoding != "csv" {
                    return Err(MapError::UnsupportedEncoding {
                        layer: layer.name.clone(),
                        encoding: encoding.to_owned(),
                    });
                }
                self.data = Some(String::new());
            }
            b"chunk" if self.data.is_some() => {
                return Err(MapError::UnsupportedFormat("chunked layer data".into()));
            }
            b"objectgroup" | b"imagelayer" | b"group" => {
                log::debug!(
                    "skipping <{}> element",
                    String::from_utf8_lossy(e.name().as_ref())
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(buf) = self.data.as_mut() {
            buf.push_str(text);
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<(), MapError> {
        match name {
            b"tileset" => {
                if let Some(ts) = self.tileset.take() {
                    self.tilesets.push(finish_tileset(ts)?);
                }
            }
            b"tile" => {
                if let Some(ts) = self.tileset.as_mut() {
                    ts.in_tile = false;
                }
            }
            b"data" => {
                if let (Some(text), Some(layer)) = (self.data.take(), self.layer.as_mut()) {
                    layer.grid = Some(parse_csv(&layer.name, &text)?);
                }
            }
            b"layer" => {
                if let Some(layer) = self.layer.take() {
                    let header = self.header("layer")?;
                    let z = self.layers.len() as i32;
                    self.layers.push(finish_layer(layer, header, z));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<IrMap, MapError> {
        let header = self
            .header
            .ok_or_else(|| MapError::InvalidMap("document has no <map> element".into()))?;
        Ok(IrMap {
            uuid: None,
            name: self.name,
            width: header.width,
            height: header.height,
            tile_w: header.tile_w,
            tile_h: header.tile_h,
            spawn: None,
            tilesets: self.tilesets,
            layers: self.layers,
        })
    }
}

fn finish_tileset(ts: PendingTileset) -> Result<IrTileset, MapError> {
    let (image, image_w, image_h) = match ts.image {
        Some(img) if img.1 > 0 && img.2 > 0 => img,
        _ => {
            return Err(MapError::InvalidTileset {
                name: ts.name,
                reason: "embedded tileset needs an <image> with width and height".into(),
            })
        }
    };
    let name = if ts.name.is_empty() {
        // unnamed tilesets go by their image
        std::path::Path::new(&image)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("tileset {}", ts.first_gid))
    } else {
        ts.name
    };
    Ok(IrTileset::Atlas {
        first_gid: ts.first_gid,
        name,
        image,
        image_w,
        image_h,
        tile_w: ts.tile_w,
        tile_h: ts.tile_h,
        tilecount: ts.tilecount,
        spacing: ts.spacing,
        margin: ts.margin,
    })
}

fn finish_layer(layer: PendingLayer, header: MapHeader, z: i32) -> IrLayer {
    let cells_x = |px: f32, size: u32| {
        if size == 0 {
            0
        } else {
            (px / size as f32).round() as i32
        }
    };
    let mut ir = IrLayer::new(
        layer.name,
        layer.layer_type,
        z,
        IrLayerKind::Grid {
            width: layer.width as usize,
            height: layer.height as usize,
            data: layer.grid.unwrap_or_default(),
        },
    );
    ir.x = cells_x(layer.offset.x, header.tile_w);
    ir.y = cells_x(layer.offset.y, header.tile_h);
    ir.width = Some(layer.width);
    ir.height = Some(layer.height);
    ir.visible = layer.visible;
    ir.opacity = layer.opacity;
    ir
}

fn parse_csv(layer: &str, text: &str) -> Result<Vec<u32>, MapError> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<u32>().map_err(|_| {
                MapError::Xml(format!("layer '{layer}': '{t}' is not a valid tile id"))
            })
        })
        .collect()
}

/// Decodes a TMX document. `name` becomes the map name.
pub fn decode_tmx_str(text: &str, name: &str) -> Result<IrMap, MapError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut doc = TmxBuilder {
        name: name.to_owned(),
        header: None,
        tilesets: Vec::new(),
        tileset: None,
        layers: Vec::new(),
        layer: None,
        data: None,
    };

    loop {
        match reader.read_event().map_err(MapError::xml)? {
            Event::Start(e) => doc.open(&e)?,
            Event::Empty(e) => {
                doc.open(&e)?;
                doc.close(e.name().as_ref())?;
            }
            Event::Text(t) => doc.text(&t.unescape().map_err(MapError::xml)?),
            Event::End(e) => doc.close(e.name().as_ref())?,
            Event::Eof => break,
            _ => {}
        }
    }
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" orientation="orthogonal" width="3" height="2" tilewidth="32" tileheight="32">
 <tileset firstgid="1" name="terrain" tilewidth="32" tileheight="32" tilecount="16" columns="4">
  <image source="../img/terrain.png" width="128" height="128"/>
 </tileset>
 <layer id="1" name="ground" width="3" height="2" offsetx="64" offsety="-32" opacity="0.5">
  <properties>
   <property name="type" value="background"/>
  </properties>
  <data encoding="csv">
1,0,5,
0,2147483650,0
</data>
 </layer>
 <layer id="2" name="roof" class="sky" width="3" height="2" visible="0">
  <data encoding="csv">0,0,0,0,0,3</data>
 </layer>
</map>"#;

    #[test]
    fn decodes_tilesets_and_csv_layers() {
        let ir = decode_tmx_str(MAP, "village").unwrap();
        assert_eq!(ir.name, "village");
        assert_eq!((ir.width, ir.height, ir.tile_w, ir.tile_h), (3, 2, 32, 32));

        assert!(matches!(
            &ir.tilesets[0],
            IrTileset::Atlas { first_gid: 1, tilecount: Some(16), image_w: 128, name, .. } if name == "terrain"
        ));

        let ground = &ir.layers[0];
        assert_eq!(ground.layer_type, LayerType::Background);
        assert_eq!((ground.x, ground.y, ground.z), (2, -1, 0));
        assert_eq!(ground.opacity, 0.5);
        let IrLayerKind::Grid { data, .. } = &ground.kind else {
            panic!("expected a grid");
        };
        assert_eq!(data, &vec![1, 0, 5, 0, 0x8000_0002, 0]);

        let roof = &ir.layers[1];
        assert_eq!(roof.layer_type, LayerType::Sky);
        assert_eq!(roof.z, 1);
        assert!(!roof.visible);
    }

    #[test]
    fn rejects_non_csv_encodings() {
        for data in [
            r#"<data encoding="base64">AAAA</data>"#,
            r#"<data encoding="base64" compression="zlib">eJw=</data>"#,
            r#"<data><tile gid="1"/></data>"#,
        ] {
            let text = format!(
                r#"<map width="1" height="1" tilewidth="32" tileheight="32"><layer name="l" width="1" height="1">{data}</layer></map>"#
            );
            let err = decode_tmx_str(&text, "m").unwrap_err();
            assert!(
                matches!(err, MapError::UnsupportedEncoding { ref layer, .. } if layer == "l"),
                "{data}: {err}"
            );
        }
    }

    #[test]
    fn rejects_external_tilesets() {
        let text = r#"<map width="1" height="1" tilewidth="32" tileheight="32"><tileset firstgid="1" source="t.tsx"/></map>"#;
        assert!(matches!(
            decode_tmx_str(text, "m"),
            Err(MapError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_image_collection_tilesets() {
        let text = r#"<map width="1" height="1" tilewidth="32" tileheight="32">
 <tileset firstgid="1" name="props" tilewidth="32" tileheight="32" tilecount="1">
  <tile id="0"><image source="barrel.png" width="32" height="48"/></tile>
 </tileset>
</map>"#;
        let err = decode_tmx_str(text, "m").unwrap_err();
        assert!(
            matches!(err, MapError::UnsupportedFormat(ref what) if what.contains("props")),
            "{err}"
        );
    }

    #[test]
    fn atlas_tiles_with_properties_are_accepted() {
        let text = r#"<map width="1" height="1" tilewidth="32" tileheight="32">
 <tileset firstgid="1" name="terrain" tilewidth="32" tileheight="32" tilecount="16" columns="4">
  <image source="terrain.png" width="128" height="128"/>
  <tile id="3"><properties><property name="solid" value="true"/></properties></tile>
  <tile id="4"/>
 </tileset>
</map>"#;
        let ir = decode_tmx_str(text, "m").unwrap();
        assert!(matches!(
            &ir.tilesets[0],
            IrTileset::Atlas { image, image_w: 128, .. } if image == "terrain.png"
        ));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(
            decode_tmx_str("<map width=\"1\"><layer></map>", "m"),
            Err(MapError::Xml(_))
        ));
    }
}
