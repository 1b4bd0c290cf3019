// src/loader/legacy_loader.rs
//! Line scanner for the legacy scripted map format.
//!
//! The script is never evaluated. Each line is matched against three
//! assignment shapes and turned into an [`Assignment`]; anything else
//! (comments, function calls, array constructors) is ignored.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::MapError;
use crate::ir_map::*;
use crate::layer::LayerType;
use crate::normalize::LEGACY_LAYERS;

lazy_static! {
    // field_layer1[3][4] = 'grass/12.png';
    static ref CELL_RE: Regex = Regex::new(
        r"^\s*(?:(?:var|let|const)\s+|\$)?([A-Za-z_]\w*)\s*\[\s*(\d+)\s*\]\s*\[\s*(\d+)\s*\]\s*=\s*([^;]*?)\s*(?:;.*)?$"
    )
    .unwrap();
    // field_type[3] = [1, 2, 2, 3];
    static ref ROW_RE: Regex = Regex::new(
        r"^\s*(?:(?:var|let|const)\s+|\$)?([A-Za-z_]\w*)\s*\[\s*(\d+)\s*\]\s*=\s*\[([^\]]*)\]\s*(?:;.*)?$"
    )
    .unwrap();
    // width = 20;
    static ref SCALAR_RE: Regex = Regex::new(
        r"^\s*(?:(?:var|let|const)\s+|\$)?([A-Za-z_]\w*)\s*=\s*([^;]*?)\s*(?:;.*)?$"
    )
    .unwrap();
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Int(i64),
    /// Anything else (`null`, identifiers, expressions).
    Other(String),
}

impl Literal {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        for q in ['\'', '"'] {
            if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
                return Literal::Str(raw[1..raw.len() - 1].to_owned());
            }
        }
        match raw.parse() {
            Ok(n) => Literal::Int(n),
            Err(_) => Literal::Other(raw.to_owned()),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(n) => Some(*n),
            Literal::Str(s) => s.trim().parse().ok(),
            Literal::Other(_) => None,
        }
    }

    /// Blank cells: `''`, `0`, `null`, `undefined`.
    fn is_blank(&self) -> bool {
        match self {
            Literal::Str(s) => s.trim().is_empty(),
            Literal::Int(n) => *n == 0,
            Literal::Other(s) => matches!(s.as_str(), "" | "null" | "undefined"),
        }
    }
}

/// One recognized statement, with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Scalar {
        line: usize,
        name: String,
        value: Literal,
    },
    Cell {
        line: usize,
        array: String,
        row: u32,
        col: u32,
        value: Literal,
    },
    Row {
        line: usize,
        array: String,
        row: u32,
        values: Vec<Literal>,
    },
}

/// Scans a script into assignment records.
pub fn scan_assignments(text: &str) -> Vec<Assignment> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(c) = CELL_RE.captures(line) {
            // indices are \d+, only overflow can fail
            let (Ok(row), Ok(col)) = (c[2].parse(), c[3].parse()) else {
                log::warn!("line {line_no}: index out of range, skipped");
                continue;
            };
            out.push(Assignment::Cell {
                line: line_no,
                array: c[1].to_owned(),
                row,
                col,
                value: Literal::parse(&c[4]),
            });
        } else if let Some(c) = ROW_RE.captures(line) {
            let Ok(row) = c[2].parse() else {
                log::warn!("line {line_no}: index out of range, skipped");
                continue;
            };
            out.push(Assignment::Row {
                line: line_no,
                array: c[1].to_owned(),
                row,
                values: c[3]
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(Literal::parse)
                    .collect(),
            });
        } else if let Some(c) = SCALAR_RE.captures(line) {
            out.push(Assignment::Scalar {
                line: line_no,
                name: c[1].to_owned(),
                value: Literal::parse(&c[2]),
            });
        }
    }
    out
}

/// Splits `tileset/N.png` into the tileset name and the 1-based id.
pub fn parse_tile_ref(value: &str) -> Option<(String, u32)> {
    let (prefix, file) = value.trim().rsplit_once('/')?;
    let tileset = prefix.rsplit('/').next()?.trim();
    let stem = file
        .strip_suffix(".png")
        .or_else(|| file.strip_suffix(".PNG"))
        .unwrap_or(file);
    let id = stem.trim().parse().ok()?;
    if tileset.is_empty() {
        return None;
    }
    Some((tileset.to_owned(), id))
}

// tilesets keep the order of first appearance
fn declare(tileset: &str, tilesets: &mut Vec<String>) {
    if !tilesets.iter().any(|t| t == tileset) {
        tilesets.push(tileset.to_owned());
    }
}

fn legacy_err(line: usize, message: impl Into<String>) -> MapError {
    MapError::Legacy {
        line,
        message: message.into(),
    }
}

fn dimension(line: usize, name: &str, value: &Literal) -> Result<u32, MapError> {
    value
        .as_int()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| legacy_err(line, format!("{name} must be a non-negative number")))
}

/// Decodes a legacy map script plus its optional field-type companion file.
pub fn decode_legacy_str(
    script: &str,
    field_types: Option<&str>,
    tile_w: u32,
    tile_h: u32,
) -> Result<IrMap, MapError> {
    let mut name = String::new();
    let mut width = None;
    let mut height = None;
    let (mut tile_w, mut tile_h) = (tile_w, tile_h);
    let mut main_bg: Option<(String, u32)> = None;
    let mut tilesets: Vec<String> = Vec::new();
    let mut cells: Vec<Vec<IrCell>> = vec![Vec::new(); LEGACY_LAYERS.len()];
    let mut skipped: Vec<String> = Vec::new();

    for assignment in scan_assignments(script) {
        match assignment {
            Assignment::Scalar { line, name: key, value } => match key.as_str() {
                "name" => {
                    name = match value {
                        Literal::Str(s) | Literal::Other(s) => s,
                        Literal::Int(n) => n.to_string(),
                    }
                }
                "width" => width = Some(dimension(line, "width", &value)?),
                "height" => height = Some(dimension(line, "height", &value)?),
                "tile_width" => tile_w = dimension(line, "tile_width", &value)?,
                "tile_height" => tile_h = dimension(line, "tile_height", &value)?,
                "main_bg" => {
                    if let Literal::Str(s) = &value {
                        main_bg = parse_tile_ref(s);
                        if let Some((ts, _)) = &main_bg {
                            declare(ts, &mut tilesets);
                        }
                    }
                }
                _ => {}
            },
            Assignment::Cell {
                line,
                array,
                row,
                col,
                value,
            } => {
                let Some(slot) = LEGACY_LAYERS.iter().position(|(n, _, _)| *n == array) else {
                    if !skipped.contains(&array) {
                        log::warn!("line {line}: unknown layer array '{array}' skipped");
                        skipped.push(array);
                    }
                    continue;
                };
                if value.is_blank() {
                    continue;
                }
                let Literal::Str(text) = &value else {
                    return Err(legacy_err(
                        line,
                        format!("{array}[{row}][{col}] is not a tile reference"),
                    ));
                };
                let (tileset, id) = parse_tile_ref(text).ok_or_else(|| {
                    legacy_err(line, format!("'{text}' is not a tileset/N.png reference"))
                })?;
                declare(&tileset, &mut tilesets);
                cells[slot].push(IrCell {
                    x: i64::from(col),
                    y: i64::from(row),
                    tile: IrTileRef::Sequential { tileset, id },
                });
            }
            Assignment::Row { .. } => {}
        }
    }

    let width = width.ok_or_else(|| MapError::InvalidMap("legacy script sets no width".into()))?;
    let height =
        height.ok_or_else(|| MapError::InvalidMap("legacy script sets no height".into()))?;

    // an unset background takes main_bg everywhere
    if let Some((tileset, id)) = &main_bg {
        if cells[0].is_empty() {
            log::debug!("filling background with main_bg {tileset}/{id}");
            for y in 0..height {
                for x in 0..width {
                    cells[0].push(IrCell {
                        x: i64::from(x),
                        y: i64::from(y),
                        tile: IrTileRef::Sequential {
                            tileset: tileset.clone(),
                            id: *id,
                        },
                    });
                }
            }
        }
    }

    let mut layers: Vec<IrLayer> = LEGACY_LAYERS
        .iter()
        .zip(cells)
        .map(|((array, kind, z), cells)| {
            let mut layer = IrLayer::new(*array, *kind, *z, IrLayerKind::Cells(cells));
            layer.skip_if_empty = true;
            layer
        })
        .collect();

    let mut spawn = None;
    if let Some(companion) = field_types {
        let (layer, default_cell) = decode_field_types(companion)?;
        spawn = default_cell;
        layers.push(layer);
    }

    Ok(IrMap {
        uuid: None,
        name,
        width,
        height,
        tile_w,
        tile_h,
        spawn,
        tilesets: tilesets
            .into_iter()
            .map(|name| IrTileset::Named {
                uuid: None,
                name,
                image_hint: None,
            })
            .collect(),
        layers,
    })
}

/// Companion file: `map_default_x/y` and `field_type[row] = [..]` rows.
fn decode_field_types(text: &str) -> Result<(IrLayer, Option<(u32, u32)>), MapError> {
    let mut default_x = None;
    let mut default_y = None;
    let mut codes = Vec::new();

    for assignment in scan_assignments(text) {
        match assignment {
            Assignment::Scalar { line, name, value } => match name.as_str() {
                "map_default_x" => default_x = Some(dimension(line, "map_default_x", &value)?),
                "map_default_y" => default_y = Some(dimension(line, "map_default_y", &value)?),
                _ => {}
            },
            Assignment::Row {
                line,
                array,
                row,
                values,
            } if array == "field_type" => {
                for (col, v) in values.iter().enumerate() {
                    let code = v.as_int().ok_or_else(|| {
                        legacy_err(line, format!("field_type[{row}][{col}] is not a number"))
                    })?;
                    codes.push((i64::from(row), col as i64, code));
                }
            }
            Assignment::Cell {
                line,
                array,
                row,
                col,
                value,
            } if array == "field_type" => {
                let code = value.as_int().ok_or_else(|| {
                    legacy_err(line, format!("field_type[{row}][{col}] is not a number"))
                })?;
                codes.push((i64::from(row), i64::from(col), code));
            }
            _ => {}
        }
    }

    let spawn = match (default_x, default_y) {
        (Some(x), Some(y)) => Some((x, y)),
        (None, None) => None,
        _ => {
            log::warn!("companion file sets only one of map_default_x/map_default_y, spawn ignored");
            None
        }
    };

    let mut layer = IrLayer::new(
        "field_type",
        LayerType::FieldType,
        5,
        IrLayerKind::LegacyFieldCodes(codes),
    );
    layer.skip_if_empty = true;
    Ok((layer, spawn))
}
