use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::MapError;
use crate::ir_map::{IrLayerKind, IrMap, IrTileRef, IrTileset};
use crate::layer::Cell;
use crate::loader::{json_loader, legacy_loader, tmx_loader};
use crate::map::{MapData, TileMap};
use crate::normalize::{normalize_layer, MapDims};
use crate::resolver::{FsImageProbe, ImageProbe, ResolverOptions, TilesetResolver};
use crate::store::{MapSink, TilesetStore};
use crate::tileset::{GidRange, GidTable, TileSet, DEFAULT_TILE_SIZE};

/// Input format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFormat {
    Tmx,
    Json,
    Legacy,
}

impl MapFormat {
    pub fn from_path(path: &Path) -> Result<Self, MapError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "tmx" | "xml" => Ok(MapFormat::Tmx),
            "json" => Ok(MapFormat::Json),
            "js" | "txt" => Ok(MapFormat::Legacy),
            _ => Err(MapError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Import policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Create tileset records for tilesets that have an image but no record.
    pub auto_create_tilesets: bool,
    pub default_tile_width: u32,
    pub default_tile_height: u32,
    /// Where [`FsImageProbe`] looks for tileset images.
    pub image_search_dirs: Vec<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            auto_create_tilesets: true,
            default_tile_width: DEFAULT_TILE_SIZE,
            default_tile_height: DEFAULT_TILE_SIZE,
            image_search_dirs: Vec::new(),
        }
    }
}

impl ImportConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, MapError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read import config {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse import config {}", path.display()))
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            allow_create: self.auto_create_tilesets,
            default_tile_width: self.default_tile_width,
            default_tile_height: self.default_tile_height,
        }
    }

    pub fn image_probe(&self) -> FsImageProbe {
        FsImageProbe::new(self.image_search_dirs.iter().cloned())
    }
}

/// Raw input for one import.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Tmx { text: String, name: String },
    Json(String),
    Legacy {
        script: String,
        field_types: Option<String>,
    },
}

/// Result of an import, ready for [`MapSink::commit`].
#[derive(Debug, Clone)]
pub struct ImportedMap {
    pub data: MapData,
    /// Tilesets synthesized by this import; every other tileset already had a record.
    pub created_tilesets: Vec<Uuid>,
}

impl ImportedMap {
    pub fn new_tilesets(&self) -> impl Iterator<Item = &TileSet> + '_ {
        self.data
            .tilesets
            .iter()
            .filter(|t| self.created_tilesets.contains(&t.uuid))
    }
}

/// Runs decode, tileset resolution, normalization and validation.
pub struct Importer<'a> {
    config: &'a ImportConfig,
    store: &'a dyn TilesetStore,
    probe: &'a dyn ImageProbe,
}

impl<'a> Importer<'a> {
    pub fn new(
        config: &'a ImportConfig,
        store: &'a dyn TilesetStore,
        probe: &'a dyn ImageProbe,
    ) -> Self {
        Importer {
            config,
            store,
            probe,
        }
    }

    pub fn decode(&self, source: &ImportSource) -> Result<IrMap, MapError> {
        match source {
            ImportSource::Tmx { text, name } => tmx_loader::decode_tmx_str(text, name),
            ImportSource::Json(text) => json_loader::decode_json_str(text),
            ImportSource::Legacy {
                script,
                field_types,
            } => legacy_loader::decode_legacy_str(
                script,
                field_types.as_deref(),
                self.config.default_tile_width,
                self.config.default_tile_height,
            ),
        }
    }

    pub fn import(&self, source: &ImportSource) -> Result<ImportedMap, MapError> {
        let ir = self.decode(source)?;
        self.build(ir)
    }

    /// Turns a decoded map into canonical data. Nothing is persisted here.
    pub fn build(&self, ir: IrMap) -> Result<ImportedMap, MapError> {
        if ir.width == 0 || ir.height == 0 {
            return Err(MapError::InvalidMap(format!(
                "map '{}' has size {}x{}",
                ir.name, ir.width, ir.height
            )));
        }
        if ir.tile_w == 0 || ir.tile_h == 0 {
            return Err(MapError::InvalidMap(format!(
                "map '{}' has tile size {}x{}",
                ir.name, ir.tile_w, ir.tile_h
            )));
        }
        log::info!(
            "importing map '{}' ({}x{}, {} layers, {} tilesets declared)",
            ir.name,
            ir.width,
            ir.height,
            ir.layers.len(),
            ir.tilesets.len()
        );

        let mut resolver =
            TilesetResolver::new(self.store, self.probe, self.config.resolver_options());

        let mut ranges = Vec::new();
        for decl in &ir.tilesets {
            let resolution = resolver.declare(decl)?;
            if let (
                IrTileset::Atlas {
                    first_gid,
                    name,
                    image_w,
                    image_h,
                    tile_w,
                    tile_h,
                    tilecount,
                    ..
                },
                Some(ts),
            ) = (decl, resolution.tileset())
            {
                let columns = image_w.checked_div(*tile_w).unwrap_or(0);
                let rows = image_h.checked_div(*tile_h).unwrap_or(0);
                if columns == 0 {
                    return Err(MapError::InvalidTileset {
                        name: name.clone(),
                        reason: format!("image width {image_w} holds no {tile_w}px column"),
                    });
                }
                ranges.push(GidRange {
                    first_gid: *first_gid,
                    tile_count: tilecount.unwrap_or(columns * rows),
                    columns,
                    tileset: ts.uuid,
                });
            }
        }
        let gids = GidTable::new(ranges);

        // resolve every reference up front so the missing list is complete
        for layer in &ir.layers {
            if let IrLayerKind::Cells(cells) = &layer.kind {
                for cell in cells {
                    match &cell.tile {
                        IrTileRef::Sequential { tileset, .. } => {
                            resolver.resolve(tileset, None)?;
                        }
                        IrTileRef::Local { tileset, .. } => {
                            resolver.resolve_reference(tileset)?;
                        }
                        IrTileRef::Gid(_) => {}
                    }
                }
            }
        }

        let missing = resolver.missing();
        if !missing.is_empty() {
            if !self.config.auto_create_tilesets {
                return Err(MapError::MissingTilesets {
                    names: missing.iter().map(|m| m.name.clone()).collect(),
                });
            }
            return Err(MapError::TilesetsRequireUpload {
                tilesets: missing.to_vec(),
            });
        }

        let dims = MapDims {
            width: ir.width,
            height: ir.height,
            tile_width: ir.tile_w,
            tile_height: ir.tile_h,
        };
        let mut layers = Vec::with_capacity(ir.layers.len());
        for ir_layer in &ir.layers {
            if let Some(layer) = normalize_layer(ir_layer, dims, &mut resolver, &gids)? {
                layers.push(layer);
            }
        }
        layers.sort_by_key(|l| l.z);

        let resolved = resolver.finish();
        let name = if ir.name.trim().is_empty() {
            "untitled".to_owned()
        } else {
            ir.name
        };
        let data = MapData {
            map: TileMap {
                uuid: ir.uuid.unwrap_or_else(Uuid::new_v4),
                name,
                width: ir.width,
                height: ir.height,
                tile_width: ir.tile_w,
                tile_height: ir.tile_h,
                spawn: ir.spawn.map(|(x, y)| Cell::new(x, y)),
            },
            layers,
            tilesets: resolved.tilesets,
        };
        data.validate()?;

        log::info!(
            "imported map '{}': {} layers, {} cells, {} tilesets ({} created)",
            data.map.name,
            data.layers.len(),
            data.tile_count(),
            data.tilesets.len(),
            resolved.created.len()
        );
        Ok(ImportedMap {
            data,
            created_tilesets: resolved.created,
        })
    }
}

/// Imports `source` and commits the result to `store` as one unit.
pub fn import_and_commit<S: TilesetStore + MapSink>(
    store: &mut S,
    probe: &dyn ImageProbe,
    config: &ImportConfig,
    source: &ImportSource,
) -> Result<ImportedMap, MapError> {
    let imported = Importer::new(config, &*store, probe).import(source)?;
    store.commit(&imported)?;
    Ok(imported)
}

/// Legacy companion file for `path`: `<stem>_field_type.<ext>` next to it.
pub fn companion_path(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("js");
    Some(path.with_file_name(format!("{stem}_field_type.{ext}")))
}

fn read_file(path: &Path) -> Result<String, MapError> {
    fs::read_to_string(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a map file, imports it and commits it. The file's directory is
/// searched for tileset images after the configured directories.
pub fn import_file<S: TilesetStore + MapSink>(
    path: impl AsRef<Path>,
    store: &mut S,
    config: &ImportConfig,
) -> anyhow::Result<ImportedMap> {
    let path = path.as_ref();
    let format = MapFormat::from_path(path)?;
    let text = read_file(path).with_context(|| format!("Failed to read map {}", path.display()))?;

    let source = match format {
        MapFormat::Tmx => ImportSource::Tmx {
            text,
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        },
        MapFormat::Json => ImportSource::Json(text),
        MapFormat::Legacy => {
            let field_types = match companion_path(path).filter(|p| p.is_file()) {
                Some(p) => Some(
                    read_file(&p)
                        .with_context(|| format!("Failed to read field types {}", p.display()))?,
                ),
                None => None,
            };
            ImportSource::Legacy {
                script: text,
                field_types,
            }
        }
    };

    let mut dirs = config.image_search_dirs.clone();
    if let Some(parent) = path.parent() {
        dirs.push(parent.to_path_buf());
    }
    let probe = FsImageProbe::new(dirs);
    import_and_commit(store, &probe, config, &source)
        .with_context(|| format!("Failed to import map {}", path.display()))
}
