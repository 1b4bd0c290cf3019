use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::error::MapError;
use crate::ir_map::IrTileset;
use crate::store::TilesetStore;
use crate::tileset::{image_basename, TileSet, DEFAULT_TILE_SIZE};

/// A referenced tileset with no record. Coordinate math is impossible until
/// an image is supplied, so no dimensions are guessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTileset {
    pub name: String,
    /// `false` when an image exists but tileset creation is disabled.
    pub requires_upload: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Matched a record that already existed.
    Existing(TileSet),
    /// Synthesized during this import.
    Created(TileSet),
    Missing(MissingTileset),
}

impl Resolution {
    pub fn tileset(&self) -> Option<&TileSet> {
        match self {
            Resolution::Existing(ts) | Resolution::Created(ts) => Some(ts),
            Resolution::Missing(_) => None,
        }
    }
}

/// Locates tileset images and reads their dimensions.
pub trait ImageProbe {
    fn locate(&self, tileset_name: &str, candidate: Option<&str>) -> Option<PathBuf>;
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), MapError>;
}

/// Probe that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImageProbe for NoImages {
    fn locate(&self, _tileset_name: &str, _candidate: Option<&str>) -> Option<PathBuf> {
        None
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32), MapError> {
        Err(MapError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }
}

/// Searches a list of directories for `<candidate>` or `<name>.png`.
#[derive(Debug, Default, Clone)]
pub struct FsImageProbe {
    search_dirs: Vec<PathBuf>,
}

impl FsImageProbe {
    pub fn new(search_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        FsImageProbe {
            search_dirs: search_dirs.into_iter().collect(),
        }
    }
}

impl ImageProbe for FsImageProbe {
    fn locate(&self, tileset_name: &str, candidate: Option<&str>) -> Option<PathBuf> {
        let mut names: Vec<PathBuf> = Vec::new();
        if let Some(c) = candidate.filter(|c| !c.is_empty()) {
            names.push(PathBuf::from(c));
            if let Some(base) = image_basename(c) {
                names.push(PathBuf::from(base));
            }
        }
        names.push(PathBuf::from(format!("{tileset_name}.png")));

        for name in &names {
            if name.is_absolute() && name.is_file() {
                return Some(name.clone());
            }
            for dir in &self.search_dirs {
                let p = dir.join(name);
                if p.is_file() {
                    return Some(p);
                }
            }
        }
        None
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32), MapError> {
        image::image_dimensions(path).map_err(|source| MapError::Image {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Synthesize records for tilesets that only exist as images or declarations.
    pub allow_create: bool,
    pub default_tile_width: u32,
    pub default_tile_height: u32,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            allow_create: true,
            default_tile_width: DEFAULT_TILE_SIZE,
            default_tile_height: DEFAULT_TILE_SIZE,
        }
    }
}

/// Final output of one import's resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTilesets {
    pub tilesets: Vec<TileSet>,
    pub created: Vec<Uuid>,
    pub missing: Vec<MissingTileset>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', " ")
}

/// Same tileset under the name normalizations: exact, case-insensitive,
/// underscore/space interchange.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.eq_ignore_ascii_case(b) || normalize_name(a) == normalize_name(b)
}

/// Resolves tileset references to canonical identities for a single import.
///
/// Lives only as long as the import; the name cache never outlives it.
pub struct TilesetResolver<'a> {
    store: &'a dyn TilesetStore,
    probe: &'a dyn ImageProbe,
    options: ResolverOptions,
    resolved: Vec<TileSet>,
    created: Vec<Uuid>,
    missing: Vec<MissingTileset>,
    // reference as written in the input -> identity
    aliases: HashMap<String, Uuid>,
    // declared uuid -> name of the missing tileset it stands for
    missing_aliases: HashMap<String, String>,
}

impl<'a> TilesetResolver<'a> {
    pub fn new(
        store: &'a dyn TilesetStore,
        probe: &'a dyn ImageProbe,
        options: ResolverOptions,
    ) -> Self {
        TilesetResolver {
            store,
            probe,
            options,
            resolved: Vec::new(),
            created: Vec::new(),
            missing: Vec::new(),
            aliases: HashMap::new(),
            missing_aliases: HashMap::new(),
        }
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&TileSet> {
        self.resolved.iter().find(|t| t.uuid == *uuid)
    }

    pub fn missing(&self) -> &[MissingTileset] {
        &self.missing
    }

    /// Resolves a tileset known only by name (and maybe an image path).
    pub fn resolve(
        &mut self,
        name: &str,
        candidate_image: Option<&str>,
    ) -> Result<Resolution, MapError> {
        if let Some(hit) = self.cached(name) {
            return Ok(hit);
        }

        if let Some(existing) = self.find_existing(name, candidate_image) {
            return Ok(self.remember_existing(name, existing));
        }

        let Some(path) = self.probe.locate(name, candidate_image) else {
            log::debug!("tileset '{name}' has no record and no image");
            return Ok(self.remember_missing(name, true));
        };
        if !self.options.allow_create {
            return Ok(self.remember_missing(name, false));
        }

        let (image_width, image_height) = self.probe.dimensions(&path)?;
        let tileset = TileSet {
            uuid: TileSet::stable_uuid(name),
            name: name.to_owned(),
            image_width,
            image_height,
            tile_width: self.options.default_tile_width,
            tile_height: self.options.default_tile_height,
            image_path: path.to_string_lossy().into_owned(),
            margin: 0,
            spacing: 0,
        };
        tileset.validate()?;
        log::info!(
            "created tileset '{name}' from {} ({}x{})",
            path.display(),
            image_width,
            image_height
        );
        Ok(self.remember_created(name, tileset))
    }

    /// Resolves a tileset the input declares with its own dimensions.
    pub fn declare(&mut self, decl: &IrTileset) -> Result<Resolution, MapError> {
        let (uuid, name, image, image_w, image_h, tile_w, tile_h, spacing, margin) = match decl {
            IrTileset::Named {
                uuid,
                name,
                image_hint,
            } => {
                if let Some(id) = uuid {
                    if let Some(existing) = self.get(id).cloned().or_else(|| self.store.by_uuid(id)) {
                        self.aliases.insert(id.to_string(), existing.uuid);
                        return Ok(self.remember_existing(name, existing));
                    }
                }
                let resolution = self.resolve(name, image_hint.as_deref())?;
                if let Some(id) = uuid {
                    self.alias_uuid(*id, &resolution);
                }
                return Ok(resolution);
            }
            IrTileset::Atlas {
                name,
                image,
                image_w,
                image_h,
                tile_w,
                tile_h,
                spacing,
                margin,
                ..
            } => (
                None, name, image, *image_w, *image_h, *tile_w, *tile_h, *spacing, *margin,
            ),
            IrTileset::Record {
                uuid,
                name,
                image,
                image_w,
                image_h,
                tile_w,
                tile_h,
                spacing,
                margin,
            } => (
                *uuid, name, image, *image_w, *image_h, *tile_w, *tile_h, *spacing, *margin,
            ),
        };

        if let Some(id) = uuid {
            if let Some(hit) = self.cached(&id.to_string()) {
                if let Some(ts) = hit.tileset() {
                    self.aliases.entry(name.clone()).or_insert(ts.uuid);
                }
                return Ok(hit);
            }
            if let Some(existing) = self.get(&id).cloned().or_else(|| self.store.by_uuid(&id)) {
                self.aliases.insert(id.to_string(), existing.uuid);
                return Ok(self.remember_existing(name, existing));
            }
        }

        if let Some(hit) = self.cached(name) {
            if let Some(id) = uuid {
                self.alias_uuid(id, &hit);
            }
            return Ok(hit);
        }

        let image = (!image.is_empty()).then_some(image.as_str());
        if let Some(existing) = self.find_existing(name, image) {
            if let Some(id) = uuid {
                self.aliases.insert(id.to_string(), existing.uuid);
            }
            return Ok(self.remember_existing(name, existing));
        }

        if !self.options.allow_create {
            let missing = self.remember_missing(name, false);
            if let Some(id) = uuid {
                self.alias_uuid(id, &missing);
            }
            return Ok(missing);
        }

        let tileset = TileSet {
            uuid: uuid.unwrap_or_else(|| TileSet::stable_uuid(name)),
            name: name.clone(),
            image_width: image_w,
            image_height: image_h,
            tile_width: if tile_w == 0 { self.options.default_tile_width } else { tile_w },
            tile_height: if tile_h == 0 { self.options.default_tile_height } else { tile_h },
            image_path: image.unwrap_or_default().to_owned(),
            margin,
            spacing,
        };
        tileset.validate()?;
        if let Some(id) = uuid {
            self.aliases.insert(id.to_string(), tileset.uuid);
        }
        Ok(self.remember_created(name, tileset))
    }

    /// Resolves a reference that is either a uuid string or a tileset name.
    pub fn resolve_reference(&mut self, reference: &str) -> Result<Resolution, MapError> {
        if let Some(hit) = self.cached(reference) {
            return Ok(hit);
        }
        match Uuid::parse_str(reference) {
            Ok(id) => {
                if let Some(existing) = self.get(&id).cloned().or_else(|| self.store.by_uuid(&id)) {
                    let name = existing.name.clone();
                    self.aliases.insert(name, existing.uuid);
                    return Ok(self.remember_existing(reference, existing));
                }
                Ok(self.remember_missing(reference, true))
            }
            Err(_) => self.resolve(reference, None),
        }
    }

    pub fn finish(self) -> ResolvedTilesets {
        ResolvedTilesets {
            tilesets: self.resolved,
            created: self.created,
            missing: self.missing,
        }
    }

    fn cached(&self, reference: &str) -> Option<Resolution> {
        if let Some(id) = self.aliases.get(reference) {
            let ts = self.get(id)?.clone();
            return Some(if self.created.contains(id) {
                Resolution::Created(ts)
            } else {
                Resolution::Existing(ts)
            });
        }
        let name = self
            .missing_aliases
            .get(reference)
            .map(String::as_str)
            .unwrap_or(reference);
        self.missing
            .iter()
            .find(|m| names_match(&m.name, name))
            .cloned()
            .map(Resolution::Missing)
    }

    /// Points a declared uuid at whatever its declaration resolved to.
    fn alias_uuid(&mut self, id: Uuid, resolution: &Resolution) {
        match resolution {
            Resolution::Missing(missing) => {
                self.missing_aliases.insert(id.to_string(), missing.name.clone());
            }
            Resolution::Existing(ts) | Resolution::Created(ts) => {
                self.aliases.insert(id.to_string(), ts.uuid);
            }
        }
    }

    fn find_existing(&self, name: &str, candidate_image: Option<&str>) -> Option<TileSet> {
        // (a) exact name
        if let Some(ts) = self.store.by_name(name) {
            return Some(ts);
        }
        if let Some(ts) = self.resolved.iter().find(|t| t.name == name) {
            return Some(ts.clone());
        }

        let stored = self.store.all();
        let pool = || stored.iter().chain(self.resolved.iter());

        // (b) case / underscore-space normalization
        if let Some(ts) = pool().find(|t| names_match(&t.name, name)) {
            return Some(ts.clone());
        }

        // (c) image file name
        let wanted = candidate_image.and_then(image_basename)?;
        pool()
            .find(|t| {
                t.image_basename()
                    .is_some_and(|b| b.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    }

    fn remember_existing(&mut self, reference: &str, tileset: TileSet) -> Resolution {
        self.aliases.insert(reference.to_owned(), tileset.uuid);
        if self.get(&tileset.uuid).is_none() {
            log::debug!("tileset '{reference}' resolved to '{}'", tileset.name);
            self.resolved.push(tileset.clone());
        }
        if self.created.contains(&tileset.uuid) {
            Resolution::Created(tileset)
        } else {
            Resolution::Existing(tileset)
        }
    }

    fn remember_created(&mut self, reference: &str, tileset: TileSet) -> Resolution {
        self.aliases.insert(reference.to_owned(), tileset.uuid);
        self.created.push(tileset.uuid);
        self.resolved.push(tileset.clone());
        Resolution::Created(tileset)
    }

    fn remember_missing(&mut self, reference: &str, requires_upload: bool) -> Resolution {
        // one entry per resource, however the input spells it
        if let Some(seen) = self.missing.iter().find(|m| names_match(&m.name, reference)) {
            return Resolution::Missing(seen.clone());
        }
        let missing = MissingTileset {
            name: reference.to_owned(),
            requires_upload,
        };
        self.missing.push(missing.clone());
        Resolution::Missing(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    struct FixedProbe {
        name: &'static str,
        dims: (u32, u32),
    }

    impl ImageProbe for FixedProbe {
        fn locate(&self, tileset_name: &str, _candidate: Option<&str>) -> Option<PathBuf> {
            (tileset_name == self.name).then(|| PathBuf::from(format!("{tileset_name}.png")))
        }

        fn dimensions(&self, _path: &Path) -> Result<(u32, u32), MapError> {
            Ok(self.dims)
        }
    }

    fn record(name: &str, image: &str) -> TileSet {
        TileSet {
            uuid: Uuid::new_v4(),
            name: name.into(),
            image_width: 256,
            image_height: 256,
            tile_width: 32,
            tile_height: 32,
            image_path: image.into(),
            margin: 0,
            spacing: 0,
        }
    }

    #[test]
    fn matches_existing_records_by_normalized_name() {
        let forest = record("Dark Forest", "tiles/dark_forest.png");
        let store = InMemoryStore::with_tilesets([forest.clone()]);
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        for name in ["Dark Forest", "dark forest", "dark_forest", "DARK_FOREST"] {
            match r.resolve(name, None).unwrap() {
                Resolution::Existing(ts) => assert_eq!(ts.uuid, forest.uuid),
                other => panic!("{name}: expected existing, got {other:?}"),
            }
        }
        assert_eq!(r.finish().tilesets.len(), 1);
    }

    #[test]
    fn matches_existing_records_by_image_basename() {
        let cave = record("cave set", "uploads/3/cave.png");
        let store = InMemoryStore::with_tilesets([cave.clone()]);
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        let res = r.resolve("dungeon", Some("old/export/cave.png")).unwrap();
        assert_eq!(res.tileset().map(|t| t.uuid), Some(cave.uuid));
    }

    #[test]
    fn unknown_without_image_requires_upload() {
        let store = InMemoryStore::new();
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        let res = r.resolve("ghost", None).unwrap();
        assert_eq!(
            res,
            Resolution::Missing(MissingTileset {
                name: "ghost".into(),
                requires_upload: true
            })
        );
        assert_eq!(r.missing().len(), 1);
        // asking again does not duplicate the entry
        r.resolve("ghost", None).unwrap();
        assert_eq!(r.missing().len(), 1);
    }

    #[test]
    fn missing_spellings_of_one_tileset_share_an_entry() {
        let store = InMemoryStore::new();
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        r.resolve("ghost", None).unwrap();
        r.resolve("Ghost", None).unwrap();
        r.resolve_reference("GHOST").unwrap();
        assert_eq!(
            r.missing(),
            &[MissingTileset {
                name: "ghost".into(),
                requires_upload: true
            }]
        );
    }

    #[test]
    fn image_without_record_synthesizes_tileset() {
        let store = InMemoryStore::new();
        let probe = FixedProbe {
            name: "town",
            dims: (256, 128),
        };
        let mut r = TilesetResolver::new(&store, &probe, ResolverOptions::default());

        let Resolution::Created(ts) = r.resolve("town", None).unwrap() else {
            panic!("expected a created tileset");
        };
        assert_eq!(ts.tiles_per_row(), 8);
        assert_eq!(ts.tiles_per_column(), 4);
        assert_eq!(ts.uuid, TileSet::stable_uuid("town"));

        let done = r.finish();
        assert_eq!(done.created, vec![ts.uuid]);
    }

    #[test]
    fn image_narrower_than_a_tile_is_rejected() {
        let store = InMemoryStore::new();
        let probe = FixedProbe {
            name: "sliver",
            dims: (16, 128),
        };
        let mut r = TilesetResolver::new(&store, &probe, ResolverOptions::default());

        assert!(matches!(
            r.resolve("sliver", None),
            Err(MapError::InvalidTileset { .. })
        ));
    }

    #[test]
    fn creation_disabled_reports_missing_without_upload() {
        let store = InMemoryStore::new();
        let probe = FixedProbe {
            name: "town",
            dims: (256, 128),
        };
        let options = ResolverOptions {
            allow_create: false,
            ..ResolverOptions::default()
        };
        let mut r = TilesetResolver::new(&store, &probe, options);

        let res = r.resolve("town", None).unwrap();
        assert_eq!(
            res,
            Resolution::Missing(MissingTileset {
                name: "town".into(),
                requires_upload: false
            })
        );
    }

    #[test]
    fn declared_record_uuid_aliases_to_existing_identity() {
        let stored = record("grass", "grass.png");
        let store = InMemoryStore::with_tilesets([stored.clone()]);
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        let foreign = Uuid::new_v4();
        let decl = IrTileset::Record {
            uuid: Some(foreign),
            name: "Grass".into(),
            image: "grass.png".into(),
            image_w: 256,
            image_h: 256,
            tile_w: 32,
            tile_h: 32,
            spacing: 0,
            margin: 0,
        };
        assert_eq!(r.declare(&decl).unwrap().tileset().map(|t| t.uuid), Some(stored.uuid));
        let by_ref = r.resolve_reference(&foreign.to_string()).unwrap();
        assert_eq!(by_ref.tileset().map(|t| t.uuid), Some(stored.uuid));
    }

    #[test]
    fn declared_name_uuid_aliases_to_existing_identity() {
        let stored = record("grass", "grass.png");
        let store = InMemoryStore::with_tilesets([stored.clone()]);
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        let foreign = Uuid::from_u128(0xabc);
        let decl = IrTileset::Named {
            uuid: Some(foreign),
            name: "grass".into(),
            image_hint: None,
        };
        assert_eq!(r.declare(&decl).unwrap().tileset().map(|t| t.uuid), Some(stored.uuid));
        let by_ref = r.resolve_reference(&foreign.to_string()).unwrap();
        assert_eq!(by_ref.tileset().map(|t| t.uuid), Some(stored.uuid));
        assert!(r.missing().is_empty());
    }

    #[test]
    fn missing_declaration_is_listed_once_under_its_name() {
        let store = InMemoryStore::new();
        let mut r = TilesetResolver::new(&store, &NoImages, ResolverOptions::default());

        let foreign = Uuid::from_u128(0xdead);
        let decl = IrTileset::Named {
            uuid: Some(foreign),
            name: "ghost".into(),
            image_hint: None,
        };
        r.declare(&decl).unwrap();
        let by_ref = r.resolve_reference(&foreign.to_string()).unwrap();
        assert!(matches!(by_ref, Resolution::Missing(ref m) if m.name == "ghost"));
        assert_eq!(r.missing().len(), 1);
    }
}
