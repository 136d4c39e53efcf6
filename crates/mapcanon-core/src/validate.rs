//! Read-only consistency checks over map documents.
//!
//! The [`Validator`] never mutates what it inspects. Single-map checks need
//! only the document and the object database; transition checks also need
//! the [`Corpus`] the document belongs to and are skipped without one.
//!
//! Findings are sorted by map id, coordinate, code and message, so two runs
//! over identical input serialize identically.

use crate::catalog::ObjectDatabase;
use crate::corpus::{run_parallel, worker_count, Corpus};
use crate::model::{BlockKind, BlockingGrid, Coord, MapDocument, ObjectCategory, DEFAULT_MAX_MAP_ID};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Structural violation; the corpus is not canonical until fixed
    Error,
    /// Likely intentional anomaly, reported but not blocking
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// Which check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FindingCode {
    /// A non-door object sits on a blocked cell
    ObjectOnBlockedTile,
    /// An object's catalog id is not in the object database
    ObjectNotFound,
    /// A transition has no inverse on its target map
    TransitionNotReciprocal,
    /// A transition points at a map the corpus does not hold
    TransitionTargetMissing,
    /// A transition lands outside its target map
    TransitionTargetOutOfBounds,
    /// A transition is listed on a map other than its source map
    TransitionSourceMismatch,
    /// A sign sits on a blocked cell
    SignOnBlockedTile,
    /// A sign has no text assigned
    SignMissingText,
    /// A spawn cannot reach any other walkable cell
    SpawnUnreachable,
    /// A spawn sits on a blocked cell
    SpawnOnBlockedTile,
    /// Several objects share one cell
    DuplicateObject,
    /// A stored category disagrees with the catalog
    CategoryMismatch,
    /// An entity lies outside the grid
    CoordinateOutOfBounds,
    /// A tile layer does not cover the grid exactly
    LayerSizeMismatch,
    /// The map id is outside the configured range
    MapIdOutOfRange,
    /// An NPC spawn references an id missing from the object database
    NpcNotFound,
}

impl FindingCode {
    /// Severity every finding with this code carries
    pub fn severity(self) -> Severity {
        match self {
            FindingCode::SpawnUnreachable
            | FindingCode::SpawnOnBlockedTile
            | FindingCode::DuplicateObject
            | FindingCode::CategoryMismatch => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Stable name used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            FindingCode::ObjectOnBlockedTile => "ObjectOnBlockedTile",
            FindingCode::ObjectNotFound => "ObjectNotFound",
            FindingCode::TransitionNotReciprocal => "TransitionNotReciprocal",
            FindingCode::TransitionTargetMissing => "TransitionTargetMissing",
            FindingCode::TransitionTargetOutOfBounds => "TransitionTargetOutOfBounds",
            FindingCode::TransitionSourceMismatch => "TransitionSourceMismatch",
            FindingCode::SignOnBlockedTile => "SignOnBlockedTile",
            FindingCode::SignMissingText => "SignMissingText",
            FindingCode::SpawnUnreachable => "SpawnUnreachable",
            FindingCode::SpawnOnBlockedTile => "SpawnOnBlockedTile",
            FindingCode::DuplicateObject => "DuplicateObject",
            FindingCode::CategoryMismatch => "CategoryMismatch",
            FindingCode::CoordinateOutOfBounds => "CoordinateOutOfBounds",
            FindingCode::LayerSizeMismatch => "LayerSizeMismatch",
            FindingCode::MapIdOutOfRange => "MapIdOutOfRange",
            FindingCode::NpcNotFound => "NpcNotFound",
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found in a map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFinding {
    /// Error or warning
    pub severity: Severity,
    /// Check that produced it
    pub code: FindingCode,
    /// Map the finding belongs to
    pub map_id: u16,
    /// Cell concerned, `None` for map-wide findings
    pub coordinate: Option<Coord>,
    /// Human readable detail
    pub message: String,
}

impl ValidationFinding {
    fn new(code: FindingCode, map_id: u16, coordinate: Option<Coord>, message: String) -> Self {
        Self {
            severity: code.severity(),
            code,
            map_id,
            coordinate,
            message,
        }
    }

    fn sort_key(&self) -> (u16, Option<Coord>, FindingCode, &str) {
        (self.map_id, self.coordinate, self.code, &self.message)
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map {} ", self.map_id)?;
        if let Some(coord) = self.coordinate {
            write!(f, "{} ", coord)?;
        }
        write!(f, "{} {}: {}", self.severity, self.code, self.message)
    }
}

fn sort_findings(findings: &mut [ValidationFinding]) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Findings of a validation run, in deterministic order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Every finding, sorted
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    /// Number of error findings
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    /// Number of warning findings
    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    /// Whether any finding is an error
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    /// Findings of one map
    pub fn for_map(&self, map_id: u16) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(move |f| f.map_id == map_id)
    }
}

/// Configuration for the validator
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Chebyshev distance within which a transition's inverse may land
    pub transition_tolerance: u16,
    /// Smallest walkable area, spawn cell included, a spawn must reach
    pub min_spawn_area: usize,
    /// Accepted map ids
    pub map_ids: RangeInclusive<u16>,
    /// Worker threads for corpus runs, 0 for one per core
    pub threads: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            transition_tolerance: 1,
            min_spawn_area: 2,
            map_ids: 1..=DEFAULT_MAX_MAP_ID,
            threads: 0,
        }
    }
}

impl ValidatorConfig {
    /// Creates a new validator config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reciprocity tolerance
    pub fn transition_tolerance(mut self, tolerance: u16) -> Self {
        self.transition_tolerance = tolerance;
        self
    }

    /// Sets the minimum reachable area for spawns
    pub fn min_spawn_area(mut self, cells: usize) -> Self {
        self.min_spawn_area = cells;
        self
    }

    /// Sets the accepted map id range
    pub fn map_ids(mut self, ids: RangeInclusive<u16>) -> Self {
        self.map_ids = ids;
        self
    }

    /// Sets the worker count
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Consistency validator bound to an object database
#[derive(Debug, Clone)]
pub struct Validator<'a> {
    objects: &'a ObjectDatabase,
    config: ValidatorConfig,
}

impl<'a> Validator<'a> {
    /// Creates a validator with default configuration
    pub fn new(objects: &'a ObjectDatabase) -> Self {
        Self {
            objects,
            config: ValidatorConfig::default(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Checks one map. Transition checks run only when `corpus` is given.
    pub fn validate_map(&self, doc: &MapDocument, corpus: Option<&Corpus>) -> Vec<ValidationFinding> {
        let mut run = MapRun {
            doc,
            grid: doc.blocking_grid(),
            findings: Vec::new(),
        };

        if !self.config.map_ids.contains(&doc.id) {
            run.push(
                FindingCode::MapIdOutOfRange,
                None,
                format!(
                    "map id {} outside {}..={}",
                    doc.id,
                    self.config.map_ids.start(),
                    self.config.map_ids.end()
                ),
            );
        }

        let cells = doc.cell_count();
        for layer in &doc.layers {
            if layer.tiles.len() != cells {
                run.push(
                    FindingCode::LayerSizeMismatch,
                    None,
                    format!(
                        "{} layer has {} tiles, grid has {} cells",
                        layer.plane.as_str(),
                        layer.tiles.len(),
                        cells
                    ),
                );
            }
        }

        for blocked in &doc.blocked_tiles {
            run.bounds(blocked.coord(), "blocked tile");
        }

        self.check_objects(&mut run);
        self.check_signs(&mut run);
        self.check_spawns(&mut run);
        self.check_transitions(&mut run, corpus);

        let mut findings = run.findings;
        sort_findings(&mut findings);
        debug!("Map {}: {} finding(s)", doc.id, findings.len());
        findings
    }

    /// Checks every map of `corpus` in parallel and merges the findings
    pub fn validate_corpus(&self, corpus: &Corpus) -> ValidationReport {
        let parts = corpus.partition(worker_count(self.config.threads));

        let mut findings: Vec<ValidationFinding> = run_parallel(parts, |docs| {
            docs.into_iter()
                .flat_map(|doc| self.validate_map(doc, Some(corpus)))
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();
        sort_findings(&mut findings);

        let report = ValidationReport { findings };
        info!(
            "Validated {} map(s): {} error(s), {} warning(s)",
            corpus.len(),
            report.error_count(),
            report.warning_count()
        );
        report
    }

    fn check_objects(&self, run: &mut MapRun<'_>) {
        let doc = run.doc;
        let mut per_cell: BTreeMap<Coord, usize> = BTreeMap::new();

        for object in &doc.objects {
            let at = object.coord();
            if !run.bounds(at, "object") {
                continue;
            }
            *per_cell.entry(at).or_default() += 1;

            let category = match self.objects.get(object.catalog_id) {
                Some(entry) => {
                    if object.category != entry.category {
                        run.push(
                            FindingCode::CategoryMismatch,
                            Some(at),
                            format!(
                                "object {} stored as {}, catalog says {}",
                                object.catalog_id,
                                object.category.as_str(),
                                entry.category.as_str()
                            ),
                        );
                    }
                    entry.category
                }
                None => {
                    run.push(
                        FindingCode::ObjectNotFound,
                        Some(at),
                        format!("object {} not in catalog", object.catalog_id),
                    );
                    object.category
                }
            };

            if let Some(kind) = run.grid.kind(at) {
                if category != ObjectCategory::Door {
                    run.push(
                        FindingCode::ObjectOnBlockedTile,
                        Some(at),
                        format!(
                            "{} object {} on {} tile",
                            category.as_str(),
                            object.catalog_id,
                            kind.as_str()
                        ),
                    );
                }
            }
        }

        for (at, count) in per_cell {
            if count > 1 {
                run.push(
                    FindingCode::DuplicateObject,
                    Some(at),
                    format!("{} objects share this cell", count),
                );
            }
        }
    }

    fn check_signs(&self, run: &mut MapRun<'_>) {
        let doc = run.doc;
        for sign in &doc.signs {
            let at = sign.coord();
            if !run.bounds(at, "sign") {
                continue;
            }
            if let Some(kind) = run.grid.kind(at) {
                run.push(
                    FindingCode::SignOnBlockedTile,
                    Some(at),
                    format!("sign on {} tile", kind.as_str()),
                );
            }
            if sign.text_id == 0 {
                run.push(FindingCode::SignMissingText, Some(at), "sign has no text".to_string());
            }
        }
    }

    fn check_spawns(&self, run: &mut MapRun<'_>) {
        let doc = run.doc;
        let doors: HashSet<Coord> = doc
            .objects
            .iter()
            .filter(|o| self.category_of(o.catalog_id, o.category) == ObjectCategory::Door)
            .map(|o| o.coord())
            .collect();

        let mut spawns: Vec<(Coord, String)> = Vec::new();
        for spawn in &doc.spawn_points {
            if run.bounds(spawn.coord(), "spawn point") {
                spawns.push((spawn.coord(), format!("spawn \"{}\"", spawn.description)));
            }
        }
        for npc in &doc.npc_spawns {
            let at = npc.coord();
            if !run.bounds(at, "npc spawn") {
                continue;
            }
            match self.objects.get(npc.npc_id) {
                None => run.push(
                    FindingCode::NpcNotFound,
                    Some(at),
                    format!("npc {} not in catalog", npc.npc_id),
                ),
                Some(entry) if entry.category != ObjectCategory::Npc => run.push(
                    FindingCode::CategoryMismatch,
                    Some(at),
                    format!("npc spawn uses {} entry {}", entry.category.as_str(), npc.npc_id),
                ),
                Some(_) => {}
            }
            spawns.push((at, format!("npc {} spawn", npc.npc_id)));
        }

        for (at, label) in spawns {
            if let Some(kind) = run.grid.kind(at) {
                run.push(
                    FindingCode::SpawnOnBlockedTile,
                    Some(at),
                    format!("{} on {} tile", label, kind.as_str()),
                );
                continue;
            }
            let area = reachable_area(&run.grid, &doors, at, self.config.min_spawn_area);
            if area < self.config.min_spawn_area {
                run.push(
                    FindingCode::SpawnUnreachable,
                    Some(at),
                    format!(
                        "{} reaches {} cell(s), needs {}",
                        label, area, self.config.min_spawn_area
                    ),
                );
            }
        }
    }

    fn check_transitions(&self, run: &mut MapRun<'_>, corpus: Option<&Corpus>) {
        let doc = run.doc;
        let tolerance = self.config.transition_tolerance;

        for t in &doc.transitions {
            let from = t.from();
            if !run.bounds(from, "transition") {
                continue;
            }
            if t.from_map_id != doc.id {
                run.push(
                    FindingCode::TransitionSourceMismatch,
                    Some(from),
                    format!("transition claims source map {}", t.from_map_id),
                );
            }

            let Some(corpus) = corpus else {
                continue;
            };
            let target = if t.to_map_id == doc.id {
                Some(doc)
            } else {
                corpus.get(t.to_map_id)
            };
            let Some(target) = target else {
                run.push(
                    FindingCode::TransitionTargetMissing,
                    Some(from),
                    format!("target map {} not in corpus", t.to_map_id),
                );
                continue;
            };
            if !target.in_bounds(t.to()) {
                run.push(
                    FindingCode::TransitionTargetOutOfBounds,
                    Some(from),
                    format!(
                        "target {} outside map {} ({}x{})",
                        t.to(),
                        target.id,
                        target.width,
                        target.height
                    ),
                );
                continue;
            }

            let reciprocal = target.transitions.iter().any(|r| {
                r.to_map_id == doc.id
                    && r.from().chebyshev(t.to()) <= tolerance
                    && r.to().chebyshev(from) <= tolerance
            });
            if !reciprocal {
                run.push(
                    FindingCode::TransitionNotReciprocal,
                    Some(from),
                    format!(
                        "no transition from map {} near {} back to {}",
                        t.to_map_id,
                        t.to(),
                        from
                    ),
                );
            }
        }
    }

    fn category_of(&self, catalog_id: u32, stored: ObjectCategory) -> ObjectCategory {
        self.objects
            .get(catalog_id)
            .map(|entry| entry.category)
            .unwrap_or(stored)
    }
}

struct MapRun<'d> {
    doc: &'d MapDocument,
    grid: BlockingGrid,
    findings: Vec<ValidationFinding>,
}

impl MapRun<'_> {
    fn push(&mut self, code: FindingCode, coordinate: Option<Coord>, message: String) {
        self.findings
            .push(ValidationFinding::new(code, self.doc.id, coordinate, message));
    }

    /// Records an out-of-bounds finding for `at`; returns whether it is inside
    fn bounds(&mut self, at: Coord, what: &str) -> bool {
        if self.doc.in_bounds(at) {
            return true;
        }
        let message = format!(
            "{} outside {}x{} grid",
            what, self.doc.width, self.doc.height
        );
        self.push(FindingCode::CoordinateOutOfBounds, Some(at), message);
        false
    }
}

/// Size of the walkable region around `start`, counting at most `limit`
/// cells. Door tiles and door objects count as walkable.
fn reachable_area(grid: &BlockingGrid, doors: &HashSet<Coord>, start: Coord, limit: usize) -> usize {
    let passable = |c: Coord| match grid.kind(c) {
        None | Some(BlockKind::Door) => true,
        Some(_) => doors.contains(&c),
    };

    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(cell) = queue.pop_front() {
        if seen.len() >= limit {
            break;
        }
        for next in grid.neighbours(cell) {
            if passable(next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ObjectAttributes, ObjectCatalogEntry};
    use crate::model::{BlockedTile, MapObject, NpcSpawn, Sign, SpawnPoint, Transition};
    use pretty_assertions::assert_eq;

    fn entry(id: u32, category: ObjectCategory) -> ObjectCatalogEntry {
        ObjectCatalogEntry {
            id,
            name: format!("entry {}", id),
            graphic: id * 10,
            category,
            attributes: ObjectAttributes::empty(),
        }
    }

    fn door_map() -> MapDocument {
        let mut doc = MapDocument::new(1, "door", 20, 20);
        doc.blocked_tiles.push(BlockedTile {
            x: 10,
            y: 10,
            kind: BlockKind::Wall,
        });
        doc.objects.push(MapObject {
            x: 10,
            y: 10,
            catalog_id: 500,
            category: ObjectCategory::Door,
        });
        doc
    }

    fn wall(doc: &mut MapDocument, x: u16, y: u16) {
        doc.blocked_tiles.push(BlockedTile {
            x,
            y,
            kind: BlockKind::Rock,
        });
    }

    fn transition(from_map: u16, from: (u16, u16), to_map: u16, to: (u16, u16)) -> Transition {
        Transition {
            from_map_id: from_map,
            from_x: from.0,
            from_y: from.1,
            to_map_id: to_map,
            to_x: to.0,
            to_y: to.1,
        }
    }

    fn codes(findings: &[ValidationFinding]) -> Vec<FindingCode> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_door_on_blocked_tile_is_clean() {
        let db = ObjectDatabase::from_entries([entry(500, ObjectCategory::Door)]).unwrap();
        let findings = Validator::new(&db).validate_map(&door_map(), None);
        assert!(findings.iter().all(|f| f.severity != Severity::Error));
    }

    #[test]
    fn test_missing_catalog_entry_is_one_error() {
        let db = ObjectDatabase::default();
        let findings = Validator::new(&db).validate_map(&door_map(), None);
        let errors: Vec<_> = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, FindingCode::ObjectNotFound);
        assert_eq!(errors[0].coordinate, Some(Coord::new(10, 10)));
    }

    #[test]
    fn test_non_door_object_on_blocked_tile() {
        let db = ObjectDatabase::from_entries([entry(500, ObjectCategory::Anvil)]).unwrap();
        let mut doc = door_map();
        doc.objects[0].category = ObjectCategory::Anvil;
        let findings = Validator::new(&db).validate_map(&doc, None);
        assert_eq!(codes(&findings), vec![FindingCode::ObjectOnBlockedTile]);
    }

    #[test]
    fn test_missing_reciprocal_transition() {
        let mut one = MapDocument::new(1, "one", 10, 10);
        one.transitions.push(transition(1, (5, 5), 2, (1, 1)));
        let two = MapDocument::new(2, "two", 10, 10);
        let corpus = Corpus::from_documents([one, two]).unwrap();

        let db = ObjectDatabase::default();
        let report = Validator::new(&db).validate_corpus(&corpus);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.findings[0].code, FindingCode::TransitionNotReciprocal);
        assert_eq!(report.findings[0].map_id, 1);
        assert_eq!(report.findings[0].coordinate, Some(Coord::new(5, 5)));
    }

    #[test]
    fn test_reciprocal_within_tolerance() {
        let mut one = MapDocument::new(1, "one", 10, 10);
        one.transitions.push(transition(1, (5, 5), 2, (1, 1)));
        let mut two = MapDocument::new(2, "two", 10, 10);
        two.transitions.push(transition(2, (2, 1), 1, (5, 6)));
        let corpus = Corpus::from_documents([one, two]).unwrap();

        let db = ObjectDatabase::default();
        let validator = Validator::new(&db);
        assert!(validator.validate_corpus(&corpus).findings.is_empty());

        let strict = validator.with_config(ValidatorConfig::new().transition_tolerance(0));
        assert_eq!(strict.validate_corpus(&corpus).error_count(), 2);
    }

    #[test]
    fn test_transition_target_checks() {
        let mut one = MapDocument::new(1, "one", 10, 10);
        one.transitions.push(transition(1, (1, 1), 7, (1, 1)));
        one.transitions.push(transition(1, (2, 1), 2, (50, 1)));
        one.transitions.push(transition(9, (3, 1), 1, (3, 1)));
        let two = MapDocument::new(2, "two", 10, 10);
        let corpus = Corpus::from_documents([one, two]).unwrap();

        let db = ObjectDatabase::default();
        let findings = Validator::new(&db).validate_map(corpus.get(1).unwrap(), Some(&corpus));
        assert_eq!(
            codes(&findings),
            vec![
                FindingCode::TransitionTargetMissing,
                FindingCode::TransitionTargetOutOfBounds,
                FindingCode::TransitionSourceMismatch,
            ]
        );
    }

    #[test]
    fn test_signs() {
        let mut doc = MapDocument::new(3, "signs", 5, 5);
        wall(&mut doc, 2, 2);
        doc.signs.push(Sign {
            x: 2,
            y: 2,
            text_id: 4,
        });
        doc.signs.push(Sign {
            x: 3,
            y: 3,
            text_id: 0,
        });
        let db = ObjectDatabase::default();
        let findings = Validator::new(&db).validate_map(&doc, None);
        assert_eq!(
            codes(&findings),
            vec![FindingCode::SignOnBlockedTile, FindingCode::SignMissingText]
        );
    }

    #[test]
    fn test_enclosed_spawn_is_a_warning() {
        let mut doc = MapDocument::new(4, "cell", 5, 5);
        for (x, y) in [(2, 1), (1, 2)] {
            wall(&mut doc, x, y);
        }
        doc.spawn_points.push(SpawnPoint {
            x: 1,
            y: 1,
            description: "jail".into(),
        });
        doc.spawn_points.push(SpawnPoint {
            x: 4,
            y: 4,
            description: "open".into(),
        });
        let db = ObjectDatabase::default();
        let findings = Validator::new(&db).validate_map(&doc, None);
        assert_eq!(codes(&findings), vec![FindingCode::SpawnUnreachable]);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].coordinate, Some(Coord::new(1, 1)));
    }

    #[test]
    fn test_door_opens_an_enclosure() {
        let mut doc = MapDocument::new(4, "cell", 5, 5);
        wall(&mut doc, 2, 1);
        doc.blocked_tiles.push(BlockedTile {
            x: 1,
            y: 2,
            kind: BlockKind::Door,
        });
        doc.spawn_points.push(SpawnPoint {
            x: 1,
            y: 1,
            description: "house".into(),
        });
        let db = ObjectDatabase::default();
        assert!(Validator::new(&db).validate_map(&doc, None).is_empty());
    }

    #[test]
    fn test_npc_spawns() {
        let db = ObjectDatabase::from_entries([
            entry(1, ObjectCategory::Npc),
            entry(2, ObjectCategory::Forge),
        ])
        .unwrap();
        let mut doc = MapDocument::new(5, "npcs", 6, 6);
        wall(&mut doc, 6, 6);
        for (x, npc_id) in [(1, 1), (2, 2), (3, 3)] {
            doc.npc_spawns.push(NpcSpawn { x, y: 1, npc_id });
        }
        doc.npc_spawns.push(NpcSpawn {
            x: 6,
            y: 6,
            npc_id: 1,
        });
        let findings = Validator::new(&db).validate_map(&doc, None);
        assert_eq!(
            codes(&findings),
            vec![
                FindingCode::CategoryMismatch,
                FindingCode::NpcNotFound,
                FindingCode::SpawnOnBlockedTile,
            ]
        );
    }

    #[test]
    fn test_structural_findings() {
        let mut doc = MapDocument::new(300, "broken", 4, 4);
        doc.layers[1].tiles.truncate(3);
        doc.objects.push(MapObject {
            x: 9,
            y: 1,
            catalog_id: 1,
            category: ObjectCategory::Item,
        });
        for catalog_id in [1, 1] {
            doc.objects.push(MapObject {
                x: 2,
                y: 2,
                catalog_id,
                category: ObjectCategory::Item,
            });
        }
        let db = ObjectDatabase::from_entries([entry(1, ObjectCategory::Item)]).unwrap();
        let findings = Validator::new(&db).validate_map(&doc, None);
        assert_eq!(
            codes(&findings),
            vec![
                FindingCode::LayerSizeMismatch,
                FindingCode::MapIdOutOfRange,
                FindingCode::CoordinateOutOfBounds,
                FindingCode::DuplicateObject,
            ]
        );
    }

    #[test]
    fn test_corpus_report_is_deterministic() {
        let docs = (1..=6).map(|id| {
            let mut doc = MapDocument::new(id, "m", 4, 4);
            doc.signs.push(Sign {
                x: 1,
                y: 1,
                text_id: 0,
            });
            doc
        });
        let corpus = Corpus::from_documents(docs).unwrap();
        let db = ObjectDatabase::default();
        let one = Validator::new(&db)
            .with_config(ValidatorConfig::new().threads(1))
            .validate_corpus(&corpus);
        let many = Validator::new(&db)
            .with_config(ValidatorConfig::new().threads(4))
            .validate_corpus(&corpus);
        assert_eq!(one.findings, many.findings);
        assert_eq!(
            serde_json::to_string(&one).unwrap(),
            serde_json::to_string(&many).unwrap()
        );
        assert_eq!(one.for_map(3).count(), 1);
    }
}
