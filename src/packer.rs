//! Packlogik für eine einzelne Palettenlage.
//!
//! Dieses Modul implementiert die 2D-Flächenaufteilung einer Lage: aus einem
//! Pool verbleibender Kisten wird eine Teilmenge ausgewählt und überlappungs-
//! frei auf der Palettengrundfläche platziert. Zwei Strategien stehen zur
//! Verfügung:
//! - Guillotine-Packung: First-Fit über freie Rechtecke, Orientierung mit
//!   minimaler Restfläche, Schnitt in ein rechtes und ein oberes Rechteck
//! - Zweireihen-Raster: dichteres Spezialverfahren für homogene Pools
//!   (eine SKU, eine Grundfläche, alle Kisten drehbar)

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{BoxInstance, PalletProfile, Placement};
use crate::types::{EPSILON_GENERAL, Footprint, Rect};

/// Auswahl des Packverfahrens für eine Lage.
///
/// `UniformRows` greift nur bei global homogenen Pools und fällt sonst auf
/// die Guillotine-Packung zurück.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LayerStrategy {
    #[default]
    Guillotine,
    UniformRows,
}

/// Ergebnis eines Lagen-Packvorgangs.
///
/// Der Pool wird partitioniert: platzierte Kisten wandern in `placed`, alle
/// übrigen in `remaining` unter Beibehaltung ihrer relativen Reihenfolge.
#[derive(Clone, Debug)]
pub struct PackedLayer {
    pub placed: Vec<Placement>,
    pub remaining: Vec<BoxInstance>,
}

/// Arena für freie Rechtecke einer Lage.
///
/// Entfernte Rechtecke hinterlassen einen Tombstone, damit Indizes stabil
/// bleiben und die Iteration die Erzeugungsreihenfolge beibehält: früher
/// entstandener Freiraum wird bevorzugt belegt.
struct FreeRectStore {
    slots: Vec<Option<Rect>>,
}

impl FreeRectStore {
    fn new(initial: Rect) -> Self {
        Self {
            slots: vec![Some(initial)],
        }
    }

    /// Iteriert alle lebenden Rechtecke in Erzeugungsreihenfolge.
    fn iter(&self) -> impl Iterator<Item = (usize, Rect)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.map(|rect| (idx, rect)))
    }

    /// Hängt ein neues Rechteck hinter alle bestehenden an.
    fn push(&mut self, rect: Rect) {
        self.slots.push(Some(rect));
    }

    /// Entfernt ein Rechteck und hinterlässt einen Tombstone.
    fn remove(&mut self, idx: usize) -> Rect {
        self.slots[idx]
            .take()
            .expect("free rectangle already removed")
    }
}

/// Packt eine Lage aus dem übergebenen Pool.
///
/// Die Pool-Reihenfolge ist die Platzierungsreihenfolge; bei gleicher
/// Eingabe ist das Ergebnis exakt reproduzierbar. Kisten, für die kein
/// Rechteck passt, werden übersprungen und landen unverändert in
/// `remaining` — innerhalb derselben Lage gibt es keinen zweiten Versuch.
pub fn pack_layer(
    pool: Vec<BoxInstance>,
    profile: &PalletProfile,
    strategy: LayerStrategy,
) -> PackedLayer {
    let result = match strategy {
        LayerStrategy::UniformRows if is_uniform_pool(&pool) => pack_uniform_rows(pool, profile),
        _ => pack_guillotine(pool, profile),
    };
    debug_assert!(layer_invariants_hold(&result.placed, profile));
    result
}

/// Guillotine-Packung über freie Rechtecke.
///
/// Für jede Kiste wird das erste Rechteck (in Erzeugungsreihenfolge)
/// gesucht, in das mindestens eine Orientierung passt; unter den passenden
/// Orientierungen gewinnt die mit minimaler Restfläche
/// `(rect.width − l) × (rect.height − w)`. Das belegte Rechteck wird durch
/// ein rechtes und ein oberes Rest-Rechteck ersetzt. Entartete
/// Rest-Rechtecke bleiben in der Arena, bestehen aber nie einen Fit-Test.
fn pack_guillotine(pool: Vec<BoxInstance>, profile: &PalletProfile) -> PackedLayer {
    let mut free = FreeRectStore::new(Rect::new(0.0, 0.0, profile.length, profile.width));
    let mut placed = Vec::new();
    let mut remaining = Vec::new();

    for instance in pool {
        let mut fit: Option<(usize, Footprint)> = None;

        for (idx, rect) in free.iter() {
            let mut best: Option<(Footprint, f64)> = None;
            for orientation in instance.orientations() {
                if !rect.fits(&orientation) {
                    continue;
                }
                let waste = rect.waste_for(&orientation);
                if best.is_none_or(|(_, best_waste)| waste < best_waste) {
                    best = Some((orientation, waste));
                }
            }
            if let Some((orientation, _)) = best {
                fit = Some((idx, orientation));
                break;
            }
        }

        match fit {
            Some((idx, dims)) => {
                let rect = free.remove(idx);
                // Klassischer Guillotine-Schnitt: rechts vom Platzierten in
                // Kistentiefe, darüber in voller Rechteckbreite.
                free.push(Rect::new(
                    rect.x + dims.l,
                    rect.y,
                    rect.width - dims.l,
                    dims.w,
                ));
                free.push(Rect::new(
                    rect.x,
                    rect.y + dims.w,
                    rect.width,
                    rect.height - dims.w,
                ));
                placed.push(Placement {
                    instance,
                    x: rect.x,
                    y: rect.y,
                    placed: dims,
                });
            }
            None => remaining.push(instance),
        }
    }

    PackedLayer { placed, remaining }
}

/// Prüft globale Homogenität: eine SKU, identische Grundfläche, alle Kisten
/// drehbar. Nur dann darf das Zweireihen-Raster angewendet werden.
fn is_uniform_pool(pool: &[BoxInstance]) -> bool {
    let Some(first) = pool.first() else {
        return false;
    };
    pool.iter()
        .all(|b| b.sku == first.sku && b.footprint == first.footprint && b.can_rotate)
}

/// Kistenanzahl einer Reihe entlang der Palettenlänge, 0 wenn die
/// Orientierung nicht in die verfügbare Breite passt.
fn row_capacity(orientation: &Footprint, length: f64, available_width: f64) -> usize {
    if orientation.w > available_width + EPSILON_GENERAL
        || orientation.l > length + EPSILON_GENERAL
    {
        return 0;
    }
    ((length / orientation.l) + EPSILON_GENERAL).floor() as usize
}

/// Wählt die Orientierung mit maximaler Reihenkapazität; bei Gleichstand
/// gewinnt die natürliche Orientierung.
fn best_row_orientation(fp: Footprint, length: f64, available_width: f64) -> (Footprint, usize) {
    let natural = (fp, row_capacity(&fp, length, available_width));
    let swapped = (
        fp.swapped(),
        row_capacity(&fp.swapped(), length, available_width),
    );
    if swapped.1 > natural.1 { swapped } else { natural }
}

/// Zweireihen-Raster für homogene Pools.
///
/// Reihe 1 nutzt die Orientierung mit maximaler Kistenzahl entlang der
/// Palettenlänge; Reihe 2 wählt unabhängig davon die Orientierung, die in
/// die Restbreite passt und dort die Kistenzahl maximiert. Platziert wird
/// jeweils von links nach rechts. Das Raster ist für gleichförmige Ware
/// dichter als die Guillotine-Packung, dominiert sie aber nicht für alle
/// Seitenverhältnisse.
fn pack_uniform_rows(pool: Vec<BoxInstance>, profile: &PalletProfile) -> PackedLayer {
    let fp = pool[0].footprint;
    let (first, first_capacity) = best_row_orientation(fp, profile.length, profile.width);
    if first_capacity == 0 {
        return PackedLayer {
            placed: Vec::new(),
            remaining: pool,
        };
    }

    let remaining_width = profile.width - first.w;
    let (second, second_capacity) = best_row_orientation(fp, profile.length, remaining_width);

    let mut placed = Vec::new();
    let mut instances = pool.into_iter();

    for slot in 0..first_capacity {
        let Some(instance) = instances.next() else {
            break;
        };
        placed.push(Placement {
            instance,
            x: slot as f64 * first.l,
            y: 0.0,
            placed: first,
        });
    }
    for slot in 0..second_capacity {
        let Some(instance) = instances.next() else {
            break;
        };
        placed.push(Placement {
            instance,
            x: slot as f64 * second.l,
            y: first.w,
            placed: second,
        });
    }

    PackedLayer {
        placed,
        remaining: instances.collect(),
    }
}

/// Invariantenprüfung einer gepackten Lage: alle Platzierungen liegen in der
/// Grundfläche und sind paarweise disjunkt.
fn layer_invariants_hold(placed: &[Placement], profile: &PalletProfile) -> bool {
    use crate::geometry::{placement_within, placements_intersect};

    placed
        .iter()
        .all(|p| placement_within(p, profile.length, profile.width))
        && placed.iter().enumerate().all(|(i, a)| {
            placed
                .iter()
                .skip(i + 1)
                .all(|b| !placements_intersect(a, b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{placement_within, placements_intersect};
    use crate::model::{BoxSpec, Fragility, OrderLine, Orientation};

    fn instances(
        count: usize,
        start_id: usize,
        sku: &str,
        dims: (f64, f64, f64),
        orientation: Orientation,
    ) -> Vec<BoxInstance> {
        let line = OrderLine {
            sku: sku.to_string(),
            display_name: sku.to_string(),
            box_type_key: "box1".to_string(),
            requested_units: count as u32,
        };
        let spec = BoxSpec::new(1, 5.0, dims, orientation).unwrap();
        (0..count)
            .map(|k| BoxInstance::from_spec(start_id + k, &line, Fragility::Strong, &spec))
            .collect()
    }

    fn assert_layer_valid(placed: &[Placement], profile: &PalletProfile) {
        for p in placed {
            assert!(
                placement_within(p, profile.length, profile.width),
                "Platzierung von Kiste {} ragt über die Grundfläche hinaus",
                p.instance.id
            );
        }
        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                assert!(
                    !placements_intersect(a, b),
                    "Kisten {} und {} überlappen sich",
                    a.instance.id,
                    b.instance.id
                );
            }
        }
    }

    #[test]
    fn packs_three_rotatable_boxes_into_one_layer() {
        let profile = PalletProfile::default();
        let pool = instances(3, 1, "A100", (60.0, 40.0, 30.0), Orientation::Both);

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        assert_eq!(result.placed.len(), 3);
        assert!(result.remaining.is_empty());
        assert_layer_valid(&result.placed, &profile);
    }

    #[test]
    fn min_waste_orientation_wins_per_rectangle() {
        let profile = PalletProfile::default();
        let pool = instances(1, 1, "A100", (60.0, 40.0, 30.0), Orientation::Both);

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        // Im vollen 120×80-Rechteck lässt die gedrehte 40×60-Aufstellung
        // weniger Restfläche (1600) als die natürliche (2400).
        assert_eq!(result.placed[0].placed, Footprint::new(40.0, 60.0));
        assert_eq!(result.placed[0].x, 0.0);
        assert_eq!(result.placed[0].y, 0.0);
    }

    #[test]
    fn fixed_orientation_is_never_swapped() {
        let profile = PalletProfile::default();
        let pool = instances(2, 1, "B200", (100.0, 70.0, 50.0), Orientation::Fixed);

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        // Neben einer 100×70-Kiste ist auf 120×80 kein Platz für eine
        // zweite; sie bleibt für die nächste Lage übrig.
        assert_eq!(result.placed.len(), 1);
        assert_eq!(result.placed[0].placed, Footprint::new(100.0, 70.0));
        assert_eq!(result.remaining.len(), 1);
        assert_eq!(result.remaining[0].id, 2);
    }

    #[test]
    fn unfit_instance_is_skipped_not_retried() {
        let profile = PalletProfile::default();
        let mut pool = instances(1, 1, "XXL", (130.0, 90.0, 20.0), Orientation::Both);
        pool.extend(instances(2, 2, "A100", (60.0, 40.0, 30.0), Orientation::Fixed));

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        assert_eq!(result.placed.len(), 2);
        assert_eq!(result.remaining.len(), 1);
        assert_eq!(result.remaining[0].id, 1, "übergroße Kiste fehlt im Rest");
        assert_layer_valid(&result.placed, &profile);
    }

    #[test]
    fn earlier_free_rectangles_are_preferred() {
        let profile = PalletProfile::default();
        // Erste Kiste belegt links unten; die zweite passt in beide
        // Rest-Rechtecke und muss in das zuerst erzeugte (rechte) wandern.
        let mut pool = instances(1, 1, "B200", (100.0, 70.0, 60.0), Orientation::Fixed);
        pool.extend(instances(1, 2, "S10", (20.0, 10.0, 10.0), Orientation::Fixed));

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        assert_eq!(result.placed.len(), 2);
        let small = &result.placed[1];
        assert_eq!((small.x, small.y), (100.0, 0.0));
    }

    #[test]
    fn packing_is_deterministic() {
        let profile = PalletProfile::default();
        let mut pool = instances(4, 1, "A100", (60.0, 40.0, 30.0), Orientation::Both);
        pool.extend(instances(3, 5, "B200", (30.0, 20.0, 15.0), Orientation::Fixed));

        let first = pack_layer(pool.clone(), &profile, LayerStrategy::Guillotine);
        let second = pack_layer(pool, &profile, LayerStrategy::Guillotine);

        assert_eq!(first.placed.len(), second.placed.len());
        for (a, b) in first.placed.iter().zip(second.placed.iter()) {
            assert_eq!(a.instance.id, b.instance.id);
            assert_eq!((a.x, a.y), (b.x, b.y));
            assert_eq!(a.placed, b.placed);
        }
    }

    #[test]
    fn mixed_pool_respects_layer_invariants() {
        let profile = PalletProfile::default();
        let mut pool = instances(5, 1, "A100", (60.0, 40.0, 30.0), Orientation::Both);
        pool.extend(instances(4, 6, "B200", (40.0, 30.0, 25.0), Orientation::Both));
        pool.extend(instances(6, 10, "C300", (25.0, 20.0, 10.0), Orientation::Fixed));

        let result = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        assert!(!result.placed.is_empty());
        assert_layer_valid(&result.placed, &profile);
    }

    #[test]
    fn uniform_rows_builds_dense_grid() {
        let profile = PalletProfile::default();
        let pool = instances(8, 1, "A100", (40.0, 30.0, 20.0), Orientation::Both);

        let result = pack_layer(pool, &profile, LayerStrategy::UniformRows);
        // Reihe 1: gedreht (30 entlang der Länge) ergibt 4 statt 3 Kisten;
        // Reihe 2 passt mit derselben Drehung in die Restbreite von 40.
        assert_eq!(result.placed.len(), 8);
        assert!(result.remaining.is_empty());
        let row1: Vec<_> = result.placed.iter().filter(|p| p.y == 0.0).collect();
        let row2: Vec<_> = result.placed.iter().filter(|p| p.y == 40.0).collect();
        assert_eq!(row1.len(), 4);
        assert_eq!(row2.len(), 4);
        for p in &result.placed {
            assert_eq!(p.placed, Footprint::new(30.0, 40.0));
        }
        assert_layer_valid(&result.placed, &profile);
    }

    #[test]
    fn uniform_rows_stops_at_pool_size() {
        let profile = PalletProfile::default();
        let pool = instances(3, 1, "A100", (40.0, 30.0, 20.0), Orientation::Both);

        let result = pack_layer(pool, &profile, LayerStrategy::UniformRows);
        assert_eq!(result.placed.len(), 3);
        assert!(result.remaining.is_empty());
    }

    #[test]
    fn uniform_rows_falls_back_for_mixed_pools() {
        let profile = PalletProfile::default();
        let mut pool = instances(2, 1, "A100", (60.0, 40.0, 30.0), Orientation::Both);
        pool.extend(instances(2, 3, "B200", (30.0, 20.0, 15.0), Orientation::Both));

        let rows = pack_layer(pool.clone(), &profile, LayerStrategy::UniformRows);
        let guillotine = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        assert_eq!(rows.placed.len(), guillotine.placed.len());
        for (a, b) in rows.placed.iter().zip(guillotine.placed.iter()) {
            assert_eq!((a.x, a.y), (b.x, b.y));
        }
    }

    #[test]
    fn uniform_rows_requires_rotation() {
        let profile = PalletProfile::default();
        // Homogen, aber nicht drehbar: das Raster greift nicht.
        let pool = instances(4, 1, "A100", (40.0, 30.0, 20.0), Orientation::Fixed);

        let rows = pack_layer(pool.clone(), &profile, LayerStrategy::UniformRows);
        let guillotine = pack_layer(pool, &profile, LayerStrategy::Guillotine);
        for (a, b) in rows.placed.iter().zip(guillotine.placed.iter()) {
            assert_eq!((a.x, a.y), (b.x, b.y));
        }
    }

    #[test]
    fn empty_pool_yields_empty_layer() {
        let profile = PalletProfile::default();
        let result = pack_layer(Vec::new(), &profile, LayerStrategy::Guillotine);
        assert!(result.placed.is_empty());
        assert!(result.remaining.is_empty());
    }
}
