//! Planungslogik für die Palettenbestückung.
//!
//! Dieses Modul setzt die Pipeline des Assembly-Engines um:
//! - Expansion der Auftragszeilen in physische Kisten (Aufrunden auf ganze
//!   Kisten, Diagnose statt Abbruch bei fehlenden Katalogeinträgen)
//! - Stabile Sortierung nach Fragilität (stabile Kisten zuerst, zerbrechliche
//!   in spätere, also obere Lagen)
//! - Stapeln der Lagen auf Paletten unter Höhen- und Gewichtsdeckel
//!
//! Die Berechnung ist rein und einsträngig: Katalog, Auftragszeilen und
//! Palettenprofil werden pro Aufruf übergeben, es gibt keinen prozessweiten
//! Zustand. Unabhängige Planungsläufe dürfen deshalb ohne Sperren parallel
//! ausgeführt werden.

use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{BoxInstance, Catalog, Layer, OrderLine, Pallet, PalletProfile};
use crate::packer::{self, LayerStrategy};
use crate::types::{EPSILON_GENERAL, Rect};

/// Konfiguration für die Planung.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanningConfig {
    /// Packverfahren für einzelne Lagen.
    pub strategy: LayerStrategy,
}

/// Grund, warum eine Auftragszeile übersprungen wurde.
///
/// Übersprungene Zeilen sind nie fatal: sie liefern null Kisten und eine
/// Diagnose, die Planung läuft weiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    UnknownSku,
    UnknownBoxType,
    InvalidUnitsPerBox,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::UnknownSku => "unknown_sku",
            SkipReason::UnknownBoxType => "unknown_box_type",
            SkipReason::InvalidUnitsPerBox => "invalid_units_per_box",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnknownSku => write!(f, "SKU ist im Katalog nicht hinterlegt"),
            SkipReason::UnknownBoxType => {
                write!(f, "Kistentyp ist für diese SKU nicht hinterlegt")
            }
            SkipReason::InvalidUnitsPerBox => {
                write!(f, "Kistentyp hat keine gültige Stückzahl pro Kiste")
            }
        }
    }
}

/// Eine übersprungene Auftragszeile samt Grund.
#[derive(Clone, Debug)]
pub struct SkippedLine {
    pub line: OrderLine,
    pub reason: SkipReason,
}

/// Gründe, warum eine Kiste auf keiner Palette platziert werden kann.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    FootprintExceedsPallet,
    TooTallForPallet,
    TooHeavyForPallet,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::FootprintExceedsPallet => "footprint_exceeds_pallet",
            UnplacedReason::TooTallForPallet => "too_tall_for_pallet",
            UnplacedReason::TooHeavyForPallet => "too_heavy_for_pallet",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::FootprintExceedsPallet => {
                write!(f, "Grundfläche passt in keiner Orientierung auf die Palette")
            }
            UnplacedReason::TooTallForPallet => {
                write!(f, "Kiste ist höher als die maximale Stapelhöhe")
            }
            UnplacedReason::TooHeavyForPallet => {
                write!(f, "Kiste überschreitet allein die zulässige Zuladung")
            }
        }
    }
}

/// Kiste, die nicht platziert werden konnte.
#[derive(Clone, Debug)]
pub struct UnplacedBox {
    pub instance: BoxInstance,
    pub reason: UnplacedReason,
}

/// Gesamtstatus eines Planungslaufs.
///
/// Die beiden Leerzustände sind bewusst getrennt, damit der Aufrufer
/// unterscheiden kann, ob gar keine Auftragszeilen ankamen oder ob die
/// Expansion null Kisten ergab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    NoOrderLines,
    NoBoxInstances,
}

/// Ereignisse während der Planung, für Live-Visualisierung über SSE.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// Eine Auftragszeile wurde übersprungen.
    LineSkipped {
        sku: String,
        box_type_key: String,
        reason_code: String,
        reason_text: String,
    },
    /// Eine Kiste kann auf keiner Palette platziert werden.
    BoxRejected {
        id: usize,
        sku: String,
        box_type_key: String,
        reason_code: String,
        reason_text: String,
    },
    /// Eine neue Palette wird begonnen.
    PalletStarted { id: usize },
    /// Eine Lage wurde festgeschrieben.
    LayerCommitted {
        pallet_id: usize,
        layer_id: usize,
        boxes: usize,
        height: f64,
        weight: f64,
        used_height: f64,
        used_weight: f64,
    },
    /// Planung abgeschlossen.
    Finished {
        pallets: usize,
        unplaced: usize,
        skipped_lines: usize,
    },
}

/// Ergebnis der Planung: Paletten plus Diagnosen, niemals eine Ausnahme.
#[derive(Clone, Debug)]
pub struct PlanResult {
    pub pallets: Vec<Pallet>,
    pub unplaced: Vec<UnplacedBox>,
    pub skipped: Vec<SkippedLine>,
    pub status: PlanStatus,
    /// Profil, gegen das geplant wurde (für Berichte und Summen).
    pub profile: PalletProfile,
}

impl PlanResult {
    /// Gibt an, ob alle Kisten platziert wurden.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Anzahl der Paletten.
    pub fn pallet_count(&self) -> usize {
        self.pallets.len()
    }

    /// Anzahl aller platzierten Kisten.
    pub fn placed_box_count(&self) -> usize {
        self.pallets.iter().map(Pallet::box_count).sum()
    }

    /// Gesamtgewicht aller Paletten inklusive Leergewicht.
    pub fn total_weight(&self) -> f64 {
        self.pallets
            .iter()
            .map(|p| self.profile.tare_weight + p.cargo_weight())
            .sum()
    }

    fn empty(status: PlanStatus, skipped: Vec<SkippedLine>, profile: &PalletProfile) -> Self {
        Self {
            pallets: Vec::new(),
            unplaced: Vec::new(),
            skipped,
            status,
            profile: *profile,
        }
    }
}

/// Plant die Palettenbestückung für einen Auftrag.
///
/// # Parameter
/// * `catalog` - Produktstammdaten, pro Aufruf übergeben
/// * `orders` - Auftragszeilen
/// * `profile` - Palettengeometrie und Deckelwerte
/// * `config` - Konfiguration der Planung
pub fn plan_pallets(
    catalog: &Catalog,
    orders: &[OrderLine],
    profile: &PalletProfile,
    config: PlanningConfig,
) -> PlanResult {
    plan_pallets_with_progress(catalog, orders, profile, config, |_| {})
}

/// Planung mit Live-Progress-Callback.
///
/// Ruft für jeden wichtigen Schritt ein Callback auf (geeignet für SSE).
pub fn plan_pallets_with_progress(
    catalog: &Catalog,
    orders: &[OrderLine],
    profile: &PalletProfile,
    config: PlanningConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> PlanResult {
    if orders.is_empty() {
        on_event(&PlanEvent::Finished {
            pallets: 0,
            unplaced: 0,
            skipped_lines: 0,
        });
        return PlanResult::empty(PlanStatus::NoOrderLines, Vec::new(), profile);
    }

    let (mut instances, skipped) = expand_order_lines(catalog, orders);
    for entry in &skipped {
        on_event(&PlanEvent::LineSkipped {
            sku: entry.line.sku.clone(),
            box_type_key: entry.line.box_type_key.clone(),
            reason_code: entry.reason.code().to_string(),
            reason_text: entry.reason.to_string(),
        });
    }

    if instances.is_empty() {
        on_event(&PlanEvent::Finished {
            pallets: 0,
            unplaced: 0,
            skipped_lines: skipped.len(),
        });
        return PlanResult::empty(PlanStatus::NoBoxInstances, skipped, profile);
    }

    sequence_by_fragility(&mut instances);
    let (pallets, unplaced) = assemble(instances, profile, config, &mut on_event);

    on_event(&PlanEvent::Finished {
        pallets: pallets.len(),
        unplaced: unplaced.len(),
        skipped_lines: skipped.len(),
    });
    PlanResult {
        pallets,
        unplaced,
        skipped,
        status: PlanStatus::Planned,
        profile: *profile,
    }
}

/// Expandiert Auftragszeilen in physische Kisten.
///
/// Pro Zeile werden `ceil(bestellte Stück / Stück pro Kiste)` identische
/// Kisten erzeugt; die Ids laufen fortlaufend über alle Zeilen. Zeilen ohne
/// auflösbaren Katalogeintrag liefern null Kisten und eine Diagnose. Null
/// bestellte Stück sind kein Fehler und liefern schlicht keine Kiste.
pub fn expand_order_lines(
    catalog: &Catalog,
    orders: &[OrderLine],
) -> (Vec<BoxInstance>, Vec<SkippedLine>) {
    let mut instances = Vec::new();
    let mut skipped = Vec::new();
    let mut next_id = 1usize;

    for line in orders {
        let Some(product) = catalog.product(&line.sku) else {
            skipped.push(SkippedLine {
                line: line.clone(),
                reason: SkipReason::UnknownSku,
            });
            continue;
        };
        let Some(spec) = product.box_spec(&line.box_type_key) else {
            skipped.push(SkippedLine {
                line: line.clone(),
                reason: SkipReason::UnknownBoxType,
            });
            continue;
        };
        if spec.units_per_box == 0 {
            skipped.push(SkippedLine {
                line: line.clone(),
                reason: SkipReason::InvalidUnitsPerBox,
            });
            continue;
        }

        for _ in 0..spec.boxes_needed(line.requested_units) {
            instances.push(BoxInstance::from_spec(next_id, line, product.fragility, spec));
            next_id += 1;
        }
    }

    (instances, skipped)
}

/// Sortiert Kisten stabil aufsteigend nach Fragilität.
///
/// Stabile Kisten wandern nach vorn und damit in untere Lagen; bei gleicher
/// Fragilität bleibt die Eingabereihenfolge erhalten, damit die Planung
/// deterministisch ist.
pub fn sequence_by_fragility(instances: &mut [BoxInstance]) {
    instances.sort_by_key(|i| i.fragility.rank());
}

/// Prüft, ob eine Kiste grundsätzlich auf eine leere Palette passt.
fn unfit_reason(instance: &BoxInstance, profile: &PalletProfile) -> Option<UnplacedReason> {
    let floor = Rect::new(0.0, 0.0, profile.length, profile.width);
    if !instance.orientations().any(|o| floor.fits(&o)) {
        return Some(UnplacedReason::FootprintExceedsPallet);
    }
    if instance.height > profile.max_height + EPSILON_GENERAL {
        return Some(UnplacedReason::TooTallForPallet);
    }
    if instance.weight_kg > profile.payload_limit() + EPSILON_GENERAL {
        return Some(UnplacedReason::TooHeavyForPallet);
    }
    None
}

/// Stapelt die sortierten Kisten auf Paletten.
///
/// Unplatzierbare Kisten werden vorab aussortiert; dadurch schreibt jede
/// Palette mindestens eine Lage mit mindestens einer Kiste fest und die
/// Schleife ist durch die Kistenzahl begrenzt — leere Paletten entstehen
/// nicht.
fn assemble(
    instances: Vec<BoxInstance>,
    profile: &PalletProfile,
    config: PlanningConfig,
    on_event: &mut impl FnMut(&PlanEvent),
) -> (Vec<Pallet>, Vec<UnplacedBox>) {
    let mut unplaced = Vec::new();
    let mut remaining = Vec::with_capacity(instances.len());
    for instance in instances {
        match unfit_reason(&instance, profile) {
            Some(reason) => {
                on_event(&PlanEvent::BoxRejected {
                    id: instance.id,
                    sku: instance.sku.clone(),
                    box_type_key: instance.box_type_key.clone(),
                    reason_code: reason.code().to_string(),
                    reason_text: reason.to_string(),
                });
                unplaced.push(UnplacedBox { instance, reason });
            }
            None => remaining.push(instance),
        }
    }

    let mut pallets: Vec<Pallet> = Vec::new();

    while !remaining.is_empty() {
        let pallet_id = pallets.len() + 1;
        on_event(&PlanEvent::PalletStarted { id: pallet_id });

        let mut pallet = Pallet::new();
        let mut used_height = 0.0;
        let mut used_weight = profile.tare_weight;

        while !remaining.is_empty() {
            let fit = packer::pack_layer(remaining.clone(), profile, config.strategy);
            if fit.placed.is_empty() {
                // Nach der Vorprüfung passt jede verbleibende Kiste einzeln
                // auf die leere Grundfläche; dieser Zweig greift nur bei
                // degenerierten Profilen und räumt dann den Pool ab, statt
                // leere Paletten zu erzeugen.
                if pallet.layers.is_empty() {
                    for instance in remaining.drain(..) {
                        on_event(&PlanEvent::BoxRejected {
                            id: instance.id,
                            sku: instance.sku.clone(),
                            box_type_key: instance.box_type_key.clone(),
                            reason_code: UnplacedReason::FootprintExceedsPallet
                                .code()
                                .to_string(),
                            reason_text: UnplacedReason::FootprintExceedsPallet.to_string(),
                        });
                        unplaced.push(UnplacedBox {
                            instance,
                            reason: UnplacedReason::FootprintExceedsPallet,
                        });
                    }
                }
                break;
            }

            let layer = Layer::new(fit.placed);
            let over_height = used_height + layer.height > profile.max_height + EPSILON_GENERAL;
            let over_weight = used_weight + layer.weight_kg > profile.max_weight + EPSILON_GENERAL;

            if over_height || over_weight {
                if !pallet.layers.is_empty() {
                    // Kandidatenlage komplett verwerfen: ihre Kisten bleiben
                    // unverbraucht in `remaining` und eröffnen die nächste
                    // Palette.
                    break;
                }
                // Erste Lage einer frischen Palette kann nur am Gewicht
                // scheitern (jede Kiste besteht die Vorprüfung einzeln).
                // Statt endlos leere Paletten zu erzeugen, wird auf das
                // längste Präfix gekürzt, das unter die Zuladung passt.
                let kept = shrink_to_weight(layer, profile);
                let kept_ids: HashSet<usize> =
                    kept.placements.iter().map(|p| p.instance.id).collect();
                // Nur die festgeschriebenen Kisten verlassen den Pool; die
                // zurückgerollten stehen unverändert in `remaining`.
                remaining.retain(|i| !kept_ids.contains(&i.id));
                used_height += kept.height;
                used_weight += kept.weight_kg;
                on_event(&PlanEvent::LayerCommitted {
                    pallet_id,
                    layer_id: pallet.layers.len() + 1,
                    boxes: kept.box_count(),
                    height: kept.height,
                    weight: kept.weight_kg,
                    used_height,
                    used_weight,
                });
                pallet.layers.push(kept);
                continue;
            }

            used_height += layer.height;
            used_weight += layer.weight_kg;
            on_event(&PlanEvent::LayerCommitted {
                pallet_id,
                layer_id: pallet.layers.len() + 1,
                boxes: layer.box_count(),
                height: layer.height,
                weight: layer.weight_kg,
                used_height,
                used_weight,
            });
            pallet.layers.push(layer);
            remaining = fit.remaining;
        }

        if !pallet.layers.is_empty() {
            pallets.push(pallet);
        }
    }

    (pallets, unplaced)
}

/// Kürzt eine Kandidatenlage auf das längste Präfix, dessen Gewicht samt
/// Leergewicht unter dem Deckel bleibt.
///
/// Ein Präfix bleibt gültig: Guillotine wie Raster platzieren in
/// Pool-Reihenfolge, das Weglassen eines Suffixes erzeugt keine Lückenfehler.
fn shrink_to_weight(layer: Layer, profile: &PalletProfile) -> Layer {
    let mut kept = Vec::new();
    let mut weight = profile.tare_weight;

    for placement in layer.placements {
        if weight + placement.instance.weight_kg > profile.max_weight + EPSILON_GENERAL {
            break;
        }
        weight += placement.instance.weight_kg;
        kept.push(placement);
    }

    debug_assert!(!kept.is_empty());
    Layer::new(kept)
}
