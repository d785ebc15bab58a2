//! Geometrische Hilfsfunktionen für die 2D-Flächenplanung einer Lage.
//!
//! Dieses Modul bietet Funktionen zur Überprüfung von Überschneidungen
//! zwischen platzierten Kisten und zur Kontrolle, ob Platzierungen innerhalb
//! der Palettengrundfläche liegen.

use crate::model::Placement;

/// Berechnet die Überlappung zweier Intervalle in einer Dimension.
///
/// # Parameter
/// * `a1` - Start des ersten Intervalls
/// * `a2` - Ende des ersten Intervalls
/// * `b1` - Start des zweiten Intervalls
/// * `b2` - Ende des zweiten Intervalls
///
/// # Rückgabewert
/// Länge der Überlappung, mindestens 0.0
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Prüft, ob sich zwei Platzierungen in der Lagenebene überschneiden.
///
/// Berührende Kanten gelten nicht als Überschneidung: zwei Kisten
/// überschneiden sich NICHT, wenn sie in mindestens einer Achse getrennt
/// sind.
pub fn placements_intersect(a: &Placement, b: &Placement) -> bool {
    !(a.max_x() <= b.x || b.max_x() <= a.x || a.max_y() <= b.y || b.max_y() <= a.y)
}

/// Berechnet die Überlappungsfläche zweier Platzierungen.
#[allow(dead_code)]
pub fn overlap_area(a: &Placement, b: &Placement) -> f64 {
    let overlap_x = overlap_1d(a.x, a.max_x(), b.x, b.max_x());
    let overlap_y = overlap_1d(a.y, a.max_y(), b.y, b.max_y());
    overlap_x * overlap_y
}

/// Prüft, ob eine Platzierung vollständig innerhalb der Grundfläche
/// `[0, length] × [0, width]` liegt.
pub fn placement_within(p: &Placement, length: f64, width: f64) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.max_x() <= length && p.max_y() <= width
}
