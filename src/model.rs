//! Data models for the pallet assembly engine.
//!
//! This module defines the fundamental data structures of the planning
//! pipeline:
//! - `Catalog` / `BoxSpec`: product master data per SKU and box-type key
//! - `OrderLine`: one requested position of an order
//! - `BoxInstance`: one physical box derived from an order line
//! - `Placement`, `Layer`, `Pallet`: the resulting loading plan
//! - `PalletProfile`: the pallet geometry and caps the plan is built against

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::types::{EPSILON_GENERAL, Footprint};

/// Validation error for master data and configuration values.
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidWeight(String),
    InvalidUnitCount(String),
    InvalidConfiguration(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidWeight(msg) => write!(f, "Invalid weight: {}", msg),
            ValidationError::InvalidUnitCount(msg) => write!(f, "Invalid unit count: {}", msg),
            ValidationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Helper function to validate a single dimension (DRY principle).
fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Helper function to validate weight (DRY principle).
fn validate_weight_value(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidWeight(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Fragility class of a product.
///
/// The ordering is the packing priority: sturdier classes are placed into
/// earlier (lower) layers, so `Strong < Medium < Fragile`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Fragility {
    Strong,
    Medium,
    Fragile,
}

impl Fragility {
    /// Numeric packing priority, lower means packed first.
    #[inline]
    pub const fn rank(&self) -> u8 {
        match self {
            Fragility::Strong => 0,
            Fragility::Medium => 1,
            Fragility::Fragile => 2,
        }
    }
}

/// Whether a box may be rotated in the layer plane when placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Length and depth are fixed as given.
    Fixed,
    /// Length and depth may be swapped during placement.
    Both,
}

impl Orientation {
    #[inline]
    pub const fn allows_rotation(&self) -> bool {
        matches!(self, Orientation::Both)
    }
}

/// One packaging variant of a product, keyed by box-type in the catalog.
///
/// # Fields
/// * `units_per_box` - How many sellable units one box holds
/// * `weight_kg` - Weight of one filled box in kg
/// * `dimensions` - Outer dimensions (length, depth, height)
/// * `orientation` - Whether the footprint may be rotated when placing
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoxSpec {
    pub units_per_box: u32,
    pub weight_kg: f64,
    #[schema(value_type = [f64; 3], example = json!([60.0, 40.0, 30.0]))]
    pub dimensions: (f64, f64, f64),
    pub orientation: Orientation,
}

impl BoxSpec {
    /// Creates a new box specification with validation.
    #[allow(dead_code)]
    pub fn new(
        units_per_box: u32,
        weight_kg: f64,
        dimensions: (f64, f64, f64),
        orientation: Orientation,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            units_per_box,
            weight_kg,
            dimensions,
            orientation,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validates the specification values.
    ///
    /// Deserialized catalogs must be validated before planning; a zero
    /// `units_per_box` would make the expansion division meaningless.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dimension(self.dimensions.0, "Length")?;
        validate_dimension(self.dimensions.1, "Depth")?;
        validate_dimension(self.dimensions.2, "Height")?;
        validate_weight_value(self.weight_kg, "Box weight")?;
        if self.units_per_box == 0 {
            return Err(ValidationError::InvalidUnitCount(
                "unitsPerBox must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Horizontal extent of the box in its natural orientation.
    #[inline]
    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.dimensions.0, self.dimensions.1)
    }

    /// Height of the box.
    #[inline]
    pub fn height(&self) -> f64 {
        self.dimensions.2
    }

    /// Number of boxes needed for the requested unit count (ceiling
    /// division). Zero requested units need zero boxes.
    ///
    /// Must only be called on validated specs (`units_per_box >= 1`).
    #[inline]
    pub fn boxes_needed(&self, requested_units: u32) -> u32 {
        requested_units.div_ceil(self.units_per_box)
    }
}

/// One product of the catalog: a fragility class shared by all of its
/// box-types, plus the box-types themselves keyed by their catalog key
/// (`box1`, `box2`, ...).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CatalogProduct {
    pub fragility: Fragility,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub boxes: HashMap<String, BoxSpec>,
}

impl CatalogProduct {
    /// Looks up a box-type by its key.
    pub fn box_spec(&self, box_type_key: &str) -> Option<&BoxSpec> {
        self.boxes.get(box_type_key)
    }
}

/// Product master data: SKU to product mapping.
///
/// The catalog is an explicit value owned by the caller and passed into the
/// engine per invocation; the engine never holds catalog state of its own.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    products: HashMap<String, CatalogProduct>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    #[allow(dead_code)]
    pub fn insert_product(&mut self, sku: impl Into<String>, product: CatalogProduct) {
        self.products.insert(sku.into(), product);
    }

    /// Looks up a product by SKU.
    pub fn product(&self, sku: &str) -> Option<&CatalogProduct> {
        self.products.get(sku)
    }

    /// Looks up a product and one of its box-types in one step.
    #[allow(dead_code)]
    pub fn spec(&self, sku: &str, box_type_key: &str) -> Option<(&CatalogProduct, &BoxSpec)> {
        let product = self.products.get(sku)?;
        let spec = product.box_spec(box_type_key)?;
        Some((product, spec))
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalog holds no products.
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Validates every box specification in the catalog.
    ///
    /// Returns the first offending entry as an error, prefixed with its
    /// SKU and box-type key.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (sku, product) in &self.products {
            for (key, spec) in &product.boxes {
                spec.validate().map_err(|err| {
                    ValidationError::InvalidConfiguration(format!("{}/{}: {}", sku, key, err))
                })?;
            }
        }
        Ok(())
    }
}

/// One requested order position, immutable once handed to the engine.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "sku": "A100",
    "displayName": "Apple juice 1l",
    "boxTypeKey": "box1",
    "requestedUnits": 25
}))]
pub struct OrderLine {
    pub sku: String,
    pub display_name: String,
    pub box_type_key: String,
    pub requested_units: u32,
}

/// One physical box to place.
///
/// All instances born from the same order line are identical except for
/// their `id`, which is assigned sequentially at expansion time. The id
/// keeps conservation checkable and makes layer rollback exact even though
/// sibling instances are interchangeable.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxInstance {
    pub id: usize,
    pub sku: String,
    pub display_name: String,
    pub box_type_key: String,
    pub units_per_box: u32,
    pub fragility: Fragility,
    pub weight_kg: f64,
    pub footprint: Footprint,
    pub height: f64,
    pub can_rotate: bool,
}

impl BoxInstance {
    /// Derives one instance from an order line and its resolved spec.
    pub fn from_spec(id: usize, line: &OrderLine, fragility: Fragility, spec: &BoxSpec) -> Self {
        Self {
            id,
            sku: line.sku.clone(),
            display_name: line.display_name.clone(),
            box_type_key: line.box_type_key.clone(),
            units_per_box: spec.units_per_box,
            fragility,
            weight_kg: spec.weight_kg,
            footprint: spec.footprint(),
            height: spec.height(),
            can_rotate: spec.orientation.allows_rotation(),
        }
    }

    /// Candidate placement orientations: the natural footprint, plus the
    /// swapped footprint iff rotation is allowed.
    pub fn orientations(&self) -> impl Iterator<Item = Footprint> {
        let swapped = self.can_rotate.then(|| self.footprint.swapped());
        std::iter::once(self.footprint).chain(swapped)
    }
}

/// A box instance placed within one layer.
///
/// # Fields
/// * `instance` - The placed box, exclusively owned by this placement
/// * `x`, `y` - Lower-left corner in layer-local coordinates
/// * `placed` - The orientation actually used (possibly swapped)
#[derive(Clone, Debug)]
pub struct Placement {
    pub instance: BoxInstance,
    pub x: f64,
    pub y: f64,
    pub placed: Footprint,
}

impl Placement {
    /// Right edge of the placed footprint.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.placed.l
    }

    /// Far edge of the placed footprint.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.placed.w
    }
}

/// One horizontal slab of boxes sharing a z-level.
///
/// Height and weight are derived from the placements at commit time and
/// immutable afterwards: the height is the tallest placed box, the weight
/// the sum of all placed boxes.
#[derive(Clone, Debug)]
pub struct Layer {
    pub placements: Vec<Placement>,
    pub height: f64,
    pub weight_kg: f64,
}

impl Layer {
    /// Seals a set of placements into a layer, deriving height and weight.
    pub fn new(placements: Vec<Placement>) -> Self {
        let height = placements
            .iter()
            .map(|p| p.instance.height)
            .fold(0.0_f64, f64::max);
        let weight_kg = placements.iter().map(|p| p.instance.weight_kg).sum();
        Self {
            placements,
            height,
            weight_kg,
        }
    }

    /// Number of boxes in the layer.
    pub fn box_count(&self) -> usize {
        self.placements.len()
    }
}

/// One pallet: layers ordered bottom to top.
#[derive(Clone, Debug, Default)]
pub struct Pallet {
    pub layers: Vec<Layer>,
}

impl Pallet {
    /// Creates an empty pallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stack height (sum of layer heights, pallet base excluded).
    pub fn stack_height(&self) -> f64 {
        self.layers.iter().map(|l| l.height).sum()
    }

    /// Cargo weight without the pallet's own tare.
    pub fn cargo_weight(&self) -> f64 {
        self.layers.iter().map(|l| l.weight_kg).sum()
    }

    /// Number of boxes across all layers.
    pub fn box_count(&self) -> usize {
        self.layers.iter().map(Layer::box_count).sum()
    }

    /// Number of layers.
    #[allow(dead_code)]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Pallet geometry and caps, substitutable per request.
///
/// Defaults describe the EUR pallet profile of the original planning sheet:
/// 120 × 80 cm footprint, 170 cm stack cap, 600 kg gross cap, 25 kg tare.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PalletProfile {
    pub length: f64,
    pub width: f64,
    pub max_height: f64,
    pub max_weight: f64,
    pub tare_weight: f64,
}

impl PalletProfile {
    pub const DEFAULT_LENGTH: f64 = 120.0;
    pub const DEFAULT_WIDTH: f64 = 80.0;
    pub const DEFAULT_MAX_HEIGHT: f64 = 170.0;
    pub const DEFAULT_MAX_WEIGHT: f64 = 600.0;
    pub const DEFAULT_TARE_WEIGHT: f64 = 25.0;

    /// Creates a profile with validation.
    pub fn new(
        length: f64,
        width: f64,
        max_height: f64,
        max_weight: f64,
        tare_weight: f64,
    ) -> Result<Self, ValidationError> {
        validate_dimension(length, "Pallet length")?;
        validate_dimension(width, "Pallet width")?;
        validate_dimension(max_height, "Pallet max height")?;
        validate_weight_value(max_weight, "Pallet max weight")?;
        validate_weight_value(tare_weight, "Pallet tare weight")?;
        if tare_weight + EPSILON_GENERAL >= max_weight {
            return Err(ValidationError::InvalidConfiguration(format!(
                "tare weight {} leaves no payload below max weight {}",
                tare_weight, max_weight
            )));
        }
        Ok(Self {
            length,
            width,
            max_height,
            max_weight,
            tare_weight,
        })
    }

    /// Weight available for cargo once the empty pallet is accounted for.
    #[inline]
    pub fn payload_limit(&self) -> f64 {
        self.max_weight - self.tare_weight
    }
}

impl Default for PalletProfile {
    fn default() -> Self {
        Self {
            length: Self::DEFAULT_LENGTH,
            width: Self::DEFAULT_WIDTH,
            max_height: Self::DEFAULT_MAX_HEIGHT,
            max_weight: Self::DEFAULT_MAX_WEIGHT,
            tare_weight: Self::DEFAULT_TARE_WEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> BoxSpec {
        BoxSpec::new(10, 5.0, (60.0, 40.0, 30.0), Orientation::Both).unwrap()
    }

    fn sample_line() -> OrderLine {
        OrderLine {
            sku: "A100".to_string(),
            display_name: "Apple juice 1l".to_string(),
            box_type_key: "box1".to_string(),
            requested_units: 25,
        }
    }

    #[test]
    fn test_box_spec_validation() {
        assert!(BoxSpec::new(10, 5.0, (60.0, 40.0, 30.0), Orientation::Fixed).is_ok());
        assert!(BoxSpec::new(0, 5.0, (60.0, 40.0, 30.0), Orientation::Fixed).is_err());
        assert!(BoxSpec::new(10, 0.0, (60.0, 40.0, 30.0), Orientation::Fixed).is_err());
        assert!(BoxSpec::new(10, 5.0, (-60.0, 40.0, 30.0), Orientation::Fixed).is_err());
        assert!(BoxSpec::new(10, 5.0, (60.0, f64::NAN, 30.0), Orientation::Fixed).is_err());
    }

    #[test]
    fn test_boxes_needed_ceiling_division() {
        let spec = sample_spec();
        assert_eq!(spec.boxes_needed(25), 3);
        assert_eq!(spec.boxes_needed(30), 3);
        assert_eq!(spec.boxes_needed(31), 4);
        assert_eq!(spec.boxes_needed(1), 1);
        assert_eq!(spec.boxes_needed(0), 0);
    }

    #[test]
    fn test_catalog_json_shape() {
        // Box-types sit next to `fragility` on the product, as in the
        // original products-detail.json.
        let json = r#"{
            "A100": {
                "fragility": "strong",
                "box1": {
                    "unitsPerBox": 10,
                    "weightKg": 5.0,
                    "dimensions": [60.0, 40.0, 30.0],
                    "orientation": "both"
                },
                "box2": {
                    "unitsPerBox": 20,
                    "weightKg": 9.5,
                    "dimensions": [60.0, 40.0, 50.0],
                    "orientation": "fixed"
                }
            }
        }"#;
        let catalog: Catalog = serde_json::from_str(json).expect("catalog should parse");
        assert_eq!(catalog.len(), 1);
        let (product, spec) = catalog.spec("A100", "box2").expect("box2 should resolve");
        assert_eq!(product.fragility, Fragility::Strong);
        assert_eq!(spec.units_per_box, 20);
        assert!(!spec.orientation.allows_rotation());
        assert!(catalog.spec("A100", "box3").is_none());
        assert!(catalog.spec("B200", "box1").is_none());
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_catalog_validate_flags_bad_spec() {
        let json = r#"{
            "B200": {
                "fragility": "medium",
                "box1": {
                    "unitsPerBox": 0,
                    "weightKg": 5.0,
                    "dimensions": [60.0, 40.0, 30.0],
                    "orientation": "fixed"
                }
            }
        }"#;
        let catalog: Catalog = serde_json::from_str(json).expect("catalog should parse");
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_fragility_ordering() {
        assert!(Fragility::Strong < Fragility::Medium);
        assert!(Fragility::Medium < Fragility::Fragile);
        assert_eq!(Fragility::Strong.rank(), 0);
        assert_eq!(Fragility::Fragile.rank(), 2);
    }

    #[test]
    fn test_instance_orientations() {
        let rotatable = BoxInstance::from_spec(1, &sample_line(), Fragility::Strong, &sample_spec());
        let opts: Vec<_> = rotatable.orientations().collect();
        assert_eq!(opts, vec![Footprint::new(60.0, 40.0), Footprint::new(40.0, 60.0)]);

        let fixed_spec = BoxSpec::new(10, 5.0, (60.0, 40.0, 30.0), Orientation::Fixed).unwrap();
        let fixed = BoxInstance::from_spec(2, &sample_line(), Fragility::Strong, &fixed_spec);
        let opts: Vec<_> = fixed.orientations().collect();
        assert_eq!(opts, vec![Footprint::new(60.0, 40.0)]);
    }

    #[test]
    fn test_layer_derives_height_and_weight() {
        let line = sample_line();
        let tall = BoxSpec::new(10, 7.5, (30.0, 20.0, 45.0), Orientation::Fixed).unwrap();
        let flat = BoxSpec::new(10, 5.0, (30.0, 20.0, 20.0), Orientation::Fixed).unwrap();
        let layer = Layer::new(vec![
            Placement {
                instance: BoxInstance::from_spec(1, &line, Fragility::Strong, &tall),
                x: 0.0,
                y: 0.0,
                placed: tall.footprint(),
            },
            Placement {
                instance: BoxInstance::from_spec(2, &line, Fragility::Strong, &flat),
                x: 30.0,
                y: 0.0,
                placed: flat.footprint(),
            },
        ]);
        assert!((layer.height - 45.0).abs() < EPSILON_GENERAL);
        assert!((layer.weight_kg - 12.5).abs() < EPSILON_GENERAL);
        assert_eq!(layer.box_count(), 2);
    }

    #[test]
    fn test_pallet_totals() {
        let line = sample_line();
        let spec = sample_spec();
        let layer = |id| {
            Layer::new(vec![Placement {
                instance: BoxInstance::from_spec(id, &line, Fragility::Strong, &spec),
                x: 0.0,
                y: 0.0,
                placed: spec.footprint(),
            }])
        };
        let pallet = Pallet {
            layers: vec![layer(1), layer(2)],
        };
        assert!((pallet.stack_height() - 60.0).abs() < EPSILON_GENERAL);
        assert!((pallet.cargo_weight() - 10.0).abs() < EPSILON_GENERAL);
        assert_eq!(pallet.box_count(), 2);
        assert_eq!(pallet.layer_count(), 2);
    }

    #[test]
    fn test_pallet_profile_defaults_and_validation() {
        let profile = PalletProfile::default();
        assert_eq!(profile.length, 120.0);
        assert_eq!(profile.width, 80.0);
        assert_eq!(profile.max_height, 170.0);
        assert_eq!(profile.max_weight, 600.0);
        assert_eq!(profile.tare_weight, 25.0);
        assert!((profile.payload_limit() - 575.0).abs() < EPSILON_GENERAL);

        assert!(PalletProfile::new(120.0, 80.0, 170.0, 600.0, 25.0).is_ok());
        assert!(PalletProfile::new(0.0, 80.0, 170.0, 600.0, 25.0).is_err());
        // Tare at or above the gross cap leaves no payload.
        assert!(PalletProfile::new(120.0, 80.0, 170.0, 600.0, 600.0).is_err());
        assert!(PalletProfile::new(120.0, 80.0, 170.0, 600.0, 700.0).is_err());
    }
}
