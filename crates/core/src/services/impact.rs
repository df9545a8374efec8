//! Environmental and business impact estimates for generated ideas.
//!
//! Metrics are derived from the material, the quantity and the idea name. CO2
//! and water savings are deterministic; profit margin and feasibility include a
//! bounded random component drawn from the supplied RNG.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::Serialize;

/// Quantity assumed when the quantity string carries no number.
pub const DEFAULT_QUANTITY: f64 = 10.0;

static QUANTITY_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)").expect("valid quantity regex"));

static QUANTITY_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+(\.\d+)?\s*[A-Za-z]+(\s*/\s*[A-Za-z]+)?\s*$")
        .expect("valid quantity format regex")
});

/// Per-material coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialFactors {
    /// kg CO2 saved per unit
    pub co2: f64,
    /// litres of water saved per unit
    pub water: f64,
    /// Base profit margin in percent
    pub base_profit: f64,
}

/// Adjustments keyed by the kind of product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductModifier {
    pub profit: f64,
    pub feasibility: f64,
}

/// Material rows, matched in order by lowercase substring. First match wins.
const MATERIAL_TABLE: &[(&str, MaterialFactors)] = &[
    ("textile", MaterialFactors { co2: 15.1, water: 700_000.0, base_profit: 22.0 }),
    ("cotton", MaterialFactors { co2: 15.1, water: 700_000.0, base_profit: 22.0 }),
    ("plastic", MaterialFactors { co2: 2.1, water: 120_000.0, base_profit: 18.0 }),
    ("paper", MaterialFactors { co2: 3.9, water: 340_000.0, base_profit: 15.0 }),
    ("wood", MaterialFactors { co2: 1.8, water: 200_000.0, base_profit: 20.0 }),
    ("metal", MaterialFactors { co2: 1.5, water: 85_000.0, base_profit: 25.0 }),
    ("glass", MaterialFactors { co2: 0.3, water: 45_000.0, base_profit: 12.0 }),
    ("food", MaterialFactors { co2: 0.5, water: 180_000.0, base_profit: 10.0 }),
    ("electronic", MaterialFactors { co2: 2.8, water: 95_000.0, base_profit: 30.0 }),
];

const DEFAULT_MATERIAL: MaterialFactors = MaterialFactors {
    co2: 8.0,
    water: 400_000.0,
    base_profit: 18.0,
};

/// Product-type rows, matched in order against the lowercase idea name.
const PRODUCT_TABLE: &[(&str, ProductModifier)] = &[
    ("insulation", ProductModifier { profit: 1.2, feasibility: 1.1 }),
    ("furniture", ProductModifier { profit: 1.15, feasibility: 0.95 }),
    ("packaging", ProductModifier { profit: 0.9, feasibility: 1.15 }),
    ("building", ProductModifier { profit: 1.1, feasibility: 0.9 }),
    ("textile", ProductModifier { profit: 1.0, feasibility: 1.0 }),
];

const DEFAULT_PRODUCT: ProductModifier = ProductModifier {
    profit: 1.0,
    feasibility: 1.0,
};

/// Impact metrics for one idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub co2_saved: i64,
    pub water_saved: i64,
    pub profit_margin: i32,
    pub feasibility_score: i32,
}

/// Whether `quantity` has the shape `<number> <unit>[/<period>]`.
#[must_use]
pub fn is_valid_quantity(quantity: &str) -> bool {
    QUANTITY_FORMAT_RE.is_match(quantity)
}

/// The first number in the quantity string, or [`DEFAULT_QUANTITY`].
#[must_use]
pub fn parse_quantity(quantity: &str) -> f64 {
    QUANTITY_NUMBER_RE
        .captures(quantity)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_QUANTITY)
}

/// Coefficients for a material description.
#[must_use]
pub fn material_factors(material: &str) -> MaterialFactors {
    let material = material.to_lowercase();
    MATERIAL_TABLE
        .iter()
        .find(|(key, _)| material.contains(key))
        .map_or(DEFAULT_MATERIAL, |(_, factors)| *factors)
}

/// Modifier for an idea name.
#[must_use]
pub fn product_modifier(idea_name: &str) -> ProductModifier {
    let name = idea_name.to_lowercase();
    PRODUCT_TABLE
        .iter()
        .find(|(key, _)| name.contains(key))
        .map_or(DEFAULT_PRODUCT, |(_, modifier)| *modifier)
}

/// Compute the impact metrics of one idea.
pub fn calculate<R: Rng + ?Sized>(
    material: &str,
    quantity: &str,
    idea_name: &str,
    rng: &mut R,
) -> ImpactMetrics {
    let factors = material_factors(material);
    let modifier = product_modifier(idea_name);
    let annual_quantity = parse_quantity(quantity) * 12.0;

    let co2_saved = (annual_quantity * factors.co2).round() as i64;
    let water_saved = (annual_quantity * factors.water).round() as i64;

    let profit = factors
        .base_profit
        .mul_add(modifier.profit, rng.gen_range(-4.0..=4.0))
        .round() as i32;

    let feasibility = (rng.gen_range(70.0..=85.0) * modifier.feasibility)
        .min(95.0)
        .round() as i32;

    ImpactMetrics {
        co2_saved,
        water_saved,
        profit_margin: profit.clamp(5, 40),
        feasibility_score: feasibility.clamp(50, 95),
    }
}
