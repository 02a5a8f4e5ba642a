//! Totals projection over an extracted model
//!
//! Mirrors the summary page: one row per block kind in priority order, a
//! grand total over those rows, and the UV extra-over kept out of the total.

use serde::Serialize;

use crate::model::{Pricing, Project};
use crate::schema::BlockKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindTotal {
    pub kind: String,
    pub price: f64,
    pub cost: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub by_kind: Vec<KindTotal>,
    pub price: f64,
    pub cost: f64,
    pub margin: f64,
    /// Shown alongside, never included in `price` or `cost`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_extra_over: Option<Pricing>,
}

pub fn calculate_totals(project: &Project) -> Totals {
    let mut sums: Vec<(BlockKind, Option<Pricing>)> = BlockKind::ALL
        .into_iter()
        .filter(|k| !k.is_delta())
        .map(|k| (k, None))
        .collect();
    let mut add = |kind: BlockKind, pricing: Pricing| {
        if let Some((_, slot)) = sums.iter_mut().find(|(k, _)| *k == kind) {
            *slot.get_or_insert_with(Pricing::default) += pricing;
        }
    };

    let mut extra_over: Option<Pricing> = None;
    for level in &project.levels {
        for area in &level.areas {
            for item in &area.line_items {
                if let Some(pricing) = item.pricing {
                    add(BlockKind::Canopy, pricing);
                }
                if let Some(pricing) = item.suppression_pricing {
                    add(BlockKind::FireSuppression, pricing);
                }
            }
            for (subsystem, pricing) in &area.subsystem_pricing {
                add(BlockKind::from_subsystem(*subsystem), *pricing);
            }
            if let Some(delta) = area.uv_extra_over {
                *extra_over.get_or_insert_with(Pricing::default) += delta;
            }
        }
    }

    let by_kind: Vec<KindTotal> = sums
        .into_iter()
        .filter_map(|(kind, pricing)| pricing.map(|p| (kind, p)))
        .map(|(kind, p)| KindTotal {
            kind: kind.label().to_string(),
            price: p.price,
            cost: p.cost,
            margin: p.margin(),
        })
        .collect();

    let total: Pricing = by_kind
        .iter()
        .map(|row| Pricing::new(row.price, row.cost))
        .fold(Pricing::default(), |acc, p| acc + p);

    Totals {
        by_kind,
        price: total.price,
        cost: total.cost,
        margin: total.margin(),
        uv_extra_over: extra_over,
    }
}
