//! Hierarchical project model: project → levels → areas → line-items
//!
//! This is both the input to synthesis and the output of extraction.
//! Pricing fields are only ever filled in by extraction; synthesis ignores
//! them, and round-trip comparisons strip them with [`Project::without_pricing`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub number: String,
    pub name: String,
    pub customer: String,
    #[serde(default)]
    pub company: String,
    pub estimator: String,
    pub location: String,
    /// `DD/MM/YYYY`
    pub date: String,
    /// Empty for the initial version, otherwise a single letter
    #[serde(default)]
    pub revision: String,
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    #[serde(default)]
    pub options: AreaOptions,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subsystem_pricing: BTreeMap<Subsystem, Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_extra_over: Option<Pricing>,
}

/// Per-area subsystem flags plus the UV comparison request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaOptions {
    pub uv_filtration: bool,
    pub supply_diffusion: bool,
    pub air_recovery: bool,
    pub ventilated_ceiling: bool,
    pub alternate_filtration: bool,
    pub uv_comparison: bool,
}

/// Area-level add-on systems, each backed by one block when enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    UvFiltration,
    SupplyDiffusion,
    AirRecovery,
    VentilatedCeiling,
    AlternateFiltration,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::UvFiltration,
        Subsystem::SupplyDiffusion,
        Subsystem::AirRecovery,
        Subsystem::VentilatedCeiling,
        Subsystem::AlternateFiltration,
    ];
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::UvFiltration => "uv_filtration",
            Subsystem::SupplyDiffusion => "supply_diffusion",
            Subsystem::AirRecovery => "air_recovery",
            Subsystem::VentilatedCeiling => "ventilated_ceiling",
            Subsystem::AlternateFiltration => "alternate_filtration",
        };
        write!(f, "{}", name)
    }
}

impl AreaOptions {
    pub fn has(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::UvFiltration => self.uv_filtration,
            Subsystem::SupplyDiffusion => self.supply_diffusion,
            Subsystem::AirRecovery => self.air_recovery,
            Subsystem::VentilatedCeiling => self.ventilated_ceiling,
            Subsystem::AlternateFiltration => self.alternate_filtration,
        }
    }

    pub fn set(&mut self, subsystem: Subsystem, enabled: bool) {
        let flag = match subsystem {
            Subsystem::UvFiltration => &mut self.uv_filtration,
            Subsystem::SupplyDiffusion => &mut self.supply_diffusion,
            Subsystem::AirRecovery => &mut self.air_recovery,
            Subsystem::VentilatedCeiling => &mut self.ventilated_ceiling,
            Subsystem::AlternateFiltration => &mut self.alternate_filtration,
        };
        *flag = enabled;
    }

    /// Enabled subsystems in canonical order
    pub fn enabled(&self) -> Vec<Subsystem> {
        Subsystem::ALL
            .into_iter()
            .filter(|s| self.has(*s))
            .collect()
    }
}

/// One canopy with its optional fire-suppression add-on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub reference: String,
    pub configuration: String,
    pub model: String,
    pub width: u32,
    pub length: u32,
    pub height: u32,
    pub sections: u32,
    /// Blank text is read as no lighting
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub lighting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_cladding: Option<WallCladding>,
    #[serde(default)]
    pub fire_suppression: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_tanks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_pricing: Option<Pricing>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    Ok(text.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallCladding {
    pub kind: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub positions: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub price: f64,
    pub cost: f64,
}

impl Pricing {
    pub fn new(price: f64, cost: f64) -> Self {
        Self { price, cost }
    }

    /// Margin as a fraction of price; zero when there is no price
    pub fn margin(&self) -> f64 {
        if self.price == 0.0 {
            0.0
        } else {
            (self.price - self.cost) / self.price
        }
    }
}

impl std::ops::Add for Pricing {
    type Output = Pricing;

    fn add(self, rhs: Pricing) -> Pricing {
        Pricing::new(self.price + rhs.price, self.cost + rhs.cost)
    }
}

impl std::ops::AddAssign for Pricing {
    fn add_assign(&mut self, rhs: Pricing) {
        *self = *self + rhs;
    }
}

impl Project {
    /// A copy with every extraction-only pricing field cleared
    pub fn without_pricing(&self) -> Project {
        let mut stripped = self.clone();
        for level in &mut stripped.levels {
            for area in &mut level.areas {
                area.subsystem_pricing.clear();
                area.uv_extra_over = None;
                for item in &mut area.line_items {
                    item.pricing = None;
                    item.suppression_pricing = None;
                }
            }
        }
        stripped
    }

    /// Areas in document order paired with their project-wide 1-based index
    pub fn indexed_areas(&self) -> Vec<(usize, &Level, &Area)> {
        let mut out = Vec::new();
        for level in &self.levels {
            for area in &level.areas {
                out.push((out.len() + 1, level, area));
            }
        }
        out
    }
}

/// Initials for the header cell: `"Yazan Hunjul / Joe Salloum"` → `"YH/JS"`
pub fn estimator_initials(full_name: &str) -> String {
    full_name
        .split('/')
        .map(|person| {
            person
                .split_whitespace()
                .filter_map(|word| word.chars().next())
                .flat_map(|c| c.to_uppercase())
                .collect::<String>()
        })
        .filter(|initials| !initials.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
