//! Entities from the data model: the shapes the engine loads, produces, and persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StockType {
    #[default]
    Bar1D,
    Sheet2D,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialType {
    pub id: Uuid,
    pub name: String,
    pub rotatable_default: bool,
    pub density: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockItem {
    pub id: Uuid,
    pub material_type_id: Uuid,
    pub stock_type: StockType,
    /// Present (> 0) for Bar1D.
    pub length: Option<f64>,
    /// Present (> 0) for Sheet2D.
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub thickness: f64,
    pub quantity: u32,
    pub reserved_qty: u32,
    pub unit_price: f64,
    pub is_from_waste: bool,
}

impl StockItem {
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved_qty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Bar1D,
    Rectangle,
    Square,
    Circle,
    Polygon,
    Freeform,
}

impl GeometryType {
    pub fn is_1d(self) -> bool {
        matches!(self, GeometryType::Bar1D)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub geometry_type: GeometryType,
    /// Length for 1D pieces, or the longer rectangle side.
    pub length: f64,
    /// Zero for 1D pieces.
    pub width: f64,
    pub can_rotate: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CuttingJobItem {
    pub id: Uuid,
    pub order_item: OrderItem,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuttingJobStatus {
    Pending,
    Optimizing,
    Optimized,
    InProduction,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CuttingJob {
    pub id: Uuid,
    pub material_type_id: Uuid,
    pub thickness: f64,
    pub status: CuttingJobStatus,
    pub items: Vec<CuttingJobItem>,
}

impl CuttingJob {
    /// §3 invariant: geometryType of the first item determines dimensionality.
    pub fn is_1d(&self) -> bool {
        self.items
            .first()
            .map(|i| i.order_item.geometry_type.is_1d())
            .unwrap_or(true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Ffd1D,
    Bfd1D,
    BottomLeft2D,
    Guillotine2D,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Ffd1D => "1D_FFD",
            Algorithm::Bfd1D => "1D_BFD",
            Algorithm::BottomLeft2D => "2D_BOTTOM_LEFT",
            Algorithm::Guillotine2D => "2D_GUILLOTINE",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "1D_FFD" => Some(Algorithm::Ffd1D),
            "1D_BFD" => Some(Algorithm::Bfd1D),
            "2D_BOTTOM_LEFT" => Some(Algorithm::BottomLeft2D),
            "2D_GUILLOTINE" => Some(Algorithm::Guillotine2D),
            _ => None,
        }
    }

    pub fn is_1d(self) -> bool {
        matches!(self, Algorithm::Ffd1D | Algorithm::Bfd1D)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioParameters {
    pub algorithm: Option<Algorithm>,
    pub kerf: f64,
    pub min_usable_waste: f64,
    pub allow_rotation: bool,
    pub use_warehouse_stock: bool,
    pub use_standard_sizes: bool,
    pub selected_stock_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationScenario {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub cutting_job_id: Uuid,
    pub created_by_id: Uuid,
    pub parameters: ScenarioParameters,
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Draft,
    Approved,
    InProduction,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayoutData {
    #[serde(rename = "1D")]
    OneD {
        stock_length: f64,
        cuts: Vec<Cut>,
        usable_waste: f64,
    },
    #[serde(rename = "2D")]
    TwoD {
        stock_width: f64,
        stock_height: f64,
        placements: Vec<Placement>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cut {
    pub piece_id: Uuid,
    pub offset: f64,
    pub length: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Placement {
    pub piece_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub rotated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CuttingPlanStock {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub sequence: u32,
    pub stock_item_id: Uuid,
    pub waste: f64,
    pub waste_percentage: f64,
    pub layout_data: LayoutData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CuttingPlan {
    pub id: Uuid,
    pub plan_number: String,
    pub scenario_id: Uuid,
    pub total_waste: f64,
    pub waste_percentage: f64,
    pub stock_used_count: u32,
    pub estimated_time: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub status: PlanStatus,
    pub approved_by_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub machine_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
