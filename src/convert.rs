//! Data converters (§4.6): deterministic, total, no I/O.
//!
//! Expand quantities into unit pieces, project domain records into the
//! minimal algorithm record shapes, and lift algorithm results back to
//! `LayoutData` with discriminators.

use uuid::Uuid;

use crate::model::{Cut, CuttingJob, LayoutData, Placement, ScenarioParameters, StockItem, StockType};
use crate::strategies::{
    Bar, Options1D, Options2D, Piece1D, Piece2D, Sheet, Stock1D, Stock2D,
};

/// Expands a job's items into unit-length 1D pieces (one entry per unit of
/// quantity), coercing nullable dimensions to 0 as flagged in geometry
/// classification.
pub fn job_to_pieces_1d(job: &CuttingJob) -> Vec<Piece1D> {
    let mut out = Vec::new();
    for item in &job.items {
        let length = item.order_item.length.max(0.0);
        for _ in 0..item.quantity {
            out.push(Piece1D {
                id: Uuid::new_v4(),
                order_item_id: item.order_item.id,
                length,
            });
        }
    }
    out
}

pub fn job_to_pieces_2d(job: &CuttingJob) -> Vec<Piece2D> {
    let mut out = Vec::new();
    for item in &job.items {
        let w = item.order_item.length.max(0.0);
        let h = item.order_item.width.max(0.0);
        for _ in 0..item.quantity {
            out.push(Piece2D {
                id: Uuid::new_v4(),
                order_item_id: item.order_item.id,
                w,
                h,
                can_rotate: item.order_item.can_rotate,
            });
        }
    }
    out
}

/// Filters stock by `stockType` and projects into the 1D algorithm shape.
pub fn stock_to_1d(stock: &[StockItem]) -> Vec<Stock1D> {
    stock
        .iter()
        .filter(|s| s.stock_type == StockType::Bar1D)
        .filter_map(|s| {
            s.length.map(|length| Stock1D {
                id: s.id,
                length,
                available: s.available(),
                unit_price: s.unit_price,
            })
        })
        .collect()
}

pub fn stock_to_2d(stock: &[StockItem]) -> Vec<Stock2D> {
    stock
        .iter()
        .filter(|s| s.stock_type == StockType::Sheet2D)
        .filter_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) => Some(Stock2D {
                id: s.id,
                w,
                h,
                available: s.available(),
                unit_price: s.unit_price,
            }),
            _ => None,
        })
        .collect()
}

pub fn options_1d(params: &ScenarioParameters, default_min_usable_waste: f64) -> Options1D {
    Options1D {
        kerf: params.kerf,
        min_usable_waste: if params.min_usable_waste > 0.0 {
            params.min_usable_waste
        } else {
            default_min_usable_waste
        },
    }
}

pub fn options_2d(params: &ScenarioParameters) -> Options2D {
    Options2D {
        kerf: params.kerf,
        allow_rotation: params.allow_rotation,
    }
}

/// Lifts a packed bar into the persisted `LayoutData` discriminated union.
pub fn bar_to_layout(bar: &Bar) -> LayoutData {
    LayoutData::OneD {
        stock_length: bar.stock_length,
        cuts: bar
            .cuts
            .iter()
            .map(|c| Cut {
                piece_id: c.piece_id,
                offset: c.offset,
                length: c.length,
            })
            .collect(),
        usable_waste: bar.usable_waste,
    }
}

pub fn sheet_to_layout(sheet: &Sheet) -> LayoutData {
    LayoutData::TwoD {
        stock_width: sheet.stock_w,
        stock_height: sheet.stock_h,
        placements: sheet
            .placements
            .iter()
            .map(|p| Placement {
                piece_id: p.piece_id,
                x: p.x,
                y: p.y,
                w: p.w,
                h: p.h,
                rotated: p.rotated,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CuttingJobItem, CuttingJobStatus, GeometryType, OrderItem};

    fn job_with_item(geometry: GeometryType, length: f64, width: f64, qty: u32) -> CuttingJob {
        CuttingJob {
            id: Uuid::new_v4(),
            material_type_id: Uuid::new_v4(),
            thickness: 18.0,
            status: CuttingJobStatus::Pending,
            items: vec![CuttingJobItem {
                id: Uuid::new_v4(),
                order_item: OrderItem {
                    id: Uuid::new_v4(),
                    geometry_type: geometry,
                    length,
                    width,
                    can_rotate: true,
                },
                quantity: qty,
            }],
        }
    }

    #[test]
    fn expands_quantity_into_unit_pieces() {
        let job = job_with_item(GeometryType::Bar1D, 600.0, 0.0, 3);
        let pieces = job_to_pieces_1d(&job);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.length == 600.0));
    }

    #[test]
    fn stock_filter_separates_dimensionality() {
        let bar = StockItem {
            id: Uuid::new_v4(),
            material_type_id: Uuid::new_v4(),
            stock_type: StockType::Bar1D,
            length: Some(2000.0),
            width: None,
            height: None,
            thickness: 18.0,
            quantity: 5,
            reserved_qty: 1,
            unit_price: 10.0,
            is_from_waste: false,
        };
        let sheet = StockItem {
            stock_type: StockType::Sheet2D,
            length: None,
            width: Some(1220.0),
            height: Some(2440.0),
            ..bar.clone()
        };

        let ones = stock_to_1d(&[bar.clone(), sheet.clone()]);
        let twos = stock_to_2d(&[bar, sheet]);

        assert_eq!(ones.len(), 1);
        assert_eq!(ones[0].available, 4);
        assert_eq!(twos.len(), 1);
    }
}
