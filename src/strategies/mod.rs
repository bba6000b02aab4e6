//! Strategy registry (§4.4) and shared strategy I/O shapes (§4.2/§4.3).

pub mod oned;
pub mod twod;

use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::Algorithm;

#[derive(Clone, Debug)]
pub struct Piece1D {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub length: f64,
}

#[derive(Clone, Debug)]
pub struct Stock1D {
    pub id: Uuid,
    pub length: f64,
    pub available: u32,
    pub unit_price: f64,
}

#[derive(Clone, Debug)]
pub struct Cut1D {
    pub piece_id: Uuid,
    pub offset: f64,
    pub length: f64,
}

#[derive(Clone, Debug)]
pub struct Bar {
    pub stock_id: Uuid,
    pub stock_length: f64,
    pub cuts: Vec<Cut1D>,
    pub waste: f64,
    pub waste_percentage: f64,
    pub usable_waste: f64,
}

#[derive(Clone, Debug)]
pub struct Options1D {
    pub kerf: f64,
    pub min_usable_waste: f64,
}

#[derive(Clone, Debug, Default)]
pub struct Statistics {
    pub efficiency: f64,
}

#[derive(Clone, Debug)]
pub struct Result1D {
    pub bars: Vec<Bar>,
    pub unplaced_pieces: Vec<Uuid>,
    pub statistics: Statistics,
}

#[derive(Clone, Debug)]
pub struct Piece2D {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub w: f64,
    pub h: f64,
    pub can_rotate: bool,
}

#[derive(Clone, Debug)]
pub struct Stock2D {
    pub id: Uuid,
    pub w: f64,
    pub h: f64,
    pub available: u32,
    pub unit_price: f64,
}

#[derive(Clone, Debug)]
pub struct Placement2D {
    pub piece_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub rotated: bool,
}

#[derive(Clone, Debug)]
pub struct Sheet {
    pub stock_id: Uuid,
    pub stock_w: f64,
    pub stock_h: f64,
    pub placements: Vec<Placement2D>,
    pub waste: f64,
    pub waste_percentage: f64,
}

#[derive(Clone, Debug)]
pub struct Options2D {
    pub kerf: f64,
    pub allow_rotation: bool,
}

#[derive(Clone, Debug)]
pub struct Result2D {
    pub sheets: Vec<Sheet>,
    pub unplaced_pieces: Vec<Uuid>,
    pub statistics: Statistics,
}

/// A 1D packing strategy. Implementations are pure values, not trait objects
/// with hidden state — every call is self-contained and deterministic.
pub trait Strategy1D: Send + Sync {
    fn execute(&self, pieces: &[Piece1D], stock: &[Stock1D], options: &Options1D) -> Result1D;
}

pub trait Strategy2D: Send + Sync {
    fn execute(&self, pieces: &[Piece2D], stock: &[Stock2D], options: &Options2D) -> Result2D;
}

struct Registry {
    ffd: oned::Ffd,
    bfd: oned::Bfd,
    bottom_left: twod::BottomLeft,
    guillotine: twod::Guillotine,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        ffd: oned::Ffd,
        bfd: oned::Bfd,
        bottom_left: twod::BottomLeft,
        guillotine: twod::Guillotine,
    })
}

pub fn lookup_1d(algorithm: Algorithm) -> Result<&'static dyn Strategy1D, EngineError> {
    let r = registry();
    match algorithm {
        Algorithm::Ffd1D => Ok(&r.ffd),
        Algorithm::Bfd1D => Ok(&r.bfd),
        _ => Err(EngineError::AlgorithmMismatch {
            algorithm: algorithm.name().to_string(),
            dimension: "1D".to_string(),
        }),
    }
}

pub fn lookup_2d(algorithm: Algorithm) -> Result<&'static dyn Strategy2D, EngineError> {
    let r = registry();
    match algorithm {
        Algorithm::BottomLeft2D => Ok(&r.bottom_left),
        Algorithm::Guillotine2D => Ok(&r.guillotine),
        _ => Err(EngineError::AlgorithmMismatch {
            algorithm: algorithm.name().to_string(),
            dimension: "2D".to_string(),
        }),
    }
}

pub fn parse_algorithm(name: &str) -> Result<Algorithm, EngineError> {
    Algorithm::parse(name).ok_or_else(|| EngineError::InvalidAlgorithm(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_rejects_cross_dimension_algorithm() {
        let err = lookup_1d(Algorithm::Guillotine2D).unwrap_err();
        assert_eq!(err.code(), "ALGORITHM_MISMATCH");

        let err = lookup_2d(Algorithm::Ffd1D).unwrap_err();
        assert_eq!(err.code(), "ALGORITHM_MISMATCH");
    }

    #[test]
    fn parse_unknown_algorithm_errors() {
        let err = parse_algorithm("BOGUS").unwrap_err();
        assert_eq!(err.code(), "INVALID_ALGORITHM");
    }
}
