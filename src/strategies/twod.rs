//! 2D strategies: Bottom-Left-Fill and Guillotine rectangle packing (§4.3).

use uuid::Uuid;

use crate::geometry::{FreeRect, Rect, rects_overlap};

use super::{Options2D, Piece2D, Placement2D, Result2D, Sheet, Statistics, Stock2D, Strategy2D};

/// Sorts pieces by `max(w,h)` descending, tie-broken by area then id.
fn sorted_pieces(pieces: &[Piece2D]) -> Vec<&Piece2D> {
    let mut v: Vec<&Piece2D> = pieces.iter().collect();
    v.sort_by(|a, b| {
        let ma = a.w.max(a.h);
        let mb = b.w.max(b.h);
        mb.partial_cmp(&ma)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                (b.w * b.h)
                    .partial_cmp(&(a.w * a.h))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    v
}

fn cheapest_fitting_stock<'a>(
    stock: &'a [Stock2D],
    used: &std::collections::HashMap<Uuid, u32>,
    piece: Rect,
    allow_rotation: bool,
) -> Option<&'a Stock2D> {
    stock
        .iter()
        .filter(|s| used.get(&s.id).copied().unwrap_or(0) < s.available)
        .filter(|s| {
            let sheet = Rect::new(s.w, s.h);
            piece.fits_in(&sheet) || (allow_rotation && piece.rotated().fits_in(&sheet))
        })
        .min_by(|a, b| {
            a.unit_price
                .partial_cmp(&b.unit_price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
}

struct OpenSheet {
    stock_id: Uuid,
    w: f64,
    h: f64,
    free: Vec<FreeRect>,
    placed: Vec<FreeRect>,
    placements: Vec<Placement2D>,
}

impl OpenSheet {
    fn new(stock_id: Uuid, w: f64, h: f64) -> Self {
        Self {
            stock_id,
            w,
            h,
            free: vec![FreeRect {
                x: 0.0,
                y: 0.0,
                w,
                h,
            }],
            placed: Vec::new(),
            placements: Vec::new(),
        }
    }

    fn finalize(self) -> Sheet {
        let used_area: f64 = self.placements.iter().map(|p| p.w * p.h).sum();
        let waste = self.w * self.h - used_area;
        let waste_percentage = if self.w * self.h > 0.0 {
            (waste / (self.w * self.h)) * 100.0
        } else {
            0.0
        };
        Sheet {
            stock_id: self.stock_id,
            stock_w: self.w,
            stock_h: self.h,
            placements: self.placements,
            waste,
            waste_percentage,
        }
    }
}

/// Orientation candidates for a piece, honoring rotation rules.
fn orientations(piece: &Piece2D, allow_rotation: bool) -> Vec<(f64, f64, bool)> {
    let can_rotate = crate::geometry::rotatable(piece.can_rotate, allow_rotation);
    if can_rotate {
        vec![(piece.w, piece.h, false), (piece.h, piece.w, true)]
    } else {
        vec![(piece.w, piece.h, false)]
    }
}

pub struct BottomLeft;

impl Strategy2D for BottomLeft {
    fn execute(&self, pieces: &[Piece2D], stock: &[Stock2D], options: &Options2D) -> Result2D {
        let ordered = sorted_pieces(pieces);
        let mut open_sheets: Vec<OpenSheet> = Vec::new();
        let mut used: std::collections::HashMap<Uuid, u32> = std::collections::HashMap::new();
        let mut unplaced = Vec::new();

        'piece: for piece in ordered {
            for sheet in open_sheets.iter_mut() {
                if try_place_bottom_left(sheet, piece, options) {
                    continue 'piece;
                }
            }

            let base = Rect::new(piece.w, piece.h);
            let can_rotate = crate::geometry::rotatable(piece.can_rotate, options.allow_rotation);
            match cheapest_fitting_stock(stock, &used, base, can_rotate) {
                Some(s) => {
                    *used.entry(s.id).or_insert(0) += 1;
                    let mut sheet = OpenSheet::new(s.id, s.w, s.h);
                    if !try_place_bottom_left(&mut sheet, piece, options) {
                        unplaced.push(piece.id);
                        continue;
                    }
                    open_sheets.push(sheet);
                }
                None => unplaced.push(piece.id),
            }
        }

        finish(open_sheets, unplaced)
    }
}

/// Finds the candidate free rectangle with the bottom-most, then left-most
/// origin that accepts the (kerf-inflated) piece in either allowed
/// orientation, places it there, and splits the rectangle into a
/// right-strip and a top-strip.
fn try_place_bottom_left(sheet: &mut OpenSheet, piece: &Piece2D, options: &Options2D) -> bool {
    // Select the free rectangle by the spec's position rule (bottom-most,
    // then left-most origin) among rectangles that accept the piece in at
    // least one allowed orientation and don't collide with what's already
    // placed; orientation within that chosen rectangle is decided
    // separately, by waste, below.
    let mut best: Option<(usize, f64, f64)> = None;

    for (idx, fr) in sheet.free.iter().enumerate() {
        let mut fits_any = false;
        for (w, h, _) in orientations(piece, options.allow_rotation) {
            let inflated = Rect::new(w + options.kerf, h + options.kerf);
            if !fr.accepts(inflated) {
                continue;
            }
            let candidate = FreeRect {
                x: fr.x,
                y: fr.y,
                w: inflated.w,
                h: inflated.h,
            };
            if !sheet.placed.iter().any(|p| rects_overlap(p, &candidate)) {
                fits_any = true;
                break;
            }
        }
        if !fits_any {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, by, bx)) => (fr.y, fr.x) < (by, bx),
        };
        if better {
            best = Some((idx, fr.y, fr.x));
        }
    }

    let Some((idx, _, _)) = best else {
        return false;
    };

    // Rotation: on the chosen free rectangle, prefer whichever allowed
    // orientation leaves less placed-area waste; tie prefers unrotated.
    let fr_area = sheet.free[idx].area();
    let mut rotated = false;
    let mut best_waste = f64::INFINITY;
    for (w, h, candidate_rotated) in orientations(piece, options.allow_rotation) {
        let inflated = Rect::new(w + options.kerf, h + options.kerf);
        if !sheet.free[idx].accepts(inflated) {
            continue;
        }
        let waste = fr_area - inflated.area();
        if waste < best_waste {
            best_waste = waste;
            rotated = candidate_rotated;
        }
    }

    let fr = sheet.free.remove(idx);
    let (raw_w, raw_h) = if rotated {
        (piece.h, piece.w)
    } else {
        (piece.w, piece.h)
    };
    let pw = raw_w + options.kerf;
    let ph = raw_h + options.kerf;

    sheet.placements.push(Placement2D {
        piece_id: piece.id,
        x: fr.x,
        y: fr.y,
        w: raw_w,
        h: raw_h,
        rotated,
    });
    sheet.placed.push(FreeRect {
        x: fr.x,
        y: fr.y,
        w: pw,
        h: ph,
    });

    let right = FreeRect {
        x: fr.x + pw,
        y: fr.y,
        w: fr.w - pw,
        h: ph,
    };
    let top = FreeRect {
        x: fr.x,
        y: fr.y + ph,
        w: fr.w,
        h: fr.h - ph,
    };
    if right.w > 0.0 && right.h > 0.0 {
        sheet.free.push(right);
    }
    if top.w > 0.0 && top.h > 0.0 {
        sheet.free.push(top);
    }

    true
}

pub struct Guillotine;

impl Strategy2D for Guillotine {
    fn execute(&self, pieces: &[Piece2D], stock: &[Stock2D], options: &Options2D) -> Result2D {
        let ordered = sorted_pieces(pieces);
        let mut open_sheets: Vec<OpenSheet> = Vec::new();
        let mut used: std::collections::HashMap<Uuid, u32> = std::collections::HashMap::new();
        let mut unplaced = Vec::new();

        'piece: for piece in ordered {
            for sheet in open_sheets.iter_mut() {
                if try_place_guillotine(sheet, piece, options) {
                    continue 'piece;
                }
            }

            let base = Rect::new(piece.w, piece.h);
            let can_rotate = crate::geometry::rotatable(piece.can_rotate, options.allow_rotation);
            match cheapest_fitting_stock(stock, &used, base, can_rotate) {
                Some(s) => {
                    *used.entry(s.id).or_insert(0) += 1;
                    let mut sheet = OpenSheet::new(s.id, s.w, s.h);
                    if !try_place_guillotine(&mut sheet, piece, options) {
                        unplaced.push(piece.id);
                        continue;
                    }
                    open_sheets.push(sheet);
                }
                None => unplaced.push(piece.id),
            }
        }

        finish(open_sheets, unplaced)
    }
}

/// First free rectangle (in split-generation order) that fits the piece in
/// an allowed orientation. Splits it into exactly two orthogonal free
/// rectangles by a full-width or full-height cut, choosing the axis that
/// leaves the larger single residual rectangle (short-axis split rule).
fn try_place_guillotine(sheet: &mut OpenSheet, piece: &Piece2D, options: &Options2D) -> bool {
    let mut found: Option<(usize, f64, f64, bool)> = None;

    for (idx, fr) in sheet.free.iter().enumerate() {
        // Among the orientations that fit this rectangle, prefer whichever
        // leaves less placed-area waste; tie prefers unrotated (tried first).
        let mut best_orientation: Option<(f64, f64, bool)> = None;
        let mut best_waste = f64::INFINITY;
        for (w, h, candidate_rotated) in orientations(piece, options.allow_rotation) {
            let inflated = Rect::new(w + options.kerf, h + options.kerf);
            if !fr.accepts(inflated) {
                continue;
            }
            let waste = fr.area() - inflated.area();
            if waste < best_waste {
                best_waste = waste;
                best_orientation = Some((inflated.w, inflated.h, candidate_rotated));
            }
        }
        if let Some((pw, ph, rotated)) = best_orientation {
            found = Some((idx, pw, ph, rotated));
            break;
        }
    }

    let Some((idx, pw, ph, rotated)) = found else {
        return false;
    };

    let fr = sheet.free.remove(idx);
    let (raw_w, raw_h) = if rotated {
        (piece.h, piece.w)
    } else {
        (piece.w, piece.h)
    };

    sheet.placements.push(Placement2D {
        piece_id: piece.id,
        x: fr.x,
        y: fr.y,
        w: raw_w,
        h: raw_h,
        rotated,
    });
    sheet.placed.push(FreeRect {
        x: fr.x,
        y: fr.y,
        w: pw,
        h: ph,
    });

    // Option A: full-width cut below the piece's top edge.
    let a_top = FreeRect {
        x: fr.x,
        y: fr.y + ph,
        w: fr.w,
        h: fr.h - ph,
    };
    let a_right = FreeRect {
        x: fr.x + pw,
        y: fr.y,
        w: fr.w - pw,
        h: ph,
    };
    // Option B: full-height cut right of the piece's trailing edge.
    let b_right = FreeRect {
        x: fr.x + pw,
        y: fr.y,
        w: fr.w - pw,
        h: fr.h,
    };
    let b_top = FreeRect {
        x: fr.x,
        y: fr.y + ph,
        w: pw,
        h: fr.h - ph,
    };

    let max_a = (a_top.w * a_top.h).max(a_right.w * a_right.h);
    let max_b = (b_right.w * b_right.h).max(b_top.w * b_top.h);

    let mut residuals = if max_a >= max_b {
        vec![a_right, a_top]
    } else {
        vec![b_top, b_right]
    };
    residuals.sort_by(|r1, r2| {
        (r1.w * r1.h)
            .partial_cmp(&(r2.w * r2.h))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for r in residuals {
        if r.w > 0.0 && r.h > 0.0 {
            sheet.free.push(r);
        }
    }

    true
}

fn finish(open_sheets: Vec<OpenSheet>, unplaced: Vec<Uuid>) -> Result2D {
    let total_area: f64 = open_sheets.iter().map(|s| s.w * s.h).sum();
    let sheets: Vec<Sheet> = open_sheets.into_iter().map(OpenSheet::finalize).collect();
    let total_waste: f64 = sheets.iter().map(|s| s.waste).sum();
    let efficiency = if total_area > 0.0 {
        100.0 - (total_waste / total_area) * 100.0
    } else {
        100.0
    };

    Result2D {
        sheets,
        unplaced_pieces: unplaced,
        statistics: Statistics { efficiency },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(w: f64, h: f64, can_rotate: bool) -> Piece2D {
        Piece2D {
            id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            w,
            h,
            can_rotate,
        }
    }

    fn stock(w: f64, h: f64, available: u32) -> Stock2D {
        Stock2D {
            id: Uuid::new_v4(),
            w,
            h,
            available,
            unit_price: 10.0,
        }
    }

    #[test]
    fn bottom_left_places_two_pieces_on_one_sheet_side_by_side() {
        let p1 = piece(600.0, 400.0, true);
        let p2 = piece(600.0, 400.0, true);
        let stock = vec![stock(1220.0, 2440.0, 10)];
        let options = Options2D {
            kerf: 3.0,
            allow_rotation: true,
        };

        let result = BottomLeft.execute(&[p1, p2], &stock, &options);

        assert_eq!(result.sheets.len(), 1);
        assert!(result.unplaced_pieces.is_empty());
        let sheet = &result.sheets[0];
        assert_eq!(sheet.placements.len(), 2);
        for p in &sheet.placements {
            assert!(p.x + p.w <= sheet.stock_w);
            assert!(p.y + p.h <= sheet.stock_h);
        }
        let expected_waste = 1220.0 * 2440.0 - 2.0 * 600.0 * 400.0;
        assert_eq!(sheet.waste, expected_waste);
    }

    #[test]
    fn bottom_left_rejects_overlapping_placements() {
        let p1 = piece(600.0, 400.0, false);
        let p2 = piece(600.0, 400.0, false);
        let stock = vec![stock(1220.0, 2440.0, 10)];
        let options = Options2D {
            kerf: 3.0,
            allow_rotation: true,
        };

        let result = BottomLeft.execute(&[p1, p2], &stock, &options);
        let placements = &result.sheets[0].placements;
        for i in 0..placements.len() {
            for j in (i + 1)..placements.len() {
                let a = FreeRect {
                    x: placements[i].x,
                    y: placements[i].y,
                    w: placements[i].w + options.kerf,
                    h: placements[i].h + options.kerf,
                };
                let b = FreeRect {
                    x: placements[j].x,
                    y: placements[j].y,
                    w: placements[j].w + options.kerf,
                    h: placements[j].h + options.kerf,
                };
                assert!(!rects_overlap(&a, &b));
            }
        }
    }

    #[test]
    fn guillotine_splits_by_short_axis_rule() {
        let p = piece(600.0, 600.0, false);
        let q = piece(400.0, 400.0, false);
        let r = piece(300.0, 300.0, false);
        let stock = vec![stock(1000.0, 1000.0, 1)];
        let options = Options2D {
            kerf: 0.0,
            allow_rotation: false,
        };

        let result = Guillotine.execute(&[p, q, r], &stock, &options);

        assert_eq!(result.sheets.len(), 1);
        assert!(result.unplaced_pieces.is_empty());
        assert_eq!(result.sheets[0].placements.len(), 3);
    }

    #[test]
    fn allow_rotation_false_never_rotates() {
        let p = piece(400.0, 600.0, true);
        let stock = vec![stock(1000.0, 500.0, 1)];
        let options = Options2D {
            kerf: 0.0,
            allow_rotation: false,
        };

        let result = BottomLeft.execute(&[p], &stock, &options);
        // 400x600 doesn't fit unrotated into a 1000x500 sheet (h=600 > 500),
        // and rotation is disallowed, so it must open no sheet / be unplaced.
        assert!(result.unplaced_pieces.len() == 1 || result.sheets.is_empty());
    }

    #[test]
    fn bottom_left_rotates_when_only_rotated_orientation_fits() {
        // 400x600 doesn't fit unrotated into a 1000x500 sheet (h=600 > 500),
        // but the rotated 600x400 does; rotation is allowed, so it must place.
        let p = piece(400.0, 600.0, true);
        let stock = vec![stock(1000.0, 500.0, 1)];
        let options = Options2D {
            kerf: 0.0,
            allow_rotation: true,
        };

        let result = BottomLeft.execute(&[p], &stock, &options);

        assert!(result.unplaced_pieces.is_empty());
        let placement = &result.sheets[0].placements[0];
        assert!(placement.rotated);
        assert_eq!((placement.w, placement.h), (600.0, 400.0));
    }

    #[test]
    fn guillotine_rotates_when_only_rotated_orientation_fits() {
        let p = piece(400.0, 600.0, true);
        let stock = vec![stock(1000.0, 500.0, 1)];
        let options = Options2D {
            kerf: 0.0,
            allow_rotation: true,
        };

        let result = Guillotine.execute(&[p], &stock, &options);

        assert!(result.unplaced_pieces.is_empty());
        let placement = &result.sheets[0].placements[0];
        assert!(placement.rotated);
        assert_eq!((placement.w, placement.h), (600.0, 400.0));
    }

    #[test]
    fn bottom_left_prefers_unrotated_on_tie_when_both_orientations_fit() {
        let p = piece(400.0, 400.0, true);
        let stock = vec![stock(1000.0, 1000.0, 1)];
        let options = Options2D {
            kerf: 0.0,
            allow_rotation: true,
        };

        let result = BottomLeft.execute(&[p], &stock, &options);

        assert!(result.unplaced_pieces.is_empty());
        assert!(!result.sheets[0].placements[0].rotated);
    }
}
