//! Quantified invariants over the 1D and 2D strategies, checked against
//! randomly generated piece/stock sets rather than fixed scenarios (§8):
//! every piece id is accounted for exactly once (placed xor unplaced), cuts
//! within a bar never overlap, 2D placements on the same sheet keep a
//! kerf separation on at least one axis, and `0 <= wastePercentage <= 100`
//! always holds.

use std::collections::HashSet;

use cutting_engine::geometry::{FreeRect, rects_overlap};
use cutting_engine::strategies::oned::{Bfd, Ffd};
use cutting_engine::strategies::twod::{BottomLeft, Guillotine};
use cutting_engine::strategies::{Options1D, Options2D, Piece1D, Piece2D, Stock1D, Stock2D, Strategy1D, Strategy2D};
use proptest::prelude::*;
use uuid::Uuid;

fn pieces_strategy() -> impl Strategy<Value = Vec<Piece1D>> {
    prop::collection::vec(50.0f64..900.0, 0..12).prop_map(|lengths| {
        lengths
            .into_iter()
            .map(|length| Piece1D {
                id: Uuid::new_v4(),
                order_item_id: Uuid::new_v4(),
                length,
            })
            .collect()
    })
}

fn stock_strategy() -> impl Strategy<Value = Vec<Stock1D>> {
    prop::collection::vec((500.0f64..3000.0, 1u32..5, 1.0f64..50.0), 1..4).prop_map(|rows| {
        rows.into_iter()
            .map(|(length, available, unit_price)| Stock1D {
                id: Uuid::new_v4(),
                length,
                available,
                unit_price,
            })
            .collect()
    })
}

fn assert_invariants(pieces: &[Piece1D], kerf: f64) -> impl Fn(&cutting_engine::strategies::Result1D) {
    let kerf = kerf;
    let expected: HashSet<Uuid> = pieces.iter().map(|p| p.id).collect();
    move |result| {
        let mut seen: HashSet<Uuid> = HashSet::new();

        for bar in &result.bars {
            assert!(
                bar.waste_percentage >= -1e-6 && bar.waste_percentage <= 100.0 + 1e-6,
                "waste_percentage out of range: {}",
                bar.waste_percentage
            );

            let mut sorted_cuts = bar.cuts.clone();
            sorted_cuts.sort_by(|a, b| a.offset.partial_cmp(&b.offset).unwrap());
            for w in sorted_cuts.windows(2) {
                let end_of_prev = w[0].offset + w[0].length + kerf - 1e-6;
                assert!(
                    w[1].offset >= end_of_prev,
                    "cuts overlap within a bar: {:?} then {:?}",
                    w[0],
                    w[1]
                );
            }

            for cut in &bar.cuts {
                assert!(seen.insert(cut.piece_id), "piece {} placed twice", cut.piece_id);
            }
        }

        for id in &result.unplaced_pieces {
            assert!(seen.insert(*id), "piece {id} both placed and unplaced");
        }

        assert_eq!(&seen, &expected, "every input piece must appear exactly once");
    }
}

fn pieces_strategy_2d() -> impl Strategy<Value = Vec<Piece2D>> {
    prop::collection::vec((100.0f64..900.0, 100.0f64..900.0, any::<bool>()), 0..8).prop_map(|rows| {
        rows.into_iter()
            .map(|(w, h, can_rotate)| Piece2D {
                id: Uuid::new_v4(),
                order_item_id: Uuid::new_v4(),
                w,
                h,
                can_rotate,
            })
            .collect()
    })
}

fn stock_strategy_2d() -> impl Strategy<Value = Vec<Stock2D>> {
    prop::collection::vec((800.0f64..2500.0, 800.0f64..2500.0, 1u32..4, 1.0f64..50.0), 1..3).prop_map(
        |rows| {
            rows.into_iter()
                .map(|(w, h, available, unit_price)| Stock2D {
                    id: Uuid::new_v4(),
                    w,
                    h,
                    available,
                    unit_price,
                })
                .collect()
        },
    )
}

/// Checks §8's 2D invariants: every input piece id is placed xor unplaced;
/// every placement lies inside its sheet; placements on the same sheet keep
/// a kerf separation on at least one axis; `0 <= wastePercentage <= 100`;
/// and `sum(placed area) + waste == sheet area` (by construction, but worth
/// pinning since it's the conservation property §8 quantifies).
fn assert_invariants_2d(pieces: &[Piece2D], kerf: f64) -> impl Fn(&cutting_engine::strategies::Result2D) {
    let kerf = kerf;
    let expected: HashSet<Uuid> = pieces.iter().map(|p| p.id).collect();
    move |result| {
        let mut seen: HashSet<Uuid> = HashSet::new();

        for sheet in &result.sheets {
            assert!(
                sheet.waste_percentage >= -1e-6 && sheet.waste_percentage <= 100.0 + 1e-6,
                "waste_percentage out of range: {}",
                sheet.waste_percentage
            );

            let placed_area: f64 = sheet.placements.iter().map(|p| p.w * p.h).sum();
            let sheet_area = sheet.stock_w * sheet.stock_h;
            assert!(
                (placed_area + sheet.waste - sheet_area).abs() <= 1e-6 * sheet_area.max(1.0),
                "placed area + waste must equal sheet area"
            );

            for p in &sheet.placements {
                assert!(p.x >= -1e-6 && p.y >= -1e-6, "placement origin outside sheet: {p:?}");
                assert!(
                    p.x + p.w <= sheet.stock_w + 1e-6 && p.y + p.h <= sheet.stock_h + 1e-6,
                    "placement extends past sheet bounds: {p:?} on {}x{}",
                    sheet.stock_w,
                    sheet.stock_h
                );
                assert!(seen.insert(p.piece_id), "piece {} placed twice", p.piece_id);
            }

            for i in 0..sheet.placements.len() {
                for j in (i + 1)..sheet.placements.len() {
                    let a = &sheet.placements[i];
                    let b = &sheet.placements[j];
                    let inflated_a = FreeRect {
                        x: a.x,
                        y: a.y,
                        w: a.w + kerf,
                        h: a.h + kerf,
                    };
                    let inflated_b = FreeRect {
                        x: b.x,
                        y: b.y,
                        w: b.w + kerf,
                        h: b.h + kerf,
                    };
                    assert!(
                        !rects_overlap(&inflated_a, &inflated_b),
                        "placements {a:?} and {b:?} lack kerf separation on either axis"
                    );
                }
            }
        }

        for id in &result.unplaced_pieces {
            assert!(seen.insert(*id), "piece {id} both placed and unplaced");
        }

        assert_eq!(&seen, &expected, "every input piece must appear exactly once");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ffd_conserves_pieces_and_respects_bounds(
        pieces in pieces_strategy(),
        stock in stock_strategy(),
        kerf in 0.0f64..5.0,
    ) {
        let options = Options1D { kerf, min_usable_waste: 50.0 };
        let result = Ffd.execute(&pieces, &stock, &options);
        assert_invariants(&pieces, kerf)(&result);
    }

    #[test]
    fn bfd_conserves_pieces_and_respects_bounds(
        pieces in pieces_strategy(),
        stock in stock_strategy(),
        kerf in 0.0f64..5.0,
    ) {
        let options = Options1D { kerf, min_usable_waste: 50.0 };
        let result = Bfd.execute(&pieces, &stock, &options);
        assert_invariants(&pieces, kerf)(&result);
    }

    #[test]
    fn bottom_left_conserves_pieces_and_keeps_kerf_separation(
        pieces in pieces_strategy_2d(),
        stock in stock_strategy_2d(),
        kerf in 0.0f64..10.0,
        allow_rotation in any::<bool>(),
    ) {
        let options = Options2D { kerf, allow_rotation };
        let result = BottomLeft.execute(&pieces, &stock, &options);
        assert_invariants_2d(&pieces, kerf)(&result);
    }

    #[test]
    fn guillotine_conserves_pieces_and_keeps_kerf_separation(
        pieces in pieces_strategy_2d(),
        stock in stock_strategy_2d(),
        kerf in 0.0f64..10.0,
        allow_rotation in any::<bool>(),
    ) {
        let options = Options2D { kerf, allow_rotation };
        let result = Guillotine.execute(&pieces, &stock, &options);
        assert_invariants_2d(&pieces, kerf)(&result);
    }
}
